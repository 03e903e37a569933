use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::error::{FsError, Result};
use crate::io::MAX_BLOCKS;

pub const SB_MAGIC: u32 = 0x4946_5353; // IFSS

/// Bumped whenever the record layout changes. Snapshots from any other version
/// are refused.
pub const FORMAT_VERSION: u32 = 1;

/// Parent index stored for the root directory record.
pub const NO_PARENT: u64 = u64::MAX;

/// Leading record of a snapshot describing the geometry of the block store and
/// how many records of each kind follow.
///
/// All integers are big endian.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy, Debug, PartialEq)]
pub struct SuperBlock {
    /// A 32-bit identifying string, in this case IFSS.
    pub sb_magic: U32<BigEndian>,
    pub version: U32<BigEndian>,
    /// Bytes per block.
    pub block_size: U64<BigEndian>,
    /// Every block on the device, used or free.
    pub blocks_count: U64<BigEndian>,
    /// Blocks owned by some inode. One block record follows per used block.
    pub used_blocks_count: U64<BigEndian>,
    pub directories_count: U64<BigEndian>,
    pub inodes_count: U64<BigEndian>,
    /// Pre-order index of the directory the cursor was on.
    pub current_directory: U64<BigEndian>,
}

impl SuperBlock {
    pub fn new() -> Self {
        let mut sb = Self::new_zeroed();
        sb.sb_magic.set(SB_MAGIC);
        sb.version.set(FORMAT_VERSION);
        sb
    }

    /// Reads a super block from the front of `buf` and checks that it belongs to
    /// a snapshot this build understands.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let sb = Self::read_from_prefix(buf)
            .ok_or_else(|| FsError::Snapshot("buffer too short for super block".into()))?;
        if sb.sb_magic.get() != SB_MAGIC {
            return Err(FsError::Snapshot(format!(
                "super block magic {:#010x} invalid",
                sb.sb_magic.get()
            )));
        }
        if sb.version.get() != FORMAT_VERSION {
            return Err(FsError::Snapshot(format!(
                "unsupported format version {}",
                sb.version.get()
            )));
        }
        if sb.block_size.get() == 0 {
            return Err(FsError::Snapshot("block size of zero".into()));
        }
        if sb.blocks_count.get() > MAX_BLOCKS as u64 {
            return Err(FsError::Snapshot(format!(
                "{} blocks exceeds the limit of {}",
                sb.blocks_count.get(),
                MAX_BLOCKS
            )));
        }
        if sb.used_blocks_count.get() > sb.blocks_count.get() {
            return Err(FsError::Snapshot(format!(
                "{} used blocks on a device of {}",
                sb.used_blocks_count.get(),
                sb.blocks_count.get()
            )));
        }
        Ok(sb)
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed head of a directory record; the name bytes follow.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct DirRecord {
    /// Pre-order index of the parent, [`NO_PARENT`] for the root.
    pub parent: U64<BigEndian>,
    pub created_at: U64<BigEndian>,
    pub name_len: U32<BigEndian>,
}

/// Fixed head of an inode record; the name bytes and then `block_count`
/// big endian block numbers follow.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct InodeRecord {
    /// Pre-order index of the owning directory.
    pub owner: U64<BigEndian>,
    pub size: U64<BigEndian>,
    pub created_at: U64<BigEndian>,
    pub modified_at: U64<BigEndian>,
    pub mode: u8,
    pub name_len: U32<BigEndian>,
    pub block_count: U32<BigEndian>,
}

/// Fixed head of a block record; `len` payload bytes follow.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct BlockRecord {
    pub blocknr: U64<BigEndian>,
    pub len: U32<BigEndian>,
}
