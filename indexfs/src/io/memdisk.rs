use crate::io::{BlockNumber, BlockStorage};
use std::io::ErrorKind;

/// 512 bytes matches the sector size of most disks the simulation stands in for.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// One mebibyte of addressable space.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Largest number of blocks a single device may hold.
pub const MAX_BLOCKS: usize = 1 << 20;

/// Emulates a block device entirely in memory. Every slot holds at most one
/// block worth of bytes; unwritten slots hold nothing at all.
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    block_size: usize,
    slots: Vec<Option<Vec<u8>>>,
}

impl MemoryDisk {
    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr >= self.slots.len() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "block {} out of range for a device of {} blocks",
                    blocknr,
                    self.slots.len()
                ),
            ));
        }
        Ok(())
    }
}

impl BlockStorage for MemoryDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.slots.len()
    }

    fn read_block(&self, blocknr: BlockNumber) -> std::io::Result<Vec<u8>> {
        self.check_range(blocknr)?;
        Ok(self.slots[blocknr].clone().unwrap_or_default())
    }

    /// This method truncates writes that exceed the total block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        let max = buf.len().min(self.block_size);
        self.slots[blocknr] = Some(buf[..max].to_vec());
        Ok(())
    }

    fn clear_block(&mut self, blocknr: BlockNumber) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        self.slots[blocknr] = None;
        Ok(())
    }
}

/// Sizes a [`MemoryDisk`] from a byte capacity and a block size.
///
/// The number of blocks is `capacity / block_size`; whatever remains after the
/// division is never addressable.
pub struct MemoryDiskBuilder {
    capacity: usize,
    block_size: usize,
}

impl Default for MemoryDiskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDiskBuilder {
    pub fn new() -> Self {
        MemoryDiskBuilder {
            capacity: DEFAULT_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Sets the total number of bytes the device should span.
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = bytes;
        self
    }

    /// Sets the size of a single block in bytes.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    pub fn build(self) -> std::io::Result<MemoryDisk> {
        if self.block_size == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block size must be greater than zero",
            ));
        }
        let block_count = self.capacity / self.block_size;
        if block_count > MAX_BLOCKS {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "{} blocks exceeds the limit of {} per device",
                    block_count, MAX_BLOCKS
                ),
            ));
        }
        Ok(MemoryDisk {
            block_size: self.block_size,
            slots: vec![None; block_count],
        })
    }
}
