//! Whole file system snapshots.
//!
//! A snapshot is a single buffer: a [`SuperBlock`], then one record per
//! directory in pre-order, one record per inode, and one record per used block.
//! It is written and read in one step; there is no partial or incremental
//! form.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::mem::size_of;
use std::path::Path;

use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes};

use crate::alloc::BlockStore;
use crate::error::{FsError, Result};
use crate::fs::FileSystem;
use crate::io::{BlockNumber, BlockStorage, MemoryDisk, MemoryDiskBuilder};
use crate::node::{AccessMode, DirId, Inode, Tree};
use crate::path::validate_name;
use crate::sb::{BlockRecord, DirRecord, InodeRecord, SuperBlock, NO_PARENT};

fn to_usize(value: u64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| FsError::Snapshot(format!("{} {} out of range", what, value)))
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| FsError::Snapshot(format!("{} {} too large to encode", what, value)))
}

/// Cursor over the record area of a snapshot.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn record<T: FromBytes>(&mut self, what: &str) -> Result<T> {
        let record = T::read_from_prefix(self.buf)
            .ok_or_else(|| FsError::Snapshot(format!("truncated {} record", what)))?;
        self.buf = &self.buf[size_of::<T>()..];
        Ok(record)
    }

    fn bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.buf.len() < len {
            return Err(FsError::Snapshot(format!("truncated {}", what)));
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    fn name(&mut self, len: usize) -> Result<String> {
        let raw = self.bytes(len, "name")?;
        let name = std::str::from_utf8(raw)
            .map_err(|_| FsError::Snapshot("name is not valid utf-8".into()))?;
        validate_name(name).map_err(|_| FsError::Snapshot(format!("invalid name '{}'", name)))?;
        Ok(name.to_string())
    }
}

impl<D: BlockStorage> FileSystem<D> {
    /// Encodes the entire file system, cursor included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let tree = self.tree();
        let store = self.store();
        let order = tree.preorder()?;
        let index: HashMap<DirId, u64> = order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u64))
            .collect();
        let position = |id: DirId| {
            index.get(&id).copied().ok_or_else(|| {
                FsError::InvariantViolation("directory missing from pre-order walk".into())
            })
        };

        let mut sb = SuperBlock::new();
        sb.block_size.set(store.block_size() as u64);
        sb.blocks_count.set(store.total_blocks() as u64);
        sb.used_blocks_count.set(store.used_count() as u64);
        sb.directories_count.set(order.len() as u64);
        sb.inodes_count.set(tree.inode_count() as u64);
        sb.current_directory.set(position(self.cwd())?);

        let mut buf = Vec::new();
        buf.extend_from_slice(sb.serialize());

        for &id in &order {
            let dir = tree.dir(id)?;
            let parent = match dir.parent {
                Some(parent) => position(parent)?,
                None => NO_PARENT,
            };
            let record = DirRecord {
                parent: U64::new(parent),
                created_at: U64::new(dir.created_at),
                name_len: U32::new(to_u32(dir.name.len(), "name length")?),
            };
            buf.extend_from_slice(record.as_bytes());
            buf.extend_from_slice(dir.name.as_bytes());
        }

        for &id in &order {
            for &inode_id in tree.dir(id)?.files.values() {
                let inode = tree.inode(inode_id)?;
                let record = InodeRecord {
                    owner: U64::new(position(id)?),
                    size: U64::new(inode.size as u64),
                    created_at: U64::new(inode.created_at),
                    modified_at: U64::new(inode.modified_at),
                    mode: inode.mode.to_byte(),
                    name_len: U32::new(to_u32(inode.name.len(), "name length")?),
                    block_count: U32::new(to_u32(inode.blocks.len(), "block count")?),
                };
                buf.extend_from_slice(record.as_bytes());
                buf.extend_from_slice(inode.name.as_bytes());
                for &blocknr in &inode.blocks {
                    buf.extend_from_slice(U64::<BigEndian>::new(blocknr as u64).as_bytes());
                }
            }
        }

        for blocknr in store.used_blocks() {
            let data = store.read_block(blocknr)?;
            let record = BlockRecord {
                blocknr: U64::new(blocknr as u64),
                len: U32::new(to_u32(data.len(), "block length")?),
            };
            buf.extend_from_slice(record.as_bytes());
            buf.extend_from_slice(&data);
        }
        Ok(buf)
    }

    /// Writes the snapshot to `sink` in one piece.
    pub fn save<W: Write>(&self, mut sink: W) -> Result<()> {
        let buf = self.to_bytes()?;
        sink.write_all(&buf)?;
        sink.flush()?;
        info!("saved snapshot ({} bytes)", buf.len());
        Ok(())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.save(BufWriter::new(file))
    }
}

impl FileSystem<MemoryDisk> {
    /// Rebuilds a file system from a snapshot produced by [`FileSystem::to_bytes`].
    ///
    /// The result is checked with [`FileSystem::verify`] before it is returned,
    /// so a snapshot whose records disagree with each other is refused rather
    /// than loaded.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let sb = SuperBlock::parse(buf)?;
        let mut reader = Reader {
            buf: &buf[size_of::<SuperBlock>()..],
        };

        let block_size = to_usize(sb.block_size.get(), "block size")?;
        let blocks_count = to_usize(sb.blocks_count.get(), "block count")?;
        let capacity = block_size
            .checked_mul(blocks_count)
            .ok_or_else(|| FsError::Snapshot("device size overflows".into()))?;
        let disk = MemoryDiskBuilder::new()
            .with_capacity(capacity)
            .with_block_size(block_size)
            .build()?;
        let mut store = BlockStore::new(disk)?;

        let directories_count = to_usize(sb.directories_count.get(), "directory count")?;
        if directories_count == 0 {
            return Err(FsError::Snapshot("snapshot has no root directory".into()));
        }
        let root_record: DirRecord = reader.record("directory")?;
        if root_record.parent.get() != NO_PARENT {
            return Err(FsError::Snapshot("first directory record is not the root".into()));
        }
        let root_name = reader.name(to_usize(root_record.name_len.get().into(), "name length")?)?;
        let mut tree = Tree::with_root(root_record.created_at.get());
        let root = tree.root();
        tree.dir_mut(root)?.name = root_name;

        let mut dirs = vec![root];
        for _ in 1..directories_count {
            let record: DirRecord = reader.record("directory")?;
            let name = reader.name(to_usize(record.name_len.get().into(), "name length")?)?;
            let parent = to_usize(record.parent.get(), "parent index")?;
            let parent = *dirs
                .get(parent)
                .ok_or_else(|| FsError::Snapshot(format!("directory '{}' has no earlier parent", name)))?;
            if tree.find_subdirectory(parent, &name)?.is_some() {
                return Err(FsError::Snapshot(format!("duplicate directory '{}'", name)));
            }
            dirs.push(tree.add_directory(parent, &name, record.created_at.get())?);
        }

        let inodes_count = to_usize(sb.inodes_count.get(), "inode count")?;
        for _ in 0..inodes_count {
            let record: InodeRecord = reader.record("inode")?;
            let name = reader.name(to_usize(record.name_len.get().into(), "name length")?)?;
            let owner = to_usize(record.owner.get(), "owner index")?;
            let owner = *dirs
                .get(owner)
                .ok_or_else(|| FsError::Snapshot(format!("file '{}' has an unknown owner", name)))?;
            if tree.find_file(owner, &name)?.is_some() {
                return Err(FsError::Snapshot(format!("duplicate file '{}'", name)));
            }
            let mode = AccessMode::from_byte(record.mode)
                .ok_or_else(|| FsError::Snapshot(format!("file '{}' has unknown mode {}", name, record.mode)))?;
            let block_count = to_usize(record.block_count.get().into(), "block count")?;
            let mut blocks: Vec<BlockNumber> = Vec::with_capacity(block_count.min(blocks_count));
            for _ in 0..block_count {
                let blocknr: U64<BigEndian> = reader.record("block number")?;
                let blocknr = to_usize(blocknr.get(), "block number")?;
                if blocknr >= blocks_count {
                    return Err(FsError::Snapshot(format!("block {} out of range", blocknr)));
                }
                blocks.push(blocknr);
            }
            tree.add_inode(Inode {
                name,
                size: to_usize(record.size.get(), "file size")?,
                created_at: record.created_at.get(),
                modified_at: record.modified_at.get(),
                mode,
                blocks,
                owner,
            })?;
        }

        let used_blocks_count = to_usize(sb.used_blocks_count.get(), "used block count")?;
        for _ in 0..used_blocks_count {
            let record: BlockRecord = reader.record("block")?;
            let blocknr = to_usize(record.blocknr.get(), "block number")?;
            let len = to_usize(record.len.get().into(), "block length")?;
            if blocknr >= blocks_count || store.is_used(blocknr) {
                return Err(FsError::Snapshot(format!("bad or repeated block record {}", blocknr)));
            }
            if len > block_size {
                return Err(FsError::Snapshot(format!("block {} holds more than a block", blocknr)));
            }
            let data = reader.bytes(len, "block payload")?;
            store.write_block(blocknr, data)?;
        }

        if !reader.buf.is_empty() {
            return Err(FsError::Snapshot(format!(
                "{} trailing bytes after the last record",
                reader.buf.len()
            )));
        }

        let cwd = to_usize(sb.current_directory.get(), "current directory")?;
        let cwd = *dirs
            .get(cwd)
            .ok_or_else(|| FsError::Snapshot("current directory out of range".into()))?;

        let fs = FileSystem::from_parts(store, tree, cwd);
        fs.verify()?;
        Ok(fs)
    }

    /// Reads a whole snapshot from `source` and rebuilds the file system.
    pub fn load<R: Read>(mut source: R) -> Result<Self> {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        let fs = Self::from_bytes(&buf)?;
        info!("loaded snapshot ({} bytes)", buf.len());
        Ok(fs)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::load(BufReader::new(file))
    }
}
