use std::collections::HashSet;
use std::fmt;

use crate::alloc::BlockStore;
use crate::error::{FsError, Result};
use crate::io::{BlockNumber, BlockStorage, MemoryDisk};
use crate::node::{now_millis, AccessMode, DirId, Inode, InodeId, Tree};
use crate::path::{copy_name, resolve, split_parent, validate_name, SEPARATOR};

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(String),
    Directory(String),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::File(name) | Entry::Directory(name) => name,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::File(name) => write!(f, "File: {}", name),
            Entry::Directory(name) => write!(f, "Subdirectory: {}", name),
        }
    }
}

/// Properties of a file, detached from the file system.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    /// Absolute path of the file, e.g. `/root/docs/a.txt`.
    pub location: String,
    pub size: usize,
    pub created_at: u64,
    pub modified_at: u64,
    pub mode: AccessMode,
    /// Number of blocks the file occupies.
    pub blocks: usize,
}

/// Properties of a directory, detached from the file system.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryInfo {
    pub name: String,
    pub location: String,
    pub created_at: u64,
    pub files: usize,
    pub subdirectories: usize,
}

/// An in-memory block file system: a block store, a directory tree on top of
/// it, and a cursor naming the current directory.
///
/// Name arguments refer to entries of the current directory. Path arguments
/// are resolved from the root when they start with `/` and from the current
/// directory otherwise. Copy and move never move the cursor.
#[derive(Debug, Clone)]
pub struct FileSystem<D: BlockStorage = MemoryDisk> {
    store: BlockStore<D>,
    tree: Tree,
    cwd: DirId,
}

impl<D: BlockStorage> FileSystem<D> {
    /// Formats the device and returns a file system holding only the root
    /// directory.
    pub fn create(dev: D) -> Result<Self> {
        let store = BlockStore::new(dev)?;
        let tree = Tree::new();
        let cwd = tree.root();
        info!(
            "created file system with {} blocks of {} bytes",
            store.total_blocks(),
            store.block_size()
        );
        Ok(FileSystem { store, tree, cwd })
    }

    pub(crate) fn from_parts(store: BlockStore<D>, tree: Tree, cwd: DirId) -> Self {
        FileSystem { store, tree, cwd }
    }

    pub(crate) fn store(&self) -> &BlockStore<D> {
        &self.store
    }

    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn cwd(&self) -> DirId {
        self.cwd
    }

    /// Frees every block and replaces the tree with an empty root.
    pub fn format(&mut self) -> Result<()> {
        self.store.format()?;
        self.tree = Tree::new();
        self.cwd = self.tree.root();
        info!("formatted file system");
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.store.block_size()
    }

    pub fn total_blocks(&self) -> usize {
        self.store.total_blocks()
    }

    pub fn free_blocks(&self) -> usize {
        self.store.free_count()
    }

    pub fn used_blocks(&self) -> usize {
        self.store.used_count()
    }

    /// Absolute path of the current directory.
    pub fn current_path(&self) -> Result<String> {
        self.tree.path_of(self.cwd)
    }

    fn file_in(&self, dir: DirId, name: &str) -> Result<InodeId> {
        self.tree
            .find_file(dir, name)?
            .ok_or_else(|| FsError::FileNotFound(name.to_string()))
    }

    fn subdirectory_in(&self, dir: DirId, name: &str) -> Result<DirId> {
        self.tree
            .find_subdirectory(dir, name)?
            .ok_or_else(|| FsError::DirectoryNotFound(name.to_string()))
    }

    fn find_free(&self, n: usize) -> Result<Vec<BlockNumber>> {
        self.store.find_free(n).map_err(|err| {
            warn!("{}", err);
            err
        })
    }

    /// Writes `data` across `blocks` in order, one block-sized chunk each.
    fn write_blocks(&mut self, blocks: &[BlockNumber], data: &[u8]) -> Result<()> {
        let block_size = self.store.block_size();
        for (&blocknr, chunk) in blocks.iter().zip(data.chunks(block_size)) {
            self.store.write_block(blocknr, chunk)?;
        }
        Ok(())
    }

    /// Claims fresh blocks and fills them with `data`. Either every block is
    /// claimed or none is.
    fn store_data(&mut self, data: &[u8]) -> Result<Vec<BlockNumber>> {
        let blocks = self.find_free(self.store.blocks_for(data.len()))?;
        self.write_blocks(&blocks, data)?;
        Ok(blocks)
    }

    fn read_inode(&self, id: InodeId) -> Result<Vec<u8>> {
        let inode = self.tree.inode(id)?;
        let mut data = Vec::with_capacity(inode.size);
        for &blocknr in &inode.blocks {
            data.extend_from_slice(&self.store.read_block(blocknr)?);
        }
        if data.len() < inode.size {
            error!("file '{}' holds fewer bytes than its size", inode.name);
            return Err(FsError::InvariantViolation(format!(
                "file '{}' has {} bytes stored but a size of {}",
                inode.name,
                data.len(),
                inode.size
            )));
        }
        data.truncate(inode.size);
        Ok(data)
    }

    fn release_blocks(&mut self, blocks: &[BlockNumber]) -> Result<()> {
        for &blocknr in blocks {
            self.store.release(blocknr)?;
        }
        Ok(())
    }

    fn allocate_in(
        &mut self,
        dir: DirId,
        name: &str,
        data: &[u8],
        mode: AccessMode,
        created_at: u64,
    ) -> Result<InodeId> {
        let blocks = self.store_data(data)?;
        debug!("file '{}' allocated with blocks {:?}", name, blocks);
        self.tree.add_inode(Inode {
            name: name.to_string(),
            size: data.len(),
            created_at,
            modified_at: now_millis(),
            mode,
            blocks,
            owner: dir,
        })
    }

    /// Creates a file in the current directory holding `data`.
    ///
    /// # Errors
    ///
    /// [`FsError::NameCollision`] if a file of that name exists, and
    /// [`FsError::InsufficientSpace`] if the data does not fit. Neither leaves
    /// anything behind.
    pub fn allocate_file(&mut self, name: &str, data: &[u8], mode: AccessMode) -> Result<()> {
        validate_name(name)?;
        if self.tree.find_file(self.cwd, name)?.is_some() {
            return Err(FsError::NameCollision(name.to_string()));
        }
        self.allocate_in(self.cwd, name, data, mode, now_millis())?;
        info!("allocated file '{}' ({} bytes)", name, data.len());
        Ok(())
    }

    /// Returns exactly the bytes last written to the file. The access mode is
    /// not consulted.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let id = self.file_in(self.cwd, name)?;
        self.read_inode(id)
    }

    /// Replaces the contents of a file, growing or shrinking its block list to
    /// fit. When more blocks are needed and none are available the file is
    /// left untouched.
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let id = self.file_in(self.cwd, name)?;
        let inode = self.tree.inode(id)?;
        if !inode.mode.can_write() {
            warn!("refused write to read-only file '{}'", name);
            return Err(FsError::ReadOnlyViolation(name.to_string()));
        }

        let required = self.store.blocks_for(data.len());
        let mut blocks = inode.blocks.clone();
        if required > blocks.len() {
            let extra = self.find_free(required - blocks.len())?;
            blocks.extend(extra);
        } else if required < blocks.len() {
            let surplus = blocks.split_off(required);
            self.tree.inode_mut(id)?.blocks = blocks.clone();
            self.release_blocks(&surplus)?;
        }

        self.write_blocks(&blocks, data)?;
        let inode = self.tree.inode_mut(id)?;
        inode.blocks = blocks;
        inode.size = data.len();
        inode.modified_at = now_millis();
        info!("wrote {} bytes to '{}'", data.len(), name);
        Ok(())
    }

    /// Removes a file from the current directory and frees its blocks.
    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        let id = self.file_in(self.cwd, name)?;
        let inode = self.tree.remove_inode(id)?;
        self.release_blocks(&inode.blocks)?;
        info!("deleted file '{}'", name);
        Ok(())
    }

    pub fn change_file_mode(&mut self, name: &str, mode: AccessMode) -> Result<()> {
        let id = self.file_in(self.cwd, name)?;
        let inode = self.tree.inode_mut(id)?;
        inode.mode = mode;
        inode.modified_at = now_millis();
        info!("file '{}' mode changed to {}", name, mode);
        Ok(())
    }

    pub fn rename_file(&mut self, old: &str, new: &str) -> Result<()> {
        validate_name(new)?;
        let id = self.file_in(self.cwd, old)?;
        if old == new {
            return Ok(());
        }
        if self.tree.find_file(self.cwd, new)?.is_some() {
            return Err(FsError::NameCollision(new.to_string()));
        }
        self.tree.rename_inode(id, new)?;
        info!("renamed file '{}' to '{}'", old, new);
        Ok(())
    }

    pub fn file_info(&self, name: &str) -> Result<FileInfo> {
        let inode = self.tree.inode(self.file_in(self.cwd, name)?)?;
        let mut location = self.tree.path_of(inode.owner)?;
        location.push(SEPARATOR);
        location.push_str(&inode.name);
        Ok(FileInfo {
            name: inode.name.clone(),
            location,
            size: inode.size,
            created_at: inode.created_at,
            modified_at: inode.modified_at,
            mode: inode.mode,
            blocks: inode.blocks.len(),
        })
    }

    /// Creates an empty subdirectory of the current directory.
    pub fn create_directory(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.tree.find_subdirectory(self.cwd, name)?.is_some() {
            return Err(FsError::NameCollision(name.to_string()));
        }
        self.tree.add_directory(self.cwd, name, now_millis())?;
        info!("created directory '{}'", name);
        Ok(())
    }

    /// Removes a subdirectory of the current directory together with
    /// everything beneath it, freeing every block its files owned.
    pub fn delete_directory(&mut self, name: &str) -> Result<()> {
        let id = self.subdirectory_in(self.cwd, name)?;
        let removed = self.tree.remove_subtree(id)?;
        let mut released = 0;
        for inode in &removed {
            self.release_blocks(&inode.blocks)?;
            released += inode.blocks.len();
        }
        info!(
            "deleted directory '{}' ({} files, {} blocks released)",
            name,
            removed.len(),
            released
        );
        Ok(())
    }

    /// Moves the cursor. On failure the cursor stays where it was.
    pub fn change_directory(&mut self, path: &str) -> Result<()> {
        self.cwd = resolve(&self.tree, self.cwd, path)?;
        debug!("changed directory to {}", self.tree.path_of(self.cwd)?);
        Ok(())
    }

    /// Files of the current directory followed by its subdirectories, each
    /// group in name order.
    pub fn list_directory(&self) -> Result<Vec<Entry>> {
        let dir = self.tree.dir(self.cwd)?;
        let files = dir.files.keys().cloned().map(Entry::File);
        let subdirectories = dir.subdirectories.keys().cloned().map(Entry::Directory);
        Ok(files.chain(subdirectories).collect())
    }

    pub fn rename_directory(&mut self, old: &str, new: &str) -> Result<()> {
        validate_name(new)?;
        let id = self.subdirectory_in(self.cwd, old)?;
        if old == new {
            return Ok(());
        }
        if self.tree.find_subdirectory(self.cwd, new)?.is_some() {
            return Err(FsError::NameCollision(new.to_string()));
        }
        self.tree.rename_directory(id, new)?;
        info!("renamed directory '{}' to '{}'", old, new);
        Ok(())
    }

    pub fn directory_info(&self, name: &str) -> Result<DirectoryInfo> {
        let id = self.subdirectory_in(self.cwd, name)?;
        let dir = self.tree.dir(id)?;
        Ok(DirectoryInfo {
            name: dir.name.clone(),
            location: self.tree.path_of(id)?,
            created_at: dir.created_at,
            files: dir.files.len(),
            subdirectories: dir.subdirectories.len(),
        })
    }

    /// Copies the file at `source_path` into the directory at `dest_dir_path`
    /// and returns the name of the copy.
    ///
    /// A copy into the file's own directory is named `<stem>_copyN<ext>` with
    /// the first free N. Elsewhere the original name is kept and a file already
    /// holding that name is replaced.
    pub fn copy_file(&mut self, source_path: &str, dest_dir_path: &str) -> Result<String> {
        let (source_dir, source_name) = split_parent(source_path);
        let source_dir = resolve(&self.tree, self.cwd, source_dir)?;
        let source = self.file_in(source_dir, source_name)?;
        let dest = resolve(&self.tree, self.cwd, dest_dir_path)?;

        let name = if dest == source_dir {
            let files = &self.tree.dir(dest)?.files;
            copy_name(source_name, |candidate| files.contains_key(candidate))
        } else {
            source_name.to_string()
        };

        let data = self.read_inode(source)?;
        let mode = self.tree.inode(source)?.mode;
        let blocks = self.store_data(&data)?;
        if let Some(replaced) = self.tree.find_file(dest, &name)? {
            let replaced = self.tree.remove_inode(replaced)?;
            self.release_blocks(&replaced.blocks)?;
            debug!("copy replaced existing file '{}'", name);
        }
        let now = now_millis();
        self.tree.add_inode(Inode {
            name: name.clone(),
            size: data.len(),
            created_at: now,
            modified_at: now,
            mode,
            blocks,
            owner: dest,
        })?;
        info!("copied '{}' to '{}' as '{}'", source_path, dest_dir_path, name);
        Ok(name)
    }

    /// Recreates the directory at `source_path`, with fresh copies of every
    /// file and subdirectory beneath it, inside the directory at
    /// `dest_dir_path`. Returns the name given to the new directory.
    ///
    /// Without `new_name`, a copy into the source's own parent is named with
    /// the `_copyN` scheme and any other copy keeps the source's name.
    ///
    /// # Errors
    ///
    /// [`FsError::IntoOwnSubtree`] if the destination is the source or lies
    /// beneath it, [`FsError::NameCollision`] if the chosen name is taken and
    /// [`FsError::InsufficientSpace`] if the subtree's data does not fit. The
    /// space check happens before anything is created.
    pub fn copy_directory(
        &mut self,
        source_path: &str,
        dest_dir_path: &str,
        new_name: Option<&str>,
    ) -> Result<String> {
        let source = resolve(&self.tree, self.cwd, source_path)?;
        let dest = resolve(&self.tree, self.cwd, dest_dir_path)?;
        if self.tree.is_within(dest, source)? {
            return Err(FsError::IntoOwnSubtree(self.tree.path_of(source)?));
        }

        let source_dir = self.tree.dir(source)?;
        let name = match new_name {
            Some(name) => {
                validate_name(name)?;
                name.to_string()
            }
            None if source_dir.parent == Some(dest) => {
                let subdirectories = &self.tree.dir(dest)?.subdirectories;
                copy_name(&source_dir.name, |candidate| subdirectories.contains_key(candidate))
            }
            None => source_dir.name.clone(),
        };
        if self.tree.find_subdirectory(dest, &name)?.is_some() {
            return Err(FsError::NameCollision(name));
        }

        let mut needed = 0;
        for id in self.tree.inodes_under(source)? {
            needed += self.tree.inode(id)?.blocks.len();
        }
        let available = self.store.free_count();
        if needed > available {
            let err = FsError::InsufficientSpace {
                requested: needed,
                available,
            };
            warn!("{}", err);
            return Err(err);
        }

        let copy = self.tree.add_directory(dest, &name, now_millis())?;
        self.mirror(source, copy)?;
        info!(
            "copied directory '{}' to '{}' as '{}'",
            source_path, dest_dir_path, name
        );
        Ok(name)
    }

    /// Fills the empty directory `dst` with copies of everything in `src`.
    fn mirror(&mut self, src: DirId, dst: DirId) -> Result<()> {
        let dir = self.tree.dir(src)?;
        let files: Vec<InodeId> = dir.files.values().copied().collect();
        let subdirectories: Vec<(String, DirId)> = dir
            .subdirectories
            .iter()
            .map(|(name, &id)| (name.clone(), id))
            .collect();

        for id in files {
            let data = self.read_inode(id)?;
            let (name, mode) = {
                let inode = self.tree.inode(id)?;
                (inode.name.clone(), inode.mode)
            };
            self.allocate_in(dst, &name, &data, mode, now_millis())?;
        }

        for (name, id) in subdirectories {
            let target = &self.tree.dir(dst)?.subdirectories;
            let name = if target.contains_key(&name) {
                copy_name(&name, |candidate| target.contains_key(candidate))
            } else {
                name
            };
            let copy = self.tree.add_directory(dst, &name, now_millis())?;
            self.mirror(id, copy)?;
        }
        Ok(())
    }

    /// Moves the file at `source_path` to `dest_path`, whose last component is
    /// the new name. The file gets fresh blocks at the destination before the
    /// source is removed, so a failed move loses nothing.
    pub fn move_file(&mut self, source_path: &str, dest_path: &str) -> Result<()> {
        let (source_dir, source_name) = split_parent(source_path);
        let source_dir = resolve(&self.tree, self.cwd, source_dir)?;
        let source = self.file_in(source_dir, source_name)?;

        let (dest_dir, dest_name) = split_parent(dest_path);
        let dest_dir = resolve(&self.tree, self.cwd, dest_dir)?;
        validate_name(dest_name)?;
        if dest_dir == source_dir && dest_name == source_name {
            return Ok(());
        }
        if self.tree.find_file(dest_dir, dest_name)?.is_some() {
            return Err(FsError::NameCollision(dest_name.to_string()));
        }

        let data = self.read_inode(source)?;
        let (mode, created_at) = {
            let inode = self.tree.inode(source)?;
            (inode.mode, inode.created_at)
        };
        self.allocate_in(dest_dir, dest_name, &data, mode, created_at)?;
        let old = self.tree.remove_inode(source)?;
        self.release_blocks(&old.blocks)?;
        info!("moved '{}' to '{}'", source_path, dest_path);
        Ok(())
    }

    /// Re-parents the directory at `source_path` under the directory at
    /// `dest_dir_path`. No blocks move.
    pub fn move_directory(&mut self, source_path: &str, dest_dir_path: &str) -> Result<()> {
        let source = resolve(&self.tree, self.cwd, source_path)?;
        let dest = resolve(&self.tree, self.cwd, dest_dir_path)?;
        if source == self.tree.root() {
            return Err(FsError::InvalidName(self.tree.dir(source)?.name.clone()));
        }
        if self.tree.is_within(dest, source)? {
            return Err(FsError::IntoOwnSubtree(self.tree.path_of(source)?));
        }
        let dir = self.tree.dir(source)?;
        if dir.parent == Some(dest) {
            return Ok(());
        }
        if self.tree.find_subdirectory(dest, &dir.name)?.is_some() {
            return Err(FsError::NameCollision(dir.name.clone()));
        }
        self.tree.reparent(source, dest)?;
        info!("moved directory '{}' to '{}'", source_path, dest_dir_path);
        Ok(())
    }

    /// Walks the whole tree and checks the accounting invariants: links agree
    /// in both directions, every file owns exactly enough blocks for its size
    /// and those blocks hold exactly `size` bytes, no block has two owners, and
    /// the owned blocks are exactly the used blocks of the store.
    pub fn verify(&self) -> Result<()> {
        let fail = |detail: String| {
            error!("{}", detail);
            Err(FsError::InvariantViolation(detail))
        };

        let order = self.tree.preorder()?;
        if order.len() != self.tree.directory_count() {
            return fail(format!(
                "{} directories allocated but {} reachable",
                self.tree.directory_count(),
                order.len()
            ));
        }
        if !order.contains(&self.cwd) {
            return fail("current directory is not reachable".into());
        }

        let mut owned = HashSet::new();
        let mut inodes = 0;
        for &id in &order {
            let dir = self.tree.dir(id)?;
            for (name, &child) in &dir.subdirectories {
                let sub = self.tree.dir(child)?;
                if sub.parent != Some(id) || &sub.name != name {
                    return fail(format!("subdirectory '{}' is linked inconsistently", name));
                }
            }
            for (name, &file) in &dir.files {
                inodes += 1;
                let inode = self.tree.inode(file)?;
                if inode.owner != id || &inode.name != name {
                    return fail(format!("file '{}' is linked inconsistently", name));
                }
                if inode.blocks.len() != self.store.blocks_for(inode.size) {
                    return fail(format!(
                        "file '{}' of {} bytes owns {} blocks",
                        name,
                        inode.size,
                        inode.blocks.len()
                    ));
                }
                let mut stored = 0;
                for (i, &blocknr) in inode.blocks.iter().enumerate() {
                    if !self.store.is_used(blocknr) {
                        return fail(format!("file '{}' owns free block {}", name, blocknr));
                    }
                    if !owned.insert(blocknr) {
                        return fail(format!("block {} has more than one owner", blocknr));
                    }
                    let len = self.store.read_block(blocknr)?.len();
                    if len < self.store.block_size() && i + 1 < inode.blocks.len() {
                        return fail(format!(
                            "file '{}' has a short block {} before its last",
                            name, blocknr
                        ));
                    }
                    stored += len;
                }
                if stored != inode.size {
                    return fail(format!(
                        "file '{}' has {} bytes stored but a size of {}",
                        name, stored, inode.size
                    ));
                }
            }
        }
        if inodes != self.tree.inode_count() {
            return fail(format!(
                "{} inodes allocated but {} reachable",
                self.tree.inode_count(),
                inodes
            ));
        }
        if owned.len() != self.store.used_count() {
            return fail(format!(
                "{} blocks used but {} owned",
                self.store.used_count(),
                owned.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryDiskBuilder;

    fn create_test_fs(capacity: usize, block_size: usize) -> FileSystem {
        let disk = MemoryDiskBuilder::new()
            .with_capacity(capacity)
            .with_block_size(block_size)
            .build()
            .expect("Could not initialize memory disk.");
        FileSystem::create(disk).unwrap()
    }

    fn names(fs: &FileSystem) -> Vec<String> {
        fs.list_directory()
            .unwrap()
            .iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    #[test]
    fn new_file_system_starts_at_root() {
        let fs = create_test_fs(1024, 512);
        assert_eq!(fs.current_path().unwrap(), "/root");
        assert_eq!(fs.total_blocks(), 2);
        assert_eq!(fs.free_blocks(), 2);
        assert!(fs.list_directory().unwrap().is_empty());
    }

    #[test]
    fn allocation_fails_without_space_and_recovers_after_delete() {
        let mut fs = create_test_fs(1024, 512);

        fs.allocate_file("a", &[7; 600], AccessMode::ReadWrite).unwrap();
        assert_eq!(fs.free_blocks(), 0);

        match fs.allocate_file("b", &[1], AccessMode::ReadWrite) {
            Err(FsError::InsufficientSpace { requested, available }) => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(names(&fs), vec!["a"]);

        fs.delete_file("a").unwrap();
        assert_eq!(fs.free_blocks(), 2);

        fs.allocate_file("b", &[1], AccessMode::ReadWrite).unwrap();
        assert_eq!(fs.free_blocks(), 1);
        fs.verify().unwrap();
    }

    #[test]
    fn read_returns_exactly_what_was_allocated() {
        let mut fs = create_test_fs(4096, 16);
        let data: Vec<u8> = (0..=99).collect();

        fs.allocate_file("data", &data, AccessMode::ReadWrite).unwrap();
        fs.allocate_file("empty", b"", AccessMode::ReadWrite).unwrap();

        assert_eq!(fs.read_file("data").unwrap(), data);
        assert_eq!(fs.read_file("empty").unwrap(), Vec::<u8>::new());
        assert_eq!(fs.file_info("data").unwrap().blocks, 7);
        assert_eq!(fs.file_info("empty").unwrap().blocks, 0);
    }

    #[test]
    fn allocating_over_an_existing_name_is_a_collision() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("a", b"one", AccessMode::ReadWrite).unwrap();
        let used = fs.used_blocks();

        match fs.allocate_file("a", b"two", AccessMode::ReadWrite) {
            Err(FsError::NameCollision(name)) => assert_eq!(name, "a"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(fs.read_file("a").unwrap(), b"one".to_vec());
        assert_eq!(fs.used_blocks(), used);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut fs = create_test_fs(1024, 16);
        assert!(matches!(
            fs.allocate_file("a/b", b"", AccessMode::ReadWrite),
            Err(FsError::InvalidName(_))
        ));
        assert!(matches!(fs.create_directory(".."), Err(FsError::InvalidName(_))));
    }

    #[test]
    fn missing_files_are_reported() {
        let mut fs = create_test_fs(1024, 16);
        assert!(matches!(fs.read_file("x"), Err(FsError::FileNotFound(_))));
        assert!(matches!(fs.write_file("x", b"1"), Err(FsError::FileNotFound(_))));
        assert!(matches!(fs.delete_file("x"), Err(FsError::FileNotFound(_))));
        assert!(matches!(
            fs.change_file_mode("x", AccessMode::ReadOnly),
            Err(FsError::FileNotFound(_))
        ));
        assert!(matches!(fs.delete_directory("x"), Err(FsError::DirectoryNotFound(_))));
    }

    #[test]
    fn shrinking_write_releases_trailing_blocks() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("f", &[1; 64], AccessMode::ReadWrite).unwrap();
        assert_eq!(fs.used_blocks(), 4);

        fs.write_file("f", &[2; 20]).unwrap();

        assert_eq!(fs.read_file("f").unwrap(), vec![2; 20]);
        assert_eq!(fs.used_blocks(), 2);
        assert_eq!(fs.file_info("f").unwrap().blocks, 2);
        fs.verify().unwrap();
    }

    #[test]
    fn growing_write_claims_more_blocks() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("f", b"short", AccessMode::ReadWrite).unwrap();

        fs.write_file("f", &[9; 40]).unwrap();

        assert_eq!(fs.read_file("f").unwrap(), vec![9; 40]);
        assert_eq!(fs.used_blocks(), 3);
        fs.verify().unwrap();
    }

    #[test]
    fn growing_write_without_space_leaves_file_untouched() {
        let mut fs = create_test_fs(32, 16);
        fs.allocate_file("f", b"abc", AccessMode::ReadWrite).unwrap();

        assert!(matches!(
            fs.write_file("f", &[0; 48]),
            Err(FsError::InsufficientSpace { .. })
        ));

        assert_eq!(fs.read_file("f").unwrap(), b"abc".to_vec());
        assert_eq!(fs.used_blocks(), 1);
        fs.verify().unwrap();
    }

    #[test]
    fn read_only_files_refuse_writes_but_not_reads() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("f", b"locked", AccessMode::ReadOnly).unwrap();

        assert!(matches!(
            fs.write_file("f", b"changed"),
            Err(FsError::ReadOnlyViolation(_))
        ));
        assert_eq!(fs.read_file("f").unwrap(), b"locked".to_vec());

        fs.change_file_mode("f", AccessMode::ReadWrite).unwrap();
        fs.write_file("f", b"changed").unwrap();
        assert_eq!(fs.read_file("f").unwrap(), b"changed".to_vec());
    }

    #[test]
    fn write_only_and_append_only_files_accept_writes() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("w", b"", AccessMode::WriteOnly).unwrap();
        fs.allocate_file("a", b"", AccessMode::AppendOnly).unwrap();
        fs.write_file("w", b"1").unwrap();
        fs.write_file("a", b"2").unwrap();
    }

    #[test]
    fn mode_change_bumps_modified_time() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("f", b"x", AccessMode::ReadWrite).unwrap();
        let before = fs.file_info("f").unwrap();

        fs.change_file_mode("f", AccessMode::ReadOnly).unwrap();

        let after = fs.file_info("f").unwrap();
        assert_eq!(after.mode, AccessMode::ReadOnly);
        assert!(after.modified_at >= before.modified_at);
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn deleting_a_directory_releases_only_its_blocks() {
        let mut fs = create_test_fs(4096, 16);
        fs.allocate_file("outside", &[0; 40], AccessMode::ReadWrite).unwrap();
        fs.create_directory("x").unwrap();
        fs.change_directory("x").unwrap();
        fs.allocate_file("f", b"hi", AccessMode::ReadWrite).unwrap();
        fs.create_directory("deeper").unwrap();
        fs.change_directory("deeper").unwrap();
        fs.allocate_file("g", &[1; 33], AccessMode::ReadWrite).unwrap();
        fs.change_directory("/root").unwrap();
        assert_eq!(fs.used_blocks(), 3 + 1 + 3);

        fs.delete_directory("x").unwrap();

        assert_eq!(fs.used_blocks(), 3);
        assert_eq!(names(&fs), vec!["outside"]);
        assert_eq!(fs.read_file("outside").unwrap(), vec![0; 40]);
        fs.verify().unwrap();
    }

    #[test]
    fn change_directory_failure_keeps_cursor() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("a").unwrap();
        fs.change_directory("a").unwrap();

        match fs.change_directory("../b/c") {
            Err(FsError::PathNotFound(part)) => assert_eq!(part, "b"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(fs.current_path().unwrap(), "/root/a");
    }

    #[test]
    fn dot_dot_from_root_is_a_no_op() {
        let mut fs = create_test_fs(1024, 16);
        fs.change_directory("..").unwrap();
        assert_eq!(fs.current_path().unwrap(), "/root");
    }

    #[test]
    fn listing_shows_files_then_directories() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("sub").unwrap();
        fs.allocate_file("b", b"", AccessMode::ReadWrite).unwrap();
        fs.allocate_file("a", b"", AccessMode::ReadWrite).unwrap();

        let listing: Vec<String> = fs
            .list_directory()
            .unwrap()
            .iter()
            .map(|entry| entry.to_string())
            .collect();
        assert_eq!(listing, vec!["File: a", "File: b", "Subdirectory: sub"]);
    }

    #[test]
    fn files_and_directories_may_share_a_name() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("same", b"", AccessMode::ReadWrite).unwrap();
        fs.create_directory("same").unwrap();
        assert_eq!(
            fs.list_directory().unwrap(),
            vec![Entry::File("same".into()), Entry::Directory("same".into())]
        );
    }

    #[test]
    fn rename_rekeys_entries_and_locations_follow() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("a.txt", b"abc", AccessMode::ReadWrite).unwrap();
        fs.allocate_file("b.txt", b"", AccessMode::ReadWrite).unwrap();
        fs.create_directory("dir").unwrap();
        fs.change_directory("dir").unwrap();
        fs.create_directory("inner").unwrap();
        fs.change_directory("..").unwrap();

        assert!(matches!(
            fs.rename_file("a.txt", "b.txt"),
            Err(FsError::NameCollision(_))
        ));
        fs.rename_file("a.txt", "c.txt").unwrap();
        assert_eq!(fs.read_file("c.txt").unwrap(), b"abc".to_vec());
        assert!(matches!(fs.read_file("a.txt"), Err(FsError::FileNotFound(_))));

        fs.rename_directory("dir", "renamed").unwrap();
        fs.change_directory("renamed").unwrap();
        assert_eq!(fs.directory_info("inner").unwrap().location, "/root/renamed/inner");
    }

    #[test]
    fn file_info_reports_location_and_size() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("docs").unwrap();
        fs.change_directory("docs").unwrap();
        fs.allocate_file("a.txt", &[0; 17], AccessMode::AppendOnly).unwrap();

        let info = fs.file_info("a.txt").unwrap();
        assert_eq!(info.location, "/root/docs/a.txt");
        assert_eq!(info.size, 17);
        assert_eq!(info.blocks, 2);
        assert_eq!(info.mode, AccessMode::AppendOnly);
    }

    #[test]
    fn copy_within_directory_picks_unused_suffix() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("a.txt", b"payload", AccessMode::ReadWrite).unwrap();
        fs.allocate_file("a_copy1.txt", b"other", AccessMode::ReadWrite).unwrap();

        let name = fs.copy_file("a.txt", "").unwrap();

        assert_eq!(name, "a_copy2.txt");
        assert_eq!(fs.read_file("a_copy2.txt").unwrap(), b"payload".to_vec());
        assert_eq!(fs.read_file("a_copy1.txt").unwrap(), b"other".to_vec());
        fs.verify().unwrap();
    }

    #[test]
    fn copy_into_own_directory_by_absolute_path_is_still_renamed() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("a.txt", b"payload", AccessMode::ReadWrite).unwrap();

        let name = fs.copy_file("/root/a.txt", "/root").unwrap();

        assert_eq!(name, "a_copy1.txt");
        assert_eq!(fs.read_file("a.txt").unwrap(), b"payload".to_vec());
    }

    #[test]
    fn copy_across_directories_keeps_name_and_does_not_alias() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("dst").unwrap();
        fs.allocate_file("f", b"original", AccessMode::ReadOnly).unwrap();

        assert_eq!(fs.copy_file("f", "dst").unwrap(), "f");
        fs.change_directory("dst").unwrap();
        assert_eq!(fs.read_file("f").unwrap(), b"original".to_vec());
        assert_eq!(fs.file_info("f").unwrap().mode, AccessMode::ReadOnly);
        assert_eq!(fs.current_path().unwrap(), "/root/dst");
        fs.verify().unwrap();
    }

    #[test]
    fn copy_across_directories_replaces_existing_file() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("dst").unwrap();
        fs.allocate_file("f", b"new", AccessMode::ReadWrite).unwrap();
        fs.change_directory("dst").unwrap();
        fs.allocate_file("f", &[0; 64], AccessMode::ReadWrite).unwrap();
        fs.change_directory("..").unwrap();
        assert_eq!(fs.used_blocks(), 5);

        fs.copy_file("f", "dst").unwrap();

        assert_eq!(fs.used_blocks(), 2);
        fs.change_directory("dst").unwrap();
        assert_eq!(fs.read_file("f").unwrap(), b"new".to_vec());
        fs.verify().unwrap();
    }

    #[test]
    fn copy_of_missing_source_fails_cleanly() {
        let mut fs = create_test_fs(1024, 16);
        assert!(matches!(fs.copy_file("nope", ""), Err(FsError::FileNotFound(_))));
        assert!(matches!(
            fs.copy_file("/root/missing/f", ""),
            Err(FsError::PathNotFound(_))
        ));
    }

    #[test]
    fn copied_directory_owns_fresh_blocks() {
        let mut fs = create_test_fs(4096, 16);
        fs.create_directory("src").unwrap();
        fs.change_directory("src").unwrap();
        fs.allocate_file("f", b"shared?", AccessMode::ReadWrite).unwrap();
        fs.create_directory("nested").unwrap();
        fs.change_directory("nested").unwrap();
        fs.allocate_file("g", &[3; 20], AccessMode::ReadWrite).unwrap();
        fs.change_directory("/root").unwrap();
        fs.create_directory("dst").unwrap();

        let name = fs.copy_directory("src", "dst", None).unwrap();
        assert_eq!(name, "src");
        assert_eq!(fs.used_blocks(), 6);

        fs.change_directory("/root/dst/src").unwrap();
        fs.write_file("f", b"changed").unwrap();
        fs.change_directory("/root/src").unwrap();
        assert_eq!(fs.read_file("f").unwrap(), b"shared?".to_vec());
        fs.change_directory("/root/dst/src/nested").unwrap();
        assert_eq!(fs.read_file("g").unwrap(), vec![3; 20]);
        fs.verify().unwrap();
    }

    #[test]
    fn copy_directory_into_own_parent_gets_suffix() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("photos").unwrap();

        assert_eq!(fs.copy_directory("photos", "", None).unwrap(), "photos_copy1");
        assert_eq!(fs.copy_directory("photos", ".", None).unwrap(), "photos_copy2");
        assert_eq!(
            fs.copy_directory("photos", ".", Some("backup")).unwrap(),
            "backup"
        );
        assert_eq!(
            names(&fs),
            vec!["backup", "photos", "photos_copy1", "photos_copy2"]
        );
    }

    #[test]
    fn copy_directory_into_itself_is_refused() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("a").unwrap();
        fs.change_directory("a").unwrap();
        fs.create_directory("b").unwrap();
        fs.change_directory("/root").unwrap();

        assert!(matches!(
            fs.copy_directory("a", "a/b", None),
            Err(FsError::IntoOwnSubtree(_))
        ));
        assert!(matches!(
            fs.copy_directory("a", "a", None),
            Err(FsError::IntoOwnSubtree(_))
        ));
        assert!(matches!(
            fs.copy_directory("/", "a", None),
            Err(FsError::IntoOwnSubtree(_))
        ));
    }

    #[test]
    fn copy_directory_checks_space_up_front() {
        let mut fs = create_test_fs(64, 16);
        fs.create_directory("src").unwrap();
        fs.change_directory("src").unwrap();
        fs.allocate_file("f", &[1; 40], AccessMode::ReadWrite).unwrap();
        fs.change_directory("..").unwrap();

        assert!(matches!(
            fs.copy_directory("src", "", None),
            Err(FsError::InsufficientSpace { requested: 3, available: 1 })
        ));
        assert_eq!(names(&fs), vec!["src"]);
        fs.verify().unwrap();
    }

    #[test]
    fn move_file_relocates_and_renames() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("dst").unwrap();
        fs.allocate_file("f", b"moving", AccessMode::ReadOnly).unwrap();
        let used = fs.used_blocks();

        fs.move_file("f", "dst/g").unwrap();

        assert_eq!(names(&fs), vec!["dst"]);
        assert_eq!(fs.used_blocks(), used);
        fs.change_directory("dst").unwrap();
        assert_eq!(fs.read_file("g").unwrap(), b"moving".to_vec());
        assert_eq!(fs.file_info("g").unwrap().mode, AccessMode::ReadOnly);
        fs.verify().unwrap();
    }

    #[test]
    fn move_file_onto_itself_changes_nothing() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("f", b"same", AccessMode::ReadWrite).unwrap();
        fs.move_file("f", "/root/f").unwrap();
        assert_eq!(fs.read_file("f").unwrap(), b"same".to_vec());
    }

    #[test]
    fn failed_move_keeps_the_source() {
        let mut fs = create_test_fs(32, 16);
        fs.create_directory("dst").unwrap();
        fs.allocate_file("f", &[5; 32], AccessMode::ReadWrite).unwrap();

        assert!(matches!(
            fs.move_file("f", "dst/f"),
            Err(FsError::InsufficientSpace { .. })
        ));
        assert_eq!(fs.read_file("f").unwrap(), vec![5; 32]);
        fs.verify().unwrap();
    }

    #[test]
    fn move_file_onto_occupied_name_is_a_collision() {
        let mut fs = create_test_fs(1024, 16);
        fs.allocate_file("a", b"a", AccessMode::ReadWrite).unwrap();
        fs.allocate_file("b", b"b", AccessMode::ReadWrite).unwrap();
        assert!(matches!(fs.move_file("a", "b"), Err(FsError::NameCollision(_))));
    }

    #[test]
    fn move_directory_relinks_without_touching_blocks() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("a").unwrap();
        fs.create_directory("b").unwrap();
        fs.change_directory("a").unwrap();
        fs.allocate_file("f", b"stay", AccessMode::ReadWrite).unwrap();
        let used = fs.used_blocks();

        fs.move_directory("/root/a", "/root/b").unwrap();

        assert_eq!(fs.current_path().unwrap(), "/root/b/a");
        assert_eq!(fs.read_file("f").unwrap(), b"stay".to_vec());
        assert_eq!(fs.used_blocks(), used);
        assert!(matches!(
            fs.move_directory("/root/b", "."),
            Err(FsError::IntoOwnSubtree(_))
        ));
        fs.verify().unwrap();
    }

    #[test]
    fn root_cannot_be_moved() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("a").unwrap();

        assert!(matches!(
            fs.move_directory("/", "a"),
            Err(FsError::InvalidName(_))
        ));
        assert!(matches!(
            fs.move_directory("/root", "/root/a"),
            Err(FsError::InvalidName(_))
        ));
        assert_eq!(names(&fs), vec!["a"]);
        fs.verify().unwrap();
    }

    #[test]
    fn format_resets_everything() {
        let mut fs = create_test_fs(1024, 16);
        fs.create_directory("a").unwrap();
        fs.change_directory("a").unwrap();
        fs.allocate_file("f", &[1; 100], AccessMode::ReadWrite).unwrap();

        fs.format().unwrap();

        assert_eq!(fs.current_path().unwrap(), "/root");
        assert_eq!(fs.free_blocks(), fs.total_blocks());
        assert!(fs.list_directory().unwrap().is_empty());
        fs.verify().unwrap();
    }
}
