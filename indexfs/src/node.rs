use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{FsError, Result};
use crate::io::BlockNumber;

/// The name given to the root directory at format time.
pub const ROOT_NAME: &str = "root";

/// Milliseconds since the unix epoch, or zero if the clock is set before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Stable handle to a directory slot in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(usize);

/// Stable handle to an inode slot in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InodeId(usize);

/// What a file allows. Only writes consult the mode; reads always succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    AppendOnly,
    #[default]
    ReadWrite,
}

impl AccessMode {
    pub fn can_write(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            AccessMode::ReadOnly => 1,
            AccessMode::WriteOnly => 2,
            AccessMode::AppendOnly => 3,
            AccessMode::ReadWrite => 4,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(AccessMode::ReadOnly),
            2 => Some(AccessMode::WriteOnly),
            3 => Some(AccessMode::AppendOnly),
            4 => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessMode::ReadOnly => "r",
            AccessMode::WriteOnly => "w",
            AccessMode::AppendOnly => "a",
            AccessMode::ReadWrite => "rw",
        };
        f.write_str(s)
    }
}

impl FromStr for AccessMode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(AccessMode::ReadOnly),
            "w" => Ok(AccessMode::WriteOnly),
            "a" => Ok(AccessMode::AppendOnly),
            "rw" => Ok(AccessMode::ReadWrite),
            other => Err(FsError::InvalidMode(other.to_string())),
        }
    }
}

/// Metadata and block list for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Inode {
    pub name: String,
    /// Logical length in bytes; the last block may hold fewer.
    pub size: usize,
    /// Milliseconds since epoch, set once.
    pub created_at: u64,
    /// Milliseconds since epoch, bumped by writes and mode changes.
    pub modified_at: u64,
    pub mode: AccessMode,
    /// Block numbers in content order.
    pub blocks: Vec<BlockNumber>,
    /// Containing directory. Navigation only, the directory owns the inode.
    pub owner: DirId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    pub name: String,
    pub created_at: u64,
    /// `None` only for the root.
    pub parent: Option<DirId>,
    pub files: BTreeMap<String, InodeId>,
    pub subdirectories: BTreeMap<String, DirId>,
}

impl Directory {
    fn new(name: &str, parent: Option<DirId>, created_at: u64) -> Self {
        Directory {
            name: name.to_string(),
            created_at,
            parent,
            files: BTreeMap::new(),
            subdirectories: BTreeMap::new(),
        }
    }
}

/// Arena holding every directory and inode of a file system.
///
/// Parents own their children through the name maps; the `parent` and `owner`
/// back references are plain handles. Freed slots are reused.
#[derive(Debug, Clone)]
pub struct Tree {
    dirs: Vec<Option<Directory>>,
    inodes: Vec<Option<Inode>>,
    free_dirs: Vec<usize>,
    free_inodes: Vec<usize>,
    root: DirId,
}

impl Tree {
    /// A tree holding only the root directory.
    pub fn new() -> Self {
        Self::with_root(now_millis())
    }

    pub(crate) fn with_root(created_at: u64) -> Self {
        Tree {
            dirs: vec![Some(Directory::new(ROOT_NAME, None, created_at))],
            inodes: Vec::new(),
            free_dirs: Vec::new(),
            free_inodes: Vec::new(),
            root: DirId(0),
        }
    }

    pub fn root(&self) -> DirId {
        self.root
    }

    pub fn dir(&self, id: DirId) -> Result<&Directory> {
        self.dirs
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| FsError::InvariantViolation(format!("dangling directory handle {}", id.0)))
    }

    pub fn dir_mut(&mut self, id: DirId) -> Result<&mut Directory> {
        self.dirs
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| FsError::InvariantViolation(format!("dangling directory handle {}", id.0)))
    }

    pub fn inode(&self, id: InodeId) -> Result<&Inode> {
        self.inodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| FsError::InvariantViolation(format!("dangling inode handle {}", id.0)))
    }

    pub fn inode_mut(&mut self, id: InodeId) -> Result<&mut Inode> {
        self.inodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| FsError::InvariantViolation(format!("dangling inode handle {}", id.0)))
    }

    pub fn directory_count(&self) -> usize {
        self.dirs.iter().filter(|d| d.is_some()).count()
    }

    pub fn inode_count(&self) -> usize {
        self.inodes.iter().filter(|i| i.is_some()).count()
    }

    /// Creates an empty subdirectory. The caller checks for name collisions.
    pub fn add_directory(&mut self, parent: DirId, name: &str, created_at: u64) -> Result<DirId> {
        self.dir(parent)?;
        let dir = Directory::new(name, Some(parent), created_at);
        let id = match self.free_dirs.pop() {
            Some(slot) => {
                self.dirs[slot] = Some(dir);
                DirId(slot)
            }
            None => {
                self.dirs.push(Some(dir));
                DirId(self.dirs.len() - 1)
            }
        };
        self.dir_mut(parent)?.subdirectories.insert(name.to_string(), id);
        Ok(id)
    }

    /// Links an inode into its owner's file map. The caller checks for name
    /// collisions.
    pub fn add_inode(&mut self, inode: Inode) -> Result<InodeId> {
        let owner = inode.owner;
        let name = inode.name.clone();
        // Fail before touching the arena if the owner is gone.
        self.dir(owner)?;
        let id = match self.free_inodes.pop() {
            Some(slot) => {
                self.inodes[slot] = Some(inode);
                InodeId(slot)
            }
            None => {
                self.inodes.push(Some(inode));
                InodeId(self.inodes.len() - 1)
            }
        };
        self.dir_mut(owner)?.files.insert(name, id);
        Ok(id)
    }

    pub fn find_file(&self, dir: DirId, name: &str) -> Result<Option<InodeId>> {
        Ok(self.dir(dir)?.files.get(name).copied())
    }

    pub fn find_subdirectory(&self, dir: DirId, name: &str) -> Result<Option<DirId>> {
        Ok(self.dir(dir)?.subdirectories.get(name).copied())
    }

    /// Unlinks an inode from its directory and frees its slot, handing back the
    /// record so the caller can release its blocks.
    pub fn remove_inode(&mut self, id: InodeId) -> Result<Inode> {
        let owner = self.inode(id)?.owner;
        let name = self.inode(id)?.name.clone();
        self.dir_mut(owner)?.files.remove(&name);
        let inode = self.inodes[id.0]
            .take()
            .ok_or_else(|| FsError::InvariantViolation(format!("dangling inode handle {}", id.0)))?;
        self.free_inodes.push(id.0);
        Ok(inode)
    }

    /// Unlinks a directory and frees the slots of everything beneath it,
    /// returning the removed inodes. Files of a directory are collected before
    /// its subdirectories are descended.
    pub fn remove_subtree(&mut self, id: DirId) -> Result<Vec<Inode>> {
        if id == self.root {
            return Err(FsError::InvariantViolation("attempted to remove the root".into()));
        }
        let dir = self.dir(id)?;
        let (name, parent) = (dir.name.clone(), dir.parent);
        if let Some(parent) = parent {
            self.dir_mut(parent)?.subdirectories.remove(&name);
        }

        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let dir = self.dirs[next.0]
                .take()
                .ok_or_else(|| FsError::InvariantViolation(format!("dangling directory handle {}", next.0)))?;
            self.free_dirs.push(next.0);
            for inode_id in dir.files.values() {
                let inode = self.inodes[inode_id.0].take().ok_or_else(|| {
                    FsError::InvariantViolation(format!("dangling inode handle {}", inode_id.0))
                })?;
                self.free_inodes.push(inode_id.0);
                removed.push(inode);
            }
            pending.extend(dir.subdirectories.values().copied());
        }
        Ok(removed)
    }

    /// Re-keys a file inside its directory.
    pub fn rename_inode(&mut self, id: InodeId, new_name: &str) -> Result<()> {
        let inode = self.inode_mut(id)?;
        let owner = inode.owner;
        let old_name = std::mem::replace(&mut inode.name, new_name.to_string());
        let files = &mut self.dir_mut(owner)?.files;
        files.remove(&old_name);
        files.insert(new_name.to_string(), id);
        Ok(())
    }

    /// Re-keys a directory inside its parent. The root has no key to change.
    pub fn rename_directory(&mut self, id: DirId, new_name: &str) -> Result<()> {
        let dir = self.dir_mut(id)?;
        let old_name = std::mem::replace(&mut dir.name, new_name.to_string());
        let parent = dir.parent;
        if let Some(parent) = parent {
            let subdirectories = &mut self.dir_mut(parent)?.subdirectories;
            subdirectories.remove(&old_name);
            subdirectories.insert(new_name.to_string(), id);
        }
        Ok(())
    }

    /// Moves a directory under a new parent. Callers must rule out cycles and
    /// name collisions first.
    pub fn reparent(&mut self, id: DirId, new_parent: DirId) -> Result<()> {
        let dir = self.dir(id)?;
        let name = dir.name.clone();
        let old_parent = dir
            .parent
            .ok_or_else(|| FsError::InvariantViolation("the root has no parent to change".into()))?;
        self.dir_mut(old_parent)?.subdirectories.remove(&name);
        self.dir_mut(new_parent)?.subdirectories.insert(name, id);
        self.dir_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    /// True if `candidate` is `ancestor` or lies somewhere beneath it.
    pub fn is_within(&self, candidate: DirId, ancestor: DirId) -> Result<bool> {
        let mut cursor = Some(candidate);
        let mut steps = 0;
        while let Some(id) = cursor {
            if id == ancestor {
                return Ok(true);
            }
            steps += 1;
            if steps > self.dirs.len() {
                return Err(FsError::InvariantViolation(format!(
                    "directory {} has no path to the root",
                    candidate.0
                )));
            }
            cursor = self.dir(id)?.parent;
        }
        Ok(false)
    }

    /// Absolute location of a directory, built by walking parent links up to
    /// the root, e.g. `/root/docs`.
    pub fn path_of(&self, id: DirId) -> Result<String> {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(next) = cursor {
            if parts.len() > self.dirs.len() {
                error!("directory {} has no path to the root", id.0);
                return Err(FsError::InvariantViolation(format!(
                    "directory {} has no path to the root",
                    id.0
                )));
            }
            let dir = self.dir(next)?;
            parts.push(dir.name.as_str());
            cursor = dir.parent;
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    /// Directories in pre-order, root first. Every parent appears before its
    /// children.
    pub fn preorder(&self) -> Result<Vec<DirId>> {
        let mut order = Vec::new();
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            if order.len() >= self.dirs.len() {
                return Err(FsError::InvariantViolation("directory tree contains a cycle".into()));
            }
            order.push(id);
            // Reverse so that children come out in name order.
            pending.extend(self.dir(id)?.subdirectories.values().rev().copied());
        }
        Ok(order)
    }

    /// Every inode at or beneath `id`.
    pub fn inodes_under(&self, id: DirId) -> Result<Vec<InodeId>> {
        let mut found = Vec::new();
        let mut pending = vec![id];
        let mut visited = 0;
        while let Some(next) = pending.pop() {
            visited += 1;
            if visited > self.dirs.len() {
                return Err(FsError::InvariantViolation("directory tree contains a cycle".into()));
            }
            let dir = self.dir(next)?;
            found.extend(dir.files.values().copied());
            pending.extend(dir.subdirectories.values().copied());
        }
        Ok(found)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
