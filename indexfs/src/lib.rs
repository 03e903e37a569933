//! An indexed file system simulated entirely in memory.
//!
//! A fixed capacity device is split into equal blocks. Files are inodes that
//! own an ordered list of blocks; directories hold named files and named
//! subdirectories under a single root. Everything goes through
//! [`FileSystem`], which keeps a cursor on the current directory much like a
//! shell does.
//!
//! ```
//! use indexfs::io::MemoryDiskBuilder;
//! use indexfs::{AccessMode, FileSystem};
//!
//! let disk = MemoryDiskBuilder::new()
//!     .with_capacity(1024)
//!     .with_block_size(512)
//!     .build()
//!     .unwrap();
//! let mut fs = FileSystem::create(disk).unwrap();
//! fs.create_directory("docs").unwrap();
//! fs.change_directory("docs").unwrap();
//! fs.allocate_file("hello.txt", b"hi", AccessMode::ReadWrite).unwrap();
//! assert_eq!(fs.read_file("hello.txt").unwrap(), b"hi");
//! assert_eq!(fs.current_path().unwrap(), "/root/docs");
//! ```

#[macro_use]
extern crate log;

mod alloc;
mod error;
mod fs;
pub mod io;
mod node;
mod path;
mod sb;
mod snapshot;

pub use crate::error::{FsError, Result};
pub use crate::fs::{DirectoryInfo, Entry, FileInfo, FileSystem};
pub use crate::node::{AccessMode, ROOT_NAME};
pub use crate::path::SEPARATOR;
pub use crate::sb::FORMAT_VERSION;
