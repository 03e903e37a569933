mod block;
mod memdisk;

pub use block::{BlockNumber, BlockStorage};
pub use memdisk::{
    MemoryDisk, MemoryDiskBuilder, DEFAULT_BLOCK_SIZE, DEFAULT_CAPACITY, MAX_BLOCKS,
};
