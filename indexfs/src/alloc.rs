use crate::error::{FsError, Result};
use crate::io::{BlockNumber, BlockStorage};

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One bit per block, set while the block is owned by some inode.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    /// Number of meaningful bits; trailing bits of the last word stay zero.
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        // Grab of the u64 containing the significant bit.
        let outer_offset = self.bitmap[blocknr / 64];

        let inner_offset = blocknr % 64;
        let mask = 0b01_u64 << inner_offset;
        let block_state = (outer_offset & mask) >> inner_offset;
        match block_state {
            0 => State::Free,
            1 => State::Used,
            _ => unreachable!("Block state returned a non 0 or 1 value. This likely indicates an error with bitmasking"),
        }
    }

    pub fn set_reserved(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        let mask = 0b01_u64 << (blocknr % 64);
        self.bitmap[blocknr / 64] |= mask;
    }

    pub fn set_free(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        let mask = 0b01_u64 << (blocknr % 64);
        self.bitmap[blocknr / 64] &= !mask;
    }

    pub fn count_used(&self) -> usize {
        self.bitmap.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterates the numbers of every reserved block.
    pub fn used(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.get(i) == State::Used)
    }
}

/// Hands out free blocks in whatever order the scan finds them. Callers must
/// not rely on the order or on the blocks being contiguous.
pub struct NextAvailableAllocation<'a> {
    /// Keeps track of the next starting place for looking for available blocks.
    marker: usize,
    bitmap: &'a Bitmap,
}

impl<'a> NextAvailableAllocation<'a> {
    pub fn new(bitmap: &'a Bitmap) -> Self {
        Self { marker: 0, bitmap }
    }
}

impl Iterator for NextAvailableAllocation<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.marker < self.bitmap.len() {
            let candidate = self.marker;
            self.marker += 1;
            if let State::Free = self.bitmap.get(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// The flat array of blocks plus the free/used accounting over it.
///
/// A block is used from the moment it is first written until it is released;
/// the bitmap and the device slots never disagree about that.
#[derive(Debug, Clone)]
pub struct BlockStore<D: BlockStorage> {
    dev: D,
    used: Bitmap,
}

impl<D: BlockStorage> BlockStore<D> {
    /// Takes ownership of the device and treats every block on it as free.
    pub fn new(mut dev: D) -> Result<Self> {
        for blocknr in 0..dev.block_count() {
            dev.clear_block(blocknr)?;
        }
        let used = Bitmap::new(dev.block_count());
        Ok(Self { dev, used })
    }

    /// Releases every block, used or not.
    pub fn format(&mut self) -> Result<()> {
        let used: Vec<BlockNumber> = self.used.used().collect();
        for blocknr in used {
            self.dev.clear_block(blocknr)?;
        }
        self.used = Bitmap::new(self.dev.block_count());
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.dev.block_size()
    }

    pub fn total_blocks(&self) -> usize {
        self.used.len()
    }

    pub fn used_count(&self) -> usize {
        self.used.count_used()
    }

    pub fn free_count(&self) -> usize {
        self.total_blocks() - self.used_count()
    }

    pub fn is_used(&self, blocknr: BlockNumber) -> bool {
        blocknr < self.used.len() && self.used.get(blocknr) == State::Used
    }

    pub fn used_blocks(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.used.used()
    }

    /// Number of blocks needed to hold `len` bytes.
    pub fn blocks_for(&self, len: usize) -> usize {
        (len + self.block_size() - 1) / self.block_size()
    }

    /// Picks `n` free blocks without claiming them. The blocks become used once
    /// they are written.
    pub fn find_free(&self, n: usize) -> Result<Vec<BlockNumber>> {
        let available = self.free_count();
        if available < n {
            return Err(FsError::InsufficientSpace {
                requested: n,
                available,
            });
        }
        let blocks: Vec<BlockNumber> = NextAvailableAllocation::new(&self.used).take(n).collect();
        debug!("found free blocks {:?}", blocks);
        Ok(blocks)
    }

    pub fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<()> {
        self.dev.write_block(blocknr, buf)?;
        self.used.set_reserved(blocknr);
        Ok(())
    }

    pub fn read_block(&self, blocknr: BlockNumber) -> Result<Vec<u8>> {
        Ok(self.dev.read_block(blocknr)?)
    }

    /// Clears the block and returns it to the free set. Releasing a block that
    /// is already free is a bug in the caller.
    pub fn release(&mut self, blocknr: BlockNumber) -> Result<()> {
        if !self.is_used(blocknr) {
            error!("block {} released twice", blocknr);
            debug_assert!(false, "block {} released twice", blocknr);
            return Err(FsError::InvariantViolation(format!(
                "block {} released while free",
                blocknr
            )));
        }
        self.dev.clear_block(blocknr)?;
        self.used.set_free(blocknr);
        debug!("released block {}", blocknr);
        Ok(())
    }
}
