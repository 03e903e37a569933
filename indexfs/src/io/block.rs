/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// A fixed number of equally sized, individually addressable blocks.
///
/// Slots are sparse: a block that was never written (or was cleared) reads back
/// as an empty buffer rather than a zero filled one, and a written block keeps
/// exactly the bytes it was given, up to the block size. Callers that need the
/// logical length of a run of blocks track it themselves.
pub trait BlockStorage {
    /// The size in bytes of every block on the device.
    fn block_size(&self) -> usize;
    /// The total number of blocks available on the device.
    fn block_count(&self) -> usize;
    /// Reads the contents of a block.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return an error.
    fn read_block(&self, blocknr: BlockNumber) -> std::io::Result<Vec<u8>>;
    /// Writes provided buffer into the specified block number. Input longer than
    /// the block size is truncated.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
    /// Drops whatever is stored in the block, returning it to the never written
    /// state.
    ///
    /// # Errors
    ///
    /// Attempting to clear a block out of range will return an error.
    fn clear_block(&mut self, blocknr: BlockNumber) -> std::io::Result<()>;
}
