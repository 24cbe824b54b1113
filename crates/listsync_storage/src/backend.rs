//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store underneath the event log.
///
/// Backends are **opaque**: they never interpret the framed records the
/// event log writes into them. They only append, read back, and durably
/// persist bytes.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - After `sync` returns, every appended byte survives process termination
/// - `rewrite` either fully replaces the contents or leaves them untouched
/// - Backends must be `Send + Sync` so the log can move between threads
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends beyond the current size or
    /// an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to `new_size` bytes.
    ///
    /// Used to cut off a torn trailing record found while replaying.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or
    /// the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Replaces the whole contents with `data`.
    ///
    /// Used by log compaction. Implementations must make the swap atomic
    /// with respect to crashes: afterwards readers observe either the old
    /// or the new contents, never a mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be written durably.
    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()>;
}
