//! Byte-level storage abstraction used by the index journal and checkpoints.
//!
//! File and memory backends share one trait so that an index configured
//! without a path runs the same commit and recovery code as a persistent one.
//!
//! # Example
//!
//! ```
//! use quarry::storage::memory::MemoryStorage;
//! use quarry::storage::Storage;
//! use std::io::{Read, Write};
//!
//! # fn main() -> quarry::error::Result<()> {
//! let storage = MemoryStorage::new();
//!
//! let mut output = storage.create_output("journal.log")?;
//! output.write_all(b"record")?;
//! output.close()?;
//!
//! let mut input = storage.open_input("journal.log")?;
//! let mut buffer = Vec::new();
//! input.read_to_end(&mut buffer)?;
//! assert_eq!(buffer, b"record");
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

pub mod file;
pub mod memory;
pub mod structured;

/// Named byte files under one storage location.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>>;

    /// Create a file for writing, truncating any previous content.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Open a file for appending, creating it if missing.
    fn append_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    fn file_size(&self, name: &str) -> Result<u64>;

    /// Replace `new_name` with `old_name` in one step. Checkpoints are
    /// written under a temporary name and renamed into place.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Shorten a file to `size` bytes.
    fn truncate_file(&self, name: &str, size: u64) -> Result<()>;

    /// Make renames and truncations durable.
    fn sync(&self) -> Result<()>;
}

/// Write handle of a storage file.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Publish the content and release the handle.
    fn close(&mut self) -> Result<()>;
}

/// Open the backend for an index location: a directory when a path is given,
/// a process-local memory store otherwise.
pub fn open_backend(path: Option<&Path>) -> Result<Arc<dyn Storage>> {
    match path {
        Some(path) => Ok(Arc::new(file::FileStorage::new(path)?)),
        None => Ok(Arc::new(memory::MemoryStorage::new())),
    }
}
