//! Process-local storage backing indexes created without a path.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{QuarryError, Result};
use crate::storage::{Storage, StorageOutput};

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Files kept in a shared map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Files,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    fn missing(name: &str) -> QuarryError {
        QuarryError::storage(format!("no file named '{name}' in memory storage"))
    }

    fn output(&self, name: &str, append: bool) -> Box<dyn StorageOutput> {
        let mut files = self.files.lock();
        let entry = files.entry(name.to_string()).or_default();
        if !append {
            entry.clear();
        }
        Box::new(MemoryOutput {
            name: name.to_string(),
            pending: Vec::new(),
            files: Arc::clone(&self.files),
            closed: false,
        })
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let data = self.files.lock().get(name).cloned().ok_or_else(|| Self::missing(name))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(self.output(name, false))
    }

    fn append_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(self.output(name, true))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock();
        files.get(name).map(|data| data.len() as u64).ok_or_else(|| Self::missing(name))
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.remove(old_name).ok_or_else(|| Self::missing(old_name))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn truncate_file(&self, name: &str, size: u64) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.get_mut(name).ok_or_else(|| Self::missing(name))?;
        data.truncate(size as usize);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Buffers writes until flush or close, then appends them to the file.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    pending: Vec<u8>,
    files: Files,
    closed: bool,
}

impl MemoryOutput {
    fn publish(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut files = self.files.lock();
        files.entry(self.name.clone()).or_default().append(&mut self.pending);
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other(format!("'{}' is closed", self.name)));
        }
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.publish();
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.publish();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.publish();
        self.closed = true;
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        self.publish();
    }
}
