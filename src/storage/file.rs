//! Directory backed storage.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{QuarryError, Result};
use crate::storage::{Storage, StorageOutput};

const BUFFER_SIZE: usize = 64 * 1024;

/// Every file of the storage lives directly in `directory`.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Use `directory`, creating it when missing.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            QuarryError::storage(format!("cannot create {}: {e}", directory.display()))
        })?;
        if !directory.is_dir() {
            return Err(QuarryError::storage(format!("{} is not a directory", directory.display())));
        }
        Ok(FileStorage { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn output(&self, name: &str, options: &OpenOptions) -> Result<Box<dyn StorageOutput>> {
        let file = options.open(self.path(name))?;
        Ok(Box::new(FileOutput {
            writer: BufWriter::with_capacity(BUFFER_SIZE, file),
        }))
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        match File::open(self.path(name)) {
            Ok(file) => Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(QuarryError::storage(format!(
                "no file named '{name}' in {}",
                self.directory.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.output(name, OpenOptions::new().write(true).create(true).truncate(true))
    }

    fn append_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.output(name, OpenOptions::new().append(true).create(true))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.path(name))?.len())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        fs::rename(self.path(old_name), self.path(new_name))?;
        Ok(())
    }

    fn truncate_file(&self, name: &str, size: u64) -> Result<()> {
        let file = OpenOptions::new().write(true).open(self.path(name))?;
        file.set_len(size)?;
        file.sync_all()?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        // renames are durable once the directory entry is synced
        #[cfg(unix)]
        File::open(&self.directory)?.sync_all()?;
        Ok(())
    }
}

/// Buffered write handle; `close` syncs the data to disk.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_journal_style_usage() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("index")).unwrap();
        assert!(storage.directory().is_dir());

        for record in [&b"abc"[..], b"def"] {
            let mut output = storage.append_output("journal").unwrap();
            output.write_all(record).unwrap();
            output.close().unwrap();
        }
        assert_eq!(storage.file_size("journal").unwrap(), 6);

        storage.truncate_file("journal", 4).unwrap();
        let mut data = Vec::new();
        storage.open_input("journal").unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"abcd");
    }

    #[test]
    fn test_checkpoint_replace() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        for content in ["old", "new"] {
            let mut output = storage.create_output("checkpoint.tmp").unwrap();
            output.write_all(content.as_bytes()).unwrap();
            output.close().unwrap();
            storage.rename_file("checkpoint.tmp", "checkpoint").unwrap();
            storage.sync().unwrap();
        }
        assert!(!storage.file_exists("checkpoint.tmp"));
        let mut text = String::new();
        storage.open_input("checkpoint").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "new");
    }

    #[test]
    fn test_missing_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(matches!(storage.open_input("nope"), Err(QuarryError::Storage(_))));
    }
}
