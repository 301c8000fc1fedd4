//! Storage collaborator: one delimited text record per sample, one blank
//! line after each completed window.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::sample::Sample;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open output for append: {0}")]
    Open(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[from] io::Error),
    #[error("storage is not open")]
    NotOpen,
}

/// The persistence stage drives this through a full
/// init/open/write/close/deinit cycle per window flush.
pub trait Storage: Send {
    /// Probe that the medium is present and writable
    fn init(&mut self) -> Result<(), StorageError>;
    fn open_append(&mut self) -> Result<(), StorageError>;
    fn write_record(&mut self, sample: &Sample) -> Result<(), StorageError>;
    /// Blank-line separator after a completed window
    fn write_separator(&mut self) -> Result<(), StorageError>;
    fn close(&mut self) -> Result<(), StorageError>;
    fn deinit(&mut self);
}

/// File-backed storage writing `"<AC>,<DC>\n"` records
pub struct FileStorage {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    /// Wipe any previous contents (explicit opt-in from the command line)
    pub fn truncate(&mut self) -> Result<(), StorageError> {
        File::create(&self.path).map_err(StorageError::Open)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn init(&mut self) -> Result<(), StorageError> {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(StorageError::Open)?;
        Ok(())
    }

    fn open_append(&mut self) -> Result<(), StorageError> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(StorageError::Open)?;
        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    fn write_record(&mut self, sample: &Sample) -> Result<(), StorageError> {
        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        writeln!(file, "{},{}", sample.ac, sample.dc)?;
        Ok(())
    }

    fn write_separator(&mut self) -> Result<(), StorageError> {
        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        writeln!(file)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn deinit(&mut self) {
        debug!(path = %self.path.display(), "storage deinitialized");
    }
}

/// In-memory storage for tests and dry runs; clones share the same record
/// log so a test can keep a handle while the pipeline owns the instance.
pub struct MemoryStorage {
    lines: Arc<Mutex<Vec<String>>>,
    open: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            open: false,
        }
    }

    /// Every line written so far, separators included as empty strings
    pub fn contents(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStorage {
    fn clone(&self) -> Self {
        Self {
            lines: self.lines.clone(),
            open: false,
        }
    }
}

impl Storage for MemoryStorage {
    fn init(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn open_append(&mut self) -> Result<(), StorageError> {
        self.open = true;
        Ok(())
    }

    fn write_record(&mut self, sample: &Sample) -> Result<(), StorageError> {
        if !self.open {
            return Err(StorageError::NotOpen);
        }
        self.lines.lock().push(format!("{},{}", sample.ac, sample.dc));
        Ok(())
    }

    fn write_separator(&mut self) -> Result<(), StorageError> {
        if !self.open {
            return Err(StorageError::NotOpen);
        }
        self.lines.lock().push(String::new());
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.open = false;
        Ok(())
    }

    fn deinit(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_record_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppg.csv");
        let mut storage = FileStorage::new(path.clone());
        storage.init().unwrap();
        storage.open_append().unwrap();
        storage.write_record(&Sample::new(123, 45_678)).unwrap();
        storage.write_record(&Sample::new(0, 1)).unwrap();
        storage.write_separator().unwrap();
        storage.close().unwrap();
        storage.deinit();
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "123,45678\n0,1\n\n");
    }

    #[test]
    fn test_file_storage_appends_across_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppg.csv");
        let mut storage = FileStorage::new(path.clone());
        for n in 0..2 {
            storage.init().unwrap();
            storage.open_append().unwrap();
            storage.write_record(&Sample::new(n, n)).unwrap();
            storage.write_separator().unwrap();
            storage.close().unwrap();
            storage.deinit();
        }
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "0,0\n\n1,1\n\n");
    }

    #[test]
    fn test_write_without_open_is_rejected() {
        let mut storage = MemoryStorage::new();
        assert!(matches!(
            storage.write_record(&Sample::new(1, 1)),
            Err(StorageError::NotOpen)
        ));
    }

    #[test]
    fn test_truncate_wipes_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppg.csv");
        std::fs::write(&path, "stale,data\n").unwrap();
        let mut storage = FileStorage::new(path.clone());
        storage.truncate().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "");
    }
}
