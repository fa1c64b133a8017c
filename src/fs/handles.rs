//! Open file handles.
//!
//! A handle is the host descriptor number of the file it was opened for. The
//! table owns the `File` behind each number so the descriptor is closed exactly
//! once, when the handle is released.

use crate::error::{Errno, FsResult};
use std::collections::HashMap;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::sync::RwLock;

/// Handle value signalling "no open file".
pub const INVALID_HANDLE: u64 = u64::MAX;

/// Open files keyed by descriptor number.
#[derive(Debug, Default)]
pub struct HandleTable {
    files: RwLock<HashMap<u64, File>>,
}

impl HandleTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `file` and returns its handle.
    pub fn insert(&self, file: File) -> FsResult<u64> {
        #[allow(clippy::cast_sign_loss)]
        let fh = file.as_raw_fd() as u64;
        let mut files = self.files.write().map_err(|_| Errno::EIO)?;
        files.insert(fh, file);
        Ok(fh)
    }

    /// Runs `f` with the file behind `fh`.
    pub fn with<R>(&self, fh: u64, f: impl FnOnce(&File) -> R) -> FsResult<R> {
        let files = self.files.read().map_err(|_| Errno::EIO)?;
        files.get(&fh).map(f).ok_or(Errno::EBADF)
    }

    /// Removes `fh` from the table and returns its file.
    pub fn remove(&self, fh: u64) -> FsResult<File> {
        let mut files = self.files.write().map_err(|_| Errno::EIO)?;
        files.remove(&fh).ok_or(Errno::EBADF)
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.files.read().map(|files| files.len()).unwrap_or(0)
    }

    /// Whether no handle is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_handle_is_descriptor_number() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f");
        std::fs::write(&path, "x").unwrap();

        let table = HandleTable::new();
        let file = File::open(&path).unwrap();
        let fd = file.as_raw_fd();
        let fh = table.insert(file).unwrap();

        assert_eq!(fh, u64::try_from(fd).unwrap());
        assert_eq!(table.with(fh, |f| f.as_raw_fd()).unwrap(), fd);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_then_use_is_ebadf() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f");
        std::fs::write(&path, "x").unwrap();

        let table = HandleTable::new();
        let fh = table.insert(File::open(&path).unwrap()).unwrap();

        table.remove(fh).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.remove(fh).unwrap_err(), Errno::EBADF);
        assert_eq!(table.with(fh, |_| ()).unwrap_err(), Errno::EBADF);
    }

    #[test]
    fn test_invalid_handle_is_never_open() {
        let table = HandleTable::new();
        assert_eq!(table.with(INVALID_HANDLE, |_| ()).unwrap_err(), Errno::EBADF);
    }
}
