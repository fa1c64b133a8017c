//! On-disk cache of transformed files.
//!
//! The cache mirrors the relative layout of the original directory. An entry
//! carries no metadata besides its own modification time, which is stamped to
//! the modification time of the original it was produced from. An entry is
//! fresh while both times are equal to the nanosecond; touching the original
//! invalidates it even if the content did not change.
//!
//! Entries are written to a temporary file in the destination directory,
//! stamped, and then renamed into place, so a concurrent reader sees either
//! the previous entry or the complete new one. Two concurrent misses on the
//! same path both run the transform and the last rename wins.

use crate::error::CacheError;
use std::fs::{self, DirBuilder, FileTimes, Permissions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Default cache directory, relative to the working directory at startup.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Permission bits of cache directories and entries.
pub const CACHE_MODE: u32 = 0o755;

/// Handle on the cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at `dir`. Nothing is created on disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the cache directory itself if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_root(&self) -> std::result::Result<(), CacheError> {
        create_dirs(&self.dir)
    }

    /// Maps a filesystem-relative path (`/a/b.txt` or `a/b.txt`) to its entry.
    #[must_use]
    pub fn entry_path(&self, relative: &Path) -> PathBuf {
        join_relative(&self.dir, relative)
    }

    /// Whether `cache` exists and was stamped from the current `original`.
    ///
    /// The original's time is read through symlinks, since transforms read
    /// the link target; the entry's own time is read without following.
    #[must_use]
    pub fn is_fresh(original: &Path, cache: &Path) -> bool {
        let original = fs::metadata(original).and_then(|m| m.modified()).ok();
        match (original, modified(cache)) {
            (Some(original), Some(cached)) => original == cached,
            _ => false,
        }
    }

    /// Writes `content` as the entry at `path`, stamping its access and
    /// modification times to `stamp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory, the temporary file, the
    /// timestamps or the final rename fail.
    pub fn write(
        &self,
        path: &Path,
        content: &[u8],
        stamp: SystemTime,
    ) -> std::result::Result<(), CacheError> {
        let parent = path.parent().unwrap_or(&self.dir);
        create_dirs(parent)?;

        let write_failed = |e: std::io::Error| CacheError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".transformfs-")
            .tempfile_in(parent)
            .map_err(write_failed)?;
        temp.write_all(content).map_err(write_failed)?;
        temp.as_file()
            .set_permissions(Permissions::from_mode(CACHE_MODE))
            .map_err(write_failed)?;
        temp.as_file()
            .set_times(FileTimes::new().set_accessed(stamp).set_modified(stamp))
            .map_err(|e| CacheError::StampFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        temp.persist(path).map_err(|e| write_failed(e.error))?;

        debug!(path = %path.display(), bytes = content.len(), "wrote cache entry");
        Ok(())
    }
}

/// Joins a filesystem-relative path onto `base`, ignoring leading `/`.
pub(crate) fn join_relative(base: &Path, relative: &Path) -> PathBuf {
    let relative = relative.strip_prefix("/").unwrap_or(relative);
    if relative.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::symlink_metadata(path).and_then(|m| m.modified()).ok()
}

fn create_dirs(path: &Path) -> std::result::Result<(), CacheError> {
    DirBuilder::new()
        .recursive(true)
        .mode(CACHE_MODE)
        .create(path)
        .map_err(|e| CacheError::DirectoryFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn stamp() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::new(1_600_000_000, 123_456_789)
    }

    #[test]
    fn test_entry_path_strips_leading_slash() {
        let store = CacheStore::new("/var/cache/tfs");
        assert_eq!(
            store.entry_path(Path::new("/docs/a.txt")),
            PathBuf::from("/var/cache/tfs/docs/a.txt")
        );
        assert_eq!(
            store.entry_path(Path::new("docs/a.txt")),
            PathBuf::from("/var/cache/tfs/docs/a.txt")
        );
        assert_eq!(store.entry_path(Path::new("/")), PathBuf::from("/var/cache/tfs"));
    }

    #[test]
    fn test_ensure_root_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join(DEFAULT_CACHE_DIR));

        store.ensure_root().unwrap();
        assert!(store.dir().is_dir());

        // Idempotent
        store.ensure_root().unwrap();
    }

    #[test]
    fn test_write_creates_parents_and_stamps() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let entry = store.entry_path(Path::new("/a/b/c.txt"));

        store.write(&entry, b"HI", stamp()).unwrap();

        assert_eq!(fs::read(&entry).unwrap(), b"HI");
        let meta = fs::metadata(&entry).unwrap();
        assert_eq!(meta.modified().unwrap(), stamp());
        assert_eq!(meta.accessed().unwrap(), stamp());
        assert_eq!(meta.mode() & 0o777, CACHE_MODE);
    }

    #[test]
    fn test_write_overwrites_existing_entry() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let entry = store.entry_path(Path::new("x.txt"));

        store.write(&entry, b"first version", stamp()).unwrap();
        let later = stamp() + Duration::from_secs(60);
        store.write(&entry, b"second", later).unwrap();

        assert_eq!(fs::read(&entry).unwrap(), b"second");
        assert_eq!(fs::metadata(&entry).unwrap().modified().unwrap(), later);
    }

    #[test]
    fn test_write_leaves_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let entry = store.entry_path(Path::new("only.txt"));

        store.write(&entry, b"data", stamp()).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("only.txt")]);
    }

    #[test]
    fn test_is_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("a.txt");
        fs::write(&original, "hi").unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache"));
        let entry = store.entry_path(Path::new("/a.txt"));

        assert!(!CacheStore::is_fresh(&original, &entry));

        let mtime = fs::metadata(&original).unwrap().modified().unwrap();
        store.write(&entry, b"HI", mtime).unwrap();
        assert!(CacheStore::is_fresh(&original, &entry));

        // Touching the original invalidates the entry, newer or not
        let file = fs::File::options().write(true).open(&original).unwrap();
        file.set_modified(mtime - Duration::from_nanos(1)).unwrap();
        assert!(!CacheStore::is_fresh(&original, &entry));
    }

    #[test]
    fn test_is_fresh_follows_original_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("real.dat");
        let link = temp_dir.path().join("link.txt");
        fs::write(&target, "hi").unwrap();
        fs::File::options()
            .write(true)
            .open(&target)
            .unwrap()
            .set_modified(stamp())
            .unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let store = CacheStore::new(temp_dir.path().join("cache"));
        let entry = store.entry_path(Path::new("/link.txt"));
        store.write(&entry, b"HI", stamp()).unwrap();
        assert!(CacheStore::is_fresh(&link, &entry));

        // Changing the target invalidates, even though the link is untouched
        fs::File::options()
            .write(true)
            .open(&target)
            .unwrap()
            .set_modified(stamp() + Duration::from_secs(60))
            .unwrap();
        assert!(!CacheStore::is_fresh(&link, &entry));
    }

    #[test]
    fn test_is_fresh_missing_original() {
        let temp_dir = TempDir::new().unwrap();
        let entry = temp_dir.path().join("entry");
        fs::write(&entry, "x").unwrap();
        assert!(!CacheStore::is_fresh(&temp_dir.path().join("gone"), &entry));
    }

    #[test]
    fn test_write_fails_when_parent_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("blocker"), "").unwrap();
        let store = CacheStore::new(temp_dir.path());
        let entry = store.entry_path(Path::new("/blocker/a.txt"));

        let err = store.write(&entry, b"x", stamp()).unwrap_err();
        assert!(matches!(err, CacheError::DirectoryFailed { .. }));
    }
}
