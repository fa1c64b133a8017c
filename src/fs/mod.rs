//! Transform-aware passthrough filesystem.
//!
//! [`TransformFs`] implements the path-based call surface a transport (such
//! as the FUSE adapter in `crate::fuse`) dispatches to. Every call resolves its
//! path against one of three directories:
//!
//! - `root`, the directory exposed as `/`,
//! - `original`, against which cache validity is judged,
//! - `cache`, holding transformed copies of matching files.
//!
//! `getattr` is where transforms happen. For a path matching a rule it serves
//! the cached entry when its modification time equals the original's, and
//! otherwise runs the rule's command and caches the output stamped with the
//! original's modification time. A failing transform is logged and the call
//! falls back to the plain attributes of the file. `open` serves the cache
//! entry whenever one exists, so content and reported size agree once
//! `getattr` has run for the path.
//!
//! Calls fail with an [`Errno`]; `Errno::status` gives the negated error
//! number of the integer call contract.

pub mod attr;
pub mod handles;

pub use attr::{AttributeSnapshot, FileKind, Timespec, VolumeSnapshot};
pub use handles::{HandleTable, INVALID_HANDLE};

use crate::cache::{CacheStore, join_relative};
use crate::error::{Errno, FsResult};
use crate::rules::{RuleTable, TransformRule};
use crate::transform::{TransformRunner, Transformer};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest symlink target returned by `readlink`; longer targets are cut.
pub const READLINK_MAX: usize = 1024;

/// Directories the filesystem works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Directory exposed as the filesystem's `/`.
    pub root: PathBuf,
    /// Directory whose files rules are evaluated against.
    pub original: PathBuf,
    /// Directory holding transformed files.
    pub cache: PathBuf,
}

impl MountConfig {
    /// Creates a configuration exposing `original` itself.
    pub fn new(original: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        let original = original.into();
        Self {
            root: original.clone(),
            original,
            cache: cache.into(),
        }
    }

    /// Exposes `root` instead of the original directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

/// The filesystem state shared by all calls.
pub struct TransformFs {
    config: MountConfig,
    /// Base for `root` resolution; `./` once `init` moved into the root.
    root: PathBuf,
    cache: CacheStore,
    rules: RuleTable,
    transformer: Arc<dyn Transformer>,
    handles: HandleTable,
}

impl TransformFs {
    /// Creates a filesystem running transforms as child processes.
    #[must_use]
    pub fn new(config: MountConfig, rules: RuleTable) -> Self {
        Self::with_transformer(config, rules, Arc::new(TransformRunner::new()))
    }

    /// Creates a filesystem with a custom transformer.
    #[must_use]
    pub fn with_transformer(
        config: MountConfig,
        rules: RuleTable,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            root: config.root.clone(),
            cache: CacheStore::new(config.cache.clone()),
            config,
            rules,
            transformer,
            handles: HandleTable::new(),
        }
    }

    /// Number of open file and directory handles.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Moves the process into the root directory so later resolution is
    /// relative to it. Failure leaves the absolute root in use.
    pub fn init(&mut self) {
        match std::env::set_current_dir(&self.config.root) {
            Ok(()) => {
                info!(root = %self.config.root.display(), "serving from root directory");
                self.root = PathBuf::from("./");
            }
            Err(e) => {
                warn!(root = %self.config.root.display(), error = %e, "cannot enter root directory");
            }
        }
    }

    fn root_path(&self, path: &Path) -> PathBuf {
        join_relative(&self.root, path)
    }

    /// Reports volume statistics of the filesystem holding `path`.
    pub fn statfs(&self, path: &Path) -> FsResult<VolumeSnapshot> {
        let stat = nix::sys::statvfs::statvfs(&self.root_path(path))?;
        Ok(VolumeSnapshot::from_statvfs(&stat))
    }

    /// Reads the target of the symlink at `path`, cut to [`READLINK_MAX`]
    /// bytes.
    pub fn readlink(&self, path: &Path) -> FsResult<PathBuf> {
        let mut target = fs::read_link(self.root_path(path))?
            .into_os_string()
            .into_vec();
        target.truncate(READLINK_MAX);
        Ok(PathBuf::from(OsString::from_vec(target)))
    }

    /// Opens `path`, preferring its cache entry. See [`Self::open_with_mode`].
    pub fn open(&self, path: &Path, flags: i32) -> FsResult<u64> {
        self.open_with_mode(path, flags, 0)
    }

    /// Opens `path` with the given `open(2)` flags and creation mode.
    ///
    /// If the path has a cache entry that can be opened, the entry is served;
    /// otherwise the file under the root. The choice is made once, here; reads
    /// through the returned handle never switch between the two.
    pub fn open_with_mode(&self, path: &Path, flags: i32, mode: u32) -> FsResult<u64> {
        let entry = self.cache.entry_path(path);
        let target = if File::open(&entry).is_ok() {
            debug!(path = %path.display(), "opening cache entry");
            entry
        } else {
            self.root_path(path)
        };

        let file = open_options(flags, mode).open(&target)?;
        self.handles.insert(file)
    }

    /// Reports the attributes of `path`.
    ///
    /// Matching rules are tried in declaration order; the first one with a
    /// fresh or freshly produced cache entry answers. Without such a rule the
    /// file under the root is stat'ed, or the open `handle` when it is not
    /// [`INVALID_HANDLE`].
    pub fn getattr(&self, path: &Path, handle: u64) -> FsResult<AttributeSnapshot> {
        for rule in self.rules.matching(path) {
            if let Some(attr) = self.transformed_attr(path, rule) {
                return Ok(attr);
            }
        }

        if handle == INVALID_HANDLE {
            let meta = fs::symlink_metadata(self.root_path(path))?;
            Ok(AttributeSnapshot::from_metadata(&meta))
        } else {
            let meta = self.handles.with(handle, File::metadata)??;
            Ok(AttributeSnapshot::from_metadata(&meta))
        }
    }

    /// Serves `path` through `rule`, regenerating its cache entry if stale.
    /// `None` means the rule could not answer and the caller moves on.
    fn transformed_attr(&self, path: &Path, rule: &TransformRule) -> Option<AttributeSnapshot> {
        let original = join_relative(&self.config.original, path);
        let entry = self.cache.entry_path(path);

        let mtime = match fs::metadata(&original).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                debug!(path = %original.display(), error = %e, "cannot stat original");
                return None;
            }
        };

        if CacheStore::is_fresh(&original, &entry)
            && let Ok(meta) = fs::symlink_metadata(&entry)
        {
            debug!(path = %path.display(), "cache hit");
            return Some(AttributeSnapshot::from_metadata(&meta));
        }

        let output = match self.transformer.transform(rule.command(), &original) {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    pattern = rule.pattern(),
                    error = %e,
                    stderr = e.stderr(),
                    "transform failed, serving original"
                );
                return None;
            }
        };

        if let Err(e) = self.cache.write(&entry, &output, mtime) {
            warn!(path = %path.display(), error = %e, "cannot write cache entry, serving original");
            return None;
        }

        match fs::symlink_metadata(&entry) {
            Ok(meta) => {
                debug!(path = %path.display(), bytes = output.len(), "cache regenerated");
                Some(AttributeSnapshot::from_metadata(&meta))
            }
            Err(e) => {
                warn!(path = %entry.display(), error = %e, "cache entry vanished after write");
                None
            }
        }
    }

    /// Reads from `handle` at `offset` into `buf`; returns the byte count.
    pub fn read(&self, _path: &Path, buf: &mut [u8], offset: i64, handle: u64) -> FsResult<usize> {
        let offset = u64::try_from(offset).map_err(|_| Errno::EINVAL)?;
        Ok(self.handles.with(handle, |file| file.read_at(buf, offset))??)
    }

    /// Closes a file handle.
    pub fn release(&self, _path: &Path, handle: u64) -> FsResult<()> {
        drop(self.handles.remove(handle)?);
        Ok(())
    }

    /// Opens the directory at `path`.
    pub fn opendir(&self, path: &Path) -> FsResult<u64> {
        let dir = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open(self.root_path(path))?;
        self.handles.insert(dir)
    }

    /// Lists the directory at `path`.
    ///
    /// Entries, `.` and `..` first, are passed to `emit` together with the
    /// offset of the entry after them, starting at `offset`. No attributes are
    /// computed. Listing stops as soon as `emit` returns `false`.
    pub fn readdir<F>(&self, path: &Path, offset: i64, mut emit: F) -> FsResult<()>
    where
        F: FnMut(&OsStr, Option<&AttributeSnapshot>, i64) -> bool,
    {
        let mut names = vec![OsString::from("."), OsString::from("..")];
        for entry in fs::read_dir(self.root_path(path))? {
            names.push(entry?.file_name());
        }

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, name) in names.iter().enumerate().skip(skip) {
            #[allow(clippy::cast_possible_wrap)]
            let next = (i + 1) as i64;
            if !emit(name, None, next) {
                break;
            }
        }
        Ok(())
    }

    /// Closes a directory handle.
    pub fn releasedir(&self, path: &Path, handle: u64) -> FsResult<()> {
        self.release(path, handle)
    }

    /// Type of the entry under the root at `path`, without evaluating rules.
    pub fn entry_kind(&self, path: &Path) -> FsResult<FileKind> {
        let meta = fs::symlink_metadata(self.root_path(path))?;
        Ok(FileKind::from(meta.file_type()))
    }
}

impl From<fs::FileType> for FileKind {
    fn from(file_type: fs::FileType) -> Self {
        use std::os::unix::fs::FileTypeExt;

        if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_block_device() {
            Self::BlockDevice
        } else if file_type.is_char_device() {
            Self::CharDevice
        } else if file_type.is_fifo() {
            Self::NamedPipe
        } else if file_type.is_socket() {
            Self::Socket
        } else {
            Self::RegularFile
        }
    }
}

/// Translates `open(2)` flags into `OpenOptions`.
fn open_options(flags: i32, mode: u32) -> OpenOptions {
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => {
            options.write(true);
        }
        libc::O_RDWR => {
            options.read(true).write(true);
        }
        _ => {
            options.read(true);
        }
    }

    if flags & libc::O_APPEND != 0 {
        options.append(true);
    }
    if flags & libc::O_TRUNC != 0 {
        options.truncate(true);
    }

    // Pass through other flags via custom_flags
    options.custom_flags(flags & !(libc::O_ACCMODE | libc::O_APPEND | libc::O_TRUNC | libc::O_CREAT));
    options.mode(mode);
    options
}
