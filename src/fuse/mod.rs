// These lints are intentionally allowed for FUSE implementation:
// - Casts: necessary for FUSE API compatibility (offset/size conversions, attribute widths)
// - Function length: FUSE callbacks carry many parameters fixed by the trait
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::too_many_arguments
)]

//! FUSE transport for transformfs.
//!
//! [`TransformFuse`] adapts the inode-based `fuser` request model to the
//! path-based calls of [`TransformFs`]: inodes are mapped to paths through an
//! [`InodeTable`], snapshots are converted to [`FileAttr`], and failures are
//! replied with their error number.
//!
//! # Example Usage
//!
//! ```bash
//! # Mirror ./docs at /mnt/docs, transforming per transforms.json
//! transformfs ./docs /mnt/docs
//!
//! # Expose a different root than the directory rules are judged against
//! transformfs ./docs ./site /mnt/docs -o ro,fsname=docs
//!
//! # Unmount
//! fusermount -u /mnt/docs
//! ```

pub mod inodes;

use crate::error::{Error, Result};
use crate::fs::{AttributeSnapshot, FileKind, INVALID_HANDLE, TransformFs};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
pub use inodes::{INODE_ROOT, InodeTable, UNKNOWN_INODE};
use libc::ENOENT;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default time-to-live for cached attributes.
const TTL: Duration = Duration::from_secs(1);

/// FUSE filesystem serving a [`TransformFs`].
pub struct TransformFuse {
    fs: TransformFs,
    inodes: InodeTable,
}

impl TransformFuse {
    /// Wraps a filesystem for mounting.
    #[must_use]
    pub fn new(fs: TransformFs) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
        }
    }

    fn path(&self, ino: u64) -> Option<PathBuf> {
        self.inodes.path(ino).map(Path::to_path_buf)
    }
}

/// Converts a snapshot into FUSE attributes for inode `ino`.
#[must_use]
pub fn file_attr(attr: &AttributeSnapshot, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size.max(0) as u64,
        blocks: attr.blocks.max(0) as u64,
        atime: attr.atim.to_system_time(),
        mtime: attr.mtim.to_system_time(),
        ctime: attr.ctim.to_system_time(),
        crtime: attr.birthtim.to_system_time(),
        kind: file_type(attr.kind()),
        perm: attr.permissions(),
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev as u32,
        blksize: attr.blksize as u32,
        flags: 0,
    }
}

/// Maps a [`FileKind`] onto the FUSE file type.
#[must_use]
pub const fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::RegularFile => FileType::RegularFile,
        FileKind::Directory => FileType::Directory,
        FileKind::Symlink => FileType::Symlink,
        FileKind::BlockDevice => FileType::BlockDevice,
        FileKind::CharDevice => FileType::CharDevice,
        FileKind::NamedPipe => FileType::NamedPipe,
        FileKind::Socket => FileType::Socket,
    }
}

impl Filesystem for TransformFuse {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        self.fs.init();
        Ok(())
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.getattr(&path, INVALID_HANDLE) {
            Ok(attr) => {
                let ino = self.inodes.lookup(path);
                reply.entry(&TTL, &file_attr(&attr, ino), 0);
            }
            Err(e) => reply.error(e.code()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.getattr(&path, fh.unwrap_or(INVALID_HANDLE)) {
            Ok(attr) => reply.attr(&TTL, &file_attr(&attr, ino)),
            Err(e) => reply.error(e.code()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(path) = self.path(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.readlink(&path) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(e.code()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.open(&path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = self.path(ino).unwrap_or_default();
        let mut buf = vec![0u8; size as usize];

        match self.fs.read(&path, &mut buf, offset, fh) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.code()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = self.path(ino).unwrap_or_default();
        match self.fs.release(&path, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.opendir(&path) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path(ino) else {
            reply.error(ENOENT);
            return;
        };

        let Self { fs, inodes } = self;
        let parent = inodes.parent(ino);
        let result = fs.readdir(&path, offset, |name, _attr, next| {
            let (entry_ino, kind) = match name.as_bytes() {
                b"." => (ino, FileType::Directory),
                b".." => (parent, FileType::Directory),
                _ => {
                    let child = path.join(name);
                    let kind = fs
                        .entry_kind(&child)
                        .map_or(FileType::RegularFile, file_type);
                    // readdir does not count as a lookup
                    (inodes.inode(&child).unwrap_or(UNKNOWN_INODE), kind)
                }
            };
            // `add` reports a full buffer; keep going while it has room
            !reply.add(entry_ino, next, kind, name)
        });

        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        let path = self.path(ino).unwrap_or_default();
        match self.fs.releasedir(&path, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.path(ino).unwrap_or_else(|| PathBuf::from("/"));
        match self.fs.statfs(&path) {
            Ok(v) => reply.statfs(
                v.blocks,
                v.bfree,
                v.bavail,
                v.files,
                v.ffree,
                v.bsize as u32,
                v.namemax as u32,
                v.frsize as u32,
            ),
            Err(e) => reply.error(e.code()),
        }
    }
}

/// Translates a `-o` option string into a mount option.
#[must_use]
pub fn mount_option(option: &str) -> MountOption {
    match option {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        _ => {
            if let Some(name) = option.strip_prefix("fsname=") {
                MountOption::FSName(name.to_string())
            } else if let Some(subtype) = option.strip_prefix("subtype=") {
                MountOption::Subtype(subtype.to_string())
            } else {
                MountOption::CUSTOM(option.to_string())
            }
        }
    }
}

/// Translates `-o` option strings, naming the filesystem `transformfs`
/// unless an `fsname=` option is among them.
#[must_use]
pub fn mount_options(options: &[String]) -> Vec<MountOption> {
    let mut mount_options: Vec<MountOption> = options.iter().map(|o| mount_option(o)).collect();
    if !mount_options
        .iter()
        .any(|o| matches!(o, MountOption::FSName(_)))
    {
        mount_options.insert(0, MountOption::FSName("transformfs".to_string()));
    }
    mount_options
}

/// Mounts the filesystem at `mountpoint`, blocking until it is unmounted.
///
/// # Arguments
///
/// * `fs` - The filesystem to serve.
/// * `mountpoint` - The directory to mount the filesystem at.
/// * `options` - `-o` style option strings.
///
/// # Errors
///
/// Returns an error if mounting fails.
pub fn mount(fs: TransformFs, mountpoint: &Path, options: &[String]) -> Result<()> {
    let mount_options = mount_options(options);
    debug!(mountpoint = %mountpoint.display(), ?mount_options, "mounting");

    fuser::mount2(TransformFuse::new(fs), mountpoint, &mount_options).map_err(|e| Error::Mount {
        message: format!("failed to mount FUSE at {}: {e}", mountpoint.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Timespec;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_file_attr_conversion() {
        let snapshot = AttributeSnapshot {
            ino: 777,
            mode: libc::S_IFREG as u32 | 0o644,
            nlink: 1,
            uid: 1000,
            gid: 100,
            size: 2,
            mtim: Timespec::new(1_700_000_000, 5),
            blksize: 4096,
            blocks: 8,
            ..AttributeSnapshot::default()
        };

        let attr = file_attr(&snapshot, 42);
        assert_eq!(attr.ino, 42);
        assert_eq!(attr.size, 2);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(attr.uid, 1000);
        assert_eq!(attr.blksize, 4096);
        assert_eq!(attr.blocks, 8);
        assert_eq!(attr.mtime, UNIX_EPOCH + Duration::new(1_700_000_000, 5));
    }

    #[test]
    fn test_file_type_mapping() {
        assert_eq!(file_type(FileKind::Directory), FileType::Directory);
        assert_eq!(file_type(FileKind::Symlink), FileType::Symlink);
        assert_eq!(file_type(FileKind::NamedPipe), FileType::NamedPipe);
    }

    #[test]
    fn test_mount_option_parsing() {
        assert_eq!(mount_option("ro"), MountOption::RO);
        assert_eq!(mount_option("allow_other"), MountOption::AllowOther);
        assert_eq!(
            mount_option("fsname=docs"),
            MountOption::FSName("docs".to_string())
        );
        assert_eq!(
            mount_option("max_read=4096"),
            MountOption::CUSTOM("max_read=4096".to_string())
        );
    }

    #[test]
    fn test_mount_options_default_fsname() {
        let options = mount_options(&["ro".to_string()]);
        assert_eq!(
            options,
            vec![MountOption::FSName("transformfs".to_string()), MountOption::RO]
        );
    }

    #[test]
    fn test_mount_options_keep_user_fsname() {
        let options = mount_options(&["fsname=docs".to_string(), "ro".to_string()]);
        assert_eq!(
            options,
            vec![MountOption::FSName("docs".to_string()), MountOption::RO]
        );
    }
}
