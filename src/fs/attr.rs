//! Portable attribute structures.
//!
//! Host stat and statvfs data are copied field by field into
//! [`AttributeSnapshot`] and [`VolumeSnapshot`]. Both are built fresh for
//! every call and never cached.

// Host field widths differ between platforms; the conversions below are
// lossless on every supported target.
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::unnecessary_cast,
    clippy::useless_conversion,
    clippy::field_reassign_with_default
)]

use nix::sys::statvfs::Statvfs;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Fragment size reported by `statfs`.
pub const FRAGMENT_SIZE: u64 = 1;

/// Maximum file name length reported by `statfs`.
pub const NAME_MAX: u64 = 255;

/// Seconds and nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    /// Whole seconds; negative before the epoch.
    pub sec: i64,
    /// Nanoseconds within the second.
    pub nsec: i64,
}

impl Timespec {
    /// Creates a timestamp.
    #[must_use]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// Converts a `SystemTime`.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, i64::from(d.subsec_nanos())),
            Err(e) => {
                let d = e.duration();
                let mut sec = -(d.as_secs() as i64);
                let mut nsec = i64::from(d.subsec_nanos());
                if nsec > 0 {
                    sec -= 1;
                    nsec = 1_000_000_000 - nsec;
                }
                Self::new(sec, nsec)
            }
        }
    }

    /// Converts to a `SystemTime`.
    #[must_use]
    pub fn to_system_time(self) -> SystemTime {
        let nanos = Duration::from_nanos(self.nsec.clamp(0, 999_999_999) as u64);
        if self.sec >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.sec as u64) + nanos
        } else {
            UNIX_EPOCH - Duration::from_secs(self.sec.unsigned_abs()) + nanos
        }
    }
}

/// File type encoded in the `mode` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file.
    RegularFile,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Block device.
    BlockDevice,
    /// Character device.
    CharDevice,
    /// FIFO.
    NamedPipe,
    /// Unix domain socket.
    Socket,
}

impl FileKind {
    /// Decodes the type bits of a `st_mode` value. Unknown types read as
    /// regular files.
    #[must_use]
    pub const fn from_mode(mode: u32) -> Self {
        match mode & (libc::S_IFMT as u32) {
            m if m == libc::S_IFDIR as u32 => Self::Directory,
            m if m == libc::S_IFLNK as u32 => Self::Symlink,
            m if m == libc::S_IFBLK as u32 => Self::BlockDevice,
            m if m == libc::S_IFCHR as u32 => Self::CharDevice,
            m if m == libc::S_IFIFO as u32 => Self::NamedPipe,
            m if m == libc::S_IFSOCK as u32 => Self::Socket,
            _ => Self::RegularFile,
        }
    }
}

/// Portable `stat` structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeSnapshot {
    /// Device containing the file.
    pub dev: u64,
    /// Host inode number.
    pub ino: u64,
    /// Type and permission bits.
    pub mode: u32,
    /// Hard link count.
    pub nlink: u32,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
    /// Device ID for special files.
    pub rdev: u64,
    /// Size in bytes.
    pub size: i64,
    /// Last access.
    pub atim: Timespec,
    /// Last modification.
    pub mtim: Timespec,
    /// Last status change.
    pub ctim: Timespec,
    /// Creation time, zero when the host does not report it.
    pub birthtim: Timespec,
    /// Preferred I/O block size.
    pub blksize: i64,
    /// Number of 512-byte blocks allocated.
    pub blocks: i64,
}

impl AttributeSnapshot {
    /// Copies host metadata. The metadata must come from `lstat` or `fstat`
    /// for the snapshot to describe the entry itself.
    #[must_use]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let mut attr = Self::default();
        attr.dev = meta.dev();
        attr.ino = meta.ino();
        attr.mode = meta.mode();
        attr.nlink = meta.nlink() as u32;
        attr.uid = meta.uid();
        attr.gid = meta.gid();
        attr.rdev = meta.rdev();
        attr.size = meta.size() as i64;
        attr.atim = Timespec::new(meta.atime(), meta.atime_nsec());
        attr.mtim = Timespec::new(meta.mtime(), meta.mtime_nsec());
        attr.ctim = Timespec::new(meta.ctime(), meta.ctime_nsec());
        attr.birthtim = meta
            .created()
            .map(Timespec::from_system_time)
            .unwrap_or_default();
        attr.blksize = meta.blksize() as i64;
        attr.blocks = meta.blocks() as i64;
        attr
    }

    /// The file type.
    #[must_use]
    pub const fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Permission bits, including setuid, setgid and sticky.
    #[must_use]
    pub const fn permissions(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// Portable `statfs` structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeSnapshot {
    /// Block size.
    pub bsize: u64,
    /// Fragment size, always [`FRAGMENT_SIZE`].
    pub frsize: u64,
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Blocks available to unprivileged users.
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Inodes available to unprivileged users, reported as `ffree`.
    pub favail: u64,
    /// Filesystem ID, not reported.
    pub fsid: u64,
    /// Mount flags, not reported.
    pub flag: u64,
    /// Maximum name length, always [`NAME_MAX`].
    pub namemax: u64,
}

impl VolumeSnapshot {
    /// Copies host `statvfs` data.
    #[must_use]
    pub fn from_statvfs(stat: &Statvfs) -> Self {
        let mut volume = Self::default();
        volume.bsize = u64::from(stat.block_size());
        volume.frsize = FRAGMENT_SIZE;
        volume.blocks = u64::from(stat.blocks());
        volume.bfree = u64::from(stat.blocks_free());
        volume.bavail = u64::from(stat.blocks_available());
        volume.files = u64::from(stat.files());
        volume.ffree = u64::from(stat.files_free());
        volume.favail = volume.ffree;
        volume.namemax = NAME_MAX;
        volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_metadata_copies_every_field() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.txt");
        std::fs::write(&path, "hello").unwrap();
        let meta = std::fs::symlink_metadata(&path).unwrap();

        let attr = AttributeSnapshot::from_metadata(&meta);
        assert_eq!(attr.dev, meta.dev());
        assert_eq!(attr.ino, meta.ino());
        assert_eq!(attr.mode, meta.mode());
        assert_eq!(u64::from(attr.nlink), meta.nlink());
        assert_eq!(attr.uid, meta.uid());
        assert_eq!(attr.gid, meta.gid());
        assert_eq!(attr.size, 5);
        assert_eq!(attr.mtim, Timespec::new(meta.mtime(), meta.mtime_nsec()));
        assert_eq!(attr.atim, Timespec::new(meta.atime(), meta.atime_nsec()));
        assert_eq!(attr.ctim, Timespec::new(meta.ctime(), meta.ctime_nsec()));
        assert_eq!(attr.blocks, meta.blocks() as i64);
        assert_eq!(attr.kind(), FileKind::RegularFile);
    }

    #[test]
    fn test_kind_of_directory_and_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink("target", &link).unwrap();

        let dir = AttributeSnapshot::from_metadata(&std::fs::metadata(temp_dir.path()).unwrap());
        assert_eq!(dir.kind(), FileKind::Directory);

        let link = AttributeSnapshot::from_metadata(&std::fs::symlink_metadata(&link).unwrap());
        assert_eq!(link.kind(), FileKind::Symlink);
    }

    #[test]
    fn test_permissions_mask() {
        let attr = AttributeSnapshot {
            mode: libc::S_IFREG as u32 | 0o4755,
            ..AttributeSnapshot::default()
        };
        assert_eq!(attr.permissions(), 0o4755);
        assert_eq!(attr.kind(), FileKind::RegularFile);
    }

    #[test]
    fn test_timespec_round_trip() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 42);
        let ts = Timespec::from_system_time(time);
        assert_eq!(ts, Timespec::new(1_700_000_000, 42));
        assert_eq!(ts.to_system_time(), time);
    }

    #[test]
    fn test_timespec_before_epoch() {
        let time = UNIX_EPOCH - Duration::new(1, 250_000_000);
        let ts = Timespec::from_system_time(time);
        assert_eq!(ts, Timespec::new(-2, 750_000_000));
        assert_eq!(ts.to_system_time(), time);
    }

    #[test]
    fn test_volume_snapshot_constants() {
        let temp_dir = TempDir::new().unwrap();
        let stat = nix::sys::statvfs::statvfs(temp_dir.path()).unwrap();

        let volume = VolumeSnapshot::from_statvfs(&stat);
        assert_eq!(volume.frsize, FRAGMENT_SIZE);
        assert_eq!(volume.namemax, NAME_MAX);
        assert_eq!(volume.favail, volume.ffree);
        assert_eq!(volume.blocks, u64::from(stat.blocks()));
        assert_eq!(volume.fsid, 0);
    }
}
