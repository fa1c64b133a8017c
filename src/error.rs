//! Error types for transformfs operations.
//!
//! This module provides the error hierarchy used by startup, configuration,
//! cache maintenance and transform execution, built with `thiserror`. The
//! filesystem call surface does not use it: calls fail with an [`Errno`],
//! which is what a kernel transport ultimately has to report.

use std::fmt;
use thiserror::Error;

/// Result type alias for transformfs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type of the filesystem call surface.
pub type FsResult<T> = std::result::Result<T, Errno>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Rule file and command line errors.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cache directory errors.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Mount errors.
    #[error("mount error: {message}")]
    Mount {
        /// Description of the mount failure.
        message: String,
    },
}

/// Errors raised while loading the rule file or interpreting arguments.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The rule file exists but could not be read.
    #[error("failed to read rule file: {path}: {reason}")]
    ReadFailed {
        /// Path to the rule file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// The rule file is not valid JSON.
    #[error("invalid rule file: {0}")]
    Json(String),

    /// The rule file is valid JSON but not an object of pattern/command pairs.
    #[error("rule file must be a JSON object mapping patterns to commands")]
    NotAnObject,

    /// A rule pattern is not a valid regular expression.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Regex compiler message.
        reason: String,
    },

    /// A rule command is empty.
    #[error("empty command for pattern {pattern:?}")]
    EmptyCommand {
        /// The pattern whose command is empty.
        pattern: String,
    },

    /// Missing mount point argument.
    #[error("missing mount point")]
    MissingMountPoint,

    /// A directory argument could not be resolved.
    #[error("cannot resolve {path}: {reason}")]
    InvalidPath {
        /// The path as given.
        path: String,
        /// Reason for failure.
        reason: String,
    },
}

/// Errors raised while maintaining the cache directory.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write a cache entry.
    #[error("failed to write cache entry: {path}: {reason}")]
    WriteFailed {
        /// Path to the entry.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to stamp the modification time of a cache entry.
    #[error("failed to stamp cache entry: {path}: {reason}")]
    StampFailed {
        /// Path to the entry.
        path: String,
        /// Reason for failure.
        reason: String,
    },
}

/// Errors raised by transform commands.
///
/// These are soft failures: they are logged and the call falls back to the
/// original file, so they never become an [`Error`].
#[derive(Error, Debug)]
pub enum TransformError {
    /// The command could not be started.
    #[error("failed to spawn {command}: {reason}")]
    SpawnFailed {
        /// Resolved executable.
        command: String,
        /// Reason for failure.
        reason: String,
    },

    /// The command ran but did not exit successfully.
    #[error("{command} exited with {status}")]
    Failed {
        /// Resolved executable.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The program's own directory could not be determined.
    #[error("cannot locate program directory: {0}")]
    ProgramDir(String),
}

impl TransformError {
    /// Returns the captured standard error of a failed run, if any.
    #[must_use]
    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// A platform error number returned by a filesystem call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(i32);

impl Errno {
    /// No such file or directory.
    pub const ENOENT: Self = Self(libc::ENOENT);
    /// Bad file descriptor.
    pub const EBADF: Self = Self(libc::EBADF);
    /// Input/output error.
    pub const EIO: Self = Self(libc::EIO);
    /// Invalid argument.
    pub const EINVAL: Self = Self(libc::EINVAL);

    /// The positive error number, as FUSE replies expect it.
    #[must_use]
    pub const fn code(self) -> i32 {
        self.0
    }

    /// The negated error number of the integer call contract.
    #[must_use]
    pub const fn status(self) -> i32 {
        -self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", std::io::Error::from_raw_os_error(self.0))
    }
}

impl From<std::io::Error> for Errno {
    fn from(err: std::io::Error) -> Self {
        Self(err.raw_os_error().unwrap_or(libc::EIO))
    }
}

impl From<nix::errno::Errno> for Errno {
    fn from(err: nix::errno::Errno) -> Self {
        Self(err as i32)
    }
}

// Implement From traits for standard library errors

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Mount {
            message: "no fuse device".to_string(),
        };
        assert_eq!(err.to_string(), "mount error: no fuse device");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotAnObject;
        assert!(err.to_string().contains("JSON object"));

        let err = ConfigError::InvalidPattern {
            pattern: "[".to_string(),
            reason: "unclosed class".to_string(),
        };
        assert!(err.to_string().contains("\"[\""));
        assert!(err.to_string().contains("unclosed class"));

        let err = ConfigError::EmptyCommand {
            pattern: "\\.md$".to_string(),
        };
        assert!(err.to_string().contains("empty command"));
    }

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::WriteFailed {
            path: "/tmp/.cache/a.txt".to_string(),
            reason: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to write cache entry: /tmp/.cache/a.txt: disk full"
        );
    }

    #[test]
    fn test_transform_error_stderr() {
        let err = TransformError::Failed {
            command: "/bin/false".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.stderr(), "boom");
        assert_eq!(err.to_string(), "/bin/false exited with exit status: 1");

        let err = TransformError::SpawnFailed {
            command: "/missing".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.stderr(), "");
    }

    #[test]
    fn test_error_from_variants() {
        let err: Error = ConfigError::MissingMountPoint.into();
        assert!(matches!(err, Error::Config(_)));

        let err: Error = CacheError::DirectoryFailed {
            path: "/tmp/.cache".to_string(),
            reason: "read-only file system".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Cache(_)));
    }

    #[test]
    fn test_errno_from_io_error() {
        let err = std::io::Error::from_raw_os_error(libc::ENOENT);
        let errno = Errno::from(err);
        assert_eq!(errno, Errno::ENOENT);
        assert_eq!(errno.code(), libc::ENOENT);
        assert_eq!(errno.status(), -libc::ENOENT);
    }

    #[test]
    fn test_errno_without_os_code_is_eio() {
        let err = std::io::Error::other("synthetic");
        assert_eq!(Errno::from(err), Errno::EIO);
    }

    #[test]
    fn test_from_serde_json_error_to_config_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ConfigError = json_err.into();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
