//! # transformfs
//!
//! A passthrough filesystem that serves transformed content for files
//! matching configured rules.
//!
//! A rule pairs a regular expression over mount-relative paths with a
//! command. When a matching file's attributes are requested, the command is
//! run on the original file and its standard output is cached; the cached
//! copy is then served in place of the original until the original's
//! modification time changes. Every other call forwards to the underlying
//! directory.
//!
//! ## Features
//!
//! - **Transform Rules**: JSON rule file, applied in declaration order
//! - **Cache**: mtime-stamped entries, written atomically
//! - **Passthrough**: attributes, reads, directory listings, symlinks, statfs
//! - **FUSE**: kernel transport via `fuser` (feature `fuse`, on by default)

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod cache;
pub mod cli;
pub mod error;
pub mod fs;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod rules;
pub mod transform;

// Re-export commonly used types at crate root
pub use error::{CacheError, ConfigError, Errno, Error, FsResult, Result, TransformError};

// Re-export filesystem types
pub use fs::{
    AttributeSnapshot, FileKind, INVALID_HANDLE, MountConfig, TransformFs, VolumeSnapshot,
};

// Re-export configuration types
pub use cache::{CacheStore, DEFAULT_CACHE_DIR};
pub use rules::{DEFAULT_RULES_FILE, RuleTable, TransformCommand, TransformRule, load_rules};
pub use transform::{TransformRunner, Transformer};

// Re-export CLI types
pub use cli::{Cli, MountArgs};

// Re-export FUSE types (feature-gated)
#[cfg(feature = "fuse")]
pub use fuse::{TransformFuse, mount};
