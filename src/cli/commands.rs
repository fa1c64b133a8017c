//! CLI command implementation.
//!
//! Startup runs in a fixed order: the cache directory is created (fatal on
//! failure), the rule file is loaded, the mount arguments are interpreted and
//! every directory is made absolute before the filesystem is mounted.

use crate::cache::CacheStore;
use crate::cli::parser::{Cli, MountArgs};
use crate::error::{ConfigError, Result};
use crate::fs::{MountConfig, TransformFs};
use crate::rules::{RuleTable, load_rules};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything needed to mount, resolved from the command line.
#[derive(Debug)]
pub struct Prepared {
    /// Directories the filesystem works on, all absolute.
    pub config: MountConfig,
    /// The loaded rule table.
    pub rules: RuleTable,
    /// Absolute mount point.
    pub mountpoint: PathBuf,
    /// `-o` option strings.
    pub options: Vec<String>,
}

/// Executes the CLI command.
///
/// Blocks until the filesystem is unmounted.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be created, the rule file
/// is invalid, the arguments are incomplete or mounting fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let prepared = prepare(cli)?;
    let mountpoint = prepared.mountpoint.clone();

    info!(
        original = %prepared.config.original.display(),
        root = %prepared.config.root.display(),
        cache = %prepared.config.cache.display(),
        rules = prepared.rules.len(),
        "starting transformfs"
    );

    let fs = TransformFs::new(prepared.config, prepared.rules);
    // Cache entries and directories carry exactly the modes they are created with
    nix::sys::stat::umask(nix::sys::stat::Mode::empty());

    cmd_mount(fs, &mountpoint, &prepared.options)?;

    Ok(format!("Unmounted transformfs from: {}\n", mountpoint.display()))
}

/// Resolves the command line into a mountable configuration.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be created, the rule file
/// is invalid or the mount point is missing.
pub fn prepare(cli: &Cli) -> Result<Prepared> {
    let cache_dir = absolute(&cli.cache_dir)?;
    CacheStore::new(&cache_dir).ensure_root()?;
    debug!(cache = %cache_dir.display(), "cache directory ready");

    let rules = load_rules(&cli.rules)?;
    let MountArgs {
        root,
        mountpoint,
        options,
    } = cli.mount_args()?;

    let config = MountConfig::new(absolute(&cli.original)?, cache_dir).with_root(absolute(&root)?);

    Ok(Prepared {
        config,
        rules,
        mountpoint: absolute(&mountpoint)?,
        options,
    })
}

fn absolute(path: &Path) -> std::result::Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::InvalidPath {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

// ==================== FUSE Mount Command ====================

/// Mounts the filesystem, blocking until it is unmounted.
#[cfg(feature = "fuse")]
fn cmd_mount(fs: TransformFs, mountpoint: &Path, options: &[String]) -> Result<()> {
    if !mountpoint.is_dir() {
        return Err(crate::Error::Mount {
            message: format!("mount point is not a directory: {}", mountpoint.display()),
        });
    }

    info!(
        mountpoint = %mountpoint.display(),
        "mounting; run 'fusermount -u {}' to unmount",
        mountpoint.display()
    );
    crate::fuse::mount(fs, mountpoint, options)
}

#[cfg(not(feature = "fuse"))]
fn cmd_mount(_fs: TransformFs, mountpoint: &Path, _options: &[String]) -> Result<()> {
    Err(crate::Error::Mount {
        message: format!(
            "cannot mount {}: built without FUSE support",
            mountpoint.display()
        ),
    })
}
