//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros. Mount arguments after
//! the original directory are collected verbatim and interpreted by
//! [`MountArgs::parse`], since their meaning depends on their position.

use crate::cache::DEFAULT_CACHE_DIR;
use crate::error::ConfigError;
use crate::rules::DEFAULT_RULES_FILE;
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// transformfs: a passthrough filesystem serving command output for
/// matching files.
///
/// Files whose path matches a rule are replaced by the output of the rule's
/// command, cached next to the mount and regenerated when the original
/// changes.
#[derive(Parser, Debug)]
#[command(name = "transformfs")]
#[command(version, about, long_about = None)]
#[command(
    override_usage = "transformfs [OPTIONS] <ORIGINAL> [MOUNT_ROOT] <MOUNTPOINT> [-o OPTION,...]"
)]
pub struct Cli {
    /// Path to the JSON rule file mapping path patterns to commands.
    #[arg(long, env = "TRANSFORMFS_RULES", default_value = DEFAULT_RULES_FILE)]
    pub rules: PathBuf,

    /// Directory holding transformed files.
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory whose files rules are evaluated against.
    pub original: PathBuf,

    /// Optional mount root, the mount point and mount options.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "MOUNT_ARGS"
    )]
    pub args: Vec<String>,
}

impl Cli {
    /// Interprets the trailing mount arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if no mount point is given.
    pub fn mount_args(&self) -> std::result::Result<MountArgs, ConfigError> {
        MountArgs::parse(self.original.clone(), &self.args)
    }
}

/// Mount arguments after positional interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountArgs {
    /// Directory exposed as `/`.
    pub root: PathBuf,
    /// Where the filesystem is mounted.
    pub mountpoint: PathBuf,
    /// `-o` option strings, split on commas.
    pub options: Vec<String>,
}

impl MountArgs {
    /// Interprets `args`, the arguments following `original`.
    ///
    /// Viewed as the full argument vector (program name, `original`, `args`),
    /// when at least three entries are present and neither of the last two
    /// starts with `-`, the second-to-last names the mount root and is taken
    /// out. The root is `original` when nothing is taken out, and also when
    /// the entry taken out is `original` itself. Of what remains, `-o` adds
    /// mount options, other flags are ignored and the last positional is the
    /// mount point.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingMountPoint`] if no positional remains.
    pub fn parse(original: PathBuf, args: &[String]) -> std::result::Result<Self, ConfigError> {
        let mut rest = args.to_vec();
        let mut root = original;

        let n = rest.len();
        let last_two_positional = |a: &str, b: &str| !a.starts_with('-') && !b.starts_with('-');
        if n >= 2 && last_two_positional(&rest[n - 2], &rest[n - 1]) {
            root = PathBuf::from(rest.remove(n - 2));
        }
        // n == 1: the entry taken out is `original`, which is already the root

        let mut mountpoint = None;
        let mut options = Vec::new();
        let mut iter = rest.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "-o" {
                match iter.next() {
                    Some(list) => options.extend(split_options(&list)),
                    None => warn!("-o given without options, ignored"),
                }
            } else if let Some(list) = arg.strip_prefix("-o") {
                options.extend(split_options(list));
            } else if arg.starts_with('-') {
                warn!(flag = %arg, "unsupported mount flag ignored");
            } else {
                mountpoint = Some(PathBuf::from(arg));
            }
        }

        Ok(Self {
            root,
            mountpoint: mountpoint.ok_or(ConfigError::MissingMountPoint)?,
            options,
        })
    }
}

fn split_options(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .filter(|o| !o.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use test_case::test_case;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["transformfs", "/data", "/mnt"]).unwrap();
        assert_eq!(cli.original, PathBuf::from("/data"));
        assert_eq!(cli.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert_eq!(cli.args, args(&["/mnt"]));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_keeps_mount_flags() {
        let cli = Cli::try_parse_from([
            "transformfs",
            "--cache-dir",
            "/tmp/c",
            "/data",
            "/mnt",
            "-o",
            "ro",
        ])
        .unwrap();
        assert_eq!(cli.cache_dir, PathBuf::from("/tmp/c"));
        assert_eq!(cli.args, args(&["/mnt", "-o", "ro"]));
    }

    #[test]
    fn test_cli_requires_mount_args() {
        assert!(Cli::try_parse_from(["transformfs", "/data"]).is_err());
    }

    #[test]
    fn test_three_argument_form_roots_at_original() {
        let parsed = MountArgs::parse(PathBuf::from("/data"), &args(&["/mnt"])).unwrap();
        assert_eq!(parsed.root, PathBuf::from("/data"));
        assert_eq!(parsed.mountpoint, PathBuf::from("/mnt"));
        assert!(parsed.options.is_empty());
    }

    #[test]
    fn test_explicit_root_is_taken_out() {
        let parsed = MountArgs::parse(PathBuf::from("/data"), &args(&["/site", "/mnt"])).unwrap();
        assert_eq!(parsed.root, PathBuf::from("/site"));
        assert_eq!(parsed.mountpoint, PathBuf::from("/mnt"));
    }

    #[test]
    fn test_trailing_flag_disables_root_detection() {
        let parsed = MountArgs::parse(PathBuf::from("/data"), &args(&["/mnt", "-f"])).unwrap();
        assert_eq!(parsed.root, PathBuf::from("/data"));
        assert_eq!(parsed.mountpoint, PathBuf::from("/mnt"));
    }

    #[test]
    fn test_options_before_root_and_mountpoint() {
        let parsed = MountArgs::parse(
            PathBuf::from("/data"),
            &args(&["-o", "ro,allow_other", "/site", "/mnt"]),
        )
        .unwrap();
        assert_eq!(parsed.root, PathBuf::from("/site"));
        assert_eq!(parsed.mountpoint, PathBuf::from("/mnt"));
        assert_eq!(parsed.options, args(&["ro", "allow_other"]));
    }

    #[test_case(&["/mnt", "-o", "ro"], &["ro"] ; "separate")]
    #[test_case(&["/mnt", "-oro,fsname=x"], &["ro", "fsname=x"] ; "attached")]
    #[test_case(&["/mnt", "-o", "a,,b", "-o", "c"], &["a", "b", "c"] ; "repeated")]
    #[test_case(&["/mnt", "-d"], &[] ; "other flags ignored")]
    fn test_mount_options(input: &[&str], expected: &[&str]) {
        let parsed = MountArgs::parse(PathBuf::from("/data"), &args(input)).unwrap();
        assert_eq!(parsed.mountpoint, PathBuf::from("/mnt"));
        assert_eq!(parsed.options, args(expected));
    }

    #[test]
    fn test_missing_mountpoint() {
        let err = MountArgs::parse(PathBuf::from("/data"), &args(&["-o", "ro"])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingMountPoint));
    }
}
