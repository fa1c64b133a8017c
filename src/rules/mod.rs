//! Transform rules.
//!
//! A [`RuleTable`] maps path patterns to the command whose output replaces
//! matching files. The table is built once before the filesystem serves any
//! call and is read-only afterwards, so it is shared between concurrent calls
//! without synchronization.
//!
//! Rules are evaluated in declaration order.

pub mod loader;

pub use loader::{DEFAULT_RULES_FILE, load_rules, parse_rules};

use crate::error::ConfigError;
use regex::bytes::Regex;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// An external command run against a matching file.
///
/// The invocation convention is fixed: the original file's path is the only
/// argument. Paths starting with `./` are resolved against the directory of the
/// running program when the command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformCommand {
    /// Executable path as configured.
    executable: PathBuf,
}

impl TransformCommand {
    /// Creates a command from its configured executable path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty.
    pub fn new(executable: impl Into<PathBuf>) -> std::result::Result<Self, ConfigError> {
        let executable = executable.into();
        if executable.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCommand {
                pattern: String::new(),
            });
        }
        Ok(Self { executable })
    }

    /// The executable path as configured.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Whether the executable is relative to the program's own directory.
    #[must_use]
    pub fn is_program_relative(&self) -> bool {
        self.executable.as_os_str().as_bytes().starts_with(b"./")
    }
}

/// A pattern and the command applied to paths it matches.
#[derive(Debug, Clone)]
pub struct TransformRule {
    pattern: Regex,
    command: TransformCommand,
}

impl TransformRule {
    /// Compiles a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regular expression.
    pub fn new(pattern: &str, command: TransformCommand) -> std::result::Result<Self, ConfigError> {
        let pattern = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern, command })
    }

    /// The pattern source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// The command to run.
    #[must_use]
    pub const fn command(&self) -> &TransformCommand {
        &self.command
    }

    /// Tests the rule against a filesystem-relative path.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.pattern.is_match(path.as_os_str().as_bytes())
    }
}

/// Ordered, immutable collection of transform rules.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<TransformRule>,
}

impl RuleTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Builds a table from `(pattern, command)` pairs, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns an error on the first invalid pattern or empty command.
    pub fn from_pairs<I, P, C>(pairs: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<PathBuf>,
    {
        let mut rules = Vec::new();
        for (pattern, command) in pairs {
            let pattern = pattern.as_ref();
            let command = TransformCommand::new(command).map_err(|_| ConfigError::EmptyCommand {
                pattern: pattern.to_string(),
            })?;
            rules.push(TransformRule::new(pattern, command)?);
        }
        Ok(Self { rules })
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &TransformRule> {
        self.rules.iter()
    }

    /// Rules matching `path`, in declaration order.
    pub fn matching<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a TransformRule> + 'a {
        self.rules.iter().filter(move |rule| rule.matches(path))
    }
}
