//! Execution of transform commands.
//!
//! A transform is an external program that receives the original file's path
//! as its only argument and writes the replacement content to standard output.
//! Standard input is empty. A run that cannot be spawned or that exits
//! unsuccessfully is a soft failure: its output is discarded and the caller
//! falls back to the original file.

use crate::error::TransformError;
use crate::rules::TransformCommand;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Runs transform commands.
///
/// The filesystem only talks to this trait, so tests can observe or replace
/// command execution.
pub trait Transformer: Send + Sync {
    /// Runs `command` on `input` and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started or exits
    /// unsuccessfully.
    fn transform(
        &self,
        command: &TransformCommand,
        input: &Path,
    ) -> std::result::Result<Vec<u8>, TransformError>;
}

/// Runs transform commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct TransformRunner {
    /// Directory `./`-relative commands are resolved against.
    program_dir: Option<PathBuf>,
}

impl TransformRunner {
    /// Creates a runner resolving relative commands against the directory of
    /// the running executable.
    #[must_use]
    pub fn new() -> Self {
        let program_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self { program_dir }
    }

    /// Creates a runner resolving relative commands against `dir`.
    pub fn with_program_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            program_dir: Some(dir.into()),
        }
    }

    /// Resolves the executable that will run for `command`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is program-relative and the program
    /// directory is unknown.
    pub fn resolve(
        &self,
        command: &TransformCommand,
    ) -> std::result::Result<PathBuf, TransformError> {
        if !command.is_program_relative() {
            return Ok(command.executable().to_path_buf());
        }
        let dir = self.program_dir.as_ref().ok_or_else(|| {
            TransformError::ProgramDir("current executable path unavailable".to_string())
        })?;
        Ok(normalize(&dir.join(command.executable())))
    }
}

impl Transformer for TransformRunner {
    fn transform(
        &self,
        command: &TransformCommand,
        input: &Path,
    ) -> std::result::Result<Vec<u8>, TransformError> {
        let executable = self.resolve(command)?;
        debug!(command = %executable.display(), input = %input.display(), "running transform");

        let output = Command::new(&executable)
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TransformError::SpawnFailed {
                command: executable.display().to_string(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(TransformError::Failed {
                command: executable.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Lexically normalizes a path: drops `.` components and folds `..` into
/// its parent. Does not touch the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
