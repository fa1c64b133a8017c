//! CLI layer for transformfs.
//!
//! Parses the command line with clap, prepares the cache and rule table and
//! mounts the filesystem.

pub mod commands;
pub mod parser;

pub use commands::{Prepared, execute, prepare};
pub use parser::{Cli, MountArgs};
