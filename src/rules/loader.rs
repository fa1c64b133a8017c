//! Rule file loading.
//!
//! The rule file is a JSON object mapping patterns to commands:
//!
//! ```json
//! {
//!     "\\.txt$": "/usr/local/bin/upper",
//!     "\\.md$": "./render-markdown"
//! }
//! ```
//!
//! String values are used verbatim; any other JSON value is used as its JSON
//! text. A missing file yields an empty table, anything else that cannot be
//! turned into rules is an error so that bad configuration is caught before
//! mounting.

use super::RuleTable;
use crate::error::ConfigError;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// Rule file name, relative to the working directory at startup.
pub const DEFAULT_RULES_FILE: &str = "transforms.json";

/// Parses rule file contents.
///
/// # Errors
///
/// Returns an error if the text is not a JSON object, or if a pattern or
/// command is invalid.
pub fn parse_rules(text: &str) -> std::result::Result<RuleTable, ConfigError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(map) = value else {
        return Err(ConfigError::NotAnObject);
    };

    RuleTable::from_pairs(map.into_iter().map(|(pattern, command)| {
        let command = match command {
            Value::String(s) => s,
            other => other.to_string(),
        };
        (pattern, command)
    }))
}

/// Loads the rule file at `path`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_rules(path: &Path) -> std::result::Result<RuleTable, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no rule file, serving plain passthrough");
            return Ok(RuleTable::new());
        }
        Err(e) => {
            return Err(ConfigError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }
    };

    let table = parse_rules(&text)?;
    info!(path = %path.display(), rules = table.len(), "loaded transform rules");
    Ok(table)
}
