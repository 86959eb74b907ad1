//! Loads a [`ConfigDocument`] from a YAML file on disk, expanding
//! `${VAR}` environment placeholders before parsing.

use std::collections::HashSet;
use std::path::Path;

use super::ConfigDocument;
use crate::error::ConfigError;

/// Read `path`, expand `${VAR}` placeholders against the process
/// environment, and parse the result as a [`ConfigDocument`].
///
/// Fails loudly (rather than leaving the placeholder in place) if a
/// referenced variable is unset.
pub fn load(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let expanded = expand_env_placeholders(&raw)?;
    serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Parse a [`ConfigDocument`] from an already-in-memory YAML string,
/// still expanding `${VAR}` placeholders. Used directly by tests and by
/// callers that source configuration from somewhere other than a file.
pub fn load_str(yaml: &str) -> Result<ConfigDocument, ConfigError> {
    let expanded = expand_env_placeholders(yaml)?;
    serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Replace every `${VAR}` occurrence with the value of the `VAR`
/// environment variable. An unset variable is a hard error rather than
/// an empty-string substitution.
fn expand_env_placeholders(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut missing: HashSet<String> = HashSet::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        missing.insert(name.to_string());
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    if let Some(name) = missing.into_iter().next() {
        return Err(ConfigError::UndefinedVariable(name));
    }
    Ok(out)
}
