//! Version extraction from a declarations file.
//!
//! The version source is any file containing a line with a
//! `version = "<value>"` declaration, e.g. a Go constant block. The first
//! non-empty captured value wins; the token is treated as opaque and
//! immutable for the duration of a run.

use std::path::Path;

use crate::error::BuildError;
use crate::runtime::Runtime;

const VERSION_PREFIX: &str = "version = \"";

/// Extract the version token from file contents.
///
/// Returns exactly the text between the quotes of the first matching
/// declaration, with no surrounding whitespace or quotes. An empty value is
/// not a version and is skipped.
pub fn extract_version(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let Some(idx) = line.find(VERSION_PREFIX) else {
            continue;
        };
        let rest = &line[idx + VERSION_PREFIX.len()..];
        if let Some(end) = rest.find('"') {
            let value = &rest[..end];
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Load the version from a source file on disk.
pub fn load_version<R: Runtime>(runtime: &R, path: &Path) -> Result<String, BuildError> {
    let contents =
        runtime
            .read_to_string(path)
            .map_err(|e| BuildError::VersionSourceUnreadable {
                path: path.to_path_buf(),
                reason: format!("{e:#}"),
            })?;

    extract_version(&contents).ok_or_else(|| BuildError::VersionNotFound {
        path: path.to_path_buf(),
    })
}
