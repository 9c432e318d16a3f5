//! The target catalog and artifact naming.
//!
//! A target is one `(os, arch)` platform pair for which a standalone
//! artifact is produced. The catalog is fixed and ordered; report output is
//! always presented in catalog order regardless of build completion order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BuildError;

/// One `(os, arch)` platform pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub os: String,
    pub arch: String,
}

impl Target {
    fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Whether artifacts for this target carry an executable extension.
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            anyhow::bail!("Invalid target format. Expected 'os/arch'.")
        } else {
            Ok(Target::new(parts[0], parts[1]))
        }
    }
}

/// The fixed, ordered catalog of release targets.
pub fn catalog() -> Vec<Target> {
    vec![
        Target::new("darwin", "amd64"),
        Target::new("linux", "386"),
        Target::new("linux", "amd64"),
        Target::new("linux", "arm"),
        Target::new("windows", "386"),
        Target::new("windows", "amd64"),
        Target::new("windows", "arm"),
    ]
}

/// Resolve the requested target specs against the catalog.
///
/// An empty request selects the whole catalog. A non-empty request selects a
/// subset, returned in catalog order (not request order). Unknown or
/// duplicated specs abort the run before any build starts.
pub fn select_targets(specs: &[String]) -> Result<Vec<Target>, BuildError> {
    let all = catalog();
    if specs.is_empty() {
        return Ok(all);
    }

    let mut requested = Vec::with_capacity(specs.len());
    for spec in specs {
        let target: Target = spec
            .parse()
            .map_err(|_| BuildError::UnknownTarget { spec: spec.clone() })?;
        if !all.contains(&target) {
            return Err(BuildError::UnknownTarget { spec: spec.clone() });
        }
        if requested.contains(&target) {
            return Err(BuildError::DuplicateTarget { spec: spec.clone() });
        }
        requested.push(target);
    }

    Ok(all.into_iter().filter(|t| requested.contains(t)).collect())
}

/// Compose the artifact file name for one target.
///
/// The name is `"<tool>-<version>-<os>-<arch>"`, with `.exe` appended if and
/// only if the target os is "windows".
pub fn artifact_file_name(tool: &str, version: &str, target: &Target) -> String {
    let mut name = format!("{}-{}-{}-{}", tool, version, target.os, target.arch);
    if target.is_windows() {
        name.push_str(".exe");
    }
    name
}
