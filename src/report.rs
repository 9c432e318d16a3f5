//! End-of-run reporting: human summary and machine-readable manifest.

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::builder::{ArtifactResult, Outcome};
use crate::runtime::Runtime;

/// File name of the machine-readable build report, written into the output
/// directory after a run.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Machine-readable record of one run, for CI consumption.
#[derive(Debug, Serialize)]
pub struct Manifest<'a> {
    pub tool: &'a str,
    pub version: &'a str,
    pub generated_by: &'a str,
    pub results: &'a [ArtifactResult],
}

/// Write the manifest into the output directory, returning its path.
pub fn write_manifest<R: Runtime>(
    runtime: &R,
    output_dir: &Path,
    manifest: &Manifest<'_>,
) -> Result<PathBuf> {
    let path = output_dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
    runtime
        .write(&path, json.as_bytes())
        .context("Failed to write manifest")?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// Print the per-target summary, one line per target in catalog order.
pub fn print_summary(tool: &str, version: &str, results: &[ArtifactResult]) {
    println!("Build summary for {tool} {version}:");
    for result in results {
        match &result.outcome {
            Outcome::Succeeded { path } => {
                println!("  ok    {:<14} {}", result.target.to_string(), path.display());
            }
            Outcome::Failed { reason, .. } => {
                println!("  FAIL  {:<14} {}", result.target.to_string(), reason);
            }
        }
    }

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - succeeded;
    println!("{succeeded} succeeded, {failed} failed");
}

/// Overall process exit code for a completed run.
///
/// Any per-target failure yields a nonzero exit: release tooling consumed by
/// automation must not report success on partial failure.
pub fn exit_code(results: &[ArtifactResult]) -> i32 {
    if results.iter().all(ArtifactResult::is_success) {
        0
    } else {
        1
    }
}
