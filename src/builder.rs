//! Release build orchestration.
//!
//! Given a version and an ordered list of targets, produce one artifact per
//! target in the output directory and report per-target success or failure.
//! A run never silently leaves artifacts from a previous run, and a failing
//! target never blocks its siblings.

use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::catalog::{Target, artifact_file_name};
use crate::error::{BuildError, Result};
use crate::runtime::Runtime;
use crate::toolchain::{BuildRequest, Invocation, Toolchain};

/// Immutable description of one run.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Artifact base name (e.g. "go-mcu")
    pub tool_name: String,
    /// Version token extracted from the version source
    pub version: String,
    /// Targets to build, already in catalog order
    pub targets: Vec<Target>,
    /// Output directory collecting all artifacts for the run
    pub output_dir: PathBuf,
    /// Maximum concurrent delegate invocations (1 = sequential)
    pub jobs: usize,
    /// Per-target timeout
    pub timeout: Option<Duration>,
}

/// Terminal state of one target's build.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Succeeded {
        path: PathBuf,
    },
    Failed {
        exit_code: Option<i32>,
        reason: String,
    },
}

/// Result of building one target.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactResult {
    pub target: Target,
    /// Composed artifact file name
    pub artifact: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ArtifactResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }
}

/// Prepare the output directory: create it if absent, empty it if present.
///
/// Only top-level entries are removed; subdirectory entries are removed with
/// a non-recursive `remove_dir`, so a non-empty subdirectory aborts the run.
/// "Does not exist" and "cannot be listed" are kept distinct: a listing or
/// removal failure is reported as [`BuildError::OutputDirectory`], never
/// masked by a create attempt. Idempotent.
pub fn prepare_output_directory<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    if !runtime.exists(path) {
        debug!("creating output directory {}", path.display());
        return runtime
            .create_dir_all(path)
            .map_err(|e| BuildError::OutputDirectory {
                path: path.to_path_buf(),
                reason: format!("{e:#}"),
            });
    }

    if !runtime.is_dir(path) {
        return Err(BuildError::OutputDirectory {
            path: path.to_path_buf(),
            reason: "exists but is not a directory".to_string(),
        });
    }

    let entries = runtime
        .read_dir(path)
        .map_err(|e| BuildError::OutputDirectory {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })?;

    for entry in entries {
        debug!("removing stale entry {}", entry.display());
        let removed = if runtime.is_dir(&entry) {
            runtime.remove_dir(&entry)
        } else {
            runtime.remove_file(&entry)
        };
        removed.map_err(|e| BuildError::OutputDirectory {
            path: entry,
            reason: format!("{e:#}"),
        })?;
    }

    Ok(())
}

/// The release builder, parameterized over the build delegate.
pub struct Builder {
    toolchain: Arc<dyn Toolchain>,
}

impl Builder {
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self { toolchain }
    }

    /// Build every target in the plan, returning exactly one result per
    /// target, in catalog order, regardless of individual failures.
    pub async fn run_all(&self, plan: &BuildPlan) -> Vec<ArtifactResult> {
        if plan.jobs <= 1 {
            let mut results = Vec::with_capacity(plan.targets.len());
            for target in &plan.targets {
                results.push(self.build_target(plan, target.clone()).await);
            }
            return results;
        }

        // The output directory is fully prepared before this point, so the
        // concurrent builds share no mutable state: each task owns its
        // request, including its environment overrides.
        let semaphore = Arc::new(Semaphore::new(plan.jobs));
        let mut join_set = JoinSet::new();

        for (index, target) in plan.targets.iter().cloned().enumerate() {
            let toolchain = Arc::clone(&self.toolchain);
            let semaphore = Arc::clone(&semaphore);
            let request = build_request(plan, &target);
            let artifact = artifact_file_name(&plan.tool_name, &plan.version, &target);

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = run_one(toolchain.as_ref(), target, artifact, request).await;
                (index, result)
            });
        }

        // Collect into catalog order regardless of completion order.
        let mut slots: Vec<Option<ArtifactResult>> = vec![None; plan.targets.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!("build task failed to complete: {e}"),
            }
        }

        slots
            .into_iter()
            .zip(&plan.targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| ArtifactResult {
                    target: target.clone(),
                    artifact: artifact_file_name(&plan.tool_name, &plan.version, target),
                    outcome: Outcome::Failed {
                        exit_code: None,
                        reason: "build task panicked".to_string(),
                    },
                })
            })
            .collect()
    }

    /// Build a single target: Pending -> Building -> {Succeeded, Failed}.
    pub async fn build_target(&self, plan: &BuildPlan, target: Target) -> ArtifactResult {
        let artifact = artifact_file_name(&plan.tool_name, &plan.version, &target);
        let request = build_request(plan, &target);
        run_one(self.toolchain.as_ref(), target, artifact, request).await
    }
}

fn build_request(plan: &BuildPlan, target: &Target) -> BuildRequest {
    let artifact = artifact_file_name(&plan.tool_name, &plan.version, target);
    BuildRequest {
        target: target.clone(),
        output_path: plan.output_dir.join(artifact),
        timeout: plan.timeout,
    }
}

async fn run_one(
    toolchain: &dyn Toolchain,
    target: Target,
    artifact: String,
    request: BuildRequest,
) -> ArtifactResult {
    debug!("{target}: pending -> building");
    let outcome = match toolchain.compile(&request).await {
        Invocation::Exited { success: true, .. } => Outcome::Succeeded {
            path: request.output_path.clone(),
        },
        Invocation::Exited {
            code,
            stderr,
            success: false,
            ..
        } => Outcome::Failed {
            exit_code: code,
            reason: failure_reason(code, &stderr),
        },
        Invocation::SpawnFailed { reason } => Outcome::Failed {
            exit_code: None,
            reason: format!("failed to start build delegate: {reason}"),
        },
        Invocation::TimedOut { after } => Outcome::Failed {
            exit_code: None,
            reason: format!("build timed out after {}s", after.as_secs()),
        },
    };

    match &outcome {
        Outcome::Succeeded { path } => info!("{target}: built {}", path.display()),
        Outcome::Failed { reason, .. } => warn!("{target}: failed: {reason}"),
    }

    ArtifactResult {
        target,
        artifact,
        outcome,
    }
}

/// Summarize a failed invocation from its exit code and the tail of stderr.
fn failure_reason(code: Option<i32>, stderr: &str) -> String {
    let tail: Vec<&str> = stderr
        .lines()
        .rev()
        .take(5)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let tail = tail.join("\n").trim().to_string();

    match (code, tail.is_empty()) {
        (Some(code), false) => format!("exit code {code}: {tail}"),
        (Some(code), true) => format!("exit code {code}"),
        (None, false) => format!("terminated by signal: {tail}"),
        (None, true) => "terminated by signal".to_string(),
    }
}

/// Run the full orchestration: reset the output directory, then build every
/// target. Directory preparation completes before any build starts.
pub async fn execute<R: Runtime>(
    runtime: &R,
    builder: &Builder,
    plan: &BuildPlan,
) -> Result<Vec<ArtifactResult>> {
    prepare_output_directory(runtime, &plan.output_dir)?;
    Ok(builder.run_all(plan).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;
    use crate::runtime::MockRuntime;
    use crate::toolchain::MockToolchain;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn plan(targets: Vec<Target>, jobs: usize) -> BuildPlan {
        BuildPlan {
            tool_name: "go-mcu".to_string(),
            version: "1.4.0".to_string(),
            targets,
            output_dir: PathBuf::from("build"),
            jobs,
            timeout: None,
        }
    }

    fn exited(success: bool, code: i32) -> Invocation {
        Invocation::Exited {
            success,
            code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_prepare_creates_missing_directory() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("build");

        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| false);
        runtime
            .expect_create_dir_all()
            .with(eq(path.clone()))
            .times(1)
            .returning(|_| Ok(()));

        prepare_output_directory(&runtime, &path).unwrap();
    }

    #[test]
    fn test_prepare_clears_existing_entries() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("build");
        let stale_file = path.join("old-artifact");
        let stale_dir = path.join("old-dir");

        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| true);
        runtime
            .expect_is_dir()
            .with(eq(path.clone()))
            .returning(|_| true);
        {
            let stale_file = stale_file.clone();
            let stale_dir = stale_dir.clone();
            runtime
                .expect_read_dir()
                .with(eq(path.clone()))
                .returning(move |_| Ok(vec![stale_file.clone(), stale_dir.clone()]));
        }
        runtime
            .expect_is_dir()
            .with(eq(stale_file.clone()))
            .returning(|_| false);
        runtime
            .expect_is_dir()
            .with(eq(stale_dir.clone()))
            .returning(|_| true);
        runtime
            .expect_remove_file()
            .with(eq(stale_file))
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_remove_dir()
            .with(eq(stale_dir))
            .times(1)
            .returning(|_| Ok(()));

        prepare_output_directory(&runtime, &path).unwrap();
    }

    #[test]
    fn test_prepare_unlistable_directory_is_not_masked() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("build");

        runtime.expect_exists().returning(|_| true);
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_read_dir()
            .returning(|_| Err(anyhow::anyhow!("permission denied")));
        // No create_dir_all expectation: attempting creation here would be
        // the masking behavior this function must not have.

        let err = prepare_output_directory(&runtime, &path).unwrap_err();
        assert!(matches!(err, BuildError::OutputDirectory { .. }));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_prepare_rejects_non_directory() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("build");

        runtime.expect_exists().returning(|_| true);
        runtime.expect_is_dir().returning(|_| false);

        let err = prepare_output_directory(&runtime, &path).unwrap_err();
        assert!(matches!(err, BuildError::OutputDirectory { .. }));
    }

    #[test]
    fn test_prepare_removal_failure_aborts() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("build");
        let entry = path.join("stuck");

        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| true);
        runtime
            .expect_is_dir()
            .with(eq(path.clone()))
            .returning(|_| true);
        {
            let entry = entry.clone();
            runtime
                .expect_read_dir()
                .returning(move |_| Ok(vec![entry.clone()]));
        }
        runtime
            .expect_is_dir()
            .with(eq(entry.clone()))
            .returning(|_| false);
        runtime
            .expect_remove_file()
            .returning(|_| Err(anyhow::anyhow!("read-only file system")));

        let err = prepare_output_directory(&runtime, &path).unwrap_err();
        assert!(matches!(err, BuildError::OutputDirectory { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn test_run_all_one_result_per_target_in_catalog_order() {
        let mut toolchain = MockToolchain::new();
        toolchain
            .expect_compile()
            .times(7)
            .returning(|_| exited(true, 0));

        let builder = Builder::new(Arc::new(toolchain));
        let plan = plan(catalog(), 1);
        let results = builder.run_all(&plan).await;

        assert_eq!(results.len(), 7);
        for (result, target) in results.iter().zip(catalog()) {
            assert_eq!(result.target, target);
            assert!(result.is_success());
        }
        assert_eq!(results[0].artifact, "go-mcu-1.4.0-darwin-amd64");
        assert_eq!(results[6].artifact, "go-mcu-1.4.0-windows-arm.exe");
    }

    #[test_log::test(tokio::test)]
    async fn test_run_all_failure_does_not_short_circuit() {
        let mut toolchain = MockToolchain::new();
        // Every windows build fails; every other build must still run.
        toolchain.expect_compile().times(7).returning(|request| {
            if request.target.os == "windows" {
                Invocation::Exited {
                    success: false,
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "linker error".to_string(),
                }
            } else {
                exited(true, 0)
            }
        });

        let builder = Builder::new(Arc::new(toolchain));
        let plan = plan(catalog(), 1);
        let results = builder.run_all(&plan).await;

        assert_eq!(results.len(), 7);
        let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 3);
        for result in &failed {
            assert_eq!(result.target.os, "windows");
            match &result.outcome {
                Outcome::Failed { exit_code, reason } => {
                    assert_eq!(*exit_code, Some(1));
                    assert!(reason.contains("linker error"));
                }
                Outcome::Succeeded { .. } => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn test_run_all_spawn_failure_is_per_target() {
        let mut toolchain = MockToolchain::new();
        toolchain.expect_compile().times(2).returning(|request| {
            if request.target.os == "darwin" {
                Invocation::SpawnFailed {
                    reason: "No such file or directory".to_string(),
                }
            } else {
                exited(true, 0)
            }
        });

        let targets = vec![
            Target {
                os: "darwin".into(),
                arch: "amd64".into(),
            },
            Target {
                os: "linux".into(),
                arch: "amd64".into(),
            },
        ];
        let builder = Builder::new(Arc::new(toolchain));
        let results = builder.run_all(&plan(targets, 1)).await;

        assert!(!results[0].is_success());
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn test_run_all_parallel_preserves_catalog_order() {
        let mut toolchain = MockToolchain::new();
        toolchain
            .expect_compile()
            .times(7)
            .returning(|_| exited(true, 0));

        let builder = Builder::new(Arc::new(toolchain));
        let plan = plan(catalog(), 4);
        let results = builder.run_all(&plan).await;

        assert_eq!(results.len(), 7);
        let order: Vec<String> = results.iter().map(|r| r.target.to_string()).collect();
        let expected: Vec<String> = catalog().iter().map(|t| t.to_string()).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn test_build_target_output_path_inside_output_dir() {
        let mut toolchain = MockToolchain::new();
        toolchain
            .expect_compile()
            .withf(|request| request.output_path == PathBuf::from("build/go-mcu-1.4.0-windows-386.exe"))
            .times(1)
            .returning(|_| exited(true, 0));

        let builder = Builder::new(Arc::new(toolchain));
        let target = Target {
            os: "windows".into(),
            arch: "386".into(),
        };
        let result = builder.build_target(&plan(vec![], 1), target).await;

        match result.outcome {
            Outcome::Succeeded { path } => {
                assert_eq!(path, PathBuf::from("build/go-mcu-1.4.0-windows-386.exe"));
            }
            Outcome::Failed { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn test_failure_reason_stderr_tail() {
        let stderr = "one\ntwo\nthree\nfour\nfive\nsix\nseven";
        let reason = failure_reason(Some(2), stderr);
        assert!(reason.starts_with("exit code 2: "));
        assert!(reason.contains("seven"));
        assert!(!reason.contains("one"));

        assert_eq!(failure_reason(Some(1), ""), "exit code 1");
        assert_eq!(failure_reason(None, ""), "terminated by signal");
    }
}
