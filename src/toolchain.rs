//! The external build delegate.
//!
//! One delegate invocation is the external compiler call that performs the
//! actual cross-compilation for a single target. Its exit status and
//! captured output are the only observable results; a nonzero exit (or a
//! failure to spawn at all) is data for the caller, not a control-flow
//! error.

use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::catalog::Target;

/// Everything one delegate invocation needs, owned per call.
///
/// Environment overrides travel inside the request rather than through a
/// shared mutable environment map, so concurrent invocations cannot race.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub target: Target,
    pub output_path: PathBuf,
    pub timeout: Option<Duration>,
}

/// Observable result of one delegate invocation.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// The delegate ran to completion; `code` is None when it was killed by
    /// a signal.
    Exited {
        success: bool,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The delegate could not be started (missing program, permissions).
    SpawnFailed { reason: String },
    /// The delegate exceeded the per-target timeout and was killed.
    TimedOut { after: Duration },
}

/// Trait for build delegates (useful for testing).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Run one compilation. Never fails: every outcome is an [`Invocation`].
    async fn compile(&self, request: &BuildRequest) -> Invocation;
}

/// The Go toolchain: `go build -o <path>` with `GOOS`/`GOARCH` overrides.
pub struct GoToolchain {
    program: String,
    extra_args: Vec<String>,
}

impl GoToolchain {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }
}

#[async_trait]
impl Toolchain for GoToolchain {
    #[tracing::instrument(skip(self), fields(target = %request.target))]
    async fn compile(&self, request: &BuildRequest) -> Invocation {
        let mut command = Command::new(&self.program);
        command
            .arg("build")
            .args(&self.extra_args)
            .arg("-o")
            .arg(&request.output_path)
            .env("GOOS", &request.target.os)
            .env("GOARCH", &request.target.arch)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(
            "invoking {} build for {} -> {}",
            self.program,
            request.target,
            request.output_path.display()
        );

        let output = match request.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => return Invocation::TimedOut { after: limit },
            },
            None => command.output().await,
        };

        match output {
            Ok(output) => Invocation::Exited {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => Invocation::SpawnFailed {
                reason: e.to_string(),
            },
        }
    }
}
