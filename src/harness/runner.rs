//! Dispatch of named operations to the mock harness or real executables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{
    generate_random, issue_certificate, provision, HarnessError, Operation, OperationResult, ProvisionArgs,
};
use crate::telemetry;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("operation {0} is not registered")]
    Unregistered(Operation),

    #[error("executable for {operation} not found at {path}")]
    Missing { operation: Operation, path: PathBuf },

    #[error("integrity check failed for {operation}: expected sha256 {expected}, found {actual}")]
    IntegrityMismatch {
        operation: Operation,
        expected: String,
        actual: String,
    },

    #[error("failed to run {operation}: {source}")]
    Io {
        operation: Operation,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Harness(#[from] HarnessError),
}

impl RunnerError {
    /// CLI exit code: refused executions are 126, missing executables 127.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Unregistered(_) | Self::IntegrityMismatch { .. } => crate::cli::EXIT_REFUSED,
            Self::Missing { .. } => crate::cli::EXIT_NOT_FOUND,
            Self::Io { .. } | Self::Harness(_) => crate::cli::EXIT_FAILURE,
        }
    }
}

#[derive(Debug, Clone)]
struct Registration {
    path: PathBuf,
    sha256: Option<String>,
}

#[derive(Debug, Clone)]
enum Backend {
    Mock,
    Real(BTreeMap<Operation, Registration>),
}

/// Runs operations by name inside a scratch directory.
#[derive(Debug, Clone)]
pub struct OperationRunner {
    scratch_dir: PathBuf,
    backend: Backend,
}

impl OperationRunner {
    /// Runner backed by the deterministic mock harness.
    pub fn mock(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            backend: Backend::Mock,
        }
    }

    /// Runner with an empty allow-list of real executables.
    pub fn real(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            backend: Backend::Real(BTreeMap::new()),
        }
    }

    /// Real runner with every operation's executable registered from `dir`,
    /// unpinned.
    pub fn from_ops_dir(scratch_dir: impl Into<PathBuf>, dir: &Path) -> Self {
        let mut runner = Self::real(scratch_dir);
        for op in Operation::ALL {
            runner.register(op, dir.join(op.executable()), None);
        }
        runner
    }

    pub fn is_mock(&self) -> bool {
        matches!(self.backend, Backend::Mock)
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Allow `operation` to run `path`, optionally pinned to a hex sha256.
    /// Has no effect on a mock runner.
    pub fn register(&mut self, operation: Operation, path: impl Into<PathBuf>, sha256: Option<&str>) {
        if let Backend::Real(registry) = &mut self.backend {
            registry.insert(
                operation,
                Registration {
                    path: path.into(),
                    sha256: sha256.map(str::to_ascii_lowercase),
                },
            );
        }
    }

    /// Check the pinned digest of a registered executable.
    pub fn verify_integrity(&self, operation: Operation) -> Result<(), RunnerError> {
        match &self.backend {
            Backend::Mock => Ok(()),
            Backend::Real(registry) => {
                let reg = registry.get(&operation).ok_or(RunnerError::Unregistered(operation))?;
                verify(operation, reg)
            }
        }
    }

    pub async fn run<S: AsRef<str>>(&self, operation: Operation, args: &[S]) -> Result<OperationResult, RunnerError> {
        let result = match &self.backend {
            Backend::Mock => self.run_mock(operation, args)?,
            Backend::Real(registry) => {
                let reg = registry.get(&operation).ok_or_else(|| {
                    error!(operation = %operation, "refusing unregistered operation");
                    RunnerError::Unregistered(operation)
                })?;
                verify(operation, reg)?;
                self.run_real(operation, reg, args).await?
            }
        };

        telemetry::record_harness_exit(operation.name(), result.exit_code);
        if result.is_success() {
            info!(operation = %operation, artifacts = result.artifacts.len(), "operation succeeded");
        } else {
            warn!(
                operation = %operation,
                exit_code = result.exit_code,
                diagnostic = result.diagnostic.as_deref().unwrap_or(""),
                "operation failed"
            );
        }
        Ok(result)
    }

    fn run_mock<S: AsRef<str>>(&self, operation: Operation, args: &[S]) -> Result<OperationResult, HarnessError> {
        let dir = &self.scratch_dir;
        match operation {
            Operation::Provision => provision(dir, ProvisionArgs::parse(args)),
            Operation::IssueCertificate => issue_certificate(dir),
            Operation::RandomBytes => generate_random(dir, args.first().map(|a| a.as_ref())),
        }
    }

    async fn run_real<S: AsRef<str>>(
        &self,
        operation: Operation,
        reg: &Registration,
        args: &[S],
    ) -> Result<OperationResult, RunnerError> {
        debug!(operation = %operation, path = %reg.path.display(), "running executable");
        let output = Command::new(&reg.path)
            .args(args.iter().map(|a| a.as_ref()))
            .current_dir(&self.scratch_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => RunnerError::Missing {
                    operation,
                    path: reg.path.clone(),
                },
                _ => RunnerError::Io { operation, source },
            })?;

        // Killed by a signal: report the shell convention of 128 + signal.
        let exit_code = output.status.code().unwrap_or_else(|| signal_exit_code(&output.status));
        let artifacts = operation
            .artifacts()
            .iter()
            .map(|name| self.scratch_dir.join(name))
            .filter(|p| p.exists())
            .collect();
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        Ok(OperationResult {
            operation,
            exit_code,
            artifacts,
            message: (exit_code == 0).then_some(stdout),
            diagnostic: (exit_code != 0).then_some(stderr),
        })
    }
}

#[cfg(unix)]
fn signal_exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|s| 128 + s).unwrap_or(1)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: &std::process::ExitStatus) -> i32 {
    1
}

fn verify(operation: Operation, reg: &Registration) -> Result<(), RunnerError> {
    let bytes = std::fs::read(&reg.path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => RunnerError::Missing {
            operation,
            path: reg.path.clone(),
        },
        _ => RunnerError::Io { operation, source },
    })?;
    let Some(expected) = &reg.sha256 else {
        return Ok(());
    };
    let actual = hex::encode(Sha256::digest(&bytes));
    if &actual != expected {
        error!(operation = %operation, expected = %expected, actual = %actual, "executable digest mismatch");
        return Err(RunnerError::IntegrityMismatch {
            operation,
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}
