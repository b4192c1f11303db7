//! Work handed control after a successful bootstrap.
//!
//! An optional install command runs first, then the selected workload: an
//! automated test run, an interactive shell, or nothing at all while the
//! services stay up until a shutdown signal.

use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{EnvConfig, Secret};
use crate::mode::{InstallBehavior, ModeProfile, Workload};

/// Env var the secret is exported as.
pub const SECRET_VAR: &str = "HMAC_SECRET";

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("{0} command is empty")]
    EmptyCommand(&'static str),

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("install command {command} exited with code {code}")]
    InstallFailed { command: String, code: i32 },
}

/// Everything needed to run the workload for one mode.
#[derive(Debug, Clone)]
pub struct WorkloadRunner {
    install: Option<Vec<String>>,
    workload: Workload,
    test_cmd: Vec<String>,
    shell: String,
    secret: Option<Secret>,
}

impl WorkloadRunner {
    pub fn new(workload: Workload) -> Self {
        Self {
            install: None,
            workload,
            test_cmd: Vec::new(),
            shell: crate::config::DEFAULT_SHELL.to_string(),
            secret: None,
        }
    }

    pub fn from_config(profile: &ModeProfile, config: &EnvConfig) -> Self {
        let install = match profile.install {
            InstallBehavior::InstallWithTestExtras => config.install_test_cmd.clone(),
            InstallBehavior::InstallMinimal => config.install_cmd.clone(),
        };
        Self {
            install,
            workload: profile.workload,
            test_cmd: config.test_cmd.clone(),
            shell: config.shell.clone(),
            secret: config.hmac_secret.clone(),
        }
    }

    pub fn install(mut self, command: Vec<String>) -> Self {
        self.install = Some(command);
        self
    }

    pub fn test_cmd(mut self, command: Vec<String>) -> Self {
        self.test_cmd = command;
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn workload(&self) -> Workload {
        self.workload
    }

    /// Run install then the workload. Returns the workload's exit code.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<i32, WorkloadError> {
        if let Some(install) = &self.install {
            let code = self.run_command("install", install, cancel).await?;
            if code != 0 {
                return Err(WorkloadError::InstallFailed {
                    command: install.join(" "),
                    code,
                });
            }
        }

        match self.workload {
            Workload::RunAutomatedTests => self.run_command("test", &self.test_cmd, cancel).await,
            Workload::InteractiveSession => {
                let shell = vec![self.shell.clone()];
                self.run_command("shell", &shell, cancel).await
            }
            Workload::NoOp => {
                info!("services up; waiting for shutdown signal");
                cancel.cancelled().await;
                Ok(0)
            }
        }
    }

    async fn run_command(
        &self,
        label: &'static str,
        argv: &[String],
        cancel: &CancellationToken,
    ) -> Result<i32, WorkloadError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(WorkloadError::EmptyCommand(label));
        };
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(secret) = &self.secret {
            cmd.env(SECRET_VAR, secret.expose());
        }

        info!(workload = label, command = %argv.join(" "), "starting workload command");
        let mut child = cmd.spawn().map_err(|source| WorkloadError::Spawn {
            command: program.clone(),
            source,
        })?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| WorkloadError::Spawn {
                    command: program.clone(),
                    source,
                })?;
                let code = status.code().unwrap_or(1);
                info!(workload = label, exit_code = code, "workload command finished");
                Ok(code)
            }
            _ = cancel.cancelled() => {
                warn!(workload = label, "workload interrupted");
                let _ = child.kill().await;
                Ok(130)
            }
        }
    }
}
