//! Service process launching.
//!
//! Launching only starts the process and records its identity; it never
//! waits for the service's own startup. Readiness is the probe's job.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::plan::ServiceDescriptor;

/// The start directive could not be executed. Always fatal.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start {service}: {command} not found")]
    NotFound { service: String, command: String },

    #[error("failed to start {service}: permission denied executing {command}")]
    PermissionDenied { service: String, command: String },

    #[error("failed to start {service}: {source}")]
    Spawn {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path} for {service}: {source}")]
    LogFile {
        service: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    pub fn service(&self) -> &str {
        match self {
            Self::NotFound { service, .. }
            | Self::PermissionDenied { service, .. }
            | Self::Spawn { service, .. }
            | Self::LogFile { service, .. } => service,
        }
    }
}

/// Handle to a launched service process.
#[derive(Debug)]
pub struct ServiceHandle {
    pid: Option<u32>,
    child: Option<Child>,
}

impl ServiceHandle {
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
        }
    }

    /// A handle with no child to supervise, for services started elsewhere.
    pub fn detached(pid: Option<u32>) -> Self {
        Self { pid, child: None }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the process has already exited. Never blocks.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    /// Ask the process to terminate and wait up to `wait` for it to exit,
    /// then kill it and wait up to `wait` again. Returns true once the
    /// process is known to be gone.
    pub async fn stop(&mut self, wait: Duration) -> bool {
        let Some(child) = self.child.as_mut() else {
            return true;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return true;
        }
        if terminate(child) {
            if let Ok(Ok(_)) = tokio::time::timeout(wait, child.wait()).await {
                return true;
            }
            debug!(pid = ?self.pid, "no exit after SIGTERM, killing");
        }
        if child.start_kill().is_err() {
            // Already reaped between try_wait and kill.
            return matches!(child.try_wait(), Ok(Some(_)));
        }
        matches!(tokio::time::timeout(wait, child.wait()).await, Ok(Ok(_)))
    }
}

#[cfg(unix)]
fn terminate(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return false;
    };
    kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn terminate(_child: &Child) -> bool {
    false
}

/// Starts service processes.
pub trait ServiceLauncher: Send + Sync {
    fn launch(&self, descriptor: &ServiceDescriptor) -> Result<ServiceHandle, LaunchError>;
}

/// Launcher backed by `tokio::process`.
///
/// Children are killed when their handle drops, so services never outlive
/// the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    log_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append each service's stdout and stderr to `<dir>/<name>.log`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn output_for(&self, service: &str) -> Result<(Stdio, Stdio), LaunchError> {
        let Some(dir) = &self.log_dir else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        let path = dir.join(format!("{}.log", service));
        let open = |path: &Path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LaunchError::LogFile {
                    service: service.to_string(),
                    path: path.to_path_buf(),
                    source,
                })
        };
        let stdout = open(&path)?;
        let stderr = stdout.try_clone().map_err(|source| LaunchError::LogFile {
            service: service.to_string(),
            path: path.clone(),
            source,
        })?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }
}

impl ServiceLauncher for ProcessLauncher {
    fn launch(&self, descriptor: &ServiceDescriptor) -> Result<ServiceHandle, LaunchError> {
        let start = &descriptor.start;
        let (stdout, stderr) = self.output_for(&descriptor.name)?;

        let mut cmd = Command::new(&start.command);
        cmd.args(&start.args)
            .envs(&start.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Some(cwd) = &start.cwd {
            cmd.current_dir(cwd);
        }

        debug!(service = %descriptor.name, command = %start, "spawning service");
        let child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => LaunchError::NotFound {
                service: descriptor.name.clone(),
                command: start.command.clone(),
            },
            ErrorKind::PermissionDenied => LaunchError::PermissionDenied {
                service: descriptor.name.clone(),
                command: start.command.clone(),
            },
            _ => LaunchError::Spawn {
                service: descriptor.name.clone(),
                source: e,
            },
        })?;

        let handle = ServiceHandle::from_child(child);
        info!(service = %descriptor.name, pid = ?handle.pid(), "service launched");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ReadinessCheck;

    fn descriptor(command: &str, args: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor::new("svc", command, ReadinessCheck::TcpPort(1)).args(args.iter().copied())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_returns_without_waiting() {
        let launcher = ProcessLauncher::new();
        let started = std::time::Instant::now();
        let mut handle = launcher.launch(&descriptor("sleep", &["5"])).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(handle.pid().is_some());
        assert!(handle.try_exit_status().is_none());
        assert!(handle.stop(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let launcher = ProcessLauncher::new();
        let err = launcher
            .launch(&descriptor("nonexistent_service_binary_12345", &[]))
            .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
        assert_eq!(err.service(), "svc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_executable_file_is_permission_denied() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let err = ProcessLauncher::new().launch(&descriptor(&path, &[])).unwrap_err();
        assert!(matches!(err, LaunchError::PermissionDenied { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_goes_to_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::new().with_log_dir(dir.path());
        let mut handle = launcher
            .launch(&descriptor("sh", &["-c", "echo hello-from-service"]))
            .unwrap();
        for _ in 0..50 {
            if handle.try_exit_status().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let log = std::fs::read_to_string(dir.path().join("svc.log")).unwrap();
        assert!(log.contains("hello-from-service"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_sends_sigterm_first() {
        use std::os::unix::process::ExitStatusExt;

        let mut handle = ProcessLauncher::new().launch(&descriptor("sleep", &["30"])).unwrap();
        assert!(handle.stop(Duration::from_secs(5)).await);
        let status = handle.try_exit_status().unwrap();
        assert_eq!(status.signal(), Some(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_when_sigterm_is_ignored() {
        use std::os::unix::process::ExitStatusExt;

        let mut handle = ProcessLauncher::new()
            .launch(&descriptor("sh", &["-c", "trap '' TERM; while :; do sleep 0.05; done"]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        assert!(handle.stop(Duration::from_millis(300)).await);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(handle.try_exit_status().unwrap().signal(), Some(9));
    }

    #[tokio::test]
    async fn test_detached_handle_stops_trivially() {
        let mut handle = ServiceHandle::detached(Some(42));
        assert_eq!(handle.pid(), Some(42));
        assert!(handle.try_exit_status().is_none());
        assert!(handle.stop(Duration::from_millis(10)).await);
    }
}
