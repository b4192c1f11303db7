//! Readiness probes.
//!
//! A probe answers one question: has the dependency published its readiness
//! signal yet? "Not yet" is `Ok(false)`, never an error. Only malformed
//! input is an error, and plan construction already rejects it.

mod bus;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::plan::ReadinessCheck;

pub use bus::{registered_names_contain, BusQuery};

/// Malformed readiness input. Configuration error, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("socket path is empty")]
    EmptySocketPath,

    #[error("tcp port 0 cannot signal readiness")]
    InvalidPort,

    #[error("invalid bus name {0:?}")]
    InvalidBusName(String),
}

/// Side-effect-free readiness predicate.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self, check: &ReadinessCheck) -> Result<bool, ProbeError>;
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Upper bound on a single TCP connect attempt.
    pub connect_timeout: Duration,
    /// How registered bus names are listed.
    pub bus_query: BusQuery,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(250),
            bus_query: BusQuery::default(),
        }
    }
}

/// Probe backed by the local filesystem, network stack and system bus.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    config: ProbeConfig,
}

impl SystemProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }
}

#[async_trait]
impl ReadinessProbe for SystemProbe {
    async fn is_ready(&self, check: &ReadinessCheck) -> Result<bool, ProbeError> {
        check.validate()?;
        let ready = match check {
            ReadinessCheck::SocketPath(path) => socket_exists(path).await,
            ReadinessCheck::TcpPort(port) => port_open(*port, self.config.connect_timeout).await,
            ReadinessCheck::BusName(name) => self.config.bus_query.contains(name).await,
        };
        Ok(ready)
    }
}

/// True iff a socket object (not a regular file or directory) exists.
pub async fn socket_exists(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => is_socket(&meta),
        Err(_) => false,
    }
}

#[cfg(unix)]
fn is_socket(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_socket()
}

#[cfg(not(unix))]
fn is_socket(meta: &std::fs::Metadata) -> bool {
    !meta.is_dir()
}

/// True iff a TCP connect to `localhost:<port>` completes within `timeout`.
pub async fn port_open(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(("localhost", port))).await,
        Ok(Ok(_))
    )
}
