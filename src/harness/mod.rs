//! Deterministic mock device operations.
//!
//! Each operation is a stateless command over a scratch directory with a
//! fixed exit-code contract, so workloads can exercise error paths without a
//! real device. [`OperationRunner`] dispatches operations either to these
//! mocks or to pinned real executables.

mod certificate;
mod provision;
mod random;
mod runner;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use thiserror::Error;

pub use certificate::issue_certificate;
pub use provision::{provision, ProvisionArgs};
pub use random::{generate_random, parse_size, DEFAULT_RANDOM_SIZE, MAX_RANDOM_SIZE};
pub use runner::{OperationRunner, RunnerError};

pub const SIGNING_KEY: &str = "signing_key.ctx";
pub const KEY_HANDLE: &str = "key_handle.txt";
pub const TEST_MODE_MARKER: &str = "test_mode.marker";
pub const CERTIFICATE: &str = "tpm_cert.pem";
pub const KEY_ID: &str = "key_id.txt";
pub const RANDOM_BYTES: &str = "random.bin";

/// Persistent handle the mock reports for the provisioned signing key.
pub const PERSISTENT_HANDLE: &str = "0x81010001";

/// A device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Provision,
    IssueCertificate,
    RandomBytes,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Self::Provision, Self::IssueCertificate, Self::RandomBytes];

    /// CLI name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::IssueCertificate => "cert",
            Self::RandomBytes => "random",
        }
    }

    /// Name of the real executable for this operation.
    pub fn executable(self) -> &'static str {
        match self {
            Self::Provision => "tpm_provisioning.sh",
            Self::IssueCertificate => "tpm_self_signed_cert.sh",
            Self::RandomBytes => "tpm_random_number.sh",
        }
    }

    /// Every artifact the operation may write, in write order.
    pub fn artifacts(self) -> &'static [&'static str] {
        match self {
            Self::Provision => &[SIGNING_KEY, KEY_HANDLE, TEST_MODE_MARKER],
            Self::IssueCertificate => &[CERTIFICATE, KEY_ID],
            Self::RandomBytes => &[RANDOM_BYTES],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provision" | "tpm_provision" => Ok(Self::Provision),
            "cert" | "generate_cert" => Ok(Self::IssueCertificate),
            "random" | "get_random" => Ok(Self::RandomBytes),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}

/// Exit codes of the harness contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum HarnessExit {
    Success = 0,
    ForcedFailure = 1,
    CertificateExists = 2,
    InvalidSize = 3,
    SizeTooLarge = 4,
}

impl HarnessExit {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Filesystem failure while writing an artifact. Not part of the exit-code
/// contract.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub operation: Operation,
    pub exit_code: i32,
    /// Artifacts written (or present, for real executables), in order.
    pub artifacts: Vec<PathBuf>,
    /// Stdout text on success.
    pub message: Option<String>,
    /// Stderr text on failure.
    pub diagnostic: Option<String>,
}

impl OperationResult {
    pub(crate) fn success(operation: Operation, artifacts: Vec<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            operation,
            exit_code: HarnessExit::Success.code(),
            artifacts,
            message: Some(message.into()),
            diagnostic: None,
        }
    }

    pub(crate) fn failure(
        operation: Operation,
        exit: HarnessExit,
        artifacts: Vec<PathBuf>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            exit_code: exit.code(),
            artifacts,
            message: None,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

fn write_artifact(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf, HarnessError> {
    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(|source| HarnessError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

const FILLER_SEED: u64 = 0x8101_0001;

/// `len` bytes of filler that are identical across runs.
pub fn deterministic_filler(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(FILLER_SEED);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_aliases() {
        assert_eq!("provision".parse::<Operation>().unwrap(), Operation::Provision);
        assert_eq!("tpm_provision".parse::<Operation>().unwrap(), Operation::Provision);
        assert_eq!("generate_cert".parse::<Operation>().unwrap(), Operation::IssueCertificate);
        assert_eq!("get_random".parse::<Operation>().unwrap(), Operation::RandomBytes);
        assert!("format_disk".parse::<Operation>().is_err());
    }

    #[test]
    fn test_filler_is_stable() {
        let a = deterministic_filler(64);
        assert_eq!(a.len(), 64);
        assert_eq!(a, deterministic_filler(64));
    }
}
