use std::path::Path;

use tracing::{debug, warn};

use super::{
    deterministic_filler, write_artifact, HarnessError, HarnessExit, Operation, OperationResult, KEY_HANDLE,
    PERSISTENT_HANDLE, SIGNING_KEY, TEST_MODE_MARKER,
};

/// Flags accepted by provisioning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionArgs {
    pub test_mode: bool,
    pub fail: bool,
}

impl ProvisionArgs {
    /// Unknown arguments are ignored.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
        let mut parsed = Self::default();
        for arg in args {
            match arg.as_ref() {
                "--test-mode" => parsed.test_mode = true,
                "--fail" => parsed.fail = true,
                other => debug!(arg = other, "ignoring unknown provision argument"),
            }
        }
        parsed
    }
}

/// Write a signing key and handle identifier into `dir`.
///
/// `--fail` rewrites the signing key first and then fails, leaving a
/// partially provisioned directory behind.
pub fn provision(dir: &Path, args: ProvisionArgs) -> Result<OperationResult, HarnessError> {
    let key = deterministic_filler(32);
    let mut artifacts = vec![write_artifact(dir, SIGNING_KEY, &key)?];

    if args.fail {
        warn!("forced provisioning failure");
        return Ok(OperationResult::failure(
            Operation::Provision,
            HarnessExit::ForcedFailure,
            artifacts,
            "provisioning failed: forced failure requested",
        ));
    }

    artifacts.push(write_artifact(dir, KEY_HANDLE, format!("{}\n", PERSISTENT_HANDLE).as_bytes())?);
    if args.test_mode {
        artifacts.push(write_artifact(dir, TEST_MODE_MARKER, b"test mode\n")?);
    }

    Ok(OperationResult::success(
        Operation::Provision,
        artifacts,
        "provisioning completed successfully",
    ))
}
