use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::{
    deterministic_filler, write_artifact, HarnessError, HarnessExit, Operation, OperationResult, CERTIFICATE, KEY_ID,
};

const SUBJECT: &str = "CN=hsm-simulator,O=Test Environment";

fn certificate_body() -> String {
    let der = deterministic_filler(96);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in hex::encode(der).as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    format!("# subject: {}\n{}", SUBJECT, pem)
}

/// Issue a self-signed certificate into `dir`. Refuses with exit 2 when one
/// already exists; the existing file is never touched.
pub fn issue_certificate(dir: &Path) -> Result<OperationResult, HarnessError> {
    let path = dir.join(CERTIFICATE);
    let body = certificate_body();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Ok(OperationResult::failure(
                Operation::IssueCertificate,
                HarnessExit::CertificateExists,
                Vec::new(),
                format!("certificate already exists at {}", path.display()),
            ));
        }
        Err(source) => return Err(HarnessError::Io { path, source }),
    };
    file.write_all(body.as_bytes())
        .map_err(|source| HarnessError::Io {
            path: path.clone(),
            source,
        })?;

    let key_id = hex::encode(Sha256::digest(body.as_bytes()));
    let key_id_path = write_artifact(dir, KEY_ID, format!("{}\n", key_id).as_bytes())?;

    Ok(OperationResult::success(
        Operation::IssueCertificate,
        vec![path, key_id_path],
        format!("certificate issued, key id {}", key_id),
    ))
}
