use std::path::Path;

use super::{deterministic_filler, write_artifact, HarnessError, HarnessExit, Operation, OperationResult, RANDOM_BYTES};

pub const DEFAULT_RANDOM_SIZE: usize = 32;
pub const MAX_RANDOM_SIZE: usize = 1024;

/// Parse a byte count. Digits only; an all-digit value that does not fit is
/// treated as too large rather than invalid.
pub fn parse_size(arg: Option<&str>) -> Result<usize, HarnessExit> {
    let Some(raw) = arg else {
        return Ok(DEFAULT_RANDOM_SIZE);
    };
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HarnessExit::InvalidSize);
    }
    let size = raw.parse::<usize>().map_err(|_| HarnessExit::SizeTooLarge)?;
    if size > MAX_RANDOM_SIZE {
        return Err(HarnessExit::SizeTooLarge);
    }
    Ok(size)
}

/// Write `size` filler bytes into `dir`.
pub fn generate_random(dir: &Path, size_arg: Option<&str>) -> Result<OperationResult, HarnessError> {
    let size = match parse_size(size_arg) {
        Ok(size) => size,
        Err(exit) => {
            let raw = size_arg.unwrap_or_default();
            let diagnostic = match exit {
                HarnessExit::SizeTooLarge => {
                    format!("size {} exceeds maximum of {} bytes", raw, MAX_RANDOM_SIZE)
                }
                _ => format!("size must be a non-negative integer, got {:?}", raw),
            };
            return Ok(OperationResult::failure(Operation::RandomBytes, exit, Vec::new(), diagnostic));
        }
    };

    let path = write_artifact(dir, RANDOM_BYTES, &deterministic_filler(size))?;
    Ok(OperationResult::success(
        Operation::RandomBytes,
        vec![path],
        format!("generated {} random bytes", size),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size(None), Ok(32));
        assert_eq!(parse_size(Some("0")), Ok(0));
        assert_eq!(parse_size(Some("1024")), Ok(1024));
        assert_eq!(parse_size(Some("1025")), Err(HarnessExit::SizeTooLarge));
        assert_eq!(parse_size(Some("99999999999999999999999")), Err(HarnessExit::SizeTooLarge));
        assert_eq!(parse_size(Some("-1")), Err(HarnessExit::InvalidSize));
        assert_eq!(parse_size(Some("abc")), Err(HarnessExit::InvalidSize));
        assert_eq!(parse_size(Some("")), Err(HarnessExit::InvalidSize));
    }
}
