//! Bus-name registration lookup.
//!
//! Names are listed by running an external query command and scanning its
//! output. A query that cannot run, times out or exits non-zero means the
//! bus is not up yet.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::trace;

/// External command that prints the bus's registered names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusQuery {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for BusQuery {
    fn default() -> Self {
        Self {
            program: "dbus-send".to_string(),
            args: [
                "--system",
                "--dest=org.freedesktop.DBus",
                "--type=method_call",
                "--print-reply",
                "/org/freedesktop/DBus",
                "org.freedesktop.DBus.ListNames",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeout: Duration::from_secs(2),
        }
    }
}

impl BusQuery {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Run the query; `None` when the listing is unavailable.
    pub async fn list(&self) -> Option<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                trace!(program = %self.program, error = %e, "bus query could not run");
                return None;
            }
            Err(_) => {
                trace!(program = %self.program, "bus query timed out");
                return None;
            }
        };

        if !output.status.success() {
            trace!(program = %self.program, status = %output.status, "bus query failed");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn contains(&self, name: &str) -> bool {
        match self.list().await {
            Some(listing) => registered_names_contain(&listing, name),
            None => false,
        }
    }
}

/// Whole-token match, so `com.example.Foo` does not match
/// `com.example.FooBar`. Handles both `dbus-send --print-reply` output
/// (`string "name"`) and one-name-per-line listings.
pub fn registered_names_contain(listing: &str, name: &str) -> bool {
    listing
        .split(|c: char| c.is_whitespace() || c == '"')
        .any(|token| token == name)
}
