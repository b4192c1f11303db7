//! Step and harness metrics through the `metrics` facade.
//!
//! No exporter is installed by this crate; without a recorder every call is
//! a no-op.

use std::time::Duration;

use metrics::{counter, histogram};

/// A step reported ready after `latency`.
pub fn record_step_ready(service: &str, latency: Duration) {
    counter!("bootstrap_steps_total", "service" => service.to_string(), "outcome" => "ready")
        .increment(1);
    histogram!("bootstrap_step_ready_seconds", "service" => service.to_string())
        .record(latency.as_secs_f64());
}

/// A step ended without becoming ready. `reason` is a short label such as
/// `timeout`, `exited` or `skipped`.
pub fn record_step_failure(service: &str, reason: &'static str) {
    counter!(
        "bootstrap_steps_total",
        "service" => service.to_string(),
        "outcome" => reason
    )
    .increment(1);
}

/// A harness operation finished with `exit_code`.
pub fn record_harness_exit(operation: &str, exit_code: i32) {
    counter!(
        "harness_operations_total",
        "operation" => operation.to_string(),
        "exit_code" => exit_code.to_string()
    )
    .increment(1);
}
