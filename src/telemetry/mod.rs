//! Telemetry for the bootstrap orchestrator.
//!
//! Provides structured logging, step tracing spans and metrics hooks.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{record_harness_exit, record_step_failure, record_step_ready};
pub use spans::{BootstrapSpan, SpanExt, StepSpan};
