//! Span utilities and extension traits for bootstrap tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};
use uuid::Uuid;

use crate::plan::ServiceDescriptor;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the span covering one bootstrap run.
pub struct BootstrapSpan;

impl BootstrapSpan {
    /// Fields included:
    /// - `run_id`: Unique identifier for the run
    /// - `steps`: Number of steps in the plan
    /// - `status`, `error.message`: Filled in by `SpanExt::record_result`
    pub fn new(run_id: Uuid, steps: usize) -> Span {
        info_span!(
            "bootstrap",
            run_id = %run_id,
            steps = steps,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}

/// Factory for the span covering one plan step.
pub struct StepSpan;

impl StepSpan {
    /// Fields included:
    /// - `service`, `criticality`, `readiness`: From the descriptor
    /// - `pid`: Filled in after launch
    /// - `status`, `error.message`: Filled in by `SpanExt::record_result`
    pub fn new(descriptor: &ServiceDescriptor) -> Span {
        info_span!(
            "step",
            service = %descriptor.name,
            criticality = %descriptor.criticality,
            readiness = %descriptor.readiness,
            pid = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
