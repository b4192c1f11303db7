//! Bootstrap sequencer.
//!
//! Drives launch-then-probe for each step strictly in plan order. Step N is
//! launched only after step N-1 is ready or has been given up on as
//! best-effort. Each readiness wait is bounded by the step timeout and by the
//! cancellation token, and sleeps between probes.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::BootstrapError;
use crate::health::BootstrapReport;
use crate::launcher::{ServiceHandle, ServiceLauncher};
use crate::plan::{BootstrapPlan, ReadinessCheck, ServiceDescriptor};
use crate::probe::{ProbeError, ReadinessProbe};
use crate::service::{RunningService, ServiceState};
use crate::shutdown::ShutdownResult;
use crate::telemetry::{self, BootstrapSpan, SpanExt, StepSpan};

/// Timing knobs for the sequencer.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Default readiness bound per step; descriptors may override it.
    pub step_timeout: Duration,
    /// Sleep between probes.
    pub poll_interval: Duration,
    /// How long to wait for each service to exit during shutdown.
    pub shutdown_wait: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            shutdown_wait: Duration::from_secs(5),
        }
    }
}

enum WaitOutcome {
    Ready(Duration),
    TimedOut(Duration),
    ExitedEarly(ExitStatus),
    Cancelled,
}

/// Owns every service it launches for the lifetime of the orchestrator.
pub struct BootstrapSequencer<L, P> {
    launcher: L,
    probe: P,
    config: SequencerConfig,
    services: Vec<RunningService>,
    cancel: CancellationToken,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl<L: ServiceLauncher, P: ReadinessProbe> BootstrapSequencer<L, P> {
    pub fn new(launcher: L, probe: P, config: SequencerConfig) -> Self {
        Self {
            launcher,
            probe,
            config,
            services: Vec::new(),
            cancel: CancellationToken::new(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Cancelling this token ends any readiness wait in progress.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Services in launch order, including skipped best-effort steps.
    pub fn services(&self) -> &[RunningService] {
        &self.services
    }

    pub fn report(&self) -> BootstrapReport {
        BootstrapReport::new(self.run_id, self.started_at, self.started.elapsed(), &self.services)
    }

    /// Bring up every step of `plan`. On error, services already launched
    /// stay recorded so `shutdown` can stop them.
    pub async fn run(&mut self, plan: &BootstrapPlan) -> Result<BootstrapReport, BootstrapError> {
        self.started_at = Utc::now();
        self.started = Instant::now();

        let span = BootstrapSpan::new(self.run_id, plan.len());
        let result = self.run_steps(plan).instrument(span.clone()).await;
        span.record_result(&result);
        result?;

        let report = self.report();
        info!(run_id = %self.run_id, state = ?report.state, elapsed_ms = report.elapsed_ms, "bootstrap complete");
        Ok(report)
    }

    async fn run_steps(&mut self, plan: &BootstrapPlan) -> Result<(), BootstrapError> {
        for step in plan.iter() {
            let span = StepSpan::new(step);
            let result = self.run_step(step).instrument(span.clone()).await;
            span.record_result(&result);
            result?;
        }
        Ok(())
    }

    async fn run_step(&mut self, step: &ServiceDescriptor) -> Result<(), BootstrapError> {
        if let Some(dependency) = self.unready_dependency(step) {
            if step.is_best_effort() {
                warn!(service = %step.name, dependency = %dependency, "skipping best-effort step: dependency not ready");
                telemetry::record_step_failure(&step.name, "skipped");
                let reason = format!("skipped: dependency {} not ready", dependency);
                self.services.push(RunningService::skipped(step.clone(), reason));
                return Ok(());
            }
            return Err(BootstrapError::DependencyNotReady {
                service: step.name.clone(),
                dependency,
            });
        }

        let handle = self.launcher.launch(step)?;
        if let Some(pid) = handle.pid() {
            tracing::Span::current().record("pid", pid);
        }
        self.services.push(RunningService::launched(step.clone(), handle));
        let index = self.services.len() - 1;

        let timeout = step.timeout.unwrap_or(self.config.step_timeout);
        let outcome = wait_until_ready(
            &self.probe,
            self.services[index].handle_mut(),
            &step.readiness,
            timeout,
            self.config.poll_interval,
            &self.cancel,
        )
        .await
        .map_err(|source| BootstrapError::Probe {
            service: step.name.clone(),
            source,
        });

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.services[index].mark_failed(e.to_string());
                return Err(e);
            }
        };

        let error = match outcome {
            WaitOutcome::Ready(latency) => {
                self.services[index].mark_ready(latency);
                telemetry::record_step_ready(&step.name, latency);
                info!(service = %step.name, latency_ms = latency.as_millis() as u64, "service ready");
                return Ok(());
            }
            WaitOutcome::TimedOut(waited) => {
                telemetry::record_step_failure(&step.name, "timeout");
                BootstrapError::Timeout {
                    service: step.name.clone(),
                    check: step.readiness.to_string(),
                    waited,
                }
            }
            WaitOutcome::ExitedEarly(status) => {
                telemetry::record_step_failure(&step.name, "exited");
                BootstrapError::ExitedEarly {
                    service: step.name.clone(),
                    status: status.to_string(),
                }
            }
            WaitOutcome::Cancelled => {
                let error = BootstrapError::Cancelled {
                    service: step.name.clone(),
                };
                self.services[index].mark_failed(error.to_string());
                return Err(error);
            }
        };

        self.services[index].mark_failed(error.to_string());
        if step.is_best_effort() {
            warn!(service = %step.name, error = %error, "best-effort step failed, continuing");
            Ok(())
        } else {
            Err(error)
        }
    }

    fn unready_dependency(&self, step: &ServiceDescriptor) -> Option<String> {
        step.depends_on
            .iter()
            .find(|dep| {
                !self
                    .services
                    .iter()
                    .any(|s| s.name() == dep.as_str() && s.state() == ServiceState::Ready)
            })
            .cloned()
    }

    /// Stop every launched service in reverse launch order.
    pub async fn shutdown(&mut self) -> ShutdownResult {
        let wait = self.config.shutdown_wait;
        let mut remaining = Vec::new();

        for svc in self.services.iter_mut().rev() {
            if svc.state() == ServiceState::Stopped || !svc.was_launched() {
                continue;
            }
            let stopped = match svc.handle_mut() {
                Some(handle) => handle.stop(wait).await,
                None => true,
            };
            if stopped {
                svc.transition(ServiceState::Stopped);
                debug!(service = %svc.name(), "service stopped");
            } else {
                warn!(service = %svc.name(), wait_ms = wait.as_millis() as u64, "service did not exit in time");
                remaining.push(svc.name().to_string());
            }
        }

        if remaining.is_empty() {
            ShutdownResult::Complete
        } else {
            ShutdownResult::Timeout { remaining }
        }
    }
}

/// Poll `probe` every `interval` (at least the configured floor) until ready, the launched process exits
/// with a failure status, `timeout` elapses, or `cancel` fires.
///
/// A zero exit status is treated as a daemon that forked into the
/// background, and polling continues.
async fn wait_until_ready<P: ReadinessProbe + ?Sized>(
    probe: &P,
    mut handle: Option<&mut ServiceHandle>,
    check: &ReadinessCheck,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<WaitOutcome, ProbeError> {
    let interval = interval.max(Duration::from_millis(crate::config::MIN_POLL_INTERVAL_MS));
    let started = tokio::time::Instant::now();
    let deadline = started + timeout;

    loop {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }

        // Every probe gets at least one interval, even past the deadline.
        let probe_deadline = deadline.max(tokio::time::Instant::now() + interval);
        let ready = tokio::select! {
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            result = tokio::time::timeout_at(probe_deadline, probe.is_ready(check)) => match result {
                Ok(ready) => ready?,
                Err(_) => false,
            },
        };
        if ready {
            return Ok(WaitOutcome::Ready(started.elapsed()));
        }

        if let Some(status) = handle.as_deref_mut().and_then(ServiceHandle::try_exit_status) {
            if !status.success() {
                return Ok(WaitOutcome::ExitedEarly(status));
            }
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome::TimedOut(started.elapsed()));
        }
        let nap = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}
