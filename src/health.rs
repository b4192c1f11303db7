//! Health reporting for a bootstrapped environment.
//!
//! Aggregates per-service states into a single report and supports one-shot
//! readiness checks of a plan without launching anything.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::{BootstrapPlan, Criticality};
use crate::probe::{ProbeError, ReadinessProbe};
use crate::service::{RunningService, ServiceState};

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Every step is ready.
    Healthy,
    /// Only best-effort steps failed.
    Degraded,
    /// A hard step is not ready.
    Unhealthy,
}

/// Per-service entry in a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReport {
    pub name: String,
    pub state: ServiceState,
    pub criticality: Criticality,
    pub pid: Option<u32>,
    pub ready_after_ms: Option<u64>,
    pub failure: Option<String>,
}

impl From<&RunningService> for ServiceReport {
    fn from(svc: &RunningService) -> Self {
        Self {
            name: svc.name().to_string(),
            state: svc.state(),
            criticality: svc.descriptor().criticality,
            pid: svc.pid(),
            ready_after_ms: svc.ready_after().map(|d| d.as_millis() as u64),
            failure: svc.failure().map(str::to_string),
        }
    }
}

/// Summary of one bootstrap run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub state: HealthState,
    pub services: Vec<ServiceReport>,
}

impl BootstrapReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>, elapsed: Duration, services: &[RunningService]) -> Self {
        Self {
            run_id,
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            state: assess(services),
            services: services.iter().map(ServiceReport::from).collect(),
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Health of a set of services.
pub fn assess(services: &[RunningService]) -> HealthState {
    let mut degraded = false;
    for svc in services {
        if svc.state() == ServiceState::Ready {
            continue;
        }
        match svc.descriptor().criticality {
            Criticality::Hard => return HealthState::Unhealthy,
            Criticality::BestEffort => degraded = true,
        }
    }
    if degraded {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

/// Result of probing one step once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessEntry {
    pub name: String,
    pub criticality: Criticality,
    pub check: String,
    pub ready: Result<bool, ProbeError>,
}

/// Probe every step once, in plan order, without launching anything.
pub async fn check_plan<P: ReadinessProbe + ?Sized>(probe: &P, plan: &BootstrapPlan) -> Vec<ReadinessEntry> {
    let mut entries = Vec::with_capacity(plan.len());
    for step in plan.iter() {
        let ready = probe.is_ready(&step.readiness).await;
        entries.push(ReadinessEntry {
            name: step.name.clone(),
            criticality: step.criticality,
            check: step.readiness.to_string(),
            ready,
        });
    }
    entries
}

/// Health implied by a one-shot readiness check.
pub fn assess_entries(entries: &[ReadinessEntry]) -> HealthState {
    let mut degraded = false;
    for entry in entries {
        if entry.ready == Ok(true) {
            continue;
        }
        match entry.criticality {
            Criticality::Hard => return HealthState::Unhealthy,
            Criticality::BestEffort => degraded = true,
        }
    }
    if degraded {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}
