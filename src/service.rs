//! Launched-service records owned by the sequencer.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::launcher::ServiceHandle;
use crate::plan::ServiceDescriptor;

/// Observed lifecycle state of a launched service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Starting,
    Ready,
    Failed,
    Stopped,
}

impl ServiceState {
    /// Allowed transitions. `Stopped` is terminal.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Starting, Ready) | (Starting, Failed) | (Starting, Stopped) | (Ready, Failed) | (Ready, Stopped) | (Failed, Stopped)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.pad(s)
    }
}

/// A descriptor together with its process handle and observed state.
#[derive(Debug)]
pub struct RunningService {
    descriptor: ServiceDescriptor,
    handle: Option<ServiceHandle>,
    state: ServiceState,
    launched_at: Option<Instant>,
    ready_after: Option<Duration>,
    failure: Option<String>,
}

impl RunningService {
    pub fn launched(descriptor: ServiceDescriptor, handle: ServiceHandle) -> Self {
        Self {
            descriptor,
            handle: Some(handle),
            state: ServiceState::Starting,
            launched_at: Some(Instant::now()),
            ready_after: None,
            failure: None,
        }
    }

    /// A best-effort step that was never launched.
    pub fn skipped(descriptor: ServiceDescriptor, reason: impl Into<String>) -> Self {
        Self {
            descriptor,
            handle: None,
            state: ServiceState::Failed,
            launched_at: None,
            ready_after: None,
            failure: Some(reason.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(ServiceHandle::pid)
    }

    pub fn ready_after(&self) -> Option<Duration> {
        self.ready_after
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn was_launched(&self) -> bool {
        self.launched_at.is_some()
    }

    pub fn handle_mut(&mut self) -> Option<&mut ServiceHandle> {
        self.handle.as_mut()
    }

    /// Apply a transition; invalid transitions are ignored and reported.
    pub fn transition(&mut self, next: ServiceState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    pub fn mark_ready(&mut self, after: Duration) -> bool {
        let ok = self.transition(ServiceState::Ready);
        if ok {
            self.ready_after = Some(after);
        }
        ok
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        let ok = self.transition(ServiceState::Failed);
        if ok {
            self.failure = Some(reason.into());
        }
        ok
    }
}
