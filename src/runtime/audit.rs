//! Runtime lifecycle audit hooks.
//!
//! Records capture a stage identifier plus structured metadata so callers can
//! log, buffer or assert on the runtime's progression without touching the
//! drive loop itself.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde_json::Value;

/// Distinct lifecycle checkpoints emitted by `DriveRuntime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeAuditStage {
    /// Bus, registries and simulation were built.
    RuntimeConstructed,
    /// A capability landed in the service or feature registry.
    CapabilityRegistered,
    /// A plugin was registered with the runtime.
    PluginRegistered,
    /// A plugin finished initialising.
    PluginInitialized,
    /// The Welcome state was entered.
    Booted,
    /// A shell event was applied to the controls.
    ShellEventApplied,
    TickDispatched,
    /// The active mode state changed.
    TransitionApplied,
    RuntimeStopped,
}

#[derive(Debug, Clone)]
pub struct RuntimeAuditEvent {
    pub timestamp: SystemTime,
    pub stage: RuntimeAuditStage,
    pub details: Vec<(String, Value)>,
}

impl RuntimeAuditEvent {
    fn new(stage: RuntimeAuditStage) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stage,
            details: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

/// Builder helper to append fields ergonomically.
pub struct RuntimeAuditEventBuilder {
    event: RuntimeAuditEvent,
}

impl RuntimeAuditEventBuilder {
    pub fn new(stage: RuntimeAuditStage) -> Self {
        Self {
            event: RuntimeAuditEvent::new(stage),
        }
    }

    pub fn detail(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> RuntimeAuditEvent {
        self.event
    }
}

pub trait RuntimeAudit: Send + Sync {
    fn record(&self, event: RuntimeAuditEvent);
}

/// Default no-op implementation used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullRuntimeAudit;

impl RuntimeAudit for NullRuntimeAudit {
    fn record(&self, _event: RuntimeAuditEvent) {}
}

/// Keeps every record in memory; clones share the buffer.
#[derive(Debug, Default, Clone)]
pub struct BufferedRuntimeAudit {
    events: Arc<Mutex<Vec<RuntimeAuditEvent>>>,
}

impl BufferedRuntimeAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RuntimeAuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stages(&self) -> Vec<RuntimeAuditStage> {
        self.events().into_iter().map(|event| event.stage).collect()
    }

    pub fn count(&self, stage: RuntimeAuditStage) -> usize {
        self.events()
            .iter()
            .filter(|event| event.stage == stage)
            .count()
    }
}

impl RuntimeAudit for BufferedRuntimeAudit {
    fn record(&self, event: RuntimeAuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
