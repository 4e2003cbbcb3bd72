use crate::bus::BusStats;
use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct RuntimeMetrics {
    ticks: u64,
    shell_events: u64,
    transitions: u64,
    published: u64,
    handler_failures: u64,
    sim_seconds: f64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&mut self, dt: f32) {
        self.ticks = self.ticks.saturating_add(1);
        if dt.is_finite() && dt > 0.0 {
            self.sim_seconds += f64::from(dt);
        }
    }

    pub fn record_shell_event(&mut self) {
        self.shell_events = self.shell_events.saturating_add(1);
    }

    pub fn record_transition(&mut self) {
        self.transitions = self.transitions.saturating_add(1);
    }

    /// Mirror the bus counters; they are cumulative, so this overwrites.
    pub fn record_bus(&mut self, stats: BusStats) {
        self.published = stats.published;
        self.handler_failures = stats.failed;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            ticks: self.ticks,
            shell_events: self.shell_events,
            transitions: self.transitions,
            published: self.published,
            handler_failures: self.handler_failures,
            sim_seconds: self.sim_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub ticks: u64,
    pub shell_events: u64,
    pub transitions: u64,
    pub published: u64,
    pub handler_failures: u64,
    pub sim_seconds: f64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target.to_string(),
            "runtime_metrics".to_string(),
            self.as_fields(),
        )
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("ticks".to_string(), json!(self.ticks));
        map.insert("shell_events".to_string(), json!(self.shell_events));
        map.insert("transitions".to_string(), json!(self.transitions));
        map.insert("published".to_string(), json!(self.published));
        map.insert("handler_failures".to_string(), json!(self.handler_failures));
        map.insert("sim_seconds".to_string(), json!(self.sim_seconds));
        map
    }
}

pub fn snapshot_event(snapshot: &MetricSnapshot, target: &str) -> LogEvent {
    snapshot.to_log_event(target)
}
