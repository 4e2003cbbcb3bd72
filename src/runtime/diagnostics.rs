use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;

use crate::Result;
use crate::bus::{EventBus, HandlerResult, Subscription};
use crate::events::{
    DriveModeChanged, GearChanged, LapCompleted, PerformanceWarning, RpmChanged, SpeedChanged,
    ThemeApply, UpdateFrequencyChanged,
};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::RuntimeMetrics;

use super::{DrivePlugin, RuntimeContext};

const TELEMETRY_TARGET: &str = "drive::runtime.telemetry";

/// Mirrors bus traffic into the structured log.
///
/// Mode, gear, theme, warning and lap events are logged by default; the
/// high-rate speed and RPM streams are opt-in.
pub struct TelemetryLoggerPlugin {
    logger: Logger,
    level: LogLevel,
    log_speed: bool,
    log_rpm: bool,
    bus: Option<Arc<EventBus>>,
    subscriptions: Vec<Subscription>,
}

impl TelemetryLoggerPlugin {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_speed: false,
            log_rpm: false,
            bus: None,
            subscriptions: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_speed(mut self, enabled: bool) -> Self {
        self.log_speed = enabled;
        self
    }

    pub fn log_rpm(mut self, enabled: bool) -> Self {
        self.log_rpm = enabled;
        self
    }

    fn mirror<T>(&mut self, bus: &EventBus, message: &'static str)
    where
        T: Serialize + Send + Sync + 'static,
    {
        let logger = self.logger.clone();
        let level = self.level;
        let subscription = bus.subscribe::<T, _>(move |event| -> HandlerResult {
            let payload = serde_json::to_value(event).map_err(|err| err.to_string())?;
            let _ = logger.log_event(event_with_fields(
                level,
                TELEMETRY_TARGET,
                message,
                [json_kv("event", payload)],
            ));
            Ok(())
        });
        self.subscriptions.push(subscription);
    }

    fn release(&mut self) {
        if let Some(bus) = self.bus.take() {
            for subscription in self.subscriptions.drain(..) {
                bus.unsubscribe(&subscription);
            }
        }
    }
}

impl DrivePlugin for TelemetryLoggerPlugin {
    fn name(&self) -> &str {
        "diagnostics.telemetry_logger"
    }

    fn init(&mut self, ctx: &mut RuntimeContext<'_>) -> Result<()> {
        self.release();
        let bus = ctx.service::<EventBus>()?;
        self.mirror::<DriveModeChanged>(&bus, "event.drive_mode");
        self.mirror::<GearChanged>(&bus, "event.gear");
        self.mirror::<ThemeApply>(&bus, "event.theme");
        self.mirror::<PerformanceWarning>(&bus, "event.warning");
        self.mirror::<LapCompleted>(&bus, "event.lap");
        self.mirror::<UpdateFrequencyChanged>(&bus, "event.update_frequency");
        if self.log_speed {
            self.mirror::<SpeedChanged>(&bus, "event.speed");
        }
        if self.log_rpm {
            self.mirror::<RpmChanged>(&bus, "event.rpm");
        }
        self.bus = Some(bus);

        let _ = self.logger.log_event(event_with_fields(
            self.level,
            TELEMETRY_TARGET,
            "plugin_initialized",
            [
                json_kv("subscriptions", json!(self.subscriptions.len())),
                json_kv("state", json!(ctx.current_state())),
            ],
        ));
        Ok(())
    }
}

impl Drop for TelemetryLoggerPlugin {
    fn drop(&mut self) {
        self.release();
    }
}

/// Periodically emits runtime metrics snapshots through the provided logger.
pub struct MetricsSnapshotPlugin {
    logger: Logger,
    metrics: Arc<Mutex<RuntimeMetrics>>,
    target: String,
    interval: Duration,
    last_emit: Option<Instant>,
    started_at: Instant,
}

impl MetricsSnapshotPlugin {
    pub fn new(logger: Logger, metrics: Arc<Mutex<RuntimeMetrics>>) -> Self {
        Self {
            logger,
            metrics,
            target: "drive::runtime.metrics".to_string(),
            interval: Duration::from_secs(5),
            last_emit: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn emit_snapshot(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return;
            }
        }

        self.last_emit = Some(now);
        let uptime = now.duration_since(self.started_at);

        if let Ok(guard) = self.metrics.lock() {
            let event = guard.snapshot(uptime).to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }
}

impl DrivePlugin for MetricsSnapshotPlugin {
    fn name(&self) -> &str {
        "diagnostics.metrics_snapshot"
    }

    fn init(&mut self, _ctx: &mut RuntimeContext<'_>) -> Result<()> {
        self.started_at = Instant::now();
        self.last_emit = None;
        Ok(())
    }

    fn on_tick(&mut self, _ctx: &mut RuntimeContext<'_>, _dt: f32) -> Result<()> {
        self.emit_snapshot();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::modes::ECO_STATE;
    use crate::runtime::{DriveRuntime, RuntimeConfig, ShellEvent};

    fn runtime_with(sink: &MemorySink) -> DriveRuntime {
        let mut config = RuntimeConfig::default();
        config.metrics_interval = Duration::ZERO;
        config.logger = Some(Logger::new(sink.clone()));
        DriveRuntime::boot(config).unwrap()
    }

    #[test]
    fn telemetry_logger_mirrors_mode_changes() {
        let sink = MemorySink::new();
        let mut runtime = runtime_with(&sink);
        runtime.register_plugin(TelemetryLoggerPlugin::new(Logger::new(sink.clone())));

        runtime
            .run_scripted([
                ShellEvent::Request(ECO_STATE.into()),
                ShellEvent::tick_secs(0.1),
            ])
            .unwrap();

        let modes: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.message == "event.drive_mode")
            .collect();
        assert_eq!(modes.len(), 1);
        assert_eq!(
            modes[0].field("event"),
            Some(&json!({ "mode": "Eco" }))
        );
        assert!(sink.contains_message("event.theme"));
        assert!(!sink.contains_message("event.speed"));
    }

    #[test]
    fn dropping_telemetry_logger_unsubscribes() {
        let sink = MemorySink::new();
        let mut runtime = runtime_with(&sink);
        let bus = Arc::clone(runtime.bus());
        let before = bus.subscriber_count::<GearChanged>();

        let mut plugin = TelemetryLoggerPlugin::new(Logger::new(sink.clone()));
        let services = runtime.services().clone();
        let features = runtime.features().clone();
        let mut ctx = RuntimeContext::new(&services, &features, runtime.current_state());
        plugin.init(&mut ctx).unwrap();
        assert_eq!(bus.subscriber_count::<GearChanged>(), before + 1);
        drop(plugin);
        assert_eq!(bus.subscriber_count::<GearChanged>(), before);
        runtime.step(0.1).unwrap();
    }

    #[test]
    fn metrics_plugin_emits_first_snapshot_immediately() {
        let sink = MemorySink::new();
        let mut runtime = runtime_with(&sink);
        let metrics = Arc::new(Mutex::new(RuntimeMetrics::new()));
        runtime.register_plugin(
            MetricsSnapshotPlugin::new(Logger::new(sink.clone()), metrics)
                .with_interval(Duration::from_secs(3600))
                .with_target("drive::test.metrics"),
        );
        for _ in 0..5 {
            runtime.step(0.1).unwrap();
        }
        let snapshots: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.message == "runtime_metrics")
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].target, "drive::test.metrics");
    }
}
