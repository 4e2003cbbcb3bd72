use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::logging::{LogLevel, Logger};
use crate::metrics::RuntimeMetrics;

use super::diagnostics::{MetricsSnapshotPlugin, TelemetryLoggerPlugin};
use super::{DrivePlugin, DriveRuntime};

/// Ordered set of plugins registered in one go. Lower priorities run first.
#[derive(Default)]
pub struct PluginBundle {
    entries: Vec<(i32, Box<dyn DrivePlugin>)>,
}

impl PluginBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin<P>(mut self, plugin: P, priority: i32) -> Self
    where
        P: DrivePlugin + 'static,
    {
        self.entries.push((priority, Box::new(plugin)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register_into(mut self, runtime: &mut DriveRuntime) {
        // Stable sort keeps insertion order within a priority.
        self.entries.sort_by_key(|(priority, _)| *priority);
        for (_, plugin) in self.entries {
            runtime.register_boxed(plugin);
        }
    }
}

#[derive(Clone)]
pub struct DiagnosticsConfig {
    pub logger: Logger,
    pub level: LogLevel,
    pub telemetry_priority: i32,
    pub log_speed: bool,
    pub log_rpm: bool,
    pub metrics: Option<DiagnosticsMetricsConfig>,
}

impl DiagnosticsConfig {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            telemetry_priority: -100,
            log_speed: false,
            log_rpm: false,
            metrics: None,
        }
    }
}

#[derive(Clone)]
pub struct DiagnosticsMetricsConfig {
    pub metrics: Arc<Mutex<RuntimeMetrics>>,
    pub interval: Duration,
    pub target: String,
    pub priority: i32,
}

/// Telemetry logger plus, when configured, periodic metrics snapshots.
pub fn diagnostics_bundle(config: DiagnosticsConfig) -> PluginBundle {
    let telemetry = TelemetryLoggerPlugin::new(config.logger.clone())
        .with_level(config.level)
        .log_speed(config.log_speed)
        .log_rpm(config.log_rpm);
    let mut bundle = PluginBundle::new().with_plugin(telemetry, config.telemetry_priority);

    if let Some(metrics_cfg) = config.metrics {
        let plugin = MetricsSnapshotPlugin::new(config.logger.clone(), metrics_cfg.metrics)
            .with_interval(metrics_cfg.interval)
            .with_target(metrics_cfg.target);
        bundle = bundle.with_plugin(plugin, metrics_cfg.priority);
    }

    bundle
}
