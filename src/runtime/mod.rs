use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::bus::EventBus;
use crate::config::DriveConfig;
use crate::controls::{ControlPanel, ControlSignal};
use crate::events::TransitionRequest;
use crate::logging::{event_with_fields, json_kv};
use crate::machine::MachineHandle;
use crate::modes::{ModeContext, ModeCoordinator};
use crate::registry::{FeatureRegistry, ServiceRegistry};
use crate::simulation::{VehicleSimulation, VehicleState};
use crate::{LogLevel, Logger, Result, RuntimeMetrics};

pub mod audit;
pub mod bundles;
pub mod diagnostics;

use audit::{NullRuntimeAudit, RuntimeAudit, RuntimeAuditEventBuilder, RuntimeAuditStage};

const TARGET: &str = "drive::runtime";

/// Configuration knobs for the drive loop.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Interval between ticks when driven by [`DriveRuntime::run`].
    pub tick_interval: Duration,
    /// Optional structured logger shared with the bus, machine and modes.
    pub logger: Option<Logger>,
    /// Metrics accumulator used for periodic snapshots.
    pub metrics: Option<Arc<Mutex<RuntimeMetrics>>>,
    /// Interval between metrics snapshot emissions. Zero disables snapshots.
    pub metrics_interval: Duration,
    /// Target field used when emitting metrics snapshots.
    pub metrics_target: String,
    /// Log the vehicle snapshot whenever its content changes.
    pub log_state_snapshots: bool,
    pub drive: DriveConfig,
    pub audit: Arc<dyn RuntimeAudit>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_micros(16_667),
            logger: None,
            metrics: None,
            metrics_interval: Duration::from_secs(5),
            metrics_target: "drive::runtime.metrics".to_string(),
            log_state_snapshots: false,
            drive: DriveConfig::default(),
            audit: Arc::new(NullRuntimeAudit),
        }
    }
}

impl RuntimeConfig {
    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(RuntimeMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<RuntimeMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Input delivered by a shell (terminal, socket, script).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Tick { elapsed: Duration },
    Press(ControlSignal),
    Release(ControlSignal),
    Request(String),
    Quit,
}

impl ShellEvent {
    pub fn tick_secs(seconds: f32) -> Self {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        ShellEvent::Tick {
            elapsed: Duration::from_secs_f32(seconds),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ShellEvent::Tick { .. } => "tick",
            ShellEvent::Press(_) => "press",
            ShellEvent::Release(_) => "release",
            ShellEvent::Request(_) => "request",
            ShellEvent::Quit => "quit",
        }
    }
}

/// Context passed to plugins: the capability registries plus the active
/// state name.
pub struct RuntimeContext<'a> {
    services: &'a ServiceRegistry,
    features: &'a FeatureRegistry,
    current_state: Option<&'a str>,
    exit_requested: bool,
}

impl<'a> RuntimeContext<'a> {
    fn new(
        services: &'a ServiceRegistry,
        features: &'a FeatureRegistry,
        current_state: Option<&'a str>,
    ) -> Self {
        Self {
            services,
            features,
            current_state,
            exit_requested: false,
        }
    }

    pub fn services(&self) -> &ServiceRegistry {
        self.services
    }

    pub fn features(&self) -> &FeatureRegistry {
        self.features
    }

    pub fn service<T>(&self) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.services.get::<T>()
    }

    pub fn feature<T>(&self) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.features.get::<T>()
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current_state
    }

    /// Signal that the runtime should stop after the current tick.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }
}

/// Behaviour injection point for the runtime.
pub trait DrivePlugin: Send {
    fn name(&self) -> &str {
        "drive_plugin"
    }

    fn init(&mut self, _ctx: &mut RuntimeContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_tick(&mut self, _ctx: &mut RuntimeContext<'_>, _dt: f32) -> Result<()> {
        Ok(())
    }
}

/// Composition root: builds the bus, registries, simulation and mode
/// coordinator, then drives them from shell events.
pub struct DriveRuntime {
    services: ServiceRegistry,
    features: FeatureRegistry,
    coordinator: ModeCoordinator,
    bus: Arc<EventBus>,
    simulation: Arc<VehicleSimulation>,
    controls: ControlPanel,
    plugins: Vec<Box<dyn DrivePlugin>>,
    initialized_plugins: usize,
    config: RuntimeConfig,
    should_exit: bool,
    start_instant: Instant,
    last_metrics_emit: Option<Instant>,
    last_fingerprint: Option<blake3::Hash>,
}

impl DriveRuntime {
    /// Build every component, register the capabilities and enter Welcome.
    pub fn boot(mut config: RuntimeConfig) -> Result<Self> {
        if config.metrics.is_none() && !config.metrics_interval.is_zero() {
            config.enable_metrics();
        }

        let mut bus = EventBus::with_config(config.drive.bus);
        if let Some(logger) = config.logger.clone() {
            bus = bus.with_logger(logger);
        }
        let bus = Arc::new(bus);
        let simulation = Arc::new(VehicleSimulation::new(
            config.drive.simulation.clone(),
            Arc::clone(&bus),
        ));

        let services = ServiceRegistry::new();
        let features = FeatureRegistry::new();
        services.register_arc(Arc::clone(&bus))?;
        services.register_arc(Arc::clone(&simulation))?;
        features.register(MachineHandle::new())?;
        features.register(ControlPanel::new())?;
        audit_registered(&config, &services, "services")?;
        audit_registered(&config, &features, "features")?;

        // Resolve everything once so a missing registration fails here.
        let bus = services.get::<EventBus>()?;
        let simulation = services.get::<VehicleSimulation>()?;
        let machine = features.get::<MachineHandle>()?.as_ref().clone();
        let controls = features.get::<ControlPanel>()?.as_ref().clone();

        let context = ModeContext::new(
            Arc::clone(&simulation),
            Arc::clone(&bus),
            controls.clone(),
            Arc::new(config.drive.clone()),
        )
        .with_machine(machine)
        .with_logger(config.logger.clone());
        let coordinator = ModeCoordinator::new(context);

        let now = Instant::now();
        let mut runtime = Self {
            services,
            features,
            coordinator,
            bus,
            simulation,
            controls,
            plugins: Vec::new(),
            initialized_plugins: 0,
            config,
            should_exit: false,
            start_instant: now,
            last_metrics_emit: Some(now),
            last_fingerprint: None,
        };
        runtime.audit(RuntimeAuditStage::RuntimeConstructed, std::iter::empty());

        runtime.coordinator.boot()?;
        runtime.audit(
            RuntimeAuditStage::Booted,
            [json_kv("state", json!(runtime.current_state()))],
        );
        runtime.log_runtime_event(
            LogLevel::Info,
            "runtime_booted",
            [json_kv("state", json!(runtime.current_state()))],
        );
        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn simulation(&self) -> &Arc<VehicleSimulation> {
        &self.simulation
    }

    pub fn controls(&self) -> &ControlPanel {
        &self.controls
    }

    pub fn coordinator(&self) -> &ModeCoordinator {
        &self.coordinator
    }

    pub fn current_state(&self) -> Option<&str> {
        self.coordinator.current()
    }

    pub fn is_exit_requested(&self) -> bool {
        self.should_exit
    }

    pub fn register_plugin<P>(&mut self, plugin: P)
    where
        P: DrivePlugin + 'static,
    {
        self.register_boxed(Box::new(plugin));
    }

    pub(crate) fn register_boxed(&mut self, plugin: Box<dyn DrivePlugin>) {
        self.audit(
            RuntimeAuditStage::PluginRegistered,
            [json_kv("plugin", json!(plugin.name()))],
        );
        self.plugins.push(plugin);
    }

    /// Advance the whole system by `dt` seconds: active mode tick, at most
    /// one transition, then plugin hooks.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        self.init_pending_plugins()?;

        let entered = self.coordinator.tick(dt)?;
        if let Some(state) = entered.as_deref() {
            self.record_metric(|metrics| metrics.record_transition());
            self.audit(
                RuntimeAuditStage::TransitionApplied,
                [json_kv("to", json!(state))],
            );
            self.log_runtime_event(
                LogLevel::Info,
                "transition_applied",
                [json_kv("to", json!(state))],
            );
        }

        for idx in 0..self.plugins.len() {
            let exit_requested = {
                let plugin = &mut self.plugins[idx];
                let mut ctx =
                    RuntimeContext::new(&self.services, &self.features, self.coordinator.current());
                plugin.on_tick(&mut ctx, dt)?;
                ctx.exit_requested
            };
            if exit_requested {
                self.should_exit = true;
                self.log_runtime_event(
                    LogLevel::Info,
                    "exit_requested",
                    [json_kv("plugin", json!(self.plugins[idx].name()))],
                );
            }
        }

        let stats = self.bus.stats();
        self.record_metric(|metrics| {
            metrics.record_tick(dt);
            metrics.record_bus(stats);
        });
        self.audit(RuntimeAuditStage::TickDispatched, [json_kv("dt", json!(dt))]);
        self.log_state_snapshot()?;
        self.maybe_emit_metrics();
        Ok(())
    }

    /// Apply one shell event. Discrete requests travel over the bus so every
    /// source of `TransitionRequest` takes the same path.
    pub fn apply(&mut self, event: ShellEvent) -> Result<()> {
        let kind = event.describe();
        match event {
            ShellEvent::Tick { elapsed } => self.step(elapsed.as_secs_f32())?,
            ShellEvent::Press(signal) => self.controls.set_held(signal, true),
            ShellEvent::Release(signal) => self.controls.set_held(signal, false),
            ShellEvent::Request(target) => {
                self.bus.publish(TransitionRequest::new(target));
            }
            ShellEvent::Quit => self.should_exit = true,
        }
        self.record_metric(|metrics| metrics.record_shell_event());
        if kind != "tick" {
            self.audit(
                RuntimeAuditStage::ShellEventApplied,
                [json_kv("event", json!(kind))],
            );
            self.log_runtime_event(
                LogLevel::Debug,
                "shell_event",
                [json_kv("event", json!(kind))],
            );
        }
        Ok(())
    }

    pub fn run_scripted<I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = ShellEvent>,
    {
        self.init_pending_plugins()?;
        for event in events {
            self.apply(event)?;
            if self.should_exit {
                break;
            }
        }
        self.finalize();
        Ok(())
    }

    /// Real-time loop: ticks every `tick_interval` and applies shell events
    /// as they arrive. Stops on `Quit` or when the sender hangs up.
    pub fn run(&mut self, events: &Receiver<ShellEvent>) -> Result<()> {
        self.init_pending_plugins()?;
        let mut last_tick = Instant::now();

        while !self.should_exit {
            let timeout = self
                .config
                .tick_interval
                .checked_sub(last_tick.elapsed())
                .unwrap_or_default();

            match events.recv_timeout(timeout) {
                Ok(event) => self.apply(event)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.should_exit = true,
            }
            if self.should_exit {
                break;
            }

            if last_tick.elapsed() >= self.config.tick_interval {
                let now = Instant::now();
                let elapsed = now.duration_since(last_tick);
                last_tick = now;
                self.step(elapsed.as_secs_f32())?;
            }
        }

        self.finalize();
        Ok(())
    }

    fn init_pending_plugins(&mut self) -> Result<()> {
        while self.initialized_plugins < self.plugins.len() {
            let idx = self.initialized_plugins;
            let plugin_name = {
                let plugin = &mut self.plugins[idx];
                let mut ctx =
                    RuntimeContext::new(&self.services, &self.features, self.coordinator.current());
                plugin.init(&mut ctx)?;
                plugin.name().to_string()
            };
            self.initialized_plugins += 1;
            self.audit(
                RuntimeAuditStage::PluginInitialized,
                [json_kv("plugin", json!(plugin_name))],
            );
            self.log_runtime_event(
                LogLevel::Debug,
                "plugin_initialized",
                [json_kv("plugin", json!(plugin_name))],
            );
        }
        Ok(())
    }

    fn finalize(&mut self) {
        let uptime_ms = self.start_instant.elapsed().as_millis() as u64;
        self.audit(
            RuntimeAuditStage::RuntimeStopped,
            [json_kv("uptime_ms", json!(uptime_ms))],
        );
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_stopped",
            [
                json_kv("uptime_ms", json!(uptime_ms)),
                json_kv("state", json!(self.current_state())),
            ],
        );
    }

    /// Log the vehicle snapshot when its serialized form differs from the
    /// last one logged.
    fn log_state_snapshot(&mut self) -> Result<()> {
        if !self.config.log_state_snapshots || self.config.logger.is_none() {
            return Ok(());
        }
        let snapshot = self.simulation.snapshot();
        let fingerprint = state_fingerprint(&snapshot)?;
        if self.last_fingerprint == Some(fingerprint) {
            return Ok(());
        }
        self.last_fingerprint = Some(fingerprint);
        self.log_runtime_event(
            LogLevel::Debug,
            "vehicle_state",
            [
                json_kv("state", serde_json::to_value(&snapshot)?),
                json_kv("fingerprint", json!(fingerprint.to_hex().to_string())),
            ],
        );
        Ok(())
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, TARGET, message, fields);
            let _ = logger.log_event(event);
        }
    }

    fn audit<I>(&self, stage: RuntimeAuditStage, details: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let mut builder = RuntimeAuditEventBuilder::new(stage);
        for (key, value) in details {
            builder.detail(key, value);
        }
        self.config.audit.record(builder.finish());
    }

    fn record_metric(&self, update: impl FnOnce(&mut RuntimeMetrics)) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut guard);
            }
        }
    }

    fn maybe_emit_metrics(&mut self) {
        if self.config.metrics.is_none() || self.config.metrics_interval.is_zero() {
            return;
        }

        let now = Instant::now();
        match self.last_metrics_emit {
            Some(last) if now.duration_since(last) < self.config.metrics_interval => {
                return;
            }
            _ => {
                self.last_metrics_emit = Some(now);
            }
        }

        let uptime = now.duration_since(self.start_instant);
        if let (Some(logger), Some(metrics)) =
            (self.config.logger.as_ref(), self.config.metrics.as_ref())
        {
            if let Ok(guard) = metrics.lock() {
                let target = self.config.metrics_target.as_str();
                let _ = logger.log_event(guard.snapshot(uptime).to_log_event(target));
            }
        }
    }
}

/// Content hash of the serialized vehicle snapshot.
pub fn state_fingerprint(state: &VehicleState) -> Result<blake3::Hash> {
    let bytes = serde_json::to_vec(state)?;
    Ok(blake3::hash(&bytes))
}

fn audit_registered<Scope>(
    config: &RuntimeConfig,
    registry: &crate::registry::CapabilityRegistry<Scope>,
    namespace: &str,
) -> Result<()> {
    for entry in registry.list_all()? {
        let mut builder = RuntimeAuditEventBuilder::new(RuntimeAuditStage::CapabilityRegistered);
        builder
            .detail("namespace", json!(namespace))
            .detail("type", json!(entry.type_name));
        config.audit.record(builder.finish());
    }
    Ok(())
}
