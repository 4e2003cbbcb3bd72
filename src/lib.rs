//! Drive-mode vehicle dashboard core.
//!
//! A typed event bus, two capability registries, a named-state machine, a
//! vehicle simulation and the Welcome/Eco/Comfort/Sport mode states, wired
//! together by [`DriveRuntime`]. Display surfaces are bus subscribers; the
//! only message the core consumes is [`TransitionRequest`].

pub mod bus;
pub mod config;
pub mod controls;
pub mod error;
pub mod events;
pub mod logging;
pub mod machine;
pub mod metrics;
pub mod modes;
pub mod registry;
pub mod runtime;
pub mod simulation;

pub use bus::{
    BusConfig, BusStats, EventBus, HandlerError, HandlerResult, PublishReport, Subscription,
};
pub use config::{DisplaySpec, DriveConfig, ModeProfile, SimulationConfig, SportConfig};
pub use controls::{ControlPanel, ControlSignal};
pub use error::{DriveError, Result};
pub use events::{
    ComfortMetricsUpdate, DisplayConfig, DriveMode, DriveModeChanged, EcoMetricsUpdate,
    GearChanged, LapCompleted, MetricKind, PerformanceWarning, RpmChanged, Severity,
    SmoothingChanged, SpeedChanged, SportMetricsUpdate, ThemeApply, TransitionRequest,
    UpdateFrequencyChanged, WarningKind,
};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink, NullSink,
};
pub use machine::{MachineHandle, State, StateMachine};
pub use metrics::{MetricSnapshot, RuntimeMetrics};
pub use modes::{
    COMFORT_STATE, ComfortModeState, ECO_STATE, EcoModeState, MODE_STATES, ModeContext,
    ModeCoordinator, SPORT_STATE, SportModeState, SportSession, WELCOME_STATE, WelcomeState,
    is_mode_state,
};
pub use registry::{
    CapabilityEntry, CapabilityRegistry, FeatureRegistry, Features, ServiceRegistry, Services,
};
pub use runtime::audit::{
    BufferedRuntimeAudit, NullRuntimeAudit, RuntimeAudit, RuntimeAuditEvent,
    RuntimeAuditEventBuilder, RuntimeAuditStage,
};
pub use runtime::bundles::{
    DiagnosticsConfig, DiagnosticsMetricsConfig, PluginBundle, diagnostics_bundle,
};
pub use runtime::diagnostics::{MetricsSnapshotPlugin, TelemetryLoggerPlugin};
pub use runtime::{
    DrivePlugin, DriveRuntime, RuntimeConfig, RuntimeContext, ShellEvent, state_fingerprint,
};
pub use simulation::{
    ControlLaw, DriveInput, GEAR_PARK, GEAR_REVERSE, JitterSource, MAX_GEAR, SeededJitter,
    VehicleSimulation, VehicleState, ZeroJitter,
};
