//! Messages exchanged over the [`EventBus`](crate::bus::EventBus).
//!
//! Simulation change events and mode broadcasts flow outward to display
//! consumers; [`TransitionRequest`] is the only message the core consumes.

use serde::{Deserialize, Serialize};

/// Operating profile of the simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveMode {
    Eco,
    Comfort,
    Sport,
}

impl DriveMode {
    pub const ALL: [DriveMode; 3] = [DriveMode::Eco, DriveMode::Comfort, DriveMode::Sport];

    /// Engine speed ceiling enforced by the simulation in this mode.
    pub const fn max_rpm(self) -> f32 {
        match self {
            DriveMode::Eco => 5000.0,
            DriveMode::Comfort => 6500.0,
            DriveMode::Sport => 7000.0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            DriveMode::Eco => "eco",
            DriveMode::Comfort => "comfort",
            DriveMode::Sport => "sport",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedChanged(pub f32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RpmChanged(pub f32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GearChanged(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriveModeChanged {
    pub mode: DriveMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeApply {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub name: String,
}

/// Gauges a display surface should show for the active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Speed,
    Rpm,
    Gear,
    Consumption,
    Range,
    Efficiency,
    Smoothness,
    GForce,
    Cornering,
    LapTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayConfig {
    pub profile: String,
    pub metrics: Vec<MetricKind>,
    pub smoothing: bool,
    pub smoothing_factor: f32,
    pub animation_ms: u32,
    pub max_rpm: f32,
    pub update_hz: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EcoMetricsUpdate {
    pub consumption_l_per_100km: f32,
    pub average_consumption: f32,
    pub range_km: f32,
    pub efficiency_score: f32,
    pub throttle: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComfortMetricsUpdate {
    pub speed_kmh: f32,
    pub smoothness: f32,
    pub consumption_l_per_100km: f32,
    pub range_km: f32,
    pub trip_time_s: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SportMetricsUpdate {
    pub speed_kmh: f32,
    pub rpm: f32,
    pub gear: i32,
    pub g_force: f32,
    pub cornering_score: f32,
    pub lap_time_s: f32,
    pub session_max_speed: f32,
    pub session_max_rpm: f32,
    pub shift_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ShiftUp,
    HarshBraking,
    Redline,
    LowFuel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceWarning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LapCompleted {
    pub lap: u32,
    pub time_s: f32,
    pub max_speed: f32,
    pub max_rpm: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UpdateFrequencyChanged {
    pub hz: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmoothingChanged {
    pub enabled: bool,
}

/// Named transition request raised by the shell; consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest(pub String);

impl TransitionRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }
}
