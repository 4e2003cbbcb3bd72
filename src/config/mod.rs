//! Tunables for the simulation, the bus and each mode profile.
//!
//! [`DriveConfig`] is loaded by merging the JSON document onto the built-in
//! defaults, so a file only names the values it overrides and every
//! missing field keeps its own preset (a partial `sport` table stays a
//! Sport profile). Stand-alone tables deserialize with `#[serde(default)]`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::BusConfig;
use crate::error::Result;
use crate::events::{DriveMode, MetricKind, ThemeApply};
use crate::simulation::ControlLaw;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub max_speed_kmh: f32,
    /// Minimum speed delta (km/h) before `SpeedChanged` fires.
    pub speed_epsilon: f32,
    /// Minimum RPM delta before `RpmChanged` fires.
    pub rpm_epsilon: f32,
    pub idle_rpm: f32,
    pub upshift_rpm: f32,
    pub downshift_rpm: f32,
    pub upshift_min_speed: f32,
    pub downshift_max_speed: f32,
    /// Highest gear the automatic shifter selects on its own.
    pub auto_shift_top_gear: i32,
    pub reverse_speed_cap: f32,
    /// Fraction of the gap to the engine-model RPM closed per second.
    pub rpm_response: f32,
    pub fuel_capacity_l: f32,
    pub initial_fuel_l: f32,
    pub idle_fuel_lph: f32,
    /// Seed for the presentation jitter; `None` seeds from the clock.
    pub jitter_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 300.0,
            speed_epsilon: 0.1,
            rpm_epsilon: 10.0,
            idle_rpm: 800.0,
            upshift_rpm: 3000.0,
            downshift_rpm: 1500.0,
            upshift_min_speed: 20.0,
            downshift_max_speed: 80.0,
            auto_shift_top_gear: 6,
            reverse_speed_cap: 20.0,
            rpm_response: 8.0,
            fuel_capacity_l: 60.0,
            initial_fuel_l: 45.0,
            idle_fuel_lph: 0.8,
            jitter_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySpec {
    pub metrics: Vec<MetricKind>,
    pub smoothing: bool,
    pub smoothing_factor: f32,
    pub animation_ms: u32,
}

impl Default for DisplaySpec {
    fn default() -> Self {
        Self {
            metrics: vec![MetricKind::Speed, MetricKind::Rpm, MetricKind::Gear],
            smoothing: true,
            smoothing_factor: 0.2,
            animation_ms: 300,
        }
    }
}

/// Everything a mode state needs to reconfigure the vehicle and displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeProfile {
    pub control: ControlLaw,
    pub telemetry_hz: f32,
    pub theme: ThemeApply,
    pub display: DisplaySpec,
    /// Engine speed above which the mode raises a shift hint or redline
    /// warning.
    pub warning_rpm: f32,
    /// Engine speed below which the warning re-arms.
    pub warning_rearm_rpm: f32,
}

impl Default for ModeProfile {
    fn default() -> Self {
        ModeProfile::comfort()
    }
}

impl ModeProfile {
    pub fn welcome() -> Self {
        Self {
            control: ControlLaw {
                accel_rate: 0.0,
                brake_rate: 40.0,
                coast_decay: 2.0,
                top_speed: 0.0,
                throttle_level: 0.0,
                brake_level: 0.6,
            },
            telemetry_hz: 0.0,
            theme: theme("#FFFFFF", "#1E1E1E", "#00B4D8", "Welcome"),
            display: DisplaySpec {
                metrics: vec![MetricKind::Speed],
                smoothing: true,
                smoothing_factor: 0.3,
                animation_ms: 1200,
            },
            warning_rpm: f32::MAX,
            warning_rearm_rpm: f32::MAX,
        }
    }

    pub fn eco() -> Self {
        Self {
            control: ControlLaw {
                accel_rate: 15.0,
                brake_rate: 30.0,
                coast_decay: 3.0,
                top_speed: 150.0,
                throttle_level: 0.55,
                brake_level: 0.5,
            },
            telemetry_hz: 10.0,
            theme: theme("#2E7D32", "#A5D6A7", "#FFEB3B", "EcoMode"),
            display: DisplaySpec {
                metrics: vec![
                    MetricKind::Speed,
                    MetricKind::Consumption,
                    MetricKind::Range,
                    MetricKind::Efficiency,
                ],
                smoothing: true,
                smoothing_factor: 0.35,
                animation_ms: 500,
            },
            warning_rpm: 2500.0,
            warning_rearm_rpm: 2200.0,
        }
    }

    pub fn comfort() -> Self {
        Self {
            control: ControlLaw {
                accel_rate: 30.0,
                brake_rate: 45.0,
                coast_decay: 2.0,
                top_speed: 180.0,
                throttle_level: 0.75,
                brake_level: 0.6,
            },
            telemetry_hz: 20.0,
            theme: theme("#1565C0", "#90CAF9", "#FFFFFF", "ComfortMode"),
            display: DisplaySpec {
                metrics: vec![
                    MetricKind::Speed,
                    MetricKind::Rpm,
                    MetricKind::Smoothness,
                    MetricKind::Range,
                ],
                smoothing: true,
                smoothing_factor: 0.25,
                animation_ms: 350,
            },
            warning_rpm: f32::MAX,
            warning_rearm_rpm: f32::MAX,
        }
    }

    pub fn sport() -> Self {
        Self {
            control: ControlLaw {
                accel_rate: 50.0,
                brake_rate: 70.0,
                coast_decay: 1.5,
                top_speed: 200.0,
                throttle_level: 1.0,
                brake_level: 0.9,
            },
            telemetry_hz: 60.0,
            theme: theme("#C62828", "#212121", "#FF9800", "SportMode"),
            display: DisplaySpec {
                metrics: vec![
                    MetricKind::Speed,
                    MetricKind::Rpm,
                    MetricKind::Gear,
                    MetricKind::GForce,
                    MetricKind::Cornering,
                    MetricKind::LapTime,
                ],
                smoothing: false,
                smoothing_factor: 0.0,
                animation_ms: 80,
            },
            warning_rpm: 6650.0,
            warning_rearm_rpm: 6000.0,
        }
    }
}

fn theme(primary: &str, secondary: &str, accent: &str, name: &str) -> ThemeApply {
    ThemeApply {
        primary: primary.to_string(),
        secondary: secondary.to_string(),
        accent: accent.to_string(),
        name: name.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SportConfig {
    pub lap_length_km: f32,
    /// Update rate restored when Sport exits.
    pub default_update_hz: f32,
}

impl Default for SportConfig {
    fn default() -> Self {
        Self {
            lap_length_km: 1.0,
            default_update_hz: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct DriveConfig {
    pub simulation: SimulationConfig,
    pub bus: BusConfig,
    pub welcome: ModeProfile,
    pub eco: ModeProfile,
    pub comfort: ModeProfile,
    pub sport: ModeProfile,
    pub sport_session: SportConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            bus: BusConfig::default(),
            welcome: ModeProfile::welcome(),
            eco: ModeProfile::eco(),
            comfort: ModeProfile::comfort(),
            sport: ModeProfile::sport(),
            sport_session: SportConfig::default(),
        }
    }
}

/// Field-for-field mirror of [`DriveConfig`]; only ever deserialized from a
/// document that already carries every default.
#[derive(Deserialize)]
struct MergedConfig {
    simulation: SimulationConfig,
    bus: BusConfig,
    welcome: ModeProfile,
    eco: ModeProfile,
    comfort: ModeProfile,
    sport: ModeProfile,
    sport_session: SportConfig,
}

impl TryFrom<Value> for DriveConfig {
    type Error = serde_json::Error;

    fn try_from(overrides: Value) -> std::result::Result<Self, Self::Error> {
        let mut merged = serde_json::to_value(DriveConfig::default())?;
        merge_json(&mut merged, overrides);
        let MergedConfig {
            simulation,
            bus,
            welcome,
            eco,
            comfort,
            sport,
            sport_session,
        } = serde_json::from_value(merged)?;
        Ok(Self {
            simulation,
            bus,
            welcome,
            eco,
            comfort,
            sport,
            sport_session,
        })
    }
}

/// Objects merge key by key; any other value replaces the default outright.
fn merge_json(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

impl DriveConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn profile(&self, mode: DriveMode) -> &ModeProfile {
        match mode {
            DriveMode::Eco => &self.eco,
            DriveMode::Comfort => &self.comfort,
            DriveMode::Sport => &self.sport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_mode_constants() {
        let config = DriveConfig::default();
        assert_eq!(config.sport.control.accel_rate, 50.0);
        assert_eq!(config.sport.control.top_speed, 200.0);
        assert!(config.eco.control.accel_rate < config.comfort.control.accel_rate);
        assert!(config.comfort.control.accel_rate < config.sport.control.accel_rate);
        assert_eq!(config.profile(DriveMode::Eco).theme.name, "EcoMode");
        assert_eq!(config.simulation.idle_rpm, 800.0);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = DriveConfig::from_json_str(
            r#"{
                "simulation": { "initial_fuel_l": 12.5, "jitter_seed": 7 },
                "sport": { "control": { "accel_rate": 65.0 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.simulation.initial_fuel_l, 12.5);
        assert_eq!(config.simulation.jitter_seed, Some(7));
        assert_eq!(config.simulation.idle_rpm, 800.0);
        assert_eq!(config.sport.control.accel_rate, 65.0);
    }

    #[test]
    fn partial_profile_keeps_its_own_mode_preset() {
        let config =
            DriveConfig::from_json_str(r#"{ "sport": { "control": { "accel_rate": 65.0 } } }"#)
                .unwrap();
        let sport = &config.sport;
        assert_eq!(sport.control.accel_rate, 65.0);
        assert_eq!(sport.control.top_speed, 200.0);
        assert_eq!(sport.control.brake_rate, 70.0);
        assert_eq!(sport.theme.name, "SportMode");
        assert_eq!(sport.telemetry_hz, 60.0);
        assert_eq!(sport.warning_rpm, 6650.0);
        assert_eq!(config.eco, ModeProfile::eco());
    }

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(DriveConfig::from_json_str("{}").unwrap(), DriveConfig::default());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = DriveConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::DriveError::Config(_)));
    }
}
