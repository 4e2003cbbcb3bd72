use serde::{Deserialize, Serialize};

/// Per-mode integration constants for `speed' = clamp(speed ± rate·dt, 0, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLaw {
    /// km/h gained per second while accelerate is held.
    pub accel_rate: f32,
    /// km/h shed per second while brake is held.
    pub brake_rate: f32,
    /// km/h shed per second with neither signal held.
    pub coast_decay: f32,
    /// Speed ceiling while accelerating (km/h).
    pub top_speed: f32,
    /// Throttle position reported while accelerating, 0..=1.
    pub throttle_level: f32,
    /// Brake force reported while braking, 0..=1.
    pub brake_level: f32,
}

impl Default for ControlLaw {
    fn default() -> Self {
        Self {
            accel_rate: 30.0,
            brake_rate: 45.0,
            coast_decay: 2.0,
            top_speed: 180.0,
            throttle_level: 0.75,
            brake_level: 0.6,
        }
    }
}

/// Control signals held during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveInput {
    pub accelerate: bool,
    pub brake: bool,
}

impl DriveInput {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn accelerate() -> Self {
        Self {
            accelerate: true,
            brake: false,
        }
    }

    pub fn brake() -> Self {
        Self {
            accelerate: false,
            brake: true,
        }
    }
}
