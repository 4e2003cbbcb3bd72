use serde_json::json;

use crate::error::Result;
use crate::events::{
    ComfortMetricsUpdate, DriveMode, PerformanceWarning, Severity, SmoothingChanged, WarningKind,
};
use crate::logging::{LogLevel, json_kv};
use crate::machine::State;

use super::shared::{Cadence, FuelWatch, announce, drive, route_transition};
use super::{COMFORT_STATE, ModeContext};

const TARGET: &str = "drive::modes.comfort";

/// Deceleration (km/h per second) the comfort profile reports as harsh.
const HARSH_DECEL: f32 = 40.0;

pub struct ComfortModeState {
    ctx: ModeContext,
    cadence: Cadence,
    fuel: FuelWatch,
    harsh_armed: bool,
}

impl ComfortModeState {
    pub fn new(ctx: ModeContext) -> Self {
        let cadence = Cadence::new(ctx.config.comfort.telemetry_hz);
        Self {
            ctx,
            cadence,
            fuel: FuelWatch::default(),
            harsh_armed: true,
        }
    }

    fn check_braking(&mut self) {
        let decel = -self.ctx.simulation.acceleration();
        if decel < HARSH_DECEL / 2.0 {
            self.harsh_armed = true;
            return;
        }
        if decel >= HARSH_DECEL && self.harsh_armed {
            self.harsh_armed = false;
            self.ctx.bus.publish(PerformanceWarning {
                kind: WarningKind::HarshBraking,
                severity: Severity::Medium,
                message: "Brake earlier for a smoother ride".to_string(),
            });
        }
    }
}

impl State for ComfortModeState {
    fn enter(&mut self) -> Result<()> {
        let profile = &self.ctx.config.comfort;
        announce(&self.ctx, Some(DriveMode::Comfort), profile);
        self.ctx.bus.publish(SmoothingChanged { enabled: true });
        self.cadence = Cadence::new(profile.telemetry_hz);
        self.harsh_armed = true;
        self.ctx.log(
            LogLevel::Info,
            TARGET,
            "entered",
            [json_kv("state", json!(COMFORT_STATE))],
        );
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        self.ctx.log(
            LogLevel::Debug,
            TARGET,
            "exited",
            [json_kv("state", json!(COMFORT_STATE))],
        );
        Ok(())
    }

    fn tick(&mut self, dt: f32) -> Result<()> {
        drive(&self.ctx, &self.ctx.config.comfort, dt);
        self.check_braking();
        if self.cadence.advance(dt) {
            let sim = &self.ctx.simulation;
            self.ctx.bus.publish(ComfortMetricsUpdate {
                speed_kmh: sim.speed(),
                smoothness: sim.comfort_score(),
                consumption_l_per_100km: sim.consumption_l_per_100km(),
                range_km: sim.range_km(),
                trip_time_s: sim.trip_time_s(),
            });
        }
        self.fuel.check(&self.ctx);
        route_transition(&self.ctx, TARGET);
        Ok(())
    }
}
