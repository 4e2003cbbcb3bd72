use serde_json::json;

use crate::bus::Subscription;
use crate::error::Result;
use crate::events::{DriveMode, EcoMetricsUpdate, Severity, SmoothingChanged, WarningKind};
use crate::logging::{LogLevel, json_kv};
use crate::machine::State;

use super::shared::{
    Cadence, FuelWatch, announce, drive, route_transition, unsubscribe_all, watch_rpm,
};
use super::{ECO_STATE, ModeContext};

const TARGET: &str = "drive::modes.eco";

/// Economy profile: gentle control law, consumption telemetry and shift-up
/// hints once the engine revs past the profile's warning level.
pub struct EcoModeState {
    ctx: ModeContext,
    subscriptions: Vec<Subscription>,
    cadence: Cadence,
    fuel: FuelWatch,
}

impl EcoModeState {
    pub fn new(ctx: ModeContext) -> Self {
        let cadence = Cadence::new(ctx.config.eco.telemetry_hz);
        Self {
            ctx,
            subscriptions: Vec::new(),
            cadence,
            fuel: FuelWatch::default(),
        }
    }

    fn publish_metrics(&self) {
        let sim = &self.ctx.simulation;
        self.ctx.bus.publish(EcoMetricsUpdate {
            consumption_l_per_100km: sim.consumption_l_per_100km(),
            average_consumption: sim.average_consumption(),
            range_km: sim.range_km(),
            efficiency_score: sim.efficiency_score(),
            throttle: sim.throttle(),
        });
    }
}

impl State for EcoModeState {
    fn enter(&mut self) -> Result<()> {
        let profile = &self.ctx.config.eco;
        announce(&self.ctx, Some(DriveMode::Eco), profile);
        self.ctx.bus.publish(SmoothingChanged { enabled: true });
        self.subscriptions.push(watch_rpm(
            &self.ctx,
            profile,
            WarningKind::ShiftUp,
            Severity::Low,
            "Shift up to save fuel",
        ));
        self.cadence = Cadence::new(profile.telemetry_hz);
        self.ctx.log(
            LogLevel::Info,
            TARGET,
            "entered",
            [json_kv("state", json!(ECO_STATE))],
        );
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        unsubscribe_all(&self.ctx, &mut self.subscriptions);
        self.ctx.log(
            LogLevel::Debug,
            TARGET,
            "exited",
            [json_kv("state", json!(ECO_STATE))],
        );
        Ok(())
    }

    fn tick(&mut self, dt: f32) -> Result<()> {
        drive(&self.ctx, &self.ctx.config.eco, dt);
        if self.cadence.advance(dt) {
            self.publish_metrics();
        }
        self.fuel.check(&self.ctx);
        route_transition(&self.ctx, TARGET);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{PerformanceWarning, ThemeApply};
    use crate::modes::test_support::{Harness, collect};
    use crate::simulation::DriveInput;

    #[test]
    fn enter_switches_mode_and_announces_theme() {
        let harness = Harness::new();
        let themes = collect::<ThemeApply>(&harness.ctx.bus);
        let mut state = EcoModeState::new(harness.ctx.clone());
        state.enter().unwrap();

        assert_eq!(harness.ctx.simulation.drive_mode(), DriveMode::Eco);
        assert_eq!(harness.ctx.simulation.max_rpm(), 5000.0);
        let themes = themes.lock().unwrap();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].name, "EcoMode");
    }

    #[test]
    fn publishes_metrics_at_ten_hertz() {
        let harness = Harness::new();
        let metrics = collect::<EcoMetricsUpdate>(&harness.ctx.bus);
        let mut state = EcoModeState::new(harness.ctx.clone());
        state.enter().unwrap();
        for _ in 0..60 {
            state.tick(1.0 / 60.0).unwrap();
        }
        assert_eq!(metrics.lock().unwrap().len(), 10);
    }

    #[test]
    fn high_rpm_raises_a_single_shift_hint() {
        let harness = Harness::new();
        let warnings = collect::<PerformanceWarning>(&harness.ctx.bus);
        let mut state = EcoModeState::new(harness.ctx.clone());
        state.enter().unwrap();

        harness.ctx.simulation.set_rpm(2600.0);
        harness.ctx.simulation.set_rpm(2800.0);
        let warnings = warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::ShiftUp);
    }

    #[test]
    fn exit_removes_rpm_watcher() {
        let harness = Harness::new();
        let bus = &harness.ctx.bus;
        let mut state = EcoModeState::new(harness.ctx.clone());
        state.enter().unwrap();
        assert_eq!(bus.subscriber_count::<crate::events::RpmChanged>(), 1);
        state.exit().unwrap();
        assert_eq!(bus.subscriber_count::<crate::events::RpmChanged>(), 0);
    }

    #[test]
    fn accelerates_gently() {
        let harness = Harness::new();
        let mut state = EcoModeState::new(harness.ctx.clone());
        state.enter().unwrap();
        harness
            .ctx
            .controls
            .set_held(crate::controls::ControlSignal::Accelerate, true);
        for _ in 0..60 {
            state.tick(1.0 / 60.0).unwrap();
        }
        assert_eq!(harness.ctx.controls.input(), DriveInput::accelerate());
        assert!((harness.ctx.simulation.speed() - 15.0).abs() < 0.05);
    }
}
