use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;

use crate::bus::{HandlerResult, Subscription};
use crate::error::Result;
use crate::events::{
    DriveMode, GearChanged, LapCompleted, Severity, SportMetricsUpdate, UpdateFrequencyChanged,
    WarningKind,
};
use crate::logging::{LogLevel, json_kv};
use crate::machine::State;

use super::shared::{
    Cadence, FuelWatch, announce, drive, route_transition, unsubscribe_all, watch_rpm,
};
use super::{ModeContext, SPORT_STATE};

const TARGET: &str = "drive::modes.sport";

/// Per-visit counters; reset on every Enter.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SportSession {
    pub laps: u32,
    pub lap_time_s: f32,
    pub lap_start_km: f32,
    pub lap_max_speed: f32,
    pub lap_max_rpm: f32,
    pub session_max_speed: f32,
    pub session_max_rpm: f32,
    pub timing: bool,
}

/// Performance profile: high-rate telemetry, shift counting, redline
/// warnings and a lap timer over fixed-length laps.
pub struct SportModeState {
    ctx: ModeContext,
    subscriptions: Vec<Subscription>,
    shifts: Arc<AtomicU32>,
    session: SportSession,
    cadence: Cadence,
    fuel: FuelWatch,
}

impl SportModeState {
    pub fn new(ctx: ModeContext) -> Self {
        let cadence = Cadence::new(ctx.config.sport.telemetry_hz);
        Self {
            ctx,
            subscriptions: Vec::new(),
            shifts: Arc::new(AtomicU32::new(0)),
            session: SportSession::default(),
            cadence,
            fuel: FuelWatch::default(),
        }
    }

    pub fn session(&self) -> SportSession {
        self.session
    }

    pub fn shift_count(&self) -> u32 {
        self.shifts.load(Ordering::SeqCst)
    }

    fn reset_session(&mut self) {
        self.session = SportSession {
            lap_start_km: self.ctx.simulation.distance_km(),
            timing: true,
            ..SportSession::default()
        };
        self.shifts.store(0, Ordering::SeqCst);
    }

    fn advance_lap(&mut self, dt: f32) {
        let sim = &self.ctx.simulation;
        let speed = sim.speed();
        let rpm = sim.rpm();
        let session = &mut self.session;
        session.session_max_speed = session.session_max_speed.max(speed);
        session.session_max_rpm = session.session_max_rpm.max(rpm);
        if !session.timing {
            return;
        }
        session.lap_max_speed = session.lap_max_speed.max(speed);
        session.lap_max_rpm = session.lap_max_rpm.max(rpm);
        session.lap_time_s += dt;

        let lap_length = self.ctx.config.sport_session.lap_length_km;
        if lap_length <= 0.0 || sim.distance_km() - session.lap_start_km < lap_length {
            return;
        }
        session.laps += 1;
        let lap = LapCompleted {
            lap: session.laps,
            time_s: session.lap_time_s,
            max_speed: session.lap_max_speed,
            max_rpm: session.lap_max_rpm,
        };
        session.lap_start_km += lap_length;
        session.lap_time_s = 0.0;
        session.lap_max_speed = speed;
        session.lap_max_rpm = rpm;

        self.ctx.log(
            LogLevel::Info,
            TARGET,
            "lap_completed",
            [
                json_kv("lap", json!(lap.lap)),
                json_kv("time_s", json!(lap.time_s)),
            ],
        );
        self.ctx.bus.publish(lap);
    }

    fn publish_metrics(&self) {
        let sim = &self.ctx.simulation;
        self.ctx.bus.publish(SportMetricsUpdate {
            speed_kmh: sim.speed(),
            rpm: sim.rpm(),
            gear: sim.gear(),
            g_force: sim.g_force(),
            cornering_score: sim.cornering_score(),
            lap_time_s: self.session.lap_time_s,
            session_max_speed: self.session.session_max_speed,
            session_max_rpm: self.session.session_max_rpm,
            shift_count: self.shift_count(),
        });
    }
}

impl State for SportModeState {
    fn enter(&mut self) -> Result<()> {
        self.reset_session();
        let profile = &self.ctx.config.sport;
        announce(&self.ctx, Some(DriveMode::Sport), profile);

        let shifts = Arc::clone(&self.shifts);
        self.subscriptions
            .push(self.ctx.bus.subscribe::<GearChanged, _>(move |_| -> HandlerResult {
                shifts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        self.subscriptions.push(watch_rpm(
            &self.ctx,
            profile,
            WarningKind::Redline,
            Severity::High,
            "Approaching redline",
        ));

        self.ctx.bus.publish(UpdateFrequencyChanged {
            hz: profile.telemetry_hz,
        });
        self.cadence = Cadence::new(profile.telemetry_hz);
        self.ctx.log(
            LogLevel::Info,
            TARGET,
            "entered",
            [json_kv("state", json!(SPORT_STATE))],
        );
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        unsubscribe_all(&self.ctx, &mut self.subscriptions);
        self.session.timing = false;
        self.ctx.bus.publish(UpdateFrequencyChanged {
            hz: self.ctx.config.sport_session.default_update_hz,
        });
        self.ctx.log(
            LogLevel::Debug,
            TARGET,
            "exited",
            [
                json_kv("state", json!(SPORT_STATE)),
                json_kv("laps", json!(self.session.laps)),
            ],
        );
        Ok(())
    }

    fn tick(&mut self, dt: f32) -> Result<()> {
        drive(&self.ctx, &self.ctx.config.sport, dt);
        self.advance_lap(dt);
        if self.cadence.advance(dt) {
            self.publish_metrics();
        }
        self.fuel.check(&self.ctx);
        route_transition(&self.ctx, TARGET);
        Ok(())
    }
}
