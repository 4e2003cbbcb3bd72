use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;

use crate::bus::{HandlerResult, Subscription};
use crate::config::ModeProfile;
use crate::events::{
    DisplayConfig, DriveMode, DriveModeChanged, PerformanceWarning, RpmChanged, Severity,
    WarningKind,
};
use crate::logging::{LogLevel, json_kv};

use super::{ModeContext, is_mode_state};

/// Fuel level (percent of capacity) below which driving modes warn once.
const LOW_FUEL_PCT: f32 = 10.0;

/// Fixed-rate gate for telemetry publishing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cadence {
    interval: f32,
    elapsed: f32,
}

impl Cadence {
    /// A rate of zero (or less) never fires.
    pub(crate) fn new(hz: f32) -> Self {
        let interval = if hz > 0.0 { 1.0 / hz } else { f32::INFINITY };
        Self {
            interval,
            elapsed: 0.0,
        }
    }

    pub(crate) fn advance(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        if self.elapsed < self.interval * (1.0 - 1e-3) {
            return false;
        }
        self.elapsed -= self.interval;
        if self.elapsed >= self.interval {
            // Dropped frames are not replayed.
            self.elapsed = 0.0;
        }
        true
    }
}

/// Rising-edge latch: fires once when a value crosses `trigger`, re-arms
/// after it falls below `rearm`.
#[derive(Debug)]
pub(crate) struct Latch {
    armed: AtomicBool,
    trigger: f32,
    rearm: f32,
}

impl Latch {
    pub(crate) fn new(trigger: f32, rearm: f32) -> Self {
        Self {
            armed: AtomicBool::new(true),
            trigger,
            rearm,
        }
    }

    pub(crate) fn observe(&self, value: f32) -> bool {
        if value > self.trigger {
            return self.armed.swap(false, Ordering::SeqCst);
        }
        if value < self.rearm {
            self.armed.store(true, Ordering::SeqCst);
        }
        false
    }
}

/// Enter steps shared by every mode: drive mode, theme, display layout and
/// the mode announcement. Welcome passes `None` and skips the mode steps.
pub(crate) fn announce(ctx: &ModeContext, mode: Option<DriveMode>, profile: &ModeProfile) {
    if let Some(mode) = mode {
        ctx.simulation.set_drive_mode(mode);
    }
    ctx.bus.publish(profile.theme.clone());
    ctx.bus.publish(DisplayConfig {
        profile: profile.theme.name.clone(),
        metrics: profile.display.metrics.clone(),
        smoothing: profile.display.smoothing,
        smoothing_factor: profile.display.smoothing_factor,
        animation_ms: profile.display.animation_ms,
        max_rpm: ctx.simulation.max_rpm(),
        update_hz: profile.telemetry_hz,
    });
    if let Some(mode) = mode {
        ctx.bus.publish(DriveModeChanged { mode });
    }
}

pub(crate) fn drive(ctx: &ModeContext, profile: &ModeProfile, dt: f32) {
    ctx.simulation
        .step(ctx.controls.input(), &profile.control, dt);
}

/// Consume at most one transition request from the control panel and queue
/// it on the machine when it names a mode state.
pub(crate) fn route_transition(ctx: &ModeContext, target: &str) -> Option<String> {
    let requested = ctx.controls.take_transition_request()?;
    if !is_mode_state(&requested) {
        ctx.log(
            LogLevel::Warn,
            target,
            "transition_rejected",
            [json_kv("requested", json!(requested))],
        );
        return None;
    }
    ctx.log(
        LogLevel::Debug,
        target,
        "transition_queued",
        [json_kv("requested", json!(requested))],
    );
    ctx.machine.request(requested.clone());
    Some(requested)
}

/// Subscribe a watcher publishing `warning` each time RPM crosses the
/// profile's warning level.
pub(crate) fn watch_rpm(
    ctx: &ModeContext,
    profile: &ModeProfile,
    kind: WarningKind,
    severity: Severity,
    message: &'static str,
) -> Subscription {
    let bus = Arc::downgrade(&ctx.bus);
    let latch = Latch::new(profile.warning_rpm, profile.warning_rearm_rpm);
    ctx.bus
        .subscribe::<RpmChanged, _>(move |event| -> HandlerResult {
            if latch.observe(event.0) {
                if let Some(bus) = bus.upgrade() {
                    bus.publish(PerformanceWarning {
                        kind,
                        severity,
                        message: message.to_string(),
                    });
                }
            }
            Ok(())
        })
}

pub(crate) fn unsubscribe_all(ctx: &ModeContext, subscriptions: &mut Vec<Subscription>) {
    for subscription in subscriptions.drain(..) {
        ctx.bus.unsubscribe(&subscription);
    }
}

/// Raises a single `LowFuel` warning per dip below the reserve.
#[derive(Debug)]
pub(crate) struct FuelWatch {
    armed: AtomicBool,
}

impl Default for FuelWatch {
    fn default() -> Self {
        Self {
            armed: AtomicBool::new(true),
        }
    }
}

impl FuelWatch {
    pub(crate) fn check(&self, ctx: &ModeContext) {
        let level = ctx.simulation.fuel_level_pct();
        if level > LOW_FUEL_PCT + 1.0 {
            self.armed.store(true, Ordering::SeqCst);
            return;
        }
        if level < LOW_FUEL_PCT && self.armed.swap(false, Ordering::SeqCst) {
            ctx.bus.publish(PerformanceWarning {
                kind: WarningKind::LowFuel,
                severity: Severity::Medium,
                message: format!("Fuel reserve: {level:.0}% left"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_fires_at_rate() {
        let mut cadence = Cadence::new(10.0);
        let fired = (0..60).filter(|_| cadence.advance(1.0 / 60.0)).count();
        assert_eq!(fired, 10);
    }

    #[test]
    fn cadence_matching_tick_rate_fires_every_tick() {
        let mut cadence = Cadence::new(60.0);
        assert!((0..30).all(|_| cadence.advance(1.0 / 60.0)));
    }

    #[test]
    fn zero_rate_never_fires() {
        let mut cadence = Cadence::new(0.0);
        assert!(!(0..100).any(|_| cadence.advance(1.0)));
    }

    #[test]
    fn latch_fires_once_until_rearmed() {
        let latch = Latch::new(2500.0, 2200.0);
        assert!(!latch.observe(2400.0));
        assert!(latch.observe(2600.0));
        assert!(!latch.observe(2700.0));
        assert!(!latch.observe(2300.0));
        assert!(!latch.observe(2600.0));
        assert!(!latch.observe(2100.0));
        assert!(latch.observe(2600.0));
    }
}
