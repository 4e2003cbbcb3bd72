use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::bus::EventBus;
use crate::config::SimulationConfig;
use crate::events::{DriveMode, GearChanged, RpmChanged, SpeedChanged};

use super::control::{ControlLaw, DriveInput};
use super::jitter::{JitterSource, SeededJitter};

pub const GEAR_REVERSE: i32 = -1;
pub const GEAR_PARK: i32 = 0;
pub const MAX_GEAR: i32 = 8;

/// Engine RPM per km/h for gears 1..=8.
const RPM_PER_KMH: [f32; 8] = [110.0, 65.0, 45.0, 35.0, 28.0, 23.0, 19.0, 16.0];
const REVERSE_RPM_PER_KMH: f32 = 120.0;
/// Extra revs the throttle adds on top of the road-speed coupling.
const THROTTLE_RPM_BOOST: f32 = 400.0;
const FREE_REV_RANGE: f32 = 2500.0;

const EFFICIENCY_JITTER: f32 = 2.0;
const CORNERING_JITTER: f32 = 5.0;

/// Physical state plus the telemetry derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleState {
    pub speed_kmh: f32,
    pub rpm: f32,
    pub gear: i32,
    pub drive_mode: DriveMode,
    pub engine_running: bool,
    pub max_rpm: f32,
    pub throttle: f32,
    pub brake_force: f32,
    /// km/h per second, estimated from the last speed change.
    pub acceleration: f32,
    pub fuel_l: f32,
    pub fuel_used_l: f32,
    pub distance_km: f32,
    pub trip_time_s: f32,
}

struct Inner {
    vehicle: VehicleState,
    reported_speed: f32,
    reported_rpm: f32,
    last_dt: f32,
}

enum Change {
    Speed(f32),
    Rpm(f32),
    Gear(i32),
}

/// Owner of the vehicle state and its mutation rules.
///
/// Setters clamp instead of failing and publish change events on the shared
/// bus only once the value has moved past a minimum delta from the last
/// reported value. The internal lock is released before anything is
/// published, so subscribers may read the simulation from their handlers.
pub struct VehicleSimulation {
    config: SimulationConfig,
    bus: Arc<EventBus>,
    inner: Mutex<Inner>,
    jitter: Mutex<Box<dyn JitterSource>>,
}

impl VehicleSimulation {
    pub fn new(config: SimulationConfig, bus: Arc<EventBus>) -> Self {
        let jitter: Box<dyn JitterSource> = match config.jitter_seed {
            Some(seed) => Box::new(SeededJitter::new(seed)),
            None => Box::new(SeededJitter::from_clock()),
        };
        let mode = DriveMode::Comfort;
        let vehicle = VehicleState {
            speed_kmh: 0.0,
            rpm: config.idle_rpm,
            gear: GEAR_PARK,
            drive_mode: mode,
            engine_running: true,
            max_rpm: mode.max_rpm(),
            throttle: 0.0,
            brake_force: 0.0,
            acceleration: 0.0,
            fuel_l: config.initial_fuel_l.clamp(0.0, config.fuel_capacity_l),
            fuel_used_l: 0.0,
            distance_km: 0.0,
            trip_time_s: 0.0,
        };
        Self {
            inner: Mutex::new(Inner {
                reported_speed: vehicle.speed_kmh,
                reported_rpm: vehicle.rpm,
                vehicle,
                last_dt: 0.0,
            }),
            jitter: Mutex::new(jitter),
            config,
            bus,
        }
    }

    pub fn with_jitter<J>(self, source: J) -> Self
    where
        J: JitterSource + 'static,
    {
        self.set_jitter(Box::new(source));
        self
    }

    pub fn set_jitter(&self, source: Box<dyn JitterSource>) {
        *self.jitter.lock().unwrap_or_else(PoisonError::into_inner) = source;
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn snapshot(&self) -> VehicleState {
        self.lock().vehicle.clone()
    }

    pub fn speed(&self) -> f32 {
        self.lock().vehicle.speed_kmh
    }

    pub fn rpm(&self) -> f32 {
        self.lock().vehicle.rpm
    }

    pub fn gear(&self) -> i32 {
        self.lock().vehicle.gear
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.lock().vehicle.drive_mode
    }

    pub fn max_rpm(&self) -> f32 {
        self.lock().vehicle.max_rpm
    }

    pub fn engine_running(&self) -> bool {
        self.lock().vehicle.engine_running
    }

    pub fn throttle(&self) -> f32 {
        self.lock().vehicle.throttle
    }

    pub fn brake_force(&self) -> f32 {
        self.lock().vehicle.brake_force
    }

    pub fn acceleration(&self) -> f32 {
        self.lock().vehicle.acceleration
    }

    pub fn distance_km(&self) -> f32 {
        self.lock().vehicle.distance_km
    }

    pub fn trip_time_s(&self) -> f32 {
        self.lock().vehicle.trip_time_s
    }

    pub fn fuel_l(&self) -> f32 {
        self.lock().vehicle.fuel_l
    }

    pub fn fuel_level_pct(&self) -> f32 {
        if self.config.fuel_capacity_l <= 0.0 {
            return 0.0;
        }
        self.fuel_l() / self.config.fuel_capacity_l * 100.0
    }

    pub fn set_speed(&self, value: f32) {
        let mut changes = Vec::new();
        {
            let mut inner = self.lock();
            self.apply_speed(&mut inner, value, &mut changes);
        }
        self.publish(changes);
    }

    pub fn set_rpm(&self, value: f32) {
        let mut changes = Vec::new();
        {
            let mut inner = self.lock();
            self.apply_rpm(&mut inner, value, &mut changes);
        }
        self.publish(changes);
    }

    pub fn set_gear(&self, value: i32) {
        let mut changes = Vec::new();
        {
            let mut inner = self.lock();
            apply_gear(&mut inner, value, &mut changes);
        }
        self.publish(changes);
    }

    /// Switch physics profile. Announcing the change is left to the mode
    /// state that requested it.
    pub fn set_drive_mode(&self, mode: DriveMode) {
        let mut changes = Vec::new();
        {
            let mut inner = self.lock();
            if inner.vehicle.drive_mode == mode {
                return;
            }
            inner.vehicle.drive_mode = mode;
            inner.vehicle.max_rpm = mode.max_rpm();
            let rpm = inner.vehicle.rpm;
            self.apply_rpm(&mut inner, rpm, &mut changes);
        }
        self.publish(changes);
    }

    /// Stopping forces speed and RPM to zero; starting (even while already
    /// running) resets RPM to idle.
    pub fn set_engine_running(&self, running: bool) {
        let mut changes = Vec::new();
        {
            let mut inner = self.lock();
            inner.vehicle.engine_running = running;
            if running {
                let idle = self.config.idle_rpm;
                self.apply_rpm(&mut inner, idle, &mut changes);
            } else {
                inner.vehicle.throttle = 0.0;
                self.apply_speed(&mut inner, 0.0, &mut changes);
                self.apply_rpm(&mut inner, 0.0, &mut changes);
            }
        }
        self.publish(changes);
    }

    /// Advance the vehicle by `dt` seconds under `law`.
    ///
    /// Brake wins over accelerate; with neither held the vehicle coasts.
    pub fn step(&self, input: DriveInput, law: &ControlLaw, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        let mut changes = Vec::new();
        {
            let mut inner = self.lock();
            inner.last_dt = dt;
            let running = inner.vehicle.engine_running;
            let speed = inner.vehicle.speed_kmh;

            let (target, throttle, brake) = if input.brake {
                (
                    (speed - law.brake_rate * dt).max(0.0),
                    0.0,
                    law.brake_level,
                )
            } else if input.accelerate && running && law.accel_rate > 0.0 {
                if inner.vehicle.gear == GEAR_PARK {
                    apply_gear(&mut inner, 1, &mut changes);
                }
                let mut cap = law.top_speed;
                if inner.vehicle.gear == GEAR_REVERSE {
                    cap = cap.min(self.config.reverse_speed_cap);
                }
                let next = if speed > cap {
                    (speed - law.coast_decay * dt).max(cap)
                } else {
                    (speed + law.accel_rate * dt).min(cap)
                };
                (next, law.throttle_level, 0.0)
            } else {
                ((speed - law.coast_decay * dt).max(0.0), 0.0, 0.0)
            };

            inner.vehicle.throttle = throttle;
            inner.vehicle.brake_force = brake;
            self.apply_speed(&mut inner, target, &mut changes);

            if running {
                let model = self.engine_model(&inner.vehicle);
                let rpm = inner.vehicle.rpm;
                let blend = (self.config.rpm_response * dt).min(1.0);
                self.apply_rpm(&mut inner, rpm + (model - rpm) * blend, &mut changes);
            }

            let vehicle = &mut inner.vehicle;
            vehicle.distance_km += vehicle.speed_kmh * dt / 3600.0;
            vehicle.trip_time_s += dt;
            if running {
                let per_100km =
                    consumption_model(vehicle.speed_kmh, vehicle.throttle, vehicle.drive_mode);
                let litres_per_hour =
                    self.config.idle_fuel_lph + per_100km * vehicle.speed_kmh / 100.0;
                let burned = (litres_per_hour * dt / 3600.0).min(vehicle.fuel_l);
                vehicle.fuel_l -= burned;
                vehicle.fuel_used_l += burned;
            }

            if running && inner.vehicle.fuel_l <= 0.0 {
                inner.vehicle.engine_running = false;
                inner.vehicle.throttle = 0.0;
                self.apply_rpm(&mut inner, 0.0, &mut changes);
            }
        }
        self.publish(changes);
    }

    /// Instantaneous consumption in L/100 km.
    pub fn consumption_l_per_100km(&self) -> f32 {
        let inner = self.lock();
        let v = &inner.vehicle;
        consumption_model(v.speed_kmh, v.throttle, v.drive_mode)
    }

    /// Trip-average consumption; falls back to the instantaneous value until
    /// the vehicle has covered a meaningful distance.
    pub fn average_consumption(&self) -> f32 {
        let (distance, used) = {
            let inner = self.lock();
            (inner.vehicle.distance_km, inner.vehicle.fuel_used_l)
        };
        if distance > 0.05 {
            used / distance * 100.0
        } else {
            self.consumption_l_per_100km()
        }
    }

    pub fn range_km(&self) -> f32 {
        let average = self.average_consumption();
        if average <= f32::EPSILON {
            return 0.0;
        }
        self.fuel_l() / average * 100.0
    }

    /// 0..=100 ride smoothness; penalises hard acceleration and braking.
    pub fn comfort_score(&self) -> f32 {
        let inner = self.lock();
        let v = &inner.vehicle;
        (100.0 - v.acceleration.abs() * 1.5 - v.brake_force * 10.0).clamp(0.0, 100.0)
    }

    /// 0..=100 eco-driving score. Includes presentation jitter.
    pub fn efficiency_score(&self) -> f32 {
        let base = {
            let inner = self.lock();
            let v = &inner.vehicle;
            100.0
                - v.throttle * 35.0
                - (v.rpm - 2000.0).max(0.0) / 40.0
                - v.acceleration.abs() * 0.8
        };
        (base + self.jitter(EFFICIENCY_JITTER)).clamp(0.0, 100.0)
    }

    /// 0..=100 cornering "feel" for the sport display. Includes presentation
    /// jitter.
    pub fn cornering_score(&self) -> f32 {
        let base = 55.0 + self.speed().min(200.0) / 5.0;
        (base + self.jitter(CORNERING_JITTER)).clamp(0.0, 100.0)
    }

    /// Longitudinal acceleration in g.
    pub fn g_force(&self) -> f32 {
        self.acceleration() / 3.6 / 9.81
    }

    fn jitter(&self, amplitude: f32) -> f32 {
        self.jitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .offset(amplitude)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_speed(&self, inner: &mut Inner, value: f32, changes: &mut Vec<Change>) {
        let clamped = clamp_finite(value, 0.0, self.config.max_speed_kmh);
        let previous = inner.vehicle.speed_kmh;
        inner.vehicle.acceleration = if inner.last_dt > 0.0 {
            (clamped - previous) / inner.last_dt
        } else {
            0.0
        };
        inner.vehicle.speed_kmh = clamped;
        if (clamped - inner.reported_speed).abs() > self.config.speed_epsilon {
            inner.reported_speed = clamped;
            changes.push(Change::Speed(clamped));
        }
    }

    fn apply_rpm(&self, inner: &mut Inner, value: f32, changes: &mut Vec<Change>) {
        let clamped = clamp_finite(value, 0.0, inner.vehicle.max_rpm);
        inner.vehicle.rpm = clamped;
        if (clamped - inner.reported_rpm).abs() > self.config.rpm_epsilon {
            inner.reported_rpm = clamped;
            changes.push(Change::Rpm(clamped));
        }
        self.auto_shift(inner, changes);
    }

    fn auto_shift(&self, inner: &mut Inner, changes: &mut Vec<Change>) {
        let cfg = &self.config;
        let v = &inner.vehicle;
        if v.gear < cfg.auto_shift_top_gear
            && v.rpm > cfg.upshift_rpm
            && v.speed_kmh > cfg.upshift_min_speed
        {
            let next = v.gear + 1;
            apply_gear(inner, next, changes);
        } else if v.gear > 1 && v.rpm < cfg.downshift_rpm && v.speed_kmh < cfg.downshift_max_speed
        {
            let next = v.gear - 1;
            apply_gear(inner, next, changes);
        }
    }

    fn engine_model(&self, v: &VehicleState) -> f32 {
        let idle = self.config.idle_rpm;
        match v.gear {
            GEAR_PARK => idle + v.throttle * FREE_REV_RANGE,
            GEAR_REVERSE => idle + v.speed_kmh * REVERSE_RPM_PER_KMH,
            gear => {
                let ratio = RPM_PER_KMH[(gear.clamp(1, MAX_GEAR) - 1) as usize];
                idle + v.speed_kmh * ratio + v.throttle * THROTTLE_RPM_BOOST
            }
        }
    }

    fn publish(&self, changes: Vec<Change>) {
        for change in changes {
            match change {
                Change::Speed(speed) => {
                    self.bus.publish(SpeedChanged(speed));
                }
                Change::Rpm(rpm) => {
                    self.bus.publish(RpmChanged(rpm));
                }
                Change::Gear(gear) => {
                    self.bus.publish(GearChanged(gear));
                }
            }
        }
    }
}

fn apply_gear(inner: &mut Inner, value: i32, changes: &mut Vec<Change>) {
    let clamped = value.clamp(GEAR_REVERSE, MAX_GEAR);
    if clamped != inner.vehicle.gear {
        inner.vehicle.gear = clamped;
        changes.push(Change::Gear(clamped));
    }
}

fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

fn consumption_model(speed_kmh: f32, throttle: f32, mode: DriveMode) -> f32 {
    let base = match mode {
        DriveMode::Eco => 4.6,
        DriveMode::Comfort => 5.8,
        DriveMode::Sport => 8.2,
    };
    base * (0.7 + 0.6 * throttle) + 0.000_35 * speed_kmh * speed_kmh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::HandlerResult;
    use crate::simulation::ZeroJitter;

    type Log<T> = Arc<Mutex<Vec<T>>>;

    fn record<T>(bus: &EventBus) -> Log<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let log: Log<T> = Arc::default();
        let sink = Arc::clone(&log);
        let _ = bus.subscribe::<T, _>(move |event: &T| -> HandlerResult {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        log
    }

    fn sim() -> (VehicleSimulation, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let sim = VehicleSimulation::new(SimulationConfig::default(), Arc::clone(&bus))
            .with_jitter(ZeroJitter);
        (sim, bus)
    }

    fn count<T>(log: &Log<T>) -> usize {
        log.lock().unwrap().len()
    }

    #[test]
    fn speed_is_clamped_into_range() {
        let (sim, _bus) = sim();
        for (input, expected) in [(-40.0, 0.0), (420.0, 300.0), (123.5, 123.5), (f32::NAN, 0.0)] {
            sim.set_speed(input);
            assert_eq!(sim.speed(), expected, "input {input}");
        }
    }

    #[test]
    fn rpm_changes_below_threshold_are_silent() {
        let (sim, bus) = sim();
        let rpm = record::<RpmChanged>(&bus);
        sim.set_rpm(800.0);
        sim.set_rpm(805.0);
        assert_eq!(count(&rpm), 0);
        assert_eq!(sim.rpm(), 805.0);
        sim.set_rpm(820.0);
        assert_eq!(*rpm.lock().unwrap(), vec![RpmChanged(820.0)]);
    }

    #[test]
    fn slow_speed_ramp_still_reports_once_past_threshold() {
        let (sim, bus) = sim();
        let speed = record::<SpeedChanged>(&bus);
        sim.set_speed(0.05);
        sim.set_speed(0.09);
        assert_eq!(count(&speed), 0);
        sim.set_speed(0.15);
        assert_eq!(count(&speed), 1);
    }

    #[test]
    fn gear_is_clamped_and_reported_on_change() {
        let (sim, bus) = sim();
        let gears = record::<GearChanged>(&bus);
        sim.set_gear(99);
        assert_eq!(sim.gear(), MAX_GEAR);
        sim.set_gear(99);
        sim.set_gear(-99);
        assert_eq!(sim.gear(), GEAR_REVERSE);
        assert_eq!(*gears.lock().unwrap(), vec![GearChanged(8), GearChanged(-1)]);
    }

    #[test]
    fn rpm_ceiling_follows_drive_mode() {
        let (sim, bus) = sim();
        let rpm = record::<RpmChanged>(&bus);
        sim.set_rpm(9000.0);
        assert_eq!(sim.rpm(), 6500.0);

        sim.set_drive_mode(DriveMode::Eco);
        assert_eq!(sim.max_rpm(), 5000.0);
        assert_eq!(sim.rpm(), 5000.0);
        assert_eq!(rpm.lock().unwrap().last(), Some(&RpmChanged(5000.0)));

        sim.set_drive_mode(DriveMode::Sport);
        assert_eq!(sim.max_rpm(), 7000.0);
        assert_eq!(sim.drive_mode(), DriveMode::Sport);
    }

    #[test]
    fn high_rpm_shifts_up_one_gear() {
        let (sim, bus) = sim();
        let gears = record::<GearChanged>(&bus);
        sim.set_gear(2);
        sim.set_speed(40.0);
        sim.set_rpm(3200.0);
        assert_eq!(sim.gear(), 3);
        assert_eq!(gears.lock().unwrap().last(), Some(&GearChanged(3)));
    }

    #[test]
    fn low_rpm_shifts_down_one_gear() {
        let (sim, _bus) = sim();
        sim.set_gear(4);
        sim.set_speed(30.0);
        sim.set_rpm(1200.0);
        assert_eq!(sim.gear(), 3);
    }

    #[test]
    fn upshift_applies_below_sixth_gear_only() {
        let (sim, bus) = sim();
        let gears = record::<GearChanged>(&bus);
        sim.set_speed(90.0);
        sim.set_rpm(3500.0);
        assert_eq!(sim.gear(), 1);
        assert_eq!(*gears.lock().unwrap(), vec![GearChanged(1)]);

        sim.set_gear(6);
        sim.set_rpm(3600.0);
        assert_eq!(sim.gear(), 6);
    }

    #[test]
    fn upshift_needs_rpm_strictly_above_threshold() {
        let (sim, _bus) = sim();
        sim.set_gear(3);
        sim.set_speed(50.0);
        sim.set_rpm(3000.0);
        assert_eq!(sim.gear(), 3);
        sim.set_speed(15.0);
        sim.set_rpm(3400.0);
        assert_eq!(sim.gear(), 3);
    }

    #[test]
    fn engine_shutoff_zeroes_speed_and_rpm_once() {
        let (sim, bus) = sim();
        sim.set_speed(80.0);
        sim.set_rpm(3000.0);
        let speed = record::<SpeedChanged>(&bus);
        let rpm = record::<RpmChanged>(&bus);

        sim.set_engine_running(false);
        assert_eq!(sim.speed(), 0.0);
        assert_eq!(sim.rpm(), 0.0);
        assert_eq!(*speed.lock().unwrap(), vec![SpeedChanged(0.0)]);
        assert_eq!(*rpm.lock().unwrap(), vec![RpmChanged(0.0)]);

        sim.set_engine_running(false);
        assert_eq!(count(&speed), 1);
        assert_eq!(count(&rpm), 1);
    }

    #[test]
    fn engine_start_resets_idle() {
        let (sim, bus) = sim();
        sim.set_engine_running(false);
        let rpm = record::<RpmChanged>(&bus);
        sim.set_engine_running(true);
        assert!(sim.engine_running());
        assert_eq!(sim.rpm(), 800.0);
        assert_eq!(*rpm.lock().unwrap(), vec![RpmChanged(800.0)]);
    }

    #[test]
    fn engine_start_while_running_still_resets_idle() {
        let (sim, bus) = sim();
        sim.set_rpm(3000.0);
        assert!(sim.engine_running());
        let rpm = record::<RpmChanged>(&bus);

        sim.set_engine_running(true);
        assert_eq!(sim.rpm(), 800.0);
        assert_eq!(*rpm.lock().unwrap(), vec![RpmChanged(800.0)]);
    }

    #[test]
    fn sport_acceleration_integrates_linearly() {
        let (sim, _bus) = sim();
        sim.set_drive_mode(DriveMode::Sport);
        let law = ControlLaw {
            accel_rate: 50.0,
            top_speed: 200.0,
            ..ControlLaw::default()
        };
        let dt = 1.0 / 60.0;
        for _ in 0..120 {
            sim.step(DriveInput::accelerate(), &law, dt);
        }
        assert!((sim.speed() - 100.0).abs() < 0.01, "speed {}", sim.speed());
        assert!(sim.gear() >= 1);
        assert_eq!(sim.throttle(), law.throttle_level);
    }

    #[test]
    fn acceleration_stops_at_top_speed() {
        let (sim, _bus) = sim();
        let law = ControlLaw {
            accel_rate: 100.0,
            top_speed: 50.0,
            ..ControlLaw::default()
        };
        for _ in 0..120 {
            sim.step(DriveInput::accelerate(), &law, 0.05);
        }
        assert_eq!(sim.speed(), 50.0);
    }

    #[test]
    fn brake_wins_over_accelerate_and_stops_at_zero() {
        let (sim, _bus) = sim();
        sim.set_speed(10.0);
        let law = ControlLaw::default();
        let both = DriveInput {
            accelerate: true,
            brake: true,
        };
        sim.step(both, &law, 0.1);
        assert!((sim.speed() - (10.0 - law.brake_rate * 0.1)).abs() < 1e-4);
        assert_eq!(sim.brake_force(), law.brake_level);
        assert_eq!(sim.throttle(), 0.0);

        for _ in 0..20 {
            sim.step(DriveInput::brake(), &law, 0.1);
        }
        assert_eq!(sim.speed(), 0.0);
    }

    #[test]
    fn coasting_decays_at_mode_rate() {
        let (sim, _bus) = sim();
        sim.set_speed(60.0);
        let law = ControlLaw {
            coast_decay: 3.0,
            ..ControlLaw::default()
        };
        sim.step(DriveInput::idle(), &law, 1.0);
        assert!((sim.speed() - 57.0).abs() < 1e-4);
        assert!((sim.acceleration() + 3.0).abs() < 1e-4);
    }

    #[test]
    fn driving_burns_fuel_and_covers_distance() {
        let (sim, _bus) = sim();
        let start_fuel = sim.fuel_l();
        let law = ControlLaw::default();
        for _ in 0..600 {
            sim.step(DriveInput::accelerate(), &law, 0.1);
        }
        assert!(sim.fuel_l() < start_fuel);
        assert!(sim.distance_km() > 0.5);
        assert!((sim.trip_time_s() - 60.0).abs() < 0.01);
        assert!(sim.range_km() > 0.0);
        assert!(sim.average_consumption() > 0.0);
    }

    #[test]
    fn empty_tank_stalls_the_engine() {
        let bus = Arc::new(EventBus::new());
        let config = SimulationConfig {
            initial_fuel_l: 0.000_1,
            ..SimulationConfig::default()
        };
        let sim = VehicleSimulation::new(config, bus);
        sim.step(DriveInput::idle(), &ControlLaw::default(), 1.0);
        assert!(!sim.engine_running());
        assert_eq!(sim.rpm(), 0.0);
        assert_eq!(sim.fuel_l(), 0.0);
    }

    #[test]
    fn jitter_free_scores_are_deterministic() {
        let (sim, _bus) = sim();
        sim.set_speed(100.0);
        assert_eq!(sim.cornering_score(), 75.0);
        let first = sim.efficiency_score();
        assert_eq!(first, sim.efficiency_score());
        assert!((0.0..=100.0).contains(&first));
    }

    #[test]
    fn non_positive_dt_is_ignored() {
        let (sim, _bus) = sim();
        sim.step(DriveInput::accelerate(), &ControlLaw::default(), 0.0);
        sim.step(DriveInput::accelerate(), &ControlLaw::default(), -1.0);
        assert_eq!(sim.speed(), 0.0);
        assert_eq!(sim.trip_time_s(), 0.0);
    }
}
