//! Mode states (Welcome, Eco, Comfort, Sport) and the coordinator that
//! drives them through the state machine.
//!
//! Every state follows the same lifecycle: Enter reconfigures the vehicle and
//! announces the mode, Tick integrates the control law, publishes telemetry
//! and routes one transition request, Exit releases its bus subscriptions.

mod comfort;
mod context;
mod coordinator;
mod eco;
mod shared;
mod sport;
mod welcome;

pub use comfort::ComfortModeState;
pub use context::ModeContext;
pub use coordinator::ModeCoordinator;
pub use eco::EcoModeState;
pub use sport::{SportModeState, SportSession};
pub use welcome::WelcomeState;

pub const WELCOME_STATE: &str = "Welcome";
pub const ECO_STATE: &str = "EcoModeState";
pub const COMFORT_STATE: &str = "ComfortModeState";
pub const SPORT_STATE: &str = "SportModeState";

/// Every name a transition request may target. The graph is fully connected.
pub const MODE_STATES: [&str; 4] = [WELCOME_STATE, ECO_STATE, COMFORT_STATE, SPORT_STATE];

pub fn is_mode_state(name: &str) -> bool {
    MODE_STATES.contains(&name)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use crate::bus::{EventBus, HandlerResult};
    use crate::config::{DriveConfig, SimulationConfig};
    use crate::controls::ControlPanel;
    use crate::logging::{Logger, MemorySink};
    use crate::simulation::{VehicleSimulation, ZeroJitter};

    use super::ModeContext;

    pub(crate) struct Harness {
        pub ctx: ModeContext,
        pub sink: MemorySink,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            let sink = MemorySink::new();
            let bus = Arc::new(EventBus::new());
            let simulation = Arc::new(
                VehicleSimulation::new(SimulationConfig::default(), Arc::clone(&bus))
                    .with_jitter(ZeroJitter),
            );
            let ctx = ModeContext::new(
                simulation,
                bus,
                ControlPanel::new(),
                Arc::new(DriveConfig::default()),
            )
            .with_logger(Some(Logger::new(sink.clone())));
            Self { ctx, sink }
        }
    }

    /// Record every `T` published on `bus` from now on.
    pub(crate) fn collect<T>(bus: &EventBus) -> Arc<Mutex<Vec<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let log: Arc<Mutex<Vec<T>>> = Arc::default();
        let sink = Arc::clone(&log);
        let _subscription = bus.subscribe::<T, _>(move |event| -> HandlerResult {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_is_exact() {
        for name in MODE_STATES {
            assert!(is_mode_state(name));
        }
        assert!(!is_mode_state("Mars"));
        assert!(!is_mode_state("ecomodestate"));
        assert!(!is_mode_state(""));
    }
}
