use serde_json::json;

use crate::bus::{HandlerResult, Subscription};
use crate::error::Result;
use crate::events::TransitionRequest;
use crate::logging::{LogLevel, json_kv};
use crate::machine::StateMachine;

use super::{
    COMFORT_STATE, ComfortModeState, ECO_STATE, EcoModeState, ModeContext, SPORT_STATE,
    SportModeState, WELCOME_STATE, WelcomeState,
};

const TARGET: &str = "drive::modes";

/// Owns the mode state machine and wires it to the shared context.
///
/// The four mode states are registered at construction. `TransitionRequest`
/// messages on the bus are forwarded to the control panel, where the active
/// state consumes them on its next tick.
pub struct ModeCoordinator {
    context: ModeContext,
    machine: StateMachine,
    relay: Option<Subscription>,
    booted: bool,
}

impl ModeCoordinator {
    pub fn new(context: ModeContext) -> Self {
        let mut machine: StateMachine = StateMachine::with_handle(context.machine.clone());
        if let Some(logger) = context.logger.clone() {
            machine = machine.with_logger(logger);
        }
        machine.add_state(WELCOME_STATE, Box::new(WelcomeState::new(context.clone())));
        machine.add_state(ECO_STATE, Box::new(EcoModeState::new(context.clone())));
        machine.add_state(COMFORT_STATE, Box::new(ComfortModeState::new(context.clone())));
        machine.add_state(SPORT_STATE, Box::new(SportModeState::new(context.clone())));

        let controls = context.controls.clone();
        let relay = context
            .bus
            .subscribe::<TransitionRequest, _>(move |request| -> HandlerResult {
                controls.request_transition(request.0.clone());
                Ok(())
            });

        Self {
            context,
            machine,
            relay: Some(relay),
            booted: false,
        }
    }

    /// Enter the Welcome state. Only the first call has any effect.
    pub fn boot(&mut self) -> Result<()> {
        if self.booted {
            self.context.log(
                LogLevel::Warn,
                TARGET,
                "boot_repeated",
                [json_kv("state", json!(self.current()))],
            );
            return Ok(());
        }
        self.booted = true;
        self.machine.goto(WELCOME_STATE)
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Tick the active state, then apply at most one queued transition.
    /// Returns the state entered, if any.
    ///
    /// A non-finite or negative `dt` is treated as zero so timers and
    /// telemetry cadences never absorb it.
    pub fn tick(&mut self, dt: f32) -> Result<Option<String>> {
        let dt = if dt.is_finite() && dt >= 0.0 {
            dt
        } else {
            self.context.log(
                LogLevel::Warn,
                TARGET,
                "tick_dt_rejected",
                [json_kv("dt", json!(dt.to_string()))],
            );
            0.0
        };
        self.machine.tick(dt)?;
        self.machine.apply_pending()
    }

    pub fn current(&self) -> Option<&str> {
        self.machine.current()
    }

    pub fn previous(&self) -> Option<&str> {
        self.machine.previous()
    }

    pub fn context(&self) -> &ModeContext {
        &self.context
    }

    pub fn state_names(&self) -> Vec<String> {
        self.machine.state_names()
    }
}

impl Drop for ModeCoordinator {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            self.context.bus.unsubscribe(&relay);
        }
    }
}
