use std::sync::Arc;

use serde_json::Value;

use crate::bus::EventBus;
use crate::config::DriveConfig;
use crate::controls::ControlPanel;
use crate::logging::{LogLevel, Logger, emit_optional};
use crate::machine::MachineHandle;
use crate::simulation::VehicleSimulation;

/// Collaborators handed to every mode state at construction.
///
/// Cloning is cheap; every field is a shared handle.
#[derive(Clone)]
pub struct ModeContext {
    pub simulation: Arc<VehicleSimulation>,
    pub bus: Arc<EventBus>,
    pub machine: MachineHandle,
    pub controls: ControlPanel,
    pub config: Arc<DriveConfig>,
    pub logger: Option<Logger>,
}

impl ModeContext {
    pub fn new(
        simulation: Arc<VehicleSimulation>,
        bus: Arc<EventBus>,
        controls: ControlPanel,
        config: Arc<DriveConfig>,
    ) -> Self {
        Self {
            simulation,
            bus,
            machine: MachineHandle::new(),
            controls,
            config,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_machine(mut self, machine: MachineHandle) -> Self {
        self.machine = machine;
        self
    }

    pub(crate) fn log<I>(&self, level: LogLevel, target: &str, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        emit_optional(self.logger.as_ref(), level, target, message, fields);
    }
}
