//! Vehicle dynamics: physical state, clamped setters, threshold-gated change
//! events and derived telemetry.

mod control;
mod core;
mod jitter;

pub use self::core::{VehicleSimulation, VehicleState, GEAR_PARK, GEAR_REVERSE, MAX_GEAR};
pub use control::{ControlLaw, DriveInput};
pub use jitter::{JitterSource, SeededJitter, ZeroJitter};
