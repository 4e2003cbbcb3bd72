//! Generic named-state machine with queued transitions.

mod core;
mod handle;

pub use self::core::{State, StateMachine};
pub use handle::MachineHandle;
