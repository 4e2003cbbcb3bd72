//! Typed publish/subscribe messaging shared by the simulation and the modes.

mod core;

pub use self::core::{
    BusConfig, BusStats, EventBus, HandlerError, HandlerResult, PublishReport, Subscription,
};
