//! Type-indexed capability registries for services and client features.

mod core;

pub use self::core::{
    CapabilityEntry, CapabilityRegistry, FeatureRegistry, Features, ServiceRegistry, Services,
};
