use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::error::{DriveError, Result};

/// Namespace marker for process-wide services (bus, simulation, logger).
#[derive(Debug, Clone, Copy)]
pub enum Services {}

/// Namespace marker for per-client features (machine handle, controls).
#[derive(Debug, Clone, Copy)]
pub enum Features {}

pub type ServiceRegistry = CapabilityRegistry<Services>;
pub type FeatureRegistry = CapabilityRegistry<Features>;

struct Slot {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Diagnostic view of one registered capability.
#[derive(Clone)]
pub struct CapabilityEntry {
    pub type_name: &'static str,
    pub instance: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for CapabilityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityEntry")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Type-indexed registry holding one instance per type.
///
/// Entries are keyed by [`TypeId`]; registering a type again replaces the
/// previous instance. The `Scope` parameter keeps the service and feature
/// namespaces apart at the type level. Clones share the same storage.
pub struct CapabilityRegistry<Scope> {
    inner: Arc<RwLock<HashMap<TypeId, Slot>>>,
    _scope: PhantomData<fn() -> Scope>,
}

impl<Scope> Clone for CapabilityRegistry<Scope> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _scope: PhantomData,
        }
    }
}

impl<Scope> Default for CapabilityRegistry<Scope> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            _scope: PhantomData,
        }
    }
}

impl<Scope> CapabilityRegistry<Scope> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` for its type, returning the instance it replaced.
    pub fn register<T>(&self, value: T) -> Result<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.register_arc(Arc::new(value))
    }

    pub fn register_arc<T>(&self, value: Arc<T>) -> Result<Option<Arc<T>>>
    where
        T: Send + Sync + 'static,
    {
        let mut guard = self.inner.write().map_err(|_| DriveError::Poisoned)?;
        let previous = guard.insert(
            TypeId::of::<T>(),
            Slot {
                type_name: type_name::<T>(),
                value,
            },
        );
        Ok(previous.and_then(|slot| slot.value.downcast::<T>().ok()))
    }

    /// Resolve the instance registered for `T`.
    ///
    /// A missing registration is a hard error, never a default.
    pub fn get<T>(&self) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let guard = self.inner.read().map_err(|_| DriveError::Poisoned)?;
        let slot = guard
            .get(&TypeId::of::<T>())
            .ok_or(DriveError::CapabilityNotFound(type_name::<T>()))?;
        Arc::clone(&slot.value)
            .downcast::<T>()
            .map_err(|_| DriveError::CapabilityTypeMismatch(type_name::<T>()))
    }

    pub fn contains<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.inner
            .read()
            .map(|guard| guard.contains_key(&TypeId::of::<T>()))
            .unwrap_or(false)
    }

    /// Every registered instance, sorted by type name.
    pub fn list_all(&self) -> Result<Vec<CapabilityEntry>> {
        let guard = self.inner.read().map_err(|_| DriveError::Poisoned)?;
        let mut entries: Vec<_> = guard
            .values()
            .map(|slot| CapabilityEntry {
                type_name: slot.type_name,
                instance: Arc::clone(&slot.value),
            })
            .collect();
        entries.sort_by(|a, b| a.type_name.cmp(b.type_name));
        Ok(entries)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Thing(u32);

    #[derive(Debug)]
    struct Other;

    #[test]
    fn register_and_get() {
        let registry = ServiceRegistry::new();
        registry.register(Thing(5)).unwrap();
        let value = registry.get::<Thing>().unwrap();
        assert_eq!(value.0, 5);
    }

    #[test]
    fn last_registration_wins() {
        let registry = ServiceRegistry::new();
        assert!(registry.register(Thing(1)).unwrap().is_none());
        let replaced = registry.register(Thing(2)).unwrap().expect("previous");
        assert_eq!(replaced.0, 1);
        assert_eq!(registry.get::<Thing>().unwrap().0, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let registry = ServiceRegistry::new();
        let err = registry.get::<Thing>().unwrap_err();
        assert!(matches!(err, DriveError::CapabilityNotFound(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn namespaces_are_independent() {
        let services = ServiceRegistry::new();
        let features = FeatureRegistry::new();
        services.register(Thing(1)).unwrap();
        assert!(services.contains::<Thing>());
        assert!(!features.contains::<Thing>());
        assert!(features.get::<Thing>().is_err());
    }

    #[test]
    fn list_all_reports_every_type() {
        let registry = FeatureRegistry::new();
        registry.register(Thing(3)).unwrap();
        registry.register(Other).unwrap();
        let entries = registry.list_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.type_name.ends_with("Thing")));
        assert!(entries.iter().any(|e| e.type_name.ends_with("Other")));
    }

    #[test]
    fn clones_share_storage() {
        let registry = ServiceRegistry::new();
        let shared = registry.clone();
        let value = Arc::new(Thing(9));
        registry.register_arc(Arc::clone(&value)).unwrap();
        let resolved = shared.get::<Thing>().unwrap();
        assert!(Arc::ptr_eq(&value, &resolved));
    }
}
