use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Default)]
struct Pointers {
    current: Option<String>,
    previous: Option<String>,
}

#[derive(Default)]
struct HandleInner {
    pointers: RwLock<Pointers>,
    pending: Mutex<VecDeque<String>>,
}

/// Cloneable view onto a [`StateMachine`](super::StateMachine).
///
/// States hold this instead of the machine itself: they read the current
/// state name and enqueue transitions, which the driver applies between
/// ticks.
#[derive(Clone, Default)]
pub struct MachineHandle {
    inner: Arc<HandleInner>,
}

impl MachineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transition to `target`. Applied by the driver after the
    /// current tick returns.
    pub fn request(&self, target: impl Into<String>) {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(target.into());
    }

    pub fn current(&self) -> Option<String> {
        self.read_pointers(|p| p.current.clone())
    }

    pub fn previous(&self) -> Option<String> {
        self.read_pointers(|p| p.previous.clone())
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.read_pointers(|p| p.current.as_deref() == Some(name))
    }

    pub fn pending(&self) -> Vec<String> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn pop_pending(&self) -> Option<String> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub(crate) fn sync(&self, current: Option<&str>, previous: Option<&str>) {
        let mut guard = self
            .inner
            .pointers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.current = current.map(str::to_string);
        guard.previous = previous.map(str::to_string);
    }

    fn read_pointers<R>(&self, read: impl FnOnce(&Pointers) -> R) -> R {
        let guard = self
            .inner
            .pointers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        read(&guard)
    }
}
