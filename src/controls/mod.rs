//! Shared driver controls: held pedals plus a one-shot transition slot.
//!
//! The shell writes, the active mode state reads. Clones share storage.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::simulation::DriveInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    Accelerate,
    Brake,
}

impl ControlSignal {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "accelerate" | "throttle" | "up" => Some(ControlSignal::Accelerate),
            "brake" | "down" => Some(ControlSignal::Brake),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PanelInner {
    held: RwLock<HashSet<ControlSignal>>,
    transition: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ControlPanel {
    inner: Arc<PanelInner>,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_held(&self, signal: ControlSignal, held: bool) {
        let mut guard = self
            .inner
            .held
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if held {
            guard.insert(signal);
        } else {
            guard.remove(&signal);
        }
    }

    pub fn is_held(&self, signal: ControlSignal) -> bool {
        self.inner
            .held
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&signal)
    }

    pub fn release_all(&self) {
        self.inner
            .held
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn input(&self) -> DriveInput {
        DriveInput {
            accelerate: self.is_held(ControlSignal::Accelerate),
            brake: self.is_held(ControlSignal::Brake),
        }
    }

    /// Store a transition request. A newer request overwrites one that has
    /// not been consumed yet.
    pub fn request_transition(&self, target: impl Into<String>) {
        *self.slot() = Some(target.into());
    }

    /// Consume the pending request, leaving the slot empty.
    pub fn take_transition_request(&self) -> Option<String> {
        self.slot().take()
    }

    pub fn pending_transition(&self) -> Option<String> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.inner
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_signals_map_to_drive_input() {
        let panel = ControlPanel::new();
        assert_eq!(panel.input(), DriveInput::idle());
        panel.set_held(ControlSignal::Accelerate, true);
        assert_eq!(panel.input(), DriveInput::accelerate());
        panel.set_held(ControlSignal::Brake, true);
        assert!(panel.input().brake && panel.input().accelerate);
        panel.release_all();
        assert_eq!(panel.input(), DriveInput::idle());
    }

    #[test]
    fn transition_request_is_consumed_once() {
        let panel = ControlPanel::new();
        let shell = panel.clone();
        shell.request_transition("EcoModeState");
        assert_eq!(panel.pending_transition().as_deref(), Some("EcoModeState"));
        assert_eq!(panel.take_transition_request().as_deref(), Some("EcoModeState"));
        assert_eq!(panel.take_transition_request(), None);
    }

    #[test]
    fn newer_request_overwrites_unconsumed_one() {
        let panel = ControlPanel::new();
        panel.request_transition("EcoModeState");
        panel.request_transition("SportModeState");
        assert_eq!(panel.take_transition_request().as_deref(), Some("SportModeState"));
    }

    #[test]
    fn signal_names_parse_loosely() {
        assert_eq!(ControlSignal::from_name(" Brake "), Some(ControlSignal::Brake));
        assert_eq!(ControlSignal::from_name("up"), Some(ControlSignal::Accelerate));
        assert_eq!(ControlSignal::from_name("horn"), None);
    }
}
