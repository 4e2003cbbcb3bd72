use std::collections::HashMap;

use serde_json::json;

use crate::error::{DriveError, Result};
use crate::logging::{LogLevel, Logger, emit_optional, json_kv};

use super::MachineHandle;

const TARGET: &str = "drive::machine";

/// Lifecycle contract implemented by every state driven by a [`StateMachine`].
pub trait State: Send {
    fn enter(&mut self) -> Result<()>;
    fn exit(&mut self) -> Result<()>;
    fn tick(&mut self, dt: f32) -> Result<()>;
}

/// Named-state registry plus the lifecycle driver for the active state.
///
/// The machine starts with no active state; an explicit [`goto`](Self::goto)
/// is required before [`tick`](Self::tick) does anything. It never judges
/// whether a transition is legal; states decide that themselves.
pub struct StateMachine<S: State + ?Sized = dyn State> {
    states: HashMap<String, Box<S>>,
    current: Option<String>,
    previous: Option<String>,
    handle: MachineHandle,
    logger: Option<Logger>,
}

impl<S: State + ?Sized> Default for StateMachine<S> {
    fn default() -> Self {
        Self::with_handle(MachineHandle::new())
    }
}

impl<S: State + ?Sized> StateMachine<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a machine around a handle created earlier, so states built
    /// before the machine can already hold it.
    pub fn with_handle(handle: MachineHandle) -> Self {
        Self {
            states: HashMap::new(),
            current: None,
            previous: None,
            handle,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn handle(&self) -> MachineHandle {
        self.handle.clone()
    }

    /// Register `state` under `name`, returning any state it replaced.
    pub fn add_state(&mut self, name: impl Into<String>, state: Box<S>) -> Option<Box<S>> {
        let name = name.into();
        self.log(LogLevel::Debug, "state_added", &name);
        self.states.insert(name, state)
    }

    /// Unregister `name`. Removing the active state leaves `current` naming
    /// it until the next `goto`; ticks become no-ops in the meantime.
    pub fn remove_state(&mut self, name: &str) -> Option<Box<S>> {
        let removed = self.states.remove(name);
        if removed.is_some() {
            let level = if self.current.as_deref() == Some(name) {
                LogLevel::Warn
            } else {
                LogLevel::Debug
            };
            self.log(level, "state_removed", name);
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn state_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.states.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Exit the active state and enter `name`.
    ///
    /// Fails with [`DriveError::StateNotFound`] before touching anything when
    /// `name` is unknown. Re-entering the active state runs Exit then Enter.
    pub fn goto(&mut self, name: &str) -> Result<()> {
        if !self.states.contains_key(name) {
            self.log(LogLevel::Warn, "goto_unknown_state", name);
            return Err(DriveError::StateNotFound(name.to_string()));
        }

        if let Some(active) = self.current.clone() {
            match self.states.get_mut(&active) {
                Some(state) => {
                    if let Err(err) = state.exit() {
                        emit_optional(
                            self.logger.as_ref(),
                            LogLevel::Warn,
                            TARGET,
                            "state_exit_failed",
                            [
                                json_kv("state", json!(active)),
                                json_kv("error", json!(err.to_string())),
                            ],
                        );
                    }
                }
                None => self.log(LogLevel::Debug, "exit_skipped_unregistered", &active),
            }
        }

        self.previous = self.current.replace(name.to_string());
        self.handle
            .sync(self.current.as_deref(), self.previous.as_deref());
        emit_optional(
            self.logger.as_ref(),
            LogLevel::Info,
            TARGET,
            "transition",
            [
                json_kv("from", json!(self.previous)),
                json_kv("to", json!(name)),
            ],
        );

        match self.states.get_mut(name) {
            Some(state) => state.enter(),
            None => Err(DriveError::StateNotFound(name.to_string())),
        }
    }

    /// Tick the active state; a no-op while nothing (registered) is active.
    pub fn tick(&mut self, dt: f32) -> Result<()> {
        let Some(active) = self.current.as_deref() else {
            return Ok(());
        };
        match self.states.get_mut(active) {
            Some(state) => state.tick(dt),
            None => Ok(()),
        }
    }

    /// Apply at most one queued transition request.
    ///
    /// Returns the name entered, if any. Unknown names surface as
    /// [`DriveError::StateNotFound`] and are dropped from the queue.
    pub fn apply_pending(&mut self) -> Result<Option<String>> {
        let Some(target) = self.handle.pop_pending() else {
            return Ok(None);
        };
        self.goto(&target)?;
        Ok(Some(target))
    }

    fn log(&self, level: LogLevel, message: &str, state: &str) {
        emit_optional(
            self.logger.as_ref(),
            level,
            TARGET,
            message,
            [json_kv("state", json!(state))],
        );
    }
}
