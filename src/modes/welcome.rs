use serde_json::json;

use crate::error::Result;
use crate::logging::{LogLevel, json_kv};
use crate::machine::State;

use super::{ModeContext, WELCOME_STATE};
use super::shared::{announce, drive, route_transition};

const TARGET: &str = "drive::modes.welcome";

/// Idle landing state entered once at boot. Has no drive mode of its own;
/// the vehicle can only coast or brake here.
pub struct WelcomeState {
    ctx: ModeContext,
}

impl WelcomeState {
    pub fn new(ctx: ModeContext) -> Self {
        Self { ctx }
    }
}

impl State for WelcomeState {
    fn enter(&mut self) -> Result<()> {
        announce(&self.ctx, None, &self.ctx.config.welcome);
        self.ctx.log(
            LogLevel::Info,
            TARGET,
            "entered",
            [json_kv("state", json!(WELCOME_STATE))],
        );
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        self.ctx.log(
            LogLevel::Debug,
            TARGET,
            "exited",
            [json_kv("state", json!(WELCOME_STATE))],
        );
        Ok(())
    }

    fn tick(&mut self, dt: f32) -> Result<()> {
        drive(&self.ctx, &self.ctx.config.welcome, dt);
        route_transition(&self.ctx, TARGET);
        Ok(())
    }
}
