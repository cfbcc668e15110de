//! Mock backend: same surface as GPIO, used for tests and target
//! bring-up (spec.md §4.5). Acknowledges after `operation-delay`, then
//! reaches the terminal state after `power-state-delay`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::PowerComponentConfig;
use crate::error::PowerMgrError;
use crate::state::PowerState;

use super::PowerBackend;

#[derive(Default)]
pub struct MockBackend {
    states: Mutex<HashMap<String, PowerState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend::default()
    }

    pub fn state_of(&self, name: &str) -> PowerState {
        self.states.lock().get(name).copied().unwrap_or(PowerState::Unknown)
    }

    fn set(&self, name: &str, state: PowerState) {
        self.states.lock().insert(name.to_owned(), state);
    }
}

#[async_trait]
impl PowerBackend for MockBackend {
    async fn power_on(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        tokio::time::sleep(cfg.operation_delay).await;
        self.set(&cfg.name, PowerState::Unknown);
        tokio::time::sleep(cfg.power_state_delay).await;
        self.set(&cfg.name, PowerState::On);
        Ok(())
    }

    async fn power_off(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        tokio::time::sleep(cfg.operation_delay).await;
        self.set(&cfg.name, PowerState::Unknown);
        tokio::time::sleep(cfg.power_state_delay).await;
        self.set(&cfg.name, PowerState::Off);
        Ok(())
    }

    async fn reset(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        tokio::time::sleep(cfg.operation_delay).await;
        self.set(&cfg.name, PowerState::Unknown);
        tokio::time::sleep(cfg.power_state_delay).await;
        self.set(&cfg.name, PowerState::On);
        Ok(())
    }

    async fn force_off(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        tokio::time::sleep(cfg.operation_delay).await;
        self.set(&cfg.name, PowerState::Off);
        Ok(())
    }

    async fn status(&self, cfg: &PowerComponentConfig) -> Result<PowerState, PowerMgrError> {
        Ok(self.state_of(&cfg.name))
    }
}
