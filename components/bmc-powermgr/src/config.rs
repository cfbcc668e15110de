//! Construction-time configuration for the power manager (spec.md §4.5,
//! §4.8 "every service is constructed via an options builder").

use std::collections::HashSet;
use std::time::Duration;

use bmc_core::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum ComponentKind {
    Host,
    Chassis,
    Bmc,
}

impl ComponentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Host => "host",
            ComponentKind::Chassis => "chassis",
            ComponentKind::Bmc => "bmc",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Gpio,
    Mock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveLevel {
    Low,
    High,
}

/// The GPIO lines wired to one power component (spec.md §3 "GPIO line").
#[derive(Clone, Debug)]
pub struct GpioLines {
    pub chip: String,
    pub power_button: u32,
    pub reset_button: u32,
    pub power_status: u32,
    pub active_level: ActiveLevel,
}

#[derive(Clone, Debug)]
pub struct PowerComponentConfig {
    pub name: String,
    pub kind: ComponentKind,
    pub backend: BackendKind,
    pub gpio: Option<GpioLines>,
    pub operation_timeout: Duration,
    pub power_on_delay: Duration,
    pub power_off_delay: Duration,
    pub reset_delay: Duration,
    pub force_off_delay: Duration,
    /// Mock backend only: delay before the component acknowledges the
    /// request, and delay before it settles into the terminal state
    /// (spec.md §4.5 "Mock backend").
    pub operation_delay: Duration,
    pub power_state_delay: Duration,
}

impl PowerComponentConfig {
    pub fn mock(name: impl Into<String>, kind: ComponentKind) -> Self {
        PowerComponentConfig {
            name: name.into(),
            kind,
            backend: BackendKind::Mock,
            gpio: None,
            operation_timeout: Duration::from_secs(10),
            power_on_delay: Duration::from_secs(3),
            power_off_delay: Duration::from_secs(3),
            reset_delay: Duration::from_millis(500),
            force_off_delay: Duration::from_secs(8),
            operation_delay: Duration::from_millis(50),
            power_state_delay: Duration::from_millis(200),
        }
    }

    pub fn gpio(name: impl Into<String>, kind: ComponentKind, gpio: GpioLines) -> Self {
        PowerComponentConfig {
            name: name.into(),
            kind,
            backend: BackendKind::Gpio,
            gpio: Some(gpio),
            operation_timeout: Duration::from_secs(10),
            power_on_delay: Duration::from_secs(3),
            power_off_delay: Duration::from_secs(3),
            reset_delay: Duration::from_millis(500),
            force_off_delay: Duration::from_secs(8),
            operation_delay: Duration::from_millis(50),
            power_state_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PowerMgrConfig {
    pub components: Vec<PowerComponentConfig>,
    /// How long to wait after an emergency message before re-checking the
    /// zone's temperature (spec.md §4.5 "Emergency response").
    pub emergency_response_delay: Duration,
    pub max_emergency_attempts: u32,
    pub emergency_attempt_interval: Duration,
    /// Components force-powered-off when an emergency persists past the
    /// re-check (typically the host(s) sharing the overheating zone).
    pub emergency_shutdown_components: Vec<String>,
}

impl Default for PowerMgrConfig {
    fn default() -> Self {
        PowerMgrConfig {
            components: Vec::new(),
            emergency_response_delay: Duration::from_secs(5),
            max_emergency_attempts: 3,
            emergency_attempt_interval: Duration::from_secs(60),
            emergency_shutdown_components: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct PowerMgrConfigBuilder {
    config: PowerMgrConfig,
}

impl PowerMgrConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, component: PowerComponentConfig) -> Self {
        self.config.components.push(component);
        self
    }

    pub fn emergency_response_delay(mut self, delay: Duration) -> Self {
        self.config.emergency_response_delay = delay;
        self
    }

    pub fn max_emergency_attempts(mut self, max: u32, interval: Duration) -> Self {
        self.config.max_emergency_attempts = max;
        self.config.emergency_attempt_interval = interval;
        self
    }

    pub fn emergency_shutdown_component(mut self, name: impl Into<String>) -> Self {
        self.config.emergency_shutdown_components.push(name.into());
        self
    }

    pub fn build(self) -> Result<PowerMgrConfig, CoreError> {
        let mut seen = HashSet::new();
        for component in &self.config.components {
            bmc_core::subject::validate_token(&component.name).map_err(|_| {
                CoreError::InvalidConfiguration(format!("invalid component name {:?}", component.name))
            })?;
            if !seen.insert(component.name.clone()) {
                return Err(CoreError::InvalidConfiguration(format!(
                    "duplicate component name {:?}",
                    component.name
                )));
            }
            if component.backend == BackendKind::Gpio && component.gpio.is_none() {
                return Err(CoreError::InvalidConfiguration(format!(
                    "component {:?} configured with gpio backend but no gpio lines",
                    component.name
                )));
            }
        }
        Ok(self.config)
    }
}
