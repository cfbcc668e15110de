//! Construction-time configuration for the state manager (spec.md §4.4,
//! §4.8 "every service is constructed via an options builder with an
//! enumerated set of recognised knobs").

use std::collections::HashSet;
use std::time::Duration;

use bmc_bus::Retention;
use bmc_core::lifecycle::{BmcStatus, ChassisStatus, HostStatus};
use bmc_core::CoreError;

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub name: String,
    pub initial: HostStatus,
}

#[derive(Clone, Debug)]
pub struct ChassisConfig {
    pub name: String,
    pub initial: ChassisStatus,
}

#[derive(Clone, Debug)]
pub struct BmcConfig {
    pub name: String,
    pub initial: BmcStatus,
}

#[derive(Clone, Debug, Default)]
pub struct StateManagerConfig {
    pub hosts: Vec<HostConfig>,
    pub chassis: Vec<ChassisConfig>,
    pub bmcs: Vec<BmcConfig>,
    pub event_retention: Option<Duration>,
}

impl StateManagerConfig {
    pub fn retention(&self) -> Retention {
        match self.event_retention {
            Some(Duration::ZERO) | None => Retention::keep_forever(),
            Some(d) => Retention { max_age: Some(d), max_bytes: None, max_messages: None },
        }
    }
}

#[derive(Default)]
pub struct StateManagerConfigBuilder {
    config: StateManagerConfig,
}

impl StateManagerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host, initially `off`.
    pub fn host(self, name: impl Into<String>) -> Self {
        self.host_with_state(name, HostStatus::Off)
    }

    pub fn host_with_state(mut self, name: impl Into<String>, initial: HostStatus) -> Self {
        self.config.hosts.push(HostConfig { name: name.into(), initial });
        self
    }

    /// Register a chassis, initially `off`.
    pub fn chassis(self, name: impl Into<String>) -> Self {
        self.chassis_with_state(name, ChassisStatus::Off)
    }

    pub fn chassis_with_state(mut self, name: impl Into<String>, initial: ChassisStatus) -> Self {
        self.config.chassis.push(ChassisConfig { name: name.into(), initial });
        self
    }

    /// Register a BMC, initially `ready`.
    pub fn bmc(self, name: impl Into<String>) -> Self {
        self.bmc_with_state(name, BmcStatus::Ready)
    }

    pub fn bmc_with_state(mut self, name: impl Into<String>, initial: BmcStatus) -> Self {
        self.config.bmcs.push(BmcConfig { name: name.into(), initial });
        self
    }

    /// Retention for the `STATEMGR` event stream; `None` or zero means
    /// keep forever.
    pub fn event_retention(mut self, retention: Duration) -> Self {
        self.config.event_retention = Some(retention);
        self
    }

    pub fn build(self) -> Result<StateManagerConfig, CoreError> {
        let mut seen = HashSet::new();
        for name in self.config.hosts.iter().map(|h| &h.name) {
            check_name("host", name, &mut seen)?;
        }
        let mut seen = HashSet::new();
        for name in self.config.chassis.iter().map(|c| &c.name) {
            check_name("chassis", name, &mut seen)?;
        }
        let mut seen = HashSet::new();
        for name in self.config.bmcs.iter().map(|b| &b.name) {
            check_name("bmc", name, &mut seen)?;
        }
        Ok(self.config)
    }
}

fn check_name(kind: &str, name: &str, seen: &mut HashSet<String>) -> Result<(), CoreError> {
    bmc_core::subject::validate_token(name)
        .map_err(|_| CoreError::InvalidConfiguration(format!("invalid {kind} name {name:?}")))?;
    if !seen.insert(name.to_owned()) {
        return Err(CoreError::InvalidConfiguration(format!("duplicate {kind} name {name:?}")));
    }
    Ok(())
}
