//! In-memory authoritative state, one map per entity kind. A single
//! `parking_lot::RwLock` per map is sufficient: transitions are total and
//! computed up front, so the lock is only ever held for the instant of the
//! read-modify-write (spec.md §4.4 "single-writer per entity discipline").

use std::collections::HashMap;

use bmc_core::lifecycle::{
    bmc_transition, chassis_transition, host_transition, Action, BmcStatus, ChassisStatus, HostStatus,
};
use parking_lot::RwLock;

use crate::config::StateManagerConfig;
use crate::error::StateMgrError;

pub struct Store {
    hosts: RwLock<HashMap<String, HostStatus>>,
    chassis: RwLock<HashMap<String, ChassisStatus>>,
    bmcs: RwLock<HashMap<String, BmcStatus>>,
}

impl Store {
    pub fn new(config: &StateManagerConfig) -> Self {
        Store {
            hosts: RwLock::new(config.hosts.iter().map(|h| (h.name.clone(), h.initial)).collect()),
            chassis: RwLock::new(config.chassis.iter().map(|c| (c.name.clone(), c.initial)).collect()),
            bmcs: RwLock::new(config.bmcs.iter().map(|b| (b.name.clone(), b.initial)).collect()),
        }
    }

    pub fn host_state(&self, name: &str) -> Result<HostStatus, StateMgrError> {
        self.hosts
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| StateMgrError::UnknownEntity { kind: "host", name: name.to_owned() })
    }

    pub fn chassis_state(&self, name: &str) -> Result<ChassisStatus, StateMgrError> {
        self.chassis
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| StateMgrError::UnknownEntity { kind: "chassis", name: name.to_owned() })
    }

    pub fn bmc_state(&self, name: &str) -> Result<BmcStatus, StateMgrError> {
        self.bmcs
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| StateMgrError::UnknownEntity { kind: "bmc", name: name.to_owned() })
    }

    pub fn list_hosts(&self) -> Vec<(String, HostStatus)> {
        self.hosts.read().iter().map(|(n, s)| (n.clone(), *s)).collect()
    }

    pub fn list_chassis(&self) -> Vec<(String, ChassisStatus)> {
        self.chassis.read().iter().map(|(n, s)| (n.clone(), *s)).collect()
    }

    pub fn list_bmcs(&self) -> Vec<(String, BmcStatus)> {
        self.bmcs.read().iter().map(|(n, s)| (n.clone(), *s)).collect()
    }

    /// Apply `action` to host `name`. Rejects are never silent: a failed
    /// transition leaves the stored state untouched and returns the error.
    pub fn transition_host(&self, name: &str, action: Action) -> Result<HostStatus, StateMgrError> {
        let mut map = self.hosts.write();
        let current = *map
            .get(name)
            .ok_or_else(|| StateMgrError::UnknownEntity { kind: "host", name: name.to_owned() })?;
        let next = host_transition(current, action)?;
        map.insert(name.to_owned(), next);
        Ok(next)
    }

    pub fn transition_chassis(&self, name: &str, action: Action) -> Result<ChassisStatus, StateMgrError> {
        let mut map = self.chassis.write();
        let current = *map
            .get(name)
            .ok_or_else(|| StateMgrError::UnknownEntity { kind: "chassis", name: name.to_owned() })?;
        let next = chassis_transition(current, action)?;
        map.insert(name.to_owned(), next);
        Ok(next)
    }

    pub fn transition_bmc(&self, name: &str, action: Action) -> Result<BmcStatus, StateMgrError> {
        let mut map = self.bmcs.write();
        let current = *map
            .get(name)
            .ok_or_else(|| StateMgrError::UnknownEntity { kind: "bmc", name: name.to_owned() })?;
        let next = bmc_transition(current, action)?;
        map.insert(name.to_owned(), next);
        Ok(next)
    }

    /// Overwrite a host's state with an observed terminal value, bypassing
    /// the transition table. Used when the power manager reports back
    /// after acting (spec.md §4.4's single-writer handoff) -- the power
    /// manager has already validated the physical transition, so this is
    /// a plain write, not a second transition check.
    pub fn observe_host(&self, name: &str, status: HostStatus) -> Result<(), StateMgrError> {
        let mut map = self.hosts.write();
        if !map.contains_key(name) {
            return Err(StateMgrError::UnknownEntity { kind: "host", name: name.to_owned() });
        }
        map.insert(name.to_owned(), status);
        Ok(())
    }

    pub fn observe_chassis(&self, name: &str, status: ChassisStatus) -> Result<(), StateMgrError> {
        let mut map = self.chassis.write();
        if !map.contains_key(name) {
            return Err(StateMgrError::UnknownEntity { kind: "chassis", name: name.to_owned() });
        }
        map.insert(name.to_owned(), status);
        Ok(())
    }

    pub fn observe_bmc(&self, name: &str, status: BmcStatus) -> Result<(), StateMgrError> {
        let mut map = self.bmcs.write();
        if !map.contains_key(name) {
            return Err(StateMgrError::UnknownEntity { kind: "bmc", name: name.to_owned() });
        }
        map.insert(name.to_owned(), status);
        Ok(())
    }
}
