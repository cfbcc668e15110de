//! The generic power-component state, independent of `Host`/`Chassis`/`Bmc`
//! lifecycle status (spec.md §4.5). A backend only ever knows "is the
//! power-status line asserted", so this is intentionally coarser than
//! `bmc-statemgr`'s per-kind status enums; `bmc-statemgr` maps it onto its
//! own richer states when a power manager is attached.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Off,
    On,
    Unknown,
    Error,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::Off => "off",
            PowerState::On => "on",
            PowerState::Unknown => "unknown",
            PowerState::Error => "error",
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
