//! Thin wrapper around the persistent-install UUID. The actual file I/O is
//! out of scope (spec.md §1) and lives in `bmc-atomicfile`; this module only
//! defines the value type shared across crates.

use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstallId(Uuid);

impl InstallId {
    pub fn new(uuid: Uuid) -> Self {
        InstallId(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for InstallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
