//! Backend trait every power component acts through, plus the GPIO and
//! mock implementations (spec.md §4.5 "GPIO backend" / "Mock backend").

pub mod gpio;
pub mod mock;

use async_trait::async_trait;

use crate::config::PowerComponentConfig;
use crate::error::PowerMgrError;
use crate::state::PowerState;

/// Power actuation verbs a backend must support. Each is expected to
/// honour `operation_timeout`; callers (component.rs) additionally wrap
/// every call in a `tokio::time::timeout` as a second line of defence.
#[async_trait]
pub trait PowerBackend: Send + Sync {
    async fn power_on(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError>;
    async fn power_off(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError>;
    async fn reset(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError>;
    async fn force_off(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError>;
    async fn status(&self, cfg: &PowerComponentConfig) -> Result<PowerState, PowerMgrError>;
}
