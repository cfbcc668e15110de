// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-component power state machines, GPIO/mock backends, and the
//! thermal-emergency responder (spec.md §4.5). Reports observed
//! transitions to the state manager; never mutates its entities directly.

pub mod backend;
pub mod component;
pub mod config;
pub mod error;
pub mod service;
pub mod state;
pub mod wire;

pub use component::Component;
pub use config::{ComponentKind, PowerComponentConfig, PowerMgrConfig, PowerMgrConfigBuilder};
pub use error::PowerMgrError;
pub use service::PowerManager;
pub use state::PowerState;

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_bus::InProcessBus;
    use bmc_core::{Service, Subject};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn spawn_manager() -> (Arc<InProcessBus>, CancellationToken, tokio::task::JoinHandle<()>) {
        let dir = tempfile::tempdir().unwrap();
        let bus: Arc<InProcessBus> = InProcessBus::new(dir.path());
        let mut cfg = PowerComponentConfig::mock("host-0", ComponentKind::Host);
        cfg.operation_delay = Duration::from_millis(10);
        cfg.power_state_delay = Duration::from_millis(10);
        let config = PowerMgrConfigBuilder::new().component(cfg).build().unwrap();
        let manager = PowerManager::new(bus.clone() as Arc<dyn bmc_bus::BusProvider>, config);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _ = manager.run(run_cancel).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        (bus, cancel, handle)
    }

    #[tokio::test]
    async fn power_on_settles_and_publishes_audit_event() {
        let (bus, cancel, handle) = spawn_manager().await;

        let reply = bus
            .request(&Subject::parse("powermgr.host.host-0.on").unwrap(), vec![], Some(Duration::from_secs(1)))
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::PowerActionReply> = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(parsed.unwrap().status, "on");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn rejects_gpio_component_with_no_lines() {
        let cfg = PowerComponentConfig { backend: config::BackendKind::Gpio, ..PowerComponentConfig::mock("x", ComponentKind::Host) };
        let err = PowerMgrConfigBuilder::new().component(cfg).build();
        assert!(err.is_err());
    }
}
