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

//! Authoritative `Host`/`Chassis`/`BMC` lifecycle state (spec.md §4.4).
//! Owns naming and validation of every entity; the power manager asks this
//! service for current state before acting and reports the observed
//! terminal state back afterward, giving each entity a single writer.

pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod wire;

pub use config::{BmcConfig, ChassisConfig, HostConfig, StateManagerConfig, StateManagerConfigBuilder};
pub use error::StateMgrError;
pub use service::StateManager;
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_bus::InProcessBus;
    use bmc_core::lifecycle::{Action, HostStatus};
    use bmc_core::{Service, Subject};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn spawn_manager() -> (Arc<InProcessBus>, CancellationToken, tokio::task::JoinHandle<()>) {
        let dir = tempfile::tempdir().unwrap();
        let bus: Arc<InProcessBus> = InProcessBus::new(dir.path());
        let config = StateManagerConfigBuilder::new()
            .host("host-0")
            .chassis("chassis-0")
            .bmc("bmc-0")
            .build()
            .unwrap();
        let manager = StateManager::new(bus.clone() as Arc<dyn bmc_bus::BusProvider>, config);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _ = manager.run(run_cancel).await;
        });
        // give the endpoint registration a beat to land.
        tokio::time::sleep(Duration::from_millis(20)).await;
        (bus, cancel, handle)
    }

    #[tokio::test]
    async fn rejects_duplicate_host_names() {
        let err = StateManagerConfigBuilder::new().host("host-0").host("host-0").build();
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn rejects_invalid_host_name() {
        let err = StateManagerConfigBuilder::new().host("host 0!").build();
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn control_transitions_and_publishes_event() {
        let (bus, cancel, handle) = spawn_manager().await;

        let reply = bus
            .request(
                &Subject::parse("statemgr.host.host-0.control").unwrap(),
                serde_json::to_vec(&wire::ControlRequest { action: Action::On }).unwrap(),
                None,
            )
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::StateReply> = serde_json::from_slice(&reply.payload).unwrap();
        let state_reply = parsed.unwrap();
        assert_eq!(state_reply.status, serde_json::to_value(HostStatus::Starting).unwrap());

        let again = bus
            .request(
                &Subject::parse("statemgr.host.host-0.state").unwrap(),
                vec![],
                None,
            )
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::StateReply> = serde_json::from_slice(&again.payload).unwrap();
        assert_eq!(parsed.unwrap().status, serde_json::to_value(HostStatus::Starting).unwrap());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_not_silent() {
        let (bus, cancel, handle) = spawn_manager().await;

        // host-0 starts `off`; `off` has no valid transition for `off`.
        let reply = bus
            .request(
                &Subject::parse("statemgr.host.host-0.control").unwrap(),
                serde_json::to_vec(&wire::ControlRequest { action: Action::Off }).unwrap(),
                None,
            )
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::StateReply> = serde_json::from_slice(&reply.payload).unwrap();
        assert!(parsed.is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_entity_is_not_found() {
        let (bus, cancel, handle) = spawn_manager().await;

        let reply = bus
            .request(&Subject::parse("statemgr.host.ghost.state").unwrap(), vec![], None)
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::StateReply> = serde_json::from_slice(&reply.payload).unwrap();
        assert!(parsed.is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn control_blocks_on_attached_power_manager_and_returns_settled_state() {
        let (bus, cancel, handle) = spawn_manager().await;

        bus.add_endpoint(
            "fake-powermgr",
            bmc_core::SubjectPattern::parse("powermgr.host.*.on").unwrap(),
            Arc::new(|msg: bmc_bus::BusMessage| {
                Box::pin(async move {
                    let reply: wire::WireResult<wire::PowerActionReply> =
                        Ok(wire::PowerActionReply { status: "on".into() });
                    Ok(bmc_bus::BusMessage::new(msg.subject.clone(), serde_json::to_vec(&reply).unwrap()))
                })
            }),
        );

        let reply = bus
            .request(
                &Subject::parse("statemgr.host.host-0.control").unwrap(),
                serde_json::to_vec(&wire::ControlRequest { action: Action::On }).unwrap(),
                None,
            )
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::StateReply> = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(parsed.unwrap().status, serde_json::to_value(HostStatus::On).unwrap());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn list_returns_all_hosts() {
        let (bus, cancel, handle) = spawn_manager().await;

        let reply = bus
            .request(&Subject::parse("statemgr.host.list").unwrap(), vec![], None)
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::ListReply> = serde_json::from_slice(&reply.payload).unwrap();
        let list = parsed.unwrap();
        assert_eq!(list.entities.len(), 1);
        assert_eq!(list.entities[0].name, "host-0");

        cancel.cancel();
        handle.await.unwrap();
    }
}
