//! Wires the `Store` onto the bus: request/reply endpoints under
//! `statemgr.{host|chassis|bmc}.{name}.{state|control|info|update}` and
//! `statemgr.{entity}.list`, plus event publication onto the `STATEMGR`
//! stream for every accepted transition (spec.md §4.4).
//!
//! `control` additionally forwards physically-actuated verbs to
//! `powermgr.{kind}.{name}.{action}` and blocks on the reply before
//! answering the caller, so `ChangeHostState` returns the settled terminal
//! status rather than the intermediate `starting`/`stopping` one (spec.md
//! §8 scenario S2). If no power manager is attached for that component the
//! request comes back `NoResponders` and the intermediate status stands.

use std::sync::Arc;

use async_trait::async_trait;
use bmc_bus::{BusMessage, BusProvider};
use bmc_core::deadline::DEFAULT_REQUEST_DEADLINE;
use bmc_core::lifecycle::{Action, BmcStatus, ChassisStatus, HostStatus};
use bmc_core::{CoreError, ExitCause, Service, Subject, SubjectPattern};
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::StateManagerConfig;
use crate::store::Store;
use crate::wire::{
    chassis_status_from_power, encode, host_status_from_power, power_action_token, ControlRequest, ListEntry,
    ListReply, ObservedUpdate, PowerActionReply, StateReply, WireError, WireResult,
};

const STREAM_NAME: &str = "STATEMGR";

pub struct StateManager {
    name: String,
    store: Arc<Store>,
    bus: Arc<dyn BusProvider>,
    config: StateManagerConfig,
    tokens: Mutex<Vec<bmc_bus::SubscriptionToken>>,
}

impl StateManager {
    pub fn new(bus: Arc<dyn BusProvider>, config: StateManagerConfig) -> Self {
        StateManager {
            name: "statemgr".to_owned(),
            store: Arc::new(Store::new(&config)),
            bus,
            config,
            tokens: Mutex::new(Vec::new()),
        }
    }

    fn register(&self) {
        let mut tokens = self.tokens.lock();

        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.host.*.state").unwrap(),
            host_state_handler(self.store.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.host.*.info").unwrap(),
            host_state_handler(self.store.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.host.*.control").unwrap(),
            host_control_handler(self.store.clone(), self.bus.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.host.*.update").unwrap(),
            host_update_handler(self.store.clone(), self.bus.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.host.list").unwrap(),
            host_list_handler(self.store.clone()),
        ));

        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.chassis.*.state").unwrap(),
            chassis_state_handler(self.store.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.chassis.*.control").unwrap(),
            chassis_control_handler(self.store.clone(), self.bus.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.chassis.*.update").unwrap(),
            chassis_update_handler(self.store.clone(), self.bus.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.chassis.list").unwrap(),
            chassis_list_handler(self.store.clone()),
        ));

        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.bmc.*.state").unwrap(),
            bmc_state_handler(self.store.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.bmc.*.control").unwrap(),
            bmc_control_handler(self.store.clone(), self.bus.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.bmc.*.update").unwrap(),
            bmc_update_handler(self.store.clone(), self.bus.clone()),
        ));
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("statemgr.bmc.list").unwrap(),
            bmc_list_handler(self.store.clone()),
        ));
    }
}

#[async_trait]
impl Service for StateManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ExitCause> {
        self.bus
            .create_or_update_stream(
                STREAM_NAME,
                vec![SubjectPattern::parse("statemgr.state.>").unwrap()],
                self.config.retention(),
            )
            .await
            .map_err(|e| ExitCause::Fatal(e.into()))?;

        self.register();
        self.bus
            .publish(&Subject::parse("operator.ready.statemgr").unwrap(), vec![], vec![])
            .await;
        info!(
            hosts = self.config.hosts.len(),
            chassis = self.config.chassis.len(),
            bmcs = self.config.bmcs.len(),
            "state manager ready"
        );

        cancel.cancelled().await;

        for token in self.tokens.lock().drain(..) {
            self.bus.unsubscribe(token);
        }
        Ok(())
    }
}

fn name_token(subject: &Subject, index: usize) -> Option<String> {
    subject.tokens().nth(index).map(|s| s.to_owned())
}

fn invalid_subject(subject: &Subject) -> WireError {
    WireError::from(CoreError::InvalidSubject(subject.to_string()))
}

fn missing_name() -> WireError {
    WireError::from(CoreError::InvalidSubject("missing name".into()))
}

/// Ask the power manager to physically actuate `action` on `kind.name` and
/// wait for its settled status, with a bounded deadline. Returns `None` if
/// there is no power manager attached for this component (no responders)
/// or the action has no physical counterpart.
async fn forward_to_powermgr(
    bus: &Arc<dyn BusProvider>,
    kind: &str,
    name: &str,
    action: Action,
) -> Option<String> {
    let token = power_action_token(action)?;
    let subject = Subject::parse(&format!("powermgr.{kind}.{name}.{token}")).ok()?;
    let reply = bus.request(&subject, vec![], Some(DEFAULT_REQUEST_DEADLINE)).await.ok()?;
    let decoded: WireResult<PowerActionReply> = serde_json::from_slice(&reply.payload).ok()?;
    decoded.ok().map(|r| r.status)
}

fn host_state_handler(store: Arc<Store>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        Box::pin(async move {
            let result: WireResult<StateReply> = (|| {
                let name = name_token(&msg.subject, 2).ok_or_else(|| invalid_subject(&msg.subject))?;
                let status = store.host_state(&name).map_err(|e| WireError::from(e.into()))?;
                Ok(StateReply {
                    name,
                    kind: "host".into(),
                    status: serde_json::to_value(status).unwrap_or_default(),
                    timestamp: Utc::now(),
                })
            })();
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

fn host_control_handler(store: Arc<Store>, bus: Arc<dyn BusProvider>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        let bus = bus.clone();
        Box::pin(async move {
            let name = name_token(&msg.subject, 2);
            let result = handle_host_control(&store, &bus, name.as_deref(), &msg.payload).await;
            if let (Ok(reply), Some(name)) = (&result, &name) {
                bus_publish_status(&bus, "host", name, reply.status.clone()).await;
            }
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

async fn handle_host_control(
    store: &Store,
    bus: &Arc<dyn BusProvider>,
    name: Option<&str>,
    payload: &[u8],
) -> WireResult<StateReply> {
    let name = name.ok_or_else(missing_name)?;
    let req: ControlRequest = serde_json::from_slice(payload)
        .map_err(|e| WireError::from(CoreError::InvalidArgument(e.to_string())))?;
    store.transition_host(name, req.action).map_err(|e| WireError::from(e.into()))?;

    if let Some(observed) = forward_to_powermgr(bus, "host", name, req.action).await {
        if let Some(status) = host_status_from_power(&observed) {
            let _ = store.observe_host(name, status);
        }
    }

    let status = store.host_state(name).map_err(|e| WireError::from(e.into()))?;
    Ok(StateReply { name: name.to_owned(), kind: "host".into(), status: serde_json::to_value(status).unwrap_or_default(), timestamp: Utc::now() })
}

fn host_update_handler(store: Arc<Store>, bus: Arc<dyn BusProvider>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        let bus = bus.clone();
        Box::pin(async move {
            let name = name_token(&msg.subject, 2);
            let result: WireResult<StateReply> = handle_host_update(&store, name.as_deref(), &msg.payload).await;
            if let (Ok(reply), Some(name)) = (&result, name) {
                bus_publish_status(&bus, "host", &name, reply.status.clone()).await;
            }
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

async fn handle_host_update(store: &Store, name: Option<&str>, payload: &[u8]) -> WireResult<StateReply> {
    let name = name.ok_or_else(missing_name)?;
    let update: ObservedUpdate<HostStatus> = serde_json::from_slice(payload)
        .map_err(|e| WireError::from(CoreError::InvalidArgument(e.to_string())))?;
    store.observe_host(name, update.status).map_err(|e| WireError::from(e.into()))?;
    Ok(StateReply {
        name: name.to_owned(),
        kind: "host".into(),
        status: serde_json::to_value(update.status).unwrap_or_default(),
        timestamp: Utc::now(),
    })
}

fn host_list_handler(store: Arc<Store>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        Box::pin(async move {
            let entities = store
                .list_hosts()
                .into_iter()
                .map(|(name, status)| ListEntry { name, status: serde_json::to_value(status).unwrap_or_default() })
                .collect();
            let result: WireResult<ListReply> = Ok(ListReply { entities });
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

fn chassis_state_handler(store: Arc<Store>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        Box::pin(async move {
            let result: WireResult<StateReply> = (|| {
                let name = name_token(&msg.subject, 2).ok_or_else(|| invalid_subject(&msg.subject))?;
                let status = store.chassis_state(&name).map_err(|e| WireError::from(e.into()))?;
                Ok(StateReply {
                    name,
                    kind: "chassis".into(),
                    status: serde_json::to_value(status).unwrap_or_default(),
                    timestamp: Utc::now(),
                })
            })();
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

fn chassis_control_handler(store: Arc<Store>, bus: Arc<dyn BusProvider>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        let bus = bus.clone();
        Box::pin(async move {
            let name = name_token(&msg.subject, 2);
            let result = handle_chassis_control(&store, &bus, name.as_deref(), &msg.payload).await;
            if let (Ok(reply), Some(name)) = (&result, &name) {
                bus_publish_status(&bus, "chassis", name, reply.status.clone()).await;
            }
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

async fn handle_chassis_control(
    store: &Store,
    bus: &Arc<dyn BusProvider>,
    name: Option<&str>,
    payload: &[u8],
) -> WireResult<StateReply> {
    let name = name.ok_or_else(missing_name)?;
    let req: ControlRequest = serde_json::from_slice(payload)
        .map_err(|e| WireError::from(CoreError::InvalidArgument(e.to_string())))?;
    store.transition_chassis(name, req.action).map_err(|e| WireError::from(e.into()))?;

    if let Some(observed) = forward_to_powermgr(bus, "chassis", name, req.action).await {
        if let Some(status) = chassis_status_from_power(&observed) {
            let _ = store.observe_chassis(name, status);
        }
    }

    let status = store.chassis_state(name).map_err(|e| WireError::from(e.into()))?;
    Ok(StateReply { name: name.to_owned(), kind: "chassis".into(), status: serde_json::to_value(status).unwrap_or_default(), timestamp: Utc::now() })
}

fn chassis_update_handler(store: Arc<Store>, bus: Arc<dyn BusProvider>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        let bus = bus.clone();
        Box::pin(async move {
            let name = name_token(&msg.subject, 2);
            let result: WireResult<StateReply> = handle_chassis_update(&store, name.as_deref(), &msg.payload).await;
            if let (Ok(reply), Some(name)) = (&result, &name) {
                bus_publish_status(&bus, "chassis", name, reply.status.clone()).await;
            }
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

async fn handle_chassis_update(store: &Store, name: Option<&str>, payload: &[u8]) -> WireResult<StateReply> {
    let name = name.ok_or_else(missing_name)?;
    let update: ObservedUpdate<ChassisStatus> = serde_json::from_slice(payload)
        .map_err(|e| WireError::from(CoreError::InvalidArgument(e.to_string())))?;
    store.observe_chassis(name, update.status).map_err(|e| WireError::from(e.into()))?;
    Ok(StateReply {
        name: name.to_owned(),
        kind: "chassis".into(),
        status: serde_json::to_value(update.status).unwrap_or_default(),
        timestamp: Utc::now(),
    })
}

fn chassis_list_handler(store: Arc<Store>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        Box::pin(async move {
            let entities = store
                .list_chassis()
                .into_iter()
                .map(|(name, status)| ListEntry { name, status: serde_json::to_value(status).unwrap_or_default() })
                .collect();
            let result: WireResult<ListReply> = Ok(ListReply { entities });
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

fn bmc_state_handler(store: Arc<Store>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        Box::pin(async move {
            let result: WireResult<StateReply> = (|| {
                let name = name_token(&msg.subject, 2).ok_or_else(|| invalid_subject(&msg.subject))?;
                let status = store.bmc_state(&name).map_err(|e| WireError::from(e.into()))?;
                Ok(StateReply {
                    name,
                    kind: "bmc".into(),
                    status: serde_json::to_value(status).unwrap_or_default(),
                    timestamp: Utc::now(),
                })
            })();
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

fn bmc_control_handler(store: Arc<Store>, bus: Arc<dyn BusProvider>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        let bus = bus.clone();
        Box::pin(async move {
            let name = name_token(&msg.subject, 2);
            let result = handle_bmc_control(&store, &bus, name.as_deref(), &msg.payload).await;
            if let (Ok(reply), Some(name)) = (&result, &name) {
                bus_publish_status(&bus, "bmc", name, reply.status.clone()).await;
            }
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

async fn handle_bmc_control(
    store: &Store,
    bus: &Arc<dyn BusProvider>,
    name: Option<&str>,
    payload: &[u8],
) -> WireResult<StateReply> {
    let name = name.ok_or_else(missing_name)?;
    let req: ControlRequest = serde_json::from_slice(payload)
        .map_err(|e| WireError::from(CoreError::InvalidArgument(e.to_string())))?;
    store.transition_bmc(name, req.action).map_err(|e| WireError::from(e.into()))?;

    // BMC self-reset settles on its own supervised restart rather than
    // through a powermgr-owned backend; forwarding is attempted for
    // uniformity but a `NoResponders` result is the expected common case.
    let _ = forward_to_powermgr(bus, "bmc", name, req.action).await;

    let status = store.bmc_state(name).map_err(|e| WireError::from(e.into()))?;
    Ok(StateReply { name: name.to_owned(), kind: "bmc".into(), status: serde_json::to_value(status).unwrap_or_default(), timestamp: Utc::now() })
}

fn bmc_update_handler(store: Arc<Store>, bus: Arc<dyn BusProvider>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        let bus = bus.clone();
        Box::pin(async move {
            let name = name_token(&msg.subject, 2);
            let result: WireResult<StateReply> = handle_bmc_update(&store, name.as_deref(), &msg.payload).await;
            if let (Ok(reply), Some(name)) = (&result, &name) {
                bus_publish_status(&bus, "bmc", name, reply.status.clone()).await;
            }
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

async fn handle_bmc_update(store: &Store, name: Option<&str>, payload: &[u8]) -> WireResult<StateReply> {
    let name = name.ok_or_else(missing_name)?;
    let update: ObservedUpdate<BmcStatus> = serde_json::from_slice(payload)
        .map_err(|e| WireError::from(CoreError::InvalidArgument(e.to_string())))?;
    store.observe_bmc(name, update.status).map_err(|e| WireError::from(e.into()))?;
    Ok(StateReply {
        name: name.to_owned(),
        kind: "bmc".into(),
        status: serde_json::to_value(update.status).unwrap_or_default(),
        timestamp: Utc::now(),
    })
}

fn bmc_list_handler(store: Arc<Store>) -> bmc_bus::EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let store = store.clone();
        Box::pin(async move {
            let entities = store
                .list_bmcs()
                .into_iter()
                .map(|(name, status)| ListEntry { name, status: serde_json::to_value(status).unwrap_or_default() })
                .collect();
            let result: WireResult<ListReply> = Ok(ListReply { entities });
            Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
        })
    })
}

async fn bus_publish_status(bus: &Arc<dyn BusProvider>, kind: &str, name: &str, status: serde_json::Value) {
    let subject = match Subject::parse(&format!("statemgr.state.{kind}.{name}")) {
        Ok(s) => s,
        Err(_) => return,
    };
    let reply = StateReply { name: name.to_owned(), kind: kind.to_owned(), status, timestamp: Utc::now() };
    let payload = serde_json::to_vec(&reply).unwrap_or_default();
    bus.publish(&subject, payload, vec![]).await;
}
