//! Wires `Component`s onto the bus: request/reply endpoints under
//! `powermgr.{kind}.{name}.{on,off,cycle,reset,force-off}`, an audit
//! stream of every completed action, and the thermal-emergency responder
//! (spec.md §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bmc_bus::{BusMessage, BusProvider, Retention};
use bmc_core::deadline::DEFAULT_REQUEST_DEADLINE;
use bmc_core::lifecycle::{ChassisStatus, HostStatus};
use bmc_core::{CoreError, ExitCause, Service, Subject, SubjectPattern};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::gpio::GpioBackend;
use crate::backend::mock::MockBackend;
use crate::backend::PowerBackend;
use crate::component::Component;
use crate::config::{BackendKind, PowerMgrConfig};
use crate::error::PowerMgrError;
use crate::state::PowerState;
use crate::wire::{encode, EmergencyThermalEvent, PowerActionReply, WireError, WireResult, ZoneStateReply};

const STREAM_NAME: &str = "POWERMGR.STATE";

pub struct PowerManager {
    name: String,
    components: HashMap<String, Arc<Component>>,
    bus: Arc<dyn BusProvider>,
    config: PowerMgrConfig,
    tokens: Mutex<Vec<bmc_bus::SubscriptionToken>>,
}

impl PowerManager {
    pub fn new(bus: Arc<dyn BusProvider>, config: PowerMgrConfig) -> Self {
        let mut components = HashMap::new();
        for cfg in &config.components {
            let backend: Arc<dyn PowerBackend> = match cfg.backend {
                BackendKind::Gpio => Arc::new(GpioBackend::new()),
                BackendKind::Mock => Arc::new(MockBackend::new()),
            };
            components.insert(cfg.name.clone(), Arc::new(Component::new(cfg.clone(), backend)));
        }
        PowerManager {
            name: "powermgr".to_owned(),
            components,
            bus,
            config,
            tokens: Mutex::new(Vec::new()),
        }
    }

    fn register(&self) {
        let mut tokens = self.tokens.lock();
        for cfg in &self.config.components {
            let kind = cfg.kind.as_str();
            for (verb, op) in ACTIONS {
                let pattern = SubjectPattern::parse(&format!("powermgr.{kind}.{}.{verb}", cfg.name)).unwrap();
                let component = self.components.get(&cfg.name).unwrap().clone();
                let bus = self.bus.clone();
                let kind = kind.to_owned();
                let name = cfg.name.clone();
                tokens.push(self.bus.add_endpoint(
                    &self.name,
                    pattern,
                    Arc::new(move |msg: BusMessage| {
                        let component = component.clone();
                        let bus = bus.clone();
                        let kind = kind.clone();
                        let name = name.clone();
                        Box::pin(async move {
                            let result = run_action(&component, op).await;
                            if let Ok(status) = &result {
                                publish_audit_event(&bus, &kind, &name, op, *status).await;
                                report_to_statemgr(&bus, &kind, &name, *status).await;
                            }
                            let reply: WireResult<PowerActionReply> =
                                result.map(|s| PowerActionReply { status: s.as_str().to_owned() }).map_err(|e| {
                                    WireError::from(CoreError::from(e))
                                });
                            Ok(BusMessage::new(msg.subject.clone(), encode(&reply)))
                        })
                    }),
                ));
            }
        }

        let bus = self.bus.clone();
        let config = self.config.clone();
        let components = self.components.clone();
        let attempts = Arc::new(Mutex::new(Vec::<std::time::Instant>::new()));
        tokens.push(self.bus.subscribe(
            SubjectPattern::parse("powermgr.emergency.thermal").unwrap(),
            Arc::new(move |msg: BusMessage| {
                let bus = bus.clone();
                let config = config.clone();
                let components = components.clone();
                let attempts = attempts.clone();
                tokio::spawn(async move {
                    let Ok(event) = serde_json::from_slice::<EmergencyThermalEvent>(&msg.payload) else {
                        warn!("malformed emergency-thermal event, dropping");
                        return;
                    };
                    if !record_attempt(&attempts, config.max_emergency_attempts, config.emergency_attempt_interval) {
                        warn!(zone = %event.zone, "emergency attempt bound exceeded within window, standing down");
                        return;
                    }
                    handle_emergency(&bus, &config, &components, event).await;
                });
            }),
        ));
    }
}

/// Records an emergency attempt in a sliding window; returns `false` once
/// `max_attempts` within `interval` has been exceeded (spec.md §4.5
/// "Honours max-emergency-attempts within emergency-attempt-interval").
fn record_attempt(attempts: &Mutex<Vec<std::time::Instant>>, max_attempts: u32, interval: Duration) -> bool {
    let now = std::time::Instant::now();
    let mut attempts = attempts.lock();
    attempts.retain(|t| now.duration_since(*t) <= interval);
    if attempts.len() as u32 >= max_attempts {
        return false;
    }
    attempts.push(now);
    true
}

type ActionFn = fn(&Component) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<PowerState, PowerMgrError>> + Send + '_>>;

const ACTIONS: &[(&str, ActionFn)] = &[
    ("on", |c| Box::pin(c.power_on())),
    ("off", |c| Box::pin(c.power_off())),
    ("cycle", |c| Box::pin(c.cycle())),
    ("reset", |c| Box::pin(c.reset())),
    ("force-off", |c| Box::pin(c.force_off())),
];

async fn run_action(component: &Component, op: ActionFn) -> Result<PowerState, PowerMgrError> {
    op(component).await
}

async fn publish_audit_event(bus: &Arc<dyn BusProvider>, kind: &str, name: &str, action: &str, status: PowerState) {
    let Ok(subject) = Subject::parse(&format!("powermgr.state.{kind}.{name}")) else { return };
    #[derive(serde::Serialize)]
    struct Event<'a> {
        name: &'a str,
        kind: &'a str,
        action: &'a str,
        status: &'a str,
    }
    let payload = serde_json::to_vec(&Event { name, kind, action, status: status.as_str() }).unwrap_or_default();
    bus.publish(&subject, payload, vec![]).await;
}

/// Report the observed terminal state back to the state manager, per
/// spec.md §4.4/§4.5's single-writer handoff: the power manager never
/// mutates state-manager entities directly, it only reports what it saw.
///
/// The payload must use `HostStatus`/`ChassisStatus`'s own derived serde
/// spelling (PascalCase), not `PowerState::as_str()`'s lowercase form,
/// since that is what `statemgr.{kind}.{name}.update` deserializes. A
/// `bmc`-kind component has no on/off equivalent in `BmcStatus` -- a BMC
/// self-reset settles through its own supervised restart rather than a
/// reported power state, mirroring `handle_bmc_control`'s own disregard
/// of the observed status -- so it is not reported here either.
async fn report_to_statemgr(bus: &Arc<dyn BusProvider>, kind: &str, name: &str, status: PowerState) {
    #[derive(serde::Serialize)]
    struct Update<S> {
        status: S,
    }
    let payload = match (kind, status) {
        ("host", PowerState::On) => serde_json::to_vec(&Update { status: HostStatus::On }),
        ("host", PowerState::Off) => serde_json::to_vec(&Update { status: HostStatus::Off }),
        ("chassis", PowerState::On) => serde_json::to_vec(&Update { status: ChassisStatus::On }),
        ("chassis", PowerState::Off) => serde_json::to_vec(&Update { status: ChassisStatus::Off }),
        _ => return,
    };
    let Ok(payload) = payload else { return };
    let Ok(subject) = Subject::parse(&format!("statemgr.{kind}.{name}.update")) else { return };
    if let Err(e) = bus.request(&subject, payload, Some(DEFAULT_REQUEST_DEADLINE)).await {
        warn!(kind, name, "failed to report observed power state to state manager: {e}");
    }
}

async fn handle_emergency(
    bus: &Arc<dyn BusProvider>,
    config: &PowerMgrConfig,
    components: &HashMap<String, Arc<Component>>,
    event: EmergencyThermalEvent,
) {
    info!(zone = %event.zone, temperature = event.temperature, "emergency-thermal received, waiting for cooling to take effect");
    tokio::time::sleep(config.emergency_response_delay).await;

    let still_critical = recheck_zone(bus, &event.zone).await;
    if !still_critical {
        info!(zone = %event.zone, "zone recovered before emergency force-off, standing down");
        return;
    }

    for name in &config.emergency_shutdown_components {
        let Some(component) = components.get(name) else {
            warn!(component = %name, "emergency shutdown target has no configured component");
            continue;
        };
        match component.force_off().await {
            Ok(status) => {
                warn!(component = %name, %status, "emergency force-off executed");
                let kind = component.config.kind.as_str();
                publish_audit_event(bus, kind, name, "force-off", status).await;
                report_to_statemgr(bus, kind, name, status).await;
            }
            Err(e) => error!(component = %name, "emergency force-off failed: {e}"),
        }
    }
}

async fn recheck_zone(bus: &Arc<dyn BusProvider>, zone: &str) -> bool {
    let Ok(subject) = Subject::parse(&format!("thermalmgr.zone.{zone}.state")) else { return true };
    let Ok(reply) = bus.request(&subject, vec![], Some(Duration::from_secs(5))).await else {
        // No responder or timeout: fail safe and proceed with shutdown.
        return true;
    };
    let Ok(result) = serde_json::from_slice::<WireResult<ZoneStateReply>>(&reply.payload) else { return true };
    match result {
        Ok(state) => matches!(state.state.as_str(), "critical" | "emergency"),
        Err(_) => true,
    }
}

#[async_trait]
impl Service for PowerManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ExitCause> {
        self.bus
            .create_or_update_stream(
                STREAM_NAME,
                vec![SubjectPattern::parse("powermgr.state.>").unwrap()],
                Retention::keep_forever(),
            )
            .await
            .map_err(|e| ExitCause::Fatal(e.into()))?;

        self.register();
        self.bus
            .publish(&Subject::parse("operator.ready.powermgr").unwrap(), vec![], vec![])
            .await;
        info!(components = self.components.len(), "power manager ready");

        cancel.cancelled().await;

        for token in self.tokens.lock().drain(..) {
            self.bus.unsubscribe(token);
        }
        Ok(())
    }
}
