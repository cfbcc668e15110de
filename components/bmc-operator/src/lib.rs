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

//! The Operator: brings up the bus first, registers every configured
//! service as a `transient` child of the supervision tree, and waits on
//! cancellation (spec.md §4.3).
//!
//! Services are enumerated from an explicit, ordered registry built by
//! `OperatorBuilder::add_service` rather than by runtime reflection over a
//! struct's fields, per spec.md §9's "Dynamic field enumeration" design
//! note -- the fixed service set is part of the builder's call sequence,
//! not discovered after the fact.

mod system;

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bmc_bus::{BusProvider, InProcessBus};
use bmc_core::{ChildSpec, RestartPolicy, Service, SubjectPattern};
use bmc_supervisor::{EscalationError, SupervisionTree};
use bmc_telemetry::TelemetryConfig;
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("operator has neither an internal bus nor an external bus provider configured")]
    NoBusConfigured,
    #[error("failed to load or create the install's persistent id: {0}")]
    PersistentId(#[from] bmc_atomicfile::AtomicFileError),
    #[error(transparent)]
    Escalation(#[from] EscalationError),
    #[error("operator step panicked: {0}")]
    Panic(String),
}

/// Which bus the Operator attaches every service to. Per spec.md §4.1 this
/// is strictly one or the other, never both.
pub enum BusChoice {
    /// The Operator owns one concrete `InProcessBus` for the process.
    Internal,
    /// An embedder-supplied bus the Operator attaches to instead of
    /// constructing its own.
    External(Arc<dyn BusProvider>),
    /// Neither -- only reachable by explicitly clearing the default,
    /// exists so `OperatorError::NoBusConfigured` is exercisable.
    None,
}

pub struct OperatorConfig {
    pub service_name: String,
    /// Root directory for the bus's stream files and the persistent
    /// install id (spec.md §6 "On-disk state").
    pub data_dir: PathBuf,
    pub bus: BusChoice,
    /// Paths that should be mounted before services start. A missing
    /// mount is logged as a warning and never fails the operator
    /// (spec.md §4.3).
    pub required_mounts: Vec<PathBuf>,
    pub telemetry: TelemetryConfig,
    pub max_restarts: u32,
    pub restart_window: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            service_name: "bmcd".to_owned(),
            data_dir: PathBuf::from("/var/bmcd"),
            bus: BusChoice::Internal,
            required_mounts: Vec::new(),
            telemetry: TelemetryConfig::default(),
            max_restarts: bmc_supervisor::DEFAULT_MAX_RESTARTS,
            restart_window: bmc_supervisor::DEFAULT_RESTART_WINDOW,
        }
    }
}

pub struct OperatorConfigBuilder {
    config: OperatorConfig,
}

impl OperatorConfigBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        OperatorConfigBuilder {
            config: OperatorConfig { service_name: service_name.into(), ..OperatorConfig::default() },
        }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn external_bus(mut self, provider: Arc<dyn BusProvider>) -> Self {
        self.config.bus = BusChoice::External(provider);
        self
    }

    /// Only for exercising `OperatorError::NoBusConfigured`; a real
    /// embedder always has either the default internal bus or an
    /// external one.
    pub fn no_bus(mut self) -> Self {
        self.config.bus = BusChoice::None;
        self
    }

    pub fn required_mount(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.required_mounts.push(path.into());
        self
    }

    pub fn otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.telemetry.otlp_endpoint = Some(endpoint.into());
        self
    }

    pub fn escalation_bound(mut self, max_restarts: u32, window: Duration) -> Self {
        self.config.max_restarts = max_restarts;
        self.config.restart_window = window;
        self
    }

    pub fn build(self) -> OperatorConfig {
        self.config
    }
}

/// Tracks `operator.ready.{service}` events so dependants can wait for a
/// service deterministically instead of racing its startup log line
/// (spec.md §9, Open Question 3).
#[derive(Default)]
struct ReadinessTracker {
    ready: Mutex<HashSet<String>>,
    notify: Notify,
}

impl ReadinessTracker {
    fn mark_ready(&self, name: &str) {
        self.ready.lock().insert(name.to_owned());
        self.notify.notify_waiters();
    }

    fn is_ready(&self, name: &str) -> bool {
        self.ready.lock().contains(name)
    }
}

/// A cloneable handle dependants can hold onto across `Operator::run`
/// (which consumes the `Operator` itself) to wait for a service's
/// readiness event deterministically (spec.md §9, Open Question 3).
#[derive(Clone)]
pub struct ReadinessHandle(Arc<ReadinessTracker>);

impl ReadinessHandle {
    pub async fn wait(&self, name: &str, cancel: &CancellationToken) {
        loop {
            if self.0.is_ready(name) {
                return;
            }
            let notified = self.0.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Non-blocking readiness check, used by the `system.health` endpoint.
    pub fn is_ready(&self, name: &str) -> bool {
        self.0.is_ready(name)
    }
}

/// Composes every configured service into one supervision tree behind one
/// bus (spec.md §4.3).
pub struct Operator {
    config: OperatorConfig,
    bus: Arc<dyn BusProvider>,
    internal_bus: Option<Arc<InProcessBus>>,
    tree: SupervisionTree,
    readiness: Arc<ReadinessTracker>,
    readiness_token: Option<bmc_bus::SubscriptionToken>,
    system_tokens: Vec<bmc_bus::SubscriptionToken>,
    service_names: Vec<String>,
    started_at: Instant,
}

impl Operator {
    /// Construct the bus (internal or external per config) and an empty
    /// tree. Fails immediately if neither is configured.
    pub fn new(config: OperatorConfig) -> Result<Self, OperatorError> {
        let mut internal_bus = None;
        let bus: Arc<dyn BusProvider> = match &config.bus {
            BusChoice::Internal => {
                let bus = InProcessBus::new(&config.data_dir);
                internal_bus = Some(bus.clone());
                bus
            }
            BusChoice::External(provider) => provider.clone(),
            BusChoice::None => return Err(OperatorError::NoBusConfigured),
        };
        Ok(Operator {
            config,
            bus,
            internal_bus,
            tree: SupervisionTree::new(),
            readiness: Arc::new(ReadinessTracker::default()),
            readiness_token: None,
            system_tokens: Vec::new(),
            service_names: Vec::new(),
            started_at: Instant::now(),
        })
    }

    /// The bus provider every registered service should be constructed
    /// against.
    pub fn bus(&self) -> Arc<dyn BusProvider> {
        self.bus.clone()
    }

    /// Register a configured service as a `transient` child with the
    /// given shutdown timeout. Services never restart on clean
    /// cancellation but do restart on a fatal exit, bounded by the
    /// operator's escalation policy.
    pub fn add_service(&mut self, service: Arc<dyn Service>, shutdown_timeout: Duration) {
        let name = service.name().to_owned();
        self.service_names.push(name.clone());
        let spec = ChildSpec::new(name, RestartPolicy::Transient).with_shutdown_timeout(shutdown_timeout);
        self.tree.add_child(spec, service);
    }

    /// Obtain a cloneable handle for waiting on readiness events, to be
    /// held by a dependant across the call to `run` (which consumes
    /// `self`).
    pub fn readiness_handle(&self) -> ReadinessHandle {
        ReadinessHandle(self.readiness.clone())
    }

    /// Run every registered service until `cancel` fires or one escalates.
    /// Telemetry init, persistent-id load and mount validation are
    /// recovered from panics and surfaced as `OperatorError::Panic` rather
    /// than unwinding the process (spec.md §4.3).
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), OperatorError> {
        AssertUnwindSafe(self.boot()).catch_unwind().await.map_err(panic_message)??;

        let readiness = self.readiness.clone();
        let token = self.bus.subscribe(
            SubjectPattern::parse("operator.ready.>").expect("static pattern"),
            Arc::new(move |msg: bmc_bus::BusMessage| {
                if let Some(name) = msg.subject.tokens().nth(2) {
                    readiness.mark_ready(name);
                }
            }),
        );
        self.readiness_token = Some(token);

        self.system_tokens = system::register(
            &self.bus,
            &self.config.service_name,
            self.started_at,
            self.service_names.clone(),
            self.readiness_handle(),
        );

        // Stream retention is only meaningful for the bus we own; an
        // externally-supplied provider reaps its own streams on its own
        // schedule.
        let reaper = self
            .internal_bus
            .clone()
            .map(|bus| tokio::spawn(bus.run_reaper(cancel.clone())));

        let tree = std::mem::replace(&mut self.tree, SupervisionTree::new());
        let result = AssertUnwindSafe(tree.run(cancel.clone())).catch_unwind().await.map_err(panic_message)?;

        if let Some(token) = self.readiness_token.take() {
            self.bus.unsubscribe(token);
        }
        for token in self.system_tokens.drain(..) {
            self.bus.unsubscribe(token);
        }
        if let Some(reaper) = reaper {
            let _ = reaper.await;
        }

        result.map_err(OperatorError::from)
    }

    async fn boot(&self) -> Result<(), OperatorError> {
        bmc_telemetry::init_once(&self.config.telemetry);

        let id_dir = self.config.data_dir.join("id");
        let id = bmc_atomicfile::get_or_create_id(&id_dir, &self.config.service_name).await?;
        info!(service = %self.config.service_name, install_id = %id.as_uuid(), "operator booting");

        for mount in &self.config.required_mounts {
            if !mount.exists() {
                warn!(path = %mount.display(), "required mount path is missing; continuing");
            }
        }

        Ok(())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> OperatorError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    OperatorError::Panic(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bmc_core::ExitCause;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ReadyService {
        name: String,
        bus: Arc<dyn BusProvider>,
        started: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Service for ReadyService {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, cancel: CancellationToken) -> Result<(), ExitCause> {
            self.started.store(true, Ordering::SeqCst);
            self.bus
                .publish(
                    &bmc_core::Subject::parse(&format!("operator.ready.{}", self.name)).unwrap(),
                    vec![],
                    vec![],
                )
                .await;
            cancel.cancelled().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn fails_fast_with_no_bus_configured() {
        let config = OperatorConfigBuilder::new("test").no_bus().build();
        let err = Operator::new(config).unwrap_err();
        assert!(matches!(err, OperatorError::NoBusConfigured));
    }

    #[tokio::test]
    async fn registered_service_becomes_ready_and_shuts_down_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = OperatorConfigBuilder::new("test").data_dir(dir.path()).build();
        let mut operator = Operator::new(config).unwrap();
        let started = Arc::new(AtomicBool::new(false));
        let service = Arc::new(ReadyService { name: "probe".into(), bus: operator.bus(), started: started.clone() });
        operator.add_service(service, Duration::from_millis(100));

        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel2.cancel();
        });
        operator.run(cancel).await.unwrap();
        assert!(started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wait_ready_unblocks_once_service_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let config = OperatorConfigBuilder::new("test").data_dir(dir.path()).build();
        let mut operator = Operator::new(config).unwrap();
        let service = Arc::new(ReadyService { name: "probe".into(), bus: operator.bus(), started: Arc::new(AtomicBool::new(false)) });
        operator.add_service(service, Duration::from_millis(100));

        let readiness = operator.readiness_handle();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let run_handle = tokio::spawn(operator.run(cancel));

        let wait_cancel = CancellationToken::new();
        tokio::time::timeout(Duration::from_secs(1), readiness.wait("probe", &wait_cancel))
            .await
            .expect("readiness should fire before the timeout");

        cancel2.cancel();
        run_handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn system_endpoints_report_uptime_and_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let config = OperatorConfigBuilder::new("test").data_dir(dir.path()).build();
        let mut operator = Operator::new(config).unwrap();
        let bus = operator.bus();
        let service =
            Arc::new(ReadyService { name: "probe".into(), bus: bus.clone(), started: Arc::new(AtomicBool::new(false)) });
        operator.add_service(service, Duration::from_millis(100));

        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let run_handle = tokio::spawn(operator.run(cancel));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let info_reply = bus
            .request(&bmc_core::Subject::parse("system.info").unwrap(), vec![], Some(Duration::from_secs(1)))
            .await
            .unwrap();
        let info: serde_json::Value = serde_json::from_slice(&info_reply.payload).unwrap();
        assert!(info["uptime_seconds"].as_f64().unwrap() >= 0.0);
        assert!(info["version"].is_string());

        let health_reply = bus
            .request(&bmc_core::Subject::parse("system.health").unwrap(), vec![], Some(Duration::from_secs(1)))
            .await
            .unwrap();
        let health: serde_json::Value = serde_json::from_slice(&health_reply.payload).unwrap();
        assert_eq!(health["healthy"], serde_json::json!(true));
        assert_eq!(health["services"][0]["name"], serde_json::json!("probe"));
        assert_eq!(health["services"][0]["ready"], serde_json::json!(true));

        cancel2.cancel();
        run_handle.await.unwrap().unwrap();
    }
}
