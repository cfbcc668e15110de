//! The `system.info` / `system.health` endpoints (spec.md §4.8's RPC
//! mapping table; SPEC_FULL.md's supplemented "healthcheck endpoint a
//! BMC always exposes"). The Operator is the only component that already
//! knows every registered service's name and readiness, so it is the
//! natural place to answer these.

use std::sync::Arc;
use std::time::Instant;

use bmc_bus::{BusMessage, BusProvider, EndpointHandler};
use bmc_core::SubjectPattern;
use serde::Serialize;

use crate::ReadinessHandle;

#[derive(Serialize)]
struct SystemInfo {
    version: &'static str,
    uptime_seconds: f64,
}

#[derive(Serialize)]
struct ServiceHealth {
    name: String,
    ready: bool,
}

#[derive(Serialize)]
struct SystemHealth {
    healthy: bool,
    services: Vec<ServiceHealth>,
}

/// Register both endpoints and return their subscription tokens.
pub fn register(
    bus: &Arc<dyn BusProvider>,
    service_name: &str,
    started_at: Instant,
    service_names: Vec<String>,
    readiness: ReadinessHandle,
) -> Vec<bmc_bus::SubscriptionToken> {
    vec![
        bus.add_endpoint(service_name, SubjectPattern::parse("system.info").expect("static pattern"), info_handler(started_at)),
        bus.add_endpoint(
            service_name,
            SubjectPattern::parse("system.health").expect("static pattern"),
            health_handler(service_names, readiness),
        ),
    ]
}

fn info_handler(started_at: Instant) -> EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let info = SystemInfo { version: env!("CARGO_PKG_VERSION"), uptime_seconds: started_at.elapsed().as_secs_f64() };
        Box::pin(async move { Ok(BusMessage::new(msg.subject.clone(), serde_json::to_vec(&info).unwrap_or_default())) })
    })
}

fn health_handler(service_names: Vec<String>, readiness: ReadinessHandle) -> EndpointHandler {
    Arc::new(move |msg: BusMessage| {
        let service_names = service_names.clone();
        let readiness = readiness.clone();
        Box::pin(async move {
            let services: Vec<ServiceHealth> = service_names
                .into_iter()
                .map(|name| {
                    let ready = readiness.is_ready(&name);
                    ServiceHealth { name, ready }
                })
                .collect();
            let healthy = services.iter().all(|s| s.ready);
            let health = SystemHealth { healthy, services };
            Ok(BusMessage::new(msg.subject.clone(), serde_json::to_vec(&health).unwrap_or_default()))
        })
    })
}
