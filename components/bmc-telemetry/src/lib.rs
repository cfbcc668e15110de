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

//! Process-wide telemetry init, out of scope as a feature (spec.md §1) but
//! required as an ambient concern everywhere else (spec.md §9 "Telemetry
//! abstraction"). The core must compile and run with no backend
//! configured, so every real backend sits behind `Telemetry` with a
//! no-op default.

use std::sync::Once;

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry exporter error: {0}")]
    Exporter(String),
}

/// Configuration for process-wide telemetry init. Construction is
/// idempotent at the call site (`init_once`), matching spec.md §4.3
/// "Initialises process-wide telemetry once (idempotent)".
#[derive(Clone, Debug, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
}

static INIT: Once = Once::new();

/// Initialise the global `tracing` subscriber exactly once per process.
/// Safe to call from every service's constructor; only the first call
/// takes effect.
pub fn init_once(config: &TelemetryConfig) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter).with(fmt::layer().compact());
        registry.init();
        tracing::info!(service = %config.service_name, "telemetry initialised");
    });
}

/// Abstraction over telemetry backends so the core compiles and runs with
/// none configured (spec.md §9). `NoopTelemetry` is the default; a real
/// deployment can attach `OtlpTelemetry`, which is out of scope for this
/// spec beyond "it exists and is pluggable".
pub trait Telemetry: Send + Sync {
    fn record_event(&self, name: &str, attributes: &[(&str, &str)]);
}

#[derive(Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record_event(&self, _name: &str, _attributes: &[(&str, &str)]) {}
}

pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record_event(&self, name: &str, attributes: &[(&str, &str)]) {
        tracing::info!(event = name, ?attributes, "telemetry event");
    }
}
