//! Wires configured sensors onto the bus: a periodic read loop bounded by
//! `max-concurrent-reads`, a threshold-evaluation loop with hysteresis, a
//! forwarding loop to the thermal manager, and request/reply endpoints
//! under `sensormon.sensor.{name}.state` / `sensormon.sensors.list`
//! (spec.md §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bmc_bus::{BusMessage, BusProvider};
use bmc_core::{CoreError, ExitCause, Service, Subject, SubjectPattern};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::gpio::GpioSensorBackend;
use crate::backend::hwmon::HwmonBackend;
use crate::backend::mock::MockSensorBackend;
use crate::backend::SensorBackend;
use crate::config::{BackendConfig, SensorConfig, SensorContext, SensorMonConfig, ThresholdPair};
use crate::reading::{Reading, ReadingStatus};
use crate::threshold;
use crate::wire::{
    encode, ReadingEvent, SensorListReply, SensorStateReply, TemperatureUpdate, ThresholdEvent, WireError, WireResult,
};

const STREAM_NAME: &str = "SENSORMON";

struct SensorState {
    config: SensorConfig,
    backend: Arc<dyn SensorBackend>,
    reading: Reading,
    threshold_status: ReadingStatus,
}

pub struct SensorMonitor {
    name: String,
    state: Arc<RwLock<HashMap<String, SensorState>>>,
    config: SensorMonConfig,
    bus: Arc<dyn BusProvider>,
    tokens: Mutex<Vec<bmc_bus::SubscriptionToken>>,
}

impl SensorMonitor {
    pub fn new(bus: Arc<dyn BusProvider>, config: SensorMonConfig) -> Self {
        let mut state = HashMap::new();
        for sensor in &config.sensors {
            let backend: Arc<dyn SensorBackend> = match &sensor.backend {
                BackendConfig::Hwmon(c) => Arc::new(HwmonBackend::new(c.clone())),
                BackendConfig::Gpio(c) => Arc::new(GpioSensorBackend::new(c.clone())),
                BackendConfig::Mock(c) => Arc::new(MockSensorBackend::new(*c)),
            };
            state.insert(
                sensor.id.clone(),
                SensorState {
                    config: sensor.clone(),
                    backend,
                    reading: Reading {
                        sensor_id: sensor.id.clone(),
                        value: None,
                        timestamp: Utc::now(),
                        status: ReadingStatus::Ok,
                    },
                    threshold_status: ReadingStatus::Ok,
                },
            );
        }
        SensorMonitor { name: "sensormon".to_owned(), state: Arc::new(RwLock::new(state)), config, bus, tokens: Mutex::new(Vec::new()) }
    }

    fn register(&self) {
        let mut tokens = self.tokens.lock();

        let state = self.state.clone();
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("sensormon.sensor.*.state").unwrap(),
            Arc::new(move |msg: BusMessage| {
                let state = state.clone();
                Box::pin(async move {
                    let result: WireResult<SensorStateReply> = (|| {
                        let name = msg.subject.tokens().nth(2).ok_or_else(missing_name)?;
                        let guard = state.read();
                        let entry = guard.get(name).ok_or_else(|| WireError::from(CoreError::NotFound(format!("sensor {name:?}"))))?;
                        Ok(reply_for(entry))
                    })();
                    Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
                })
            }),
        ));

        let state = self.state.clone();
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("sensormon.sensors.list").unwrap(),
            Arc::new(move |msg: BusMessage| {
                let state = state.clone();
                Box::pin(async move {
                    let guard = state.read();
                    let sensors = guard.values().map(reply_for).collect();
                    let result: WireResult<SensorListReply> = Ok(SensorListReply { sensors });
                    Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
                })
            }),
        ));
    }

    fn spawn_monitoring_loop(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        let bus = self.bus.clone();
        let interval = self.config.monitoring_interval;
        let sensor_timeout = self.config.sensor_timeout;
        let max_concurrent = self.config.max_concurrent_reads;
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(max_concurrent));
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let ids: Vec<(String, Arc<dyn SensorBackend>)> = state
                    .read()
                    .iter()
                    .filter(|(_, s)| s.config.enabled)
                    .map(|(id, s)| (id.clone(), s.backend.clone()))
                    .collect();

                let mut handles = Vec::with_capacity(ids.len());
                for (id, backend) in ids {
                    let permit = semaphore.clone();
                    let state = state.clone();
                    let bus = bus.clone();
                    handles.push(tokio::spawn(async move {
                        let _permit = permit.acquire_owned().await;
                        let reading = read_one(&id, backend.as_ref(), sensor_timeout).await;
                        publish_reading(&bus, &reading).await;
                        if let Some(entry) = state.write().get_mut(&id) {
                            entry.reading = reading;
                        }
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            }
        })
    }

    fn spawn_threshold_loop(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        let bus = self.bus.clone();
        let interval = self.config.threshold_check_interval;
        let hysteresis_min = self.config.hysteresis_min;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let mut events = Vec::new();
                {
                    let mut guard = state.write();
                    for entry in guard.values_mut() {
                        let Some(value) = entry.reading.value else { continue };
                        let upper = ThresholdPair { warning: entry.config.upper.warning, critical: entry.config.upper.critical };
                        let lower = ThresholdPair { warning: entry.config.lower.warning, critical: entry.config.lower.critical };
                        let next = threshold::evaluate(value, &upper, &lower, entry.threshold_status, hysteresis_min);
                        if next != entry.threshold_status {
                            events.push(ThresholdEvent {
                                sensor_id: entry.config.id.clone(),
                                value: Some(value),
                                previous_status: status_str(entry.threshold_status).to_owned(),
                                status: status_str(next).to_owned(),
                            });
                            entry.threshold_status = next;
                        }
                    }
                }
                for event in events {
                    publish_threshold_event(&bus, &event).await;
                }
            }
        })
    }

    fn spawn_temperature_forward_loop(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        let bus = self.bus.clone();
        let interval = self.config.temperature_update_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let updates: Vec<TemperatureUpdate> = state
                    .read()
                    .values()
                    .filter(|s| s.config.context == SensorContext::Temperature)
                    .filter_map(|s| s.reading.value.map(|v| TemperatureUpdate { sensor_id: s.config.id.clone(), value: v }))
                    .collect();
                for update in updates {
                    let Ok(subject) = Subject::parse(&format!("thermalmgr.sensor.{}.temperature", update.sensor_id)) else { continue };
                    let payload = serde_json::to_vec(&update).unwrap_or_default();
                    bus.publish(&subject, payload, vec![]).await;
                }
            }
        })
    }
}

fn missing_name() -> WireError {
    WireError::from(CoreError::InvalidSubject("missing sensor name".into()))
}

fn status_str(status: ReadingStatus) -> &'static str {
    status.as_str()
}

fn reply_for(entry: &SensorState) -> SensorStateReply {
    SensorStateReply {
        id: entry.config.id.clone(),
        context: entry.config.context.as_str().to_owned(),
        unit: entry.config.unit.clone(),
        value: entry.reading.value,
        status: status_str(entry.reading.status).to_owned(),
        timestamp: entry.reading.timestamp,
    }
}

async fn read_one(id: &str, backend: &dyn SensorBackend, sensor_timeout: std::time::Duration) -> Reading {
    match tokio::time::timeout(sensor_timeout, backend.read()).await {
        Ok(Ok(value)) => Reading { sensor_id: id.to_owned(), value: Some(value), timestamp: Utc::now(), status: ReadingStatus::Ok },
        Ok(Err(e)) => {
            warn!(sensor = %id, "sensor read failed: {e}");
            Reading { sensor_id: id.to_owned(), value: None, timestamp: Utc::now(), status: ReadingStatus::Error }
        }
        Err(_) => {
            warn!(sensor = %id, "sensor read timed out");
            Reading { sensor_id: id.to_owned(), value: None, timestamp: Utc::now(), status: ReadingStatus::Error }
        }
    }
}

async fn publish_reading(bus: &Arc<dyn BusProvider>, reading: &Reading) {
    let Ok(subject) = Subject::parse(&format!("sensormon.{}.reading", reading.sensor_id)) else { return };
    let event = ReadingEvent {
        sensor_id: reading.sensor_id.clone(),
        value: reading.value,
        timestamp: reading.timestamp,
        status: status_str(reading.status).to_owned(),
    };
    let payload = serde_json::to_vec(&event).unwrap_or_default();
    bus.publish(&subject, payload, vec![]).await;
}

async fn publish_threshold_event(bus: &Arc<dyn BusProvider>, event: &ThresholdEvent) {
    let Ok(subject) = Subject::parse(&format!("sensormon.{}.{}", event.sensor_id, event.status)) else { return };
    let payload = serde_json::to_vec(event).unwrap_or_default();
    bus.publish(&subject, payload, vec![]).await;
}

#[async_trait]
impl Service for SensorMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ExitCause> {
        self.bus
            .create_or_update_stream(
                STREAM_NAME,
                vec![
                    SubjectPattern::parse("sensormon.*.reading").unwrap(),
                    SubjectPattern::parse("sensormon.*.warning").unwrap(),
                    SubjectPattern::parse("sensormon.*.critical").unwrap(),
                    SubjectPattern::parse("sensormon.*.error").unwrap(),
                    SubjectPattern::parse("sensormon.*.ok").unwrap(),
                ],
                self.config.retention(),
            )
            .await
            .map_err(|e| ExitCause::Fatal(e.into()))?;

        self.register();

        let monitoring = self.spawn_monitoring_loop(cancel.clone());
        let threshold_check = self.spawn_threshold_loop(cancel.clone());
        let forward = self.spawn_temperature_forward_loop(cancel.clone());

        self.bus.publish(&Subject::parse("operator.ready.sensormon").unwrap(), vec![], vec![]).await;
        info!(sensors = self.state.read().len(), "sensor monitor ready");

        cancel.cancelled().await;

        for token in self.tokens.lock().drain(..) {
            self.bus.unsubscribe(token);
        }
        let _ = tokio::join!(monitoring, threshold_check, forward);
        Ok(())
    }
}
