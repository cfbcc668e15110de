//! Wires configured zones and cooling devices onto the bus: a PID control
//! loop per zone at `thermal-control-interval`, an emergency-temperature
//! scan at `emergency-check-interval`, a subscription that ingests
//! forwarded sensor temperatures, and request/reply endpoints under
//! `thermalmgr.zone.{id}.{state,set}` (spec.md §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bmc_bus::{BusMessage, BusProvider};
use bmc_core::{CoreError, ExitCause, Service, Subject, SubjectPattern};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{CoolingBackend, HwmonCoolingBackend, MockCoolingBackend};
use crate::config::{CoolingBackendKind, CoolingDeviceConfig, ThermalMgrConfig, ZoneConfig};
use crate::error::ThermalMgrError;
use crate::pid::Pid;
use crate::wire::{
    encode, EmergencyThermalEvent, TemperatureUpdate, WireError, WireResult, ZoneOutputEvent, ZoneSetRequest,
    ZoneStateReply,
};
use crate::zone::ZoneState;

const STREAM_NAME: &str = "THERMALMGR";

struct ZoneRuntime {
    config: ZoneConfig,
    pid: Pid,
    target_temp: f64,
    state: ZoneState,
    last_temperature: Option<f64>,
    suspended: bool,
}

pub struct ThermalManager {
    name: String,
    zones: Arc<Mutex<HashMap<String, ZoneRuntime>>>,
    devices: HashMap<String, (CoolingDeviceConfig, Arc<dyn CoolingBackend>)>,
    sensor_readings: Arc<RwLock<HashMap<String, f64>>>,
    bus: Arc<dyn BusProvider>,
    config: ThermalMgrConfig,
    tokens: Mutex<Vec<bmc_bus::SubscriptionToken>>,
}

impl ThermalManager {
    pub fn new(bus: Arc<dyn BusProvider>, config: ThermalMgrConfig) -> Self {
        let mut devices = HashMap::new();
        for device_cfg in &config.devices {
            let backend: Arc<dyn CoolingBackend> = match device_cfg.backend {
                CoolingBackendKind::Hwmon => Arc::new(HwmonCoolingBackend::new()),
                CoolingBackendKind::Mock => Arc::new(MockCoolingBackend::new()),
            };
            devices.insert(device_cfg.id.clone(), (device_cfg.clone(), backend));
        }

        let mut zones = HashMap::new();
        for zone_cfg in &config.zones {
            let state = if zone_cfg.enabled { ZoneState::Normal } else { ZoneState::Disabled };
            zones.insert(
                zone_cfg.id.clone(),
                ZoneRuntime {
                    pid: Pid::new(zone_cfg.gains, zone_cfg.output_min, zone_cfg.output_max),
                    target_temp: zone_cfg.target_temp,
                    state,
                    last_temperature: None,
                    suspended: false,
                    config: zone_cfg.clone(),
                },
            );
        }

        ThermalManager {
            name: "thermalmgr".to_owned(),
            zones: Arc::new(Mutex::new(zones)),
            devices,
            sensor_readings: Arc::new(RwLock::new(HashMap::new())),
            bus,
            config,
            tokens: Mutex::new(Vec::new()),
        }
    }

    fn register(&self) {
        let mut tokens = self.tokens.lock();

        let zones = self.zones.clone();
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("thermalmgr.zone.*.state").unwrap(),
            Arc::new(move |msg: BusMessage| {
                let zones = zones.clone();
                Box::pin(async move {
                    let result: WireResult<ZoneStateReply> = (|| {
                        let name = msg.subject.tokens().nth(2).ok_or_else(missing_name)?;
                        let zones = zones.lock();
                        let rt = zones.get(name).ok_or_else(|| WireError::from(CoreError::NotFound(format!("zone {name:?}"))))?;
                        Ok(ZoneStateReply { id: name.to_owned(), state: rt.state.as_str().to_owned(), temperature: rt.last_temperature })
                    })();
                    Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
                })
            }),
        ));

        let zones = self.zones.clone();
        tokens.push(self.bus.add_endpoint(
            &self.name,
            SubjectPattern::parse("thermalmgr.zone.*.set").unwrap(),
            Arc::new(move |msg: BusMessage| {
                let zones = zones.clone();
                Box::pin(async move {
                    let result: WireResult<ZoneStateReply> = (|| {
                        let name = msg.subject.tokens().nth(2).ok_or_else(missing_name)?;
                        let req: ZoneSetRequest = serde_json::from_slice(&msg.payload)
                            .map_err(|e| WireError::from(CoreError::InvalidArgument(e.to_string())))?;
                        let mut zones = zones.lock();
                        let rt = zones
                            .get_mut(name)
                            .ok_or_else(|| WireError::from(CoreError::NotFound(format!("zone {name:?}"))))?;
                        apply_zone_set(rt, req);
                        Ok(ZoneStateReply { id: name.to_owned(), state: rt.state.as_str().to_owned(), temperature: rt.last_temperature })
                    })();
                    Ok(BusMessage::new(msg.subject.clone(), encode(&result)))
                })
            }),
        ));

        let sensor_readings = self.sensor_readings.clone();
        tokens.push(self.bus.subscribe(
            SubjectPattern::parse("thermalmgr.sensor.*.temperature").unwrap(),
            Arc::new(move |msg: BusMessage| {
                let Ok(update) = serde_json::from_slice::<TemperatureUpdate>(&msg.payload) else { return };
                sensor_readings.write().insert(update.sensor_id, update.value);
            }),
        ));
    }

    fn spawn_control_loop(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let zones = self.zones.clone();
        let sensor_readings = self.sensor_readings.clone();
        let devices = self.devices.iter().map(|(k, (cfg, backend))| (k.clone(), (cfg.clone(), backend.clone()))).collect::<HashMap<_, _>>();
        let bus = self.bus.clone();
        let interval = self.config.thermal_control_interval;
        let hysteresis_min = self.config.hysteresis_min;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let dt_secs = interval.as_secs_f64();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let updates: Vec<(String, f64, f64, Vec<String>)> = {
                    let readings = sensor_readings.read();
                    let mut zones = zones.lock();
                    let mut out = Vec::new();
                    for (id, rt) in zones.iter_mut() {
                        if !rt.config.enabled || rt.suspended {
                            continue;
                        }
                        let mut temps = rt.config.sensor_ids.iter().filter_map(|sid| readings.get(sid).copied());
                        let Some(first) = temps.next() else { continue };
                        let max_temp = temps.fold(first, f64::max);

                        let output = rt.pid.update(max_temp, rt.target_temp, dt_secs);
                        rt.last_temperature = Some(max_temp);
                        rt.state = crate::zone::evaluate(
                            max_temp,
                            rt.config.warning_temp,
                            rt.config.critical_temp,
                            rt.config.emergency_temp,
                            rt.state,
                            hysteresis_min,
                        );
                        out.push((id.clone(), output, max_temp, rt.config.device_ids.clone()));
                    }
                    out
                };

                for (id, output, temp, device_ids) in updates {
                    for device_id in &device_ids {
                        if let Some((cfg, backend)) = devices.get(device_id) {
                            if let Err(e) = backend.set_level(cfg, output).await {
                                warn!(zone = %id, device = %device_id, "cooling actuation failed: {e}");
                            }
                        }
                    }
                    publish_output_event(&bus, &id, output, temp).await;
                }
            }
        })
    }

    fn spawn_emergency_loop(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let zones = self.zones.clone();
        let devices = self.devices.iter().map(|(k, (cfg, backend))| (k.clone(), (cfg.clone(), backend.clone()))).collect::<HashMap<_, _>>();
        let bus = self.bus.clone();
        let interval = self.config.emergency_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let actions: Vec<(String, f64, Vec<String>, f64)> = {
                    let mut zones = zones.lock();
                    let mut out = Vec::new();
                    for (id, rt) in zones.iter_mut() {
                        if !rt.config.enabled {
                            continue;
                        }
                        let Some(temp) = rt.last_temperature else { continue };
                        if temp >= rt.config.emergency_temp && !rt.suspended {
                            rt.suspended = true;
                            out.push((id.clone(), rt.config.failsafe_cooling_level, rt.config.device_ids.clone(), temp));
                        } else if rt.suspended && temp < rt.config.critical_temp {
                            rt.suspended = false;
                            info!(zone = %id, "pid control resumed, zone recovered below critical-temp");
                        }
                    }
                    out
                };

                for (id, level, device_ids, temp) in actions {
                    warn!(zone = %id, temperature = temp, "emergency temperature reached, applying failsafe cooling");
                    for device_id in &device_ids {
                        if let Some((cfg, backend)) = devices.get(device_id) {
                            if let Err(e) = backend.set_level(cfg, level).await {
                                warn!(zone = %id, device = %device_id, "failsafe actuation failed: {e}");
                            }
                        }
                    }
                    publish_emergency_event(&bus, &id, temp).await;
                }
            }
        })
    }
}

fn missing_name() -> WireError {
    WireError::from(CoreError::InvalidSubject("missing zone name".into()))
}

fn apply_zone_set(rt: &mut ZoneRuntime, req: ZoneSetRequest) {
    let mut gains = rt.pid.gains();
    if let Some(kp) = req.kp {
        gains.kp = kp;
    }
    if let Some(ki) = req.ki {
        gains.ki = ki;
    }
    if let Some(kd) = req.kd {
        gains.kd = kd;
    }
    rt.pid.set_gains(gains);
    if let Some(target) = req.target_temp {
        rt.target_temp = target;
    }
}

async fn publish_output_event(bus: &Arc<dyn BusProvider>, id: &str, output: f64, temperature: f64) {
    let Ok(subject) = Subject::parse(&format!("thermalmgr.zone.{id}.output")) else { return };
    let event = ZoneOutputEvent { id: id.to_owned(), output, temperature };
    let payload = serde_json::to_vec(&event).unwrap_or_default();
    bus.publish(&subject, payload, vec![]).await;
}

async fn publish_emergency_event(bus: &Arc<dyn BusProvider>, zone: &str, temperature: f64) {
    let Ok(subject) = Subject::parse("powermgr.emergency.thermal") else { return };
    let event = EmergencyThermalEvent { zone: zone.to_owned(), temperature, action: "emergency_shutdown".to_owned() };
    let payload = serde_json::to_vec(&event).unwrap_or_default();
    bus.publish(&subject, payload, vec![]).await;
}

#[async_trait]
impl Service for ThermalManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ExitCause> {
        self.bus
            .create_or_update_stream(
                STREAM_NAME,
                vec![SubjectPattern::parse("thermalmgr.zone.*.output").unwrap()],
                bmc_bus::Retention::bounded(std::time::Duration::from_secs(3600), 16 * 1024 * 1024, 100_000),
            )
            .await
            .map_err(|e| ExitCause::Fatal(e.into()))?;

        self.register();

        let control = self.spawn_control_loop(cancel.clone());
        let emergency = self.spawn_emergency_loop(cancel.clone());

        self.bus.publish(&Subject::parse("operator.ready.thermalmgr").unwrap(), vec![], vec![]).await;
        info!(zones = self.zones.lock().len(), "thermal manager ready");

        cancel.cancelled().await;

        for token in self.tokens.lock().drain(..) {
            self.bus.unsubscribe(token);
        }
        let _ = tokio::join!(control, emergency);
        Ok(())
    }
}
