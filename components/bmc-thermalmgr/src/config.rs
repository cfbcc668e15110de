//! Construction-time configuration for the thermal manager (spec.md §4.7,
//! §4.8 "every service is constructed via an options builder").

use std::collections::HashSet;
use std::time::Duration;

use bmc_core::CoreError;

#[derive(Clone, Copy, Debug)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Clone, Debug)]
pub struct ZoneConfig {
    pub id: String,
    pub sensor_ids: Vec<String>,
    pub device_ids: Vec<String>,
    pub target_temp: f64,
    pub warning_temp: f64,
    pub critical_temp: f64,
    pub emergency_temp: f64,
    pub gains: PidGains,
    pub output_min: f64,
    pub output_max: f64,
    /// Cooling level written to every device in the zone once
    /// `emergency-temp` is crossed (spec.md §4.7, "typically 100%").
    pub failsafe_cooling_level: f64,
    pub enabled: bool,
}

impl ZoneConfig {
    pub fn new(id: impl Into<String>) -> Self {
        ZoneConfig {
            id: id.into(),
            sensor_ids: Vec::new(),
            device_ids: Vec::new(),
            target_temp: 60.0,
            warning_temp: 70.0,
            critical_temp: 85.0,
            emergency_temp: 95.0,
            gains: PidGains { kp: 2.0, ki: 0.1, kd: 0.05 },
            output_min: 0.0,
            output_max: 100.0,
            failsafe_cooling_level: 100.0,
            enabled: true,
        }
    }

    pub fn sensor(mut self, id: impl Into<String>) -> Self {
        self.sensor_ids.push(id.into());
        self
    }

    pub fn device(mut self, id: impl Into<String>) -> Self {
        self.device_ids.push(id.into());
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub enum CoolingBackendKind {
    Hwmon,
    Mock,
}

#[derive(Clone, Debug)]
pub struct CoolingDeviceConfig {
    pub id: String,
    pub backend: CoolingBackendKind,
    /// hwmon backend only: sysfs path to the `pwmN` control file.
    pub pwm_path: Option<String>,
}

impl CoolingDeviceConfig {
    pub fn mock(id: impl Into<String>) -> Self {
        CoolingDeviceConfig { id: id.into(), backend: CoolingBackendKind::Mock, pwm_path: None }
    }

    pub fn hwmon(id: impl Into<String>, pwm_path: impl Into<String>) -> Self {
        CoolingDeviceConfig { id: id.into(), backend: CoolingBackendKind::Hwmon, pwm_path: Some(pwm_path.into()) }
    }
}

#[derive(Clone, Debug)]
pub struct ThermalMgrConfig {
    pub zones: Vec<ZoneConfig>,
    pub devices: Vec<CoolingDeviceConfig>,
    pub thermal_control_interval: Duration,
    pub emergency_check_interval: Duration,
    pub hysteresis_min: f64,
}

impl Default for ThermalMgrConfig {
    fn default() -> Self {
        ThermalMgrConfig {
            zones: Vec::new(),
            devices: Vec::new(),
            thermal_control_interval: Duration::from_secs(1),
            emergency_check_interval: Duration::from_secs(1),
            hysteresis_min: 0.5,
        }
    }
}

#[derive(Default)]
pub struct ThermalMgrConfigBuilder {
    config: ThermalMgrConfig,
}

impl ThermalMgrConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone(mut self, zone: ZoneConfig) -> Self {
        self.config.zones.push(zone);
        self
    }

    pub fn device(mut self, device: CoolingDeviceConfig) -> Self {
        self.config.devices.push(device);
        self
    }

    pub fn thermal_control_interval(mut self, interval: Duration) -> Self {
        self.config.thermal_control_interval = interval;
        self
    }

    pub fn emergency_check_interval(mut self, interval: Duration) -> Self {
        self.config.emergency_check_interval = interval;
        self
    }

    pub fn build(self) -> Result<ThermalMgrConfig, CoreError> {
        let mut seen_zones = HashSet::new();
        let mut seen_devices = HashSet::new();
        for device in &self.config.devices {
            bmc_core::subject::validate_token(&device.id)
                .map_err(|_| CoreError::InvalidConfiguration(format!("invalid device id {:?}", device.id)))?;
            if !seen_devices.insert(device.id.clone()) {
                return Err(CoreError::InvalidConfiguration(format!("duplicate device id {:?}", device.id)));
            }
        }
        for zone in &self.config.zones {
            bmc_core::subject::validate_token(&zone.id)
                .map_err(|_| CoreError::InvalidConfiguration(format!("invalid zone id {:?}", zone.id)))?;
            if !seen_zones.insert(zone.id.clone()) {
                return Err(CoreError::InvalidConfiguration(format!("duplicate zone id {:?}", zone.id)));
            }
            if zone.warning_temp > zone.critical_temp || zone.critical_temp > zone.emergency_temp {
                return Err(CoreError::InvalidConfiguration(format!(
                    "zone {:?} thresholds must satisfy warning <= critical <= emergency",
                    zone.id
                )));
            }
            for device_id in &zone.device_ids {
                if !seen_devices.contains(device_id) {
                    return Err(CoreError::InvalidConfiguration(format!(
                        "zone {:?} references unknown device {:?}",
                        zone.id, device_id
                    )));
                }
            }
        }
        if self.config.zones.is_empty() {
            tracing::warn!("thermal manager configured with zero zones");
        }
        Ok(self.config)
    }
}
