//! Construction-time configuration for the sensor monitor (spec.md §4.6,
//! §4.8 "every service is constructed via an options builder").

use std::collections::HashSet;
use std::time::Duration;

use bmc_core::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum SensorContext {
    Temperature,
    Voltage,
    Current,
    Power,
    FanTach,
}

impl SensorContext {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorContext::Temperature => "temperature",
            SensorContext::Voltage => "voltage",
            SensorContext::Current => "current",
            SensorContext::Power => "power",
            SensorContext::FanTach => "fan-tach",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Hwmon,
    Gpio,
    Mock,
}

/// `{warning, critical}` thresholds on one side of a sensor's range
/// (spec.md §3 "Sensor definition").
#[derive(Clone, Copy, Debug, Default)]
pub struct ThresholdPair {
    pub warning: Option<f64>,
    pub critical: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct HwmonConfig {
    /// Glob matched against `/sys/class/hwmon/*/name` to find the chip,
    /// e.g. `coretemp*` (spec.md §4.6 "discover via /sys/class/hwmon/*").
    pub chip_name_pattern: String,
    /// Glob matched against files inside the chip directory, e.g.
    /// `temp1_input`.
    pub input_file_pattern: String,
}

#[derive(Clone, Debug)]
pub struct GpioSensorConfig {
    pub chip: String,
    pub line: u32,
}

impl GpioSensorConfig {
    pub fn new(chip: impl Into<String>, line: u32) -> Self {
        GpioSensorConfig { chip: chip.into(), line }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MockSensorConfig {
    pub base_value: f64,
    pub sine_amplitude: f64,
    pub sine_period: Duration,
    pub noise: f64,
    /// Probability in `[0, 1]` that a given read fails outright, simulating
    /// a flaky backend (spec.md §4.6 "optional probabilistic failure
    /// injection").
    pub failure_probability: f64,
}

impl Default for MockSensorConfig {
    fn default() -> Self {
        MockSensorConfig {
            base_value: 40.0,
            sine_amplitude: 2.0,
            sine_period: Duration::from_secs(60),
            noise: 0.2,
            failure_probability: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub enum BackendConfig {
    Hwmon(HwmonConfig),
    Gpio(GpioSensorConfig),
    Mock(MockSensorConfig),
}

#[derive(Clone, Debug)]
pub struct SensorConfig {
    pub id: String,
    pub context: SensorContext,
    pub unit: String,
    pub location: String,
    pub backend: BackendConfig,
    pub upper: ThresholdPair,
    pub lower: ThresholdPair,
    pub enabled: bool,
}

impl SensorConfig {
    pub fn mock(id: impl Into<String>, context: SensorContext, unit: impl Into<String>) -> Self {
        SensorConfig {
            id: id.into(),
            context,
            unit: unit.into(),
            location: String::new(),
            backend: BackendConfig::Mock(MockSensorConfig::default()),
            upper: ThresholdPair::default(),
            lower: ThresholdPair::default(),
            enabled: true,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        match self.backend {
            BackendConfig::Hwmon(_) => BackendKind::Hwmon,
            BackendConfig::Gpio(_) => BackendKind::Gpio,
            BackendConfig::Mock(_) => BackendKind::Mock,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SensorMonConfig {
    pub sensors: Vec<SensorConfig>,
    pub monitoring_interval: Duration,
    pub max_concurrent_reads: usize,
    pub sensor_timeout: Duration,
    pub threshold_check_interval: Duration,
    pub temperature_update_interval: Duration,
    /// Minimum hysteresis margin applied regardless of the 1%-of-range
    /// default (spec.md §4.6 "min 0.5 units").
    pub hysteresis_min: f64,
    /// Retention for the readings/threshold-event stream; `None` or zero
    /// means keep forever.
    pub reading_retention: Option<Duration>,
}

impl Default for SensorMonConfig {
    fn default() -> Self {
        SensorMonConfig {
            sensors: Vec::new(),
            monitoring_interval: Duration::from_secs(2),
            max_concurrent_reads: 8,
            sensor_timeout: Duration::from_secs(1),
            threshold_check_interval: Duration::from_secs(2),
            temperature_update_interval: Duration::from_secs(2),
            hysteresis_min: 0.5,
            reading_retention: Some(Duration::from_secs(3600)),
        }
    }
}

impl SensorMonConfig {
    pub fn retention(&self) -> bmc_bus::Retention {
        match self.reading_retention {
            Some(d) if d > Duration::ZERO => bmc_bus::Retention { max_age: Some(d), max_bytes: None, max_messages: None },
            _ => bmc_bus::Retention::keep_forever(),
        }
    }
}

#[derive(Default)]
pub struct SensorMonConfigBuilder {
    config: SensorMonConfig,
}

impl SensorMonConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sensor(mut self, sensor: SensorConfig) -> Self {
        self.config.sensors.push(sensor);
        self
    }

    pub fn monitoring_interval(mut self, interval: Duration) -> Self {
        self.config.monitoring_interval = interval;
        self
    }

    pub fn max_concurrent_reads(mut self, max: usize) -> Self {
        self.config.max_concurrent_reads = max;
        self
    }

    pub fn sensor_timeout(mut self, timeout: Duration) -> Self {
        self.config.sensor_timeout = timeout;
        self
    }

    pub fn threshold_check_interval(mut self, interval: Duration) -> Self {
        self.config.threshold_check_interval = interval;
        self
    }

    pub fn temperature_update_interval(mut self, interval: Duration) -> Self {
        self.config.temperature_update_interval = interval;
        self
    }

    pub fn reading_retention(mut self, retention: Duration) -> Self {
        self.config.reading_retention = Some(retention);
        self
    }

    pub fn build(self) -> Result<SensorMonConfig, CoreError> {
        let mut seen = HashSet::new();
        for sensor in &self.config.sensors {
            bmc_core::subject::validate_token(&sensor.id)
                .map_err(|_| CoreError::InvalidConfiguration(format!("invalid sensor id {:?}", sensor.id)))?;
            if !seen.insert(sensor.id.clone()) {
                return Err(CoreError::InvalidConfiguration(format!("duplicate sensor id {:?}", sensor.id)));
            }
            if let BackendConfig::Gpio(_) = sensor.backend {
                if sensor.unit.is_empty() {
                    return Err(CoreError::InvalidConfiguration(format!(
                        "sensor {:?} must declare a unit",
                        sensor.id
                    )));
                }
            }
        }
        if self.config.max_concurrent_reads == 0 {
            return Err(CoreError::InvalidConfiguration("max-concurrent-reads must be at least 1".to_owned()));
        }
        Ok(self.config)
    }
}
