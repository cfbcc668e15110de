//! On-disk TOML configuration (spec.md §9 "functional options -> plain
//! config struct / small builder" applied to the process entry point):
//! deserialized once at start-up, then translated into every service's
//! own `XxxConfigBuilder`. Unknown keys are rejected at this boundary
//! since there is no compile-time enforcement for data loaded from a
//! file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bmc_core::CoreError;
use bmc_powermgr::{ComponentKind, PowerComponentConfig, PowerMgrConfig, PowerMgrConfigBuilder};
use bmc_sensormon::config::{MockSensorConfig, SensorContext, ThresholdPair};
use bmc_sensormon::{SensorConfig, SensorMonConfig, SensorMonConfigBuilder};
use bmc_statemgr::{StateManagerConfig, StateManagerConfigBuilder};
use bmc_thermalmgr::config::CoolingDeviceConfig;
use bmc_thermalmgr::{ThermalMgrConfig, ThermalMgrConfigBuilder, ZoneConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub operator: OperatorSection,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub chassis: Vec<String>,
    #[serde(default)]
    pub bmcs: Vec<String>,
    #[serde(default)]
    pub power_components: Vec<PowerComponentSection>,
    #[serde(default)]
    pub sensors: Vec<SensorSection>,
    #[serde(default)]
    pub thermal_zones: Vec<ThermalZoneSection>,
    #[serde(default)]
    pub cooling_devices: Vec<String>,
    #[serde(default)]
    pub gateway: GatewaySection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorSection {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    pub otlp_endpoint: Option<String>,
}

impl Default for OperatorSection {
    fn default() -> Self {
        OperatorSection { service_name: default_service_name(), data_dir: default_data_dir(), otlp_endpoint: None }
    }
}

fn default_service_name() -> String {
    "bmcd".to_owned()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/bmcd")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PowerComponentSection {
    pub name: String,
    pub kind: EntityKindSection,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EntityKindSection {
    Host,
    Chassis,
    Bmc,
}

impl From<EntityKindSection> for ComponentKind {
    fn from(kind: EntityKindSection) -> Self {
        match kind {
            EntityKindSection::Host => ComponentKind::Host,
            EntityKindSection::Chassis => ComponentKind::Chassis,
            EntityKindSection::Bmc => ComponentKind::Bmc,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorSection {
    pub id: String,
    #[serde(default = "default_sensor_context")]
    pub context: SensorContextSection,
    #[serde(default = "default_sensor_unit")]
    pub unit: String,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
}

fn default_sensor_context() -> SensorContextSection {
    SensorContextSection::Temperature
}

fn default_sensor_unit() -> String {
    "celsius".to_owned()
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum SensorContextSection {
    Temperature,
    Voltage,
    Current,
    Power,
    FanTach,
}

impl From<SensorContextSection> for SensorContext {
    fn from(context: SensorContextSection) -> Self {
        match context {
            SensorContextSection::Temperature => SensorContext::Temperature,
            SensorContextSection::Voltage => SensorContext::Voltage,
            SensorContextSection::Current => SensorContext::Current,
            SensorContextSection::Power => SensorContext::Power,
            SensorContextSection::FanTach => SensorContext::FanTach,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermalZoneSection {
    pub id: String,
    #[serde(default)]
    pub sensors: Vec<String>,
    #[serde(default)]
    pub devices: Vec<String>,
    pub target_temp: Option<f64>,
    pub warning_temp: Option<f64>,
    pub critical_temp: Option<f64>,
    pub emergency_temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_gateway_addr")]
    pub addr: SocketAddr,
    #[serde(default = "default_redirect_addr")]
    pub redirect_addr: SocketAddr,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    pub acme_directory_url: Option<String>,
    pub web_ui_dir: Option<PathBuf>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        GatewaySection {
            addr: default_gateway_addr(),
            redirect_addr: default_redirect_addr(),
            hostname: default_hostname(),
            acme_directory_url: None,
            web_ui_dir: None,
        }
    }
}

fn default_gateway_addr() -> SocketAddr {
    "0.0.0.0:443".parse().unwrap()
}

fn default_redirect_addr() -> SocketAddr {
    "0.0.0.0:80".parse().unwrap()
}

fn default_hostname() -> String {
    "bmcd.local".to_owned()
}

pub async fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

pub fn statemgr_config(file: &FileConfig) -> Result<StateManagerConfig, ConfigError> {
    let mut builder = StateManagerConfigBuilder::new();
    for host in &file.hosts {
        builder = builder.host(host);
    }
    for chassis in &file.chassis {
        builder = builder.chassis(chassis);
    }
    for bmc in &file.bmcs {
        builder = builder.bmc(bmc);
    }
    Ok(builder.build()?)
}

/// Every power component is constructed against the mock backend: the
/// file format has no way to describe GPIO chip wiring, which is
/// expected to be supplied programmatically by a board-specific embedder
/// rather than hand-typed into this file (spec.md §4.5's GPIO backend is
/// still fully implemented; it's just not reachable from this loader).
pub fn powermgr_config(file: &FileConfig) -> Result<PowerMgrConfig, ConfigError> {
    let mut builder = PowerMgrConfigBuilder::new();
    for component in &file.power_components {
        builder = builder.component(PowerComponentConfig::mock(component.name.clone(), component.kind.into()));
    }
    Ok(builder.build()?)
}

pub fn sensormon_config(file: &FileConfig) -> Result<SensorMonConfig, ConfigError> {
    let mut builder = SensorMonConfigBuilder::new();
    for sensor in &file.sensors {
        let mut config = SensorConfig::mock(sensor.id.clone(), sensor.context.into(), sensor.unit.clone());
        config.upper = ThresholdPair { warning: sensor.warning, critical: sensor.critical };
        builder = builder.sensor(config);
    }
    Ok(builder.build()?)
}

/// Translate this process's mock sensor readings into the mock signal
/// parameters the backend uses internally; kept separate from
/// `sensormon_config` so the defaults stay in one place.
#[allow(dead_code)]
pub fn default_mock_signal() -> MockSensorConfig {
    MockSensorConfig::default()
}

pub fn thermalmgr_config(file: &FileConfig) -> Result<ThermalMgrConfig, ConfigError> {
    let mut builder = ThermalMgrConfigBuilder::new();
    for device_id in &file.cooling_devices {
        builder = builder.device(CoolingDeviceConfig::mock(device_id.clone()));
    }
    for zone in &file.thermal_zones {
        let mut cfg = ZoneConfig::new(zone.id.clone());
        for sensor_id in &zone.sensors {
            cfg = cfg.sensor(sensor_id.clone());
        }
        for device_id in &zone.devices {
            cfg = cfg.device(device_id.clone());
        }
        if let Some(target) = zone.target_temp {
            cfg.target_temp = target;
        }
        if let Some(warning) = zone.warning_temp {
            cfg.warning_temp = warning;
        }
        if let Some(critical) = zone.critical_temp {
            cfg.critical_temp = critical;
        }
        if let Some(emergency) = zone.emergency_temp {
            cfg.emergency_temp = emergency;
        }
        builder = builder.zone(cfg);
    }
    Ok(builder.build()?)
}

pub fn gateway_config(file: &FileConfig) -> Result<bmc_gateway::GatewayConfig, ConfigError> {
    let mut builder = bmc_gateway::GatewayConfig::builder(file.gateway.hostname.clone())
        .addr(file.gateway.addr)
        .redirect_addr(file.gateway.redirect_addr);
    if let Some(directory_url) = &file.gateway.acme_directory_url {
        builder = builder.acme(directory_url.clone(), file.gateway.hostname.clone());
    }
    if let Some(dir) = &file.gateway.web_ui_dir {
        builder = builder.web_ui_dir(dir.clone());
    }
    Ok(builder.build()?)
}

pub fn shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_a_minimal_config_and_builds_every_service_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
            [operator]
            service_name = "bmcd-test"
            data_dir = "/tmp/bmcd-test"

            hosts = ["host-0"]
            chassis = ["chassis-0"]
            bmcs = ["bmc-0"]
            cooling_devices = ["fan0"]

            [[power_components]]
            name = "host-0"
            kind = "host"

            [[sensors]]
            id = "cpu-temp"
            context = "temperature"
            unit = "celsius"
            warning = 70.0
            critical = 85.0

            [[thermal_zones]]
            id = "cpu-zone"
            sensors = ["cpu-temp"]
            devices = ["fan0"]
            target_temp = 55.0

            [gateway]
            hostname = "bmcd.example"
            "#,
        )
        .await
        .unwrap();

        let file_config = load(&path).await.unwrap();
        assert_eq!(file_config.operator.service_name, "bmcd-test");

        statemgr_config(&file_config).unwrap();
        powermgr_config(&file_config).unwrap();
        sensormon_config(&file_config).unwrap();
        thermalmgr_config(&file_config).unwrap();
        gateway_config(&file_config).unwrap();
    }

    #[tokio::test]
    async fn rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "not_a_real_field = true\n").await.unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
