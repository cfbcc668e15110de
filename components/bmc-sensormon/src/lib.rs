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

//! Periodic hwmon/GPIO/mock sensor reads and hysteresis-guarded threshold
//! evaluation (spec.md §4.6). Forwards temperature readings to the thermal
//! manager; never evaluates thresholds for the thermal manager itself.

pub mod backend;
pub mod config;
pub mod error;
pub mod reading;
pub mod service;
pub mod threshold;
pub mod wire;

pub use config::{SensorConfig, SensorContext, SensorMonConfig, SensorMonConfigBuilder};
pub use error::SensorMonError;
pub use reading::{Reading, ReadingStatus};
pub use service::SensorMonitor;

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_bus::InProcessBus;
    use bmc_core::{Service, Subject};
    use config::{BackendConfig, MockSensorConfig, ThresholdPair};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn spawn_monitor(sensor: SensorConfig) -> (Arc<InProcessBus>, CancellationToken, tokio::task::JoinHandle<()>) {
        let dir = tempfile::tempdir().unwrap();
        let bus: Arc<InProcessBus> = InProcessBus::new(dir.path());
        let config = SensorMonConfigBuilder::new()
            .sensor(sensor)
            .monitoring_interval(Duration::from_millis(20))
            .threshold_check_interval(Duration::from_millis(20))
            .temperature_update_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let monitor = SensorMonitor::new(bus.clone() as Arc<dyn bmc_bus::BusProvider>, config);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _ = monitor.run(run_cancel).await;
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        (bus, cancel, handle)
    }

    #[tokio::test]
    async fn reports_sensor_state_over_the_bus() {
        let sensor = SensorConfig {
            backend: BackendConfig::Mock(MockSensorConfig { base_value: 42.0, sine_amplitude: 0.0, noise: 0.0, ..MockSensorConfig::default() }),
            ..SensorConfig::mock("cpu-temp", SensorContext::Temperature, "C")
        };
        let (bus, cancel, handle) = spawn_monitor(sensor).await;

        let reply = bus
            .request(&Subject::parse("sensormon.sensor.cpu-temp.state").unwrap(), vec![], Some(Duration::from_secs(1)))
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::SensorStateReply> = serde_json::from_slice(&reply.payload).unwrap();
        let state = parsed.unwrap();
        assert_eq!(state.id, "cpu-temp");
        assert!((state.value.unwrap() - 42.0).abs() < 0.01);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn crossing_a_critical_threshold_emits_a_critical_event() {
        let mut sensor = SensorConfig {
            backend: BackendConfig::Mock(MockSensorConfig { base_value: 95.0, sine_amplitude: 0.0, noise: 0.0, ..MockSensorConfig::default() }),
            ..SensorConfig::mock("cpu-temp", SensorContext::Temperature, "C")
        };
        sensor.upper = ThresholdPair { warning: Some(70.0), critical: Some(85.0) };

        let dir = tempfile::tempdir().unwrap();
        let bus: Arc<InProcessBus> = InProcessBus::new(dir.path());
        let config = SensorMonConfigBuilder::new()
            .sensor(sensor)
            .monitoring_interval(Duration::from_millis(20))
            .threshold_check_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let monitor = SensorMonitor::new(bus.clone() as Arc<dyn bmc_bus::BusProvider>, config);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            bmc_core::SubjectPattern::parse("sensormon.cpu-temp.critical").unwrap(),
            Arc::new(move |msg| {
                let _ = tx.send(msg);
            }),
        );

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _ = monitor.run(run_cancel).await;
        });

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(got.is_ok());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn lists_all_configured_sensors() {
        let sensor = SensorConfig::mock("fan0", SensorContext::FanTach, "rpm");
        let (bus, cancel, handle) = spawn_monitor(sensor).await;

        let reply = bus
            .request(&Subject::parse("sensormon.sensors.list").unwrap(), vec![], Some(Duration::from_secs(1)))
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::SensorListReply> = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(parsed.unwrap().sensors.len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
