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

//! Zone-scoped PID cooling control loops and emergency escalation
//! (spec.md §4.7). Never actuates power directly; publishes
//! `powermgr.emergency.thermal` and leaves the shutdown decision to the
//! power manager.

pub mod backend;
pub mod config;
pub mod error;
pub mod pid;
pub mod service;
pub mod wire;
pub mod zone;

pub use config::{CoolingDeviceConfig, PidGains, ThermalMgrConfig, ThermalMgrConfigBuilder, ZoneConfig};
pub use error::ThermalMgrError;
pub use service::ThermalManager;
pub use zone::ZoneState;

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_bus::InProcessBus;
    use bmc_core::{Service, Subject};
    use config::CoolingDeviceConfig as DeviceCfg;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn spawn_manager(zone: ZoneConfig, devices: Vec<DeviceCfg>) -> (Arc<InProcessBus>, CancellationToken, tokio::task::JoinHandle<()>) {
        let dir = tempfile::tempdir().unwrap();
        let bus: Arc<InProcessBus> = InProcessBus::new(dir.path());
        let mut builder = ThermalMgrConfigBuilder::new()
            .zone(zone)
            .thermal_control_interval(Duration::from_millis(20))
            .emergency_check_interval(Duration::from_millis(20));
        for device in devices {
            builder = builder.device(device);
        }
        let config = builder.build().unwrap();
        let manager = ThermalManager::new(bus.clone() as Arc<dyn bmc_bus::BusProvider>, config);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _ = manager.run(run_cancel).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        (bus, cancel, handle)
    }

    #[tokio::test]
    async fn control_loop_drives_output_toward_target() {
        let zone = ZoneConfig::new("cpu-zone").sensor("cpu-temp").device("fan0");
        let (bus, cancel, handle) = spawn_manager(zone, vec![DeviceCfg::mock("fan0")]).await;

        bus.publish(
            &Subject::parse("thermalmgr.sensor.cpu-temp.temperature").unwrap(),
            serde_json::to_vec(&wire::TemperatureUpdate { sensor_id: "cpu-temp".into(), value: 80.0 }).unwrap(),
            vec![],
        )
        .await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        let reply = bus
            .request(&Subject::parse("thermalmgr.zone.cpu-zone.state").unwrap(), vec![], Some(Duration::from_secs(1)))
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::ZoneStateReply> = serde_json::from_slice(&reply.payload).unwrap();
        let state = parsed.unwrap();
        assert_eq!(state.state, "warning");
        assert!((state.temperature.unwrap() - 80.0).abs() < 0.01);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn emergency_temperature_triggers_failsafe_and_suspends_pid() {
        let zone = ZoneConfig::new("cpu-zone").sensor("cpu-temp").device("fan0");
        let (bus, cancel, handle) = spawn_manager(zone, vec![DeviceCfg::mock("fan0")]).await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            bmc_core::SubjectPattern::parse("powermgr.emergency.thermal").unwrap(),
            Arc::new(move |msg| {
                let _ = tx.send(msg);
            }),
        );

        bus.publish(
            &Subject::parse("thermalmgr.sensor.cpu-temp.temperature").unwrap(),
            serde_json::to_vec(&wire::TemperatureUpdate { sensor_id: "cpu-temp".into(), value: 99.0 }).unwrap(),
            vec![],
        )
        .await;

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(got.is_ok());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn reconfiguration_resets_integral_without_panicking() {
        let zone = ZoneConfig::new("cpu-zone").sensor("cpu-temp").device("fan0");
        let (bus, cancel, handle) = spawn_manager(zone, vec![DeviceCfg::mock("fan0")]).await;

        let req = wire::ZoneSetRequest { kp: Some(1.5), ki: Some(0.2), kd: None, target_temp: Some(55.0) };
        let reply = bus
            .request(
                &Subject::parse("thermalmgr.zone.cpu-zone.set").unwrap(),
                serde_json::to_vec(&req).unwrap(),
                Some(Duration::from_secs(1)),
            )
            .await
            .unwrap();
        let parsed: wire::WireResult<wire::ZoneStateReply> = serde_json::from_slice(&reply.payload).unwrap();
        assert!(parsed.is_ok());

        cancel.cancel();
        handle.await.unwrap();
    }
}
