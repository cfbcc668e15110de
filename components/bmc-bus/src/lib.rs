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

//! The local message bus: subject-addressed request/reply, publish/subscribe
//! and persistent streams, all in-process (spec.md §4.1).

pub mod error;
pub mod inprocess;
pub mod message;
pub mod provider;
pub mod retention;
pub mod stream;
pub mod subscription;

pub use error::BusError;
pub use inprocess::InProcessBus;
pub use message::BusMessage;
pub use provider::{BusProvider, EndpointHandler, SubscribeHandler};
pub use retention::Retention;
pub use subscription::SubscriptionToken;

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_core::{Subject, SubjectPattern};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_delivers_to_matching_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let bus = InProcessBus::new(dir.path());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            SubjectPattern::parse("sensormon.*.reading").unwrap(),
            Arc::new(move |msg| {
                let _ = tx.send(msg);
            }),
        );
        bus.publish(
            &Subject::parse("sensormon.cpu-temp.reading").unwrap(),
            b"42".to_vec(),
            vec![],
        )
        .await;
        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&msg.payload[..], b"42");
    }

    #[tokio::test]
    async fn request_with_no_responder_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bus = InProcessBus::new(dir.path());
        let err = bus
            .request(&Subject::parse("sensormon.ghost.state").unwrap(), vec![], None)
            .await
            .unwrap_err();
        assert_eq!(err, BusError::NoResponders);
    }

    #[tokio::test]
    async fn request_dispatches_to_endpoint_and_replies() {
        let dir = tempfile::tempdir().unwrap();
        let bus = InProcessBus::new(dir.path());
        bus.add_endpoint(
            "statemgr",
            SubjectPattern::parse("statemgr.host.*.state").unwrap(),
            Arc::new(|msg| {
                Box::pin(async move {
                    Ok(BusMessage::new(msg.subject.clone(), b"on".to_vec()))
                })
            }),
        );
        let reply = bus
            .request(
                &Subject::parse("statemgr.host.host-0.state").unwrap(),
                vec![],
                None,
            )
            .await
            .unwrap();
        assert_eq!(&reply.payload[..], b"on");
    }

    #[tokio::test]
    async fn streams_persist_matching_messages() {
        let dir = tempfile::tempdir().unwrap();
        let bus = InProcessBus::new(dir.path());
        bus.create_or_update_stream(
            "SENSORMON",
            vec![SubjectPattern::parse("sensormon.>").unwrap()],
            Retention::keep_forever(),
        )
        .await
        .unwrap();
        bus.publish(
            &Subject::parse("sensormon.cpu-temp.reading").unwrap(),
            b"100".to_vec(),
            vec![],
        )
        .await;
        let stream = bus.streams.get("SENSORMON").unwrap().clone();
        let records = stream.read_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "sensormon.cpu-temp.reading");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let bus = InProcessBus::new(dir.path());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<BusMessage>();
        let token = bus.subscribe(
            SubjectPattern::parse("sensormon.*.reading").unwrap(),
            Arc::new(move |msg| {
                let _ = tx.send(msg);
            }),
        );
        bus.unsubscribe(token);
        bus.publish(
            &Subject::parse("sensormon.cpu-temp.reading").unwrap(),
            b"42".to_vec(),
            vec![],
        )
        .await;
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err());
    }
}
