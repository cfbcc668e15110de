//! The "connection provider" from spec.md §4.1: an in-process handle
//! additional services can clone to attach to the bus without opening a
//! network socket. Either the Operator owns one concrete `InProcessBus` and
//! hands out its provider, or the embedder supplies an external one -- never
//! both (enforced by `bmc-operator`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bmc_core::{Subject, SubjectPattern};

use crate::error::BusError;
use crate::message::BusMessage;
use crate::retention::Retention;
use crate::subscription::SubscriptionToken;

pub type EndpointHandler =
    Arc<dyn Fn(BusMessage) -> Pin<Box<dyn Future<Output = Result<BusMessage, BusError>> + Send>> + Send + Sync>;

pub type SubscribeHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// The operations every bus-attached service depends on. Implemented by
/// `InProcessBus`; test doubles can implement it directly.
#[async_trait]
pub trait BusProvider: Send + Sync {
    async fn publish(&self, subject: &Subject, payload: Vec<u8>, headers: Vec<(String, String)>);

    async fn request(
        &self,
        subject: &Subject,
        payload: Vec<u8>,
        deadline: Option<Duration>,
    ) -> Result<BusMessage, BusError>;

    fn subscribe(&self, pattern: SubjectPattern, handler: SubscribeHandler) -> SubscriptionToken;

    fn add_endpoint(
        &self,
        service_name: &str,
        pattern: SubjectPattern,
        handler: EndpointHandler,
    ) -> SubscriptionToken;

    async fn create_or_update_stream(
        &self,
        name: &str,
        subjects: Vec<SubjectPattern>,
        retention: Retention,
    ) -> Result<(), BusError>;

    fn unsubscribe(&self, token: SubscriptionToken);
}
