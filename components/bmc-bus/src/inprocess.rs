use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bmc_core::{deadline::DEFAULT_REQUEST_DEADLINE, Subject, SubjectPattern};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::BusError;
use crate::message::BusMessage;
use crate::provider::{BusProvider, EndpointHandler, SubscribeHandler};
use crate::retention::Retention;
use crate::stream::Stream;
use crate::subscription::SubscriptionToken;

struct Subscriber {
    token: SubscriptionToken,
    pattern: SubjectPattern,
    sender: mpsc::UnboundedSender<BusMessage>,
    task: JoinHandle<()>,
}

struct Endpoint {
    token: SubscriptionToken,
    service_name: String,
    pattern: SubjectPattern,
    handler: EndpointHandler,
}

/// The concrete, in-process implementation of `BusProvider`. The Operator
/// constructs exactly one of these and clones its `Arc` handle out to every
/// registered service -- no network socket is ever opened (spec.md §4.1).
pub struct InProcessBus {
    subscribers: RwLock<Vec<Subscriber>>,
    endpoints: RwLock<Vec<Endpoint>>,
    pub(crate) streams: DashMap<String, Arc<Stream>>,
    stream_dir: PathBuf,
}

impl InProcessBus {
    pub fn new(stream_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(InProcessBus {
            subscribers: RwLock::new(Vec::new()),
            endpoints: RwLock::new(Vec::new()),
            streams: DashMap::new(),
            stream_dir: stream_dir.into(),
        })
    }

    /// Endpoints registered under a service name, for discovery (spec.md
    /// §4.1 "add-endpoint ... for discovery").
    pub fn endpoints_for(&self, service_name: &str) -> Vec<String> {
        self.endpoints
            .read()
            .iter()
            .filter(|e| e.service_name == service_name)
            .map(|e| e.pattern.as_str().to_owned())
            .collect()
    }

    async fn persist_if_matched(&self, msg: &BusMessage) {
        for entry in self.streams.iter() {
            let stream = entry.value();
            if stream.matches(&msg.subject) {
                if let Err(e) = stream
                    .append(msg.subject.as_str(), msg.payload.to_vec(), msg.headers.clone())
                    .await
                {
                    warn!(stream = %stream.name, "failed to persist message: {e}");
                }
            }
        }
    }

    /// Periodically enforces retention on every configured stream. Spawned
    /// once by the Operator alongside the bus.
    pub async fn run_reaper(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    for entry in self.streams.iter() {
                        if let Err(e) = entry.value().enforce_retention().await {
                            warn!("stream retention enforcement failed: {e}");
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BusProvider for InProcessBus {
    async fn publish(&self, subject: &Subject, payload: Vec<u8>, headers: Vec<(String, String)>) {
        let headers: HashMap<String, String> = headers.into_iter().collect();
        let msg = BusMessage {
            subject: subject.clone(),
            payload: payload.into(),
            headers,
            reply_to: None,
        };
        self.persist_if_matched(&msg).await;

        let subs = self.subscribers.read();
        let mut delivered = 0usize;
        for sub in subs.iter() {
            if sub.pattern.matches(subject) {
                if sub.sender.send(msg.clone()).is_err() {
                    trace!(subject = %subject, "subscriber channel closed, dropping");
                } else {
                    delivered += 1;
                }
            }
        }
        trace!(subject = %subject, delivered, "published");
    }

    async fn request(
        &self,
        subject: &Subject,
        payload: Vec<u8>,
        deadline: Option<Duration>,
    ) -> Result<BusMessage, BusError> {
        let deadline = deadline.unwrap_or(DEFAULT_REQUEST_DEADLINE);
        let handler = {
            let endpoints = self.endpoints.read();
            endpoints
                .iter()
                .find(|e| e.pattern.matches(subject))
                .map(|e| e.handler.clone())
        };
        let Some(handler) = handler else {
            return Err(BusError::NoResponders);
        };
        let msg = BusMessage::new(subject.clone(), payload);
        match tokio::time::timeout(deadline, handler(msg)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BusError::Timeout),
        }
    }

    fn subscribe(&self, pattern: SubjectPattern, handler: SubscribeHandler) -> SubscriptionToken {
        let (tx, mut rx) = mpsc::unbounded_channel::<BusMessage>();
        let token = SubscriptionToken::next();
        let task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                handler(msg);
            }
        });
        self.subscribers.write().push(Subscriber {
            token,
            pattern,
            sender: tx,
            task,
        });
        token
    }

    fn add_endpoint(
        &self,
        service_name: &str,
        pattern: SubjectPattern,
        handler: EndpointHandler,
    ) -> SubscriptionToken {
        let token = SubscriptionToken::next();
        self.endpoints.write().push(Endpoint {
            token,
            service_name: service_name.to_owned(),
            pattern,
            handler,
        });
        token
    }

    async fn create_or_update_stream(
        &self,
        name: &str,
        subjects: Vec<SubjectPattern>,
        retention: Retention,
    ) -> Result<(), BusError> {
        if let Some(existing) = self.streams.get(name) {
            existing.reconfigure(subjects, retention);
            return Ok(());
        }
        let stream = Stream::create(&self.stream_dir, name, subjects, retention).await?;
        self.streams.insert(name.to_owned(), stream);
        debug!(stream = name, "stream created");
        Ok(())
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        {
            let mut subs = self.subscribers.write();
            if let Some(idx) = subs.iter().position(|s| s.token == token) {
                let sub = subs.remove(idx);
                sub.task.abort();
            }
        }
        {
            let mut endpoints = self.endpoints.write();
            endpoints.retain(|e| e.token != token);
        }
    }
}
