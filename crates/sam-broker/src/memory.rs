// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sam_types::{SamError, UserProperties};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::{topic_matches, BrokerAdapter, IncomingMessage, MessageHandle, Subscription};

struct Subscriber {
    pattern: String,
    sender: mpsc::UnboundedSender<IncomingMessage>,
}

/// An in-process `BrokerAdapter` with no real transport: used by
/// `sam-testing` doubles and by integration tests exercising the turn
/// algorithm end to end without a real message broker. Delivery is
/// synchronous and in-order per topic, matching the spec's QoS-1
/// no-reorder-within-a-topic guarantee trivially (there's only one
/// process).
pub struct InMemoryBroker {
    subscribers: Mutex<Vec<Subscriber>>,
    settled: Mutex<HashSet<u64>>,
    next_handle: AtomicU64,
    /// Counts down on each `publish` call while nonzero, failing with
    /// `SamError::Transport` instead of delivering — used by tests
    /// exercising retry/backoff paths and retry-budget exhaustion.
    fail_remaining_publishes: AtomicU32,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            settled: Mutex::new(HashSet::new()),
            next_handle: AtomicU64::new(1),
            fail_remaining_publishes: AtomicU32::new(0),
        }
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: make the next `publish` call return a `Transport` error.
    pub fn inject_publish_failure(&self) {
        self.fail_remaining_publishes.store(1, Ordering::SeqCst);
    }

    /// Test hook: make the next `n` `publish` calls return a `Transport`
    /// error, e.g. to drive a retry loop past its budget.
    pub fn inject_publish_failures(&self, n: u32) {
        self.fail_remaining_publishes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerAdapter for InMemoryBroker {
    async fn subscribe(&self, topic_pattern: &str) -> Result<Subscription, SamError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber { pattern: topic_pattern.to_string(), sender: tx });
        trace!(pattern = %topic_pattern, "subscribed");
        Ok(rx)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        user_properties: UserProperties,
    ) -> Result<(), SamError> {
        let remaining = self.fail_remaining_publishes.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_remaining_publishes
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(SamError::Transport(format!("injected failure publishing to {topic}")));
        }

        let handle_id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let subscribers = self.subscribers.lock().unwrap();
        let mut delivered = 0;
        for sub in subscribers.iter() {
            if topic_matches(&sub.pattern, topic) {
                let msg = IncomingMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                    user_properties: user_properties.clone(),
                    handle: MessageHandle(handle_id),
                };
                if sub.sender.send(msg).is_err() {
                    warn!(topic, "subscriber channel closed, dropping delivery");
                } else {
                    delivered += 1;
                }
            }
        }
        trace!(topic, delivered, "published");
        Ok(())
    }

    async fn acknowledge(&self, handle: MessageHandle) -> Result<(), SamError> {
        let mut settled = self.settled.lock().unwrap();
        if !settled.insert(handle.0) {
            return Err(SamError::Transport(format!(
                "message handle {:?} already settled",
                handle
            )));
        }
        Ok(())
    }

    async fn negative_acknowledge(&self, handle: MessageHandle) -> Result<(), SamError> {
        let mut settled = self.settled.lock().unwrap();
        if !settled.insert(handle.0) {
            return Err(SamError::Transport(format!(
                "message handle {:?} already settled",
                handle
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sam_types::topics;

    #[tokio::test]
    async fn publish_delivers_to_matching_subscriber() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe(&topics::request("acme", "math")).await.unwrap();
        broker
            .publish(&topics::request("acme", "math"), serde_json::json!({"hello": "world"}), UserProperties::default())
            .await
            .unwrap();
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.payload["hello"], "world");
    }

    #[tokio::test]
    async fn publish_does_not_deliver_to_non_matching_subscriber() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe(&topics::request("acme", "research")).await.unwrap();
        broker
            .publish(&topics::request("acme", "math"), serde_json::json!({}), UserProperties::default())
            .await
            .unwrap();
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn wildcard_subscription_receives_responses_for_any_sub_task() {
        let broker = InMemoryBroker::new();
        let mut sub = broker
            .subscribe(&format!("acme/a2a/v1/agent/response/math/{}", ">"))
            .await
            .unwrap();
        broker
            .publish(&topics::response("acme", "math", "sub-1"), serde_json::json!({}), UserProperties::default())
            .await
            .unwrap();
        broker
            .publish(&topics::response("acme", "math", "sub-2"), serde_json::json!({}), UserProperties::default())
            .await
            .unwrap();
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn settlement_occurs_exactly_once() {
        let broker = InMemoryBroker::new();
        broker.acknowledge(MessageHandle(1)).await.unwrap();
        let err = broker.acknowledge(MessageHandle(1)).await.unwrap_err();
        assert!(matches!(err, SamError::Transport(_)));
    }

    #[tokio::test]
    async fn injected_failure_surfaces_transport_error_once() {
        let broker = InMemoryBroker::new();
        broker.inject_publish_failure();
        let err = broker
            .publish("acme/a2a/v1/agent/request/math", serde_json::json!({}), UserProperties::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SamError::Transport(_)));

        // second attempt succeeds
        broker
            .publish("acme/a2a/v1/agent/request/math", serde_json::json!({}), UserProperties::default())
            .await
            .unwrap();
    }
}
