// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use sam_types::{SamError, UserProperties};

/// A message delivered to a subscriber, carrying its own settlement
/// handle. Settlement (ack/nack) must occur exactly once per received
/// message (spec §4.1).
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    pub user_properties: UserProperties,
    pub handle: MessageHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub u64);

/// A live registration created by [`BrokerAdapter::subscribe`]. Dropping
/// it does not automatically unsubscribe — callers that want that must
/// track it themselves; this mirrors the teacher's explicit
/// `Subscribe`/`Unsubscribe` command pair rather than relying on `Drop`.
pub type Subscription = tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>;

/// Translates between A2A JSON-RPC envelopes and the runtime's internal
/// event stream (spec §4.1). Implementations must settle every delivered
/// message exactly once and must retry `publish` with exponential
/// backoff on transport failure before surfacing [`SamError::Transport`].
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Registers a handler for topics matching `topic_pattern` (broker
    /// wildcard convention: `*` single segment, `>` remainder).
    async fn subscribe(&self, topic_pattern: &str) -> Result<Subscription, SamError>;

    /// Fire-and-forget publish at QoS-1.
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        user_properties: UserProperties,
    ) -> Result<(), SamError>;

    async fn acknowledge(&self, handle: MessageHandle) -> Result<(), SamError>;

    async fn negative_acknowledge(&self, handle: MessageHandle) -> Result<(), SamError>;
}

/// Exponential backoff schedule for reconnect/retry loops, matching the
/// shape used by the teacher's P2P transport reconnection logic.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_ms: 250, cap_ms: 30_000, factor: 2.0 }
    }
}

impl BackoffPolicy {
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let raw = self.base_ms as f64 * self.factor.powi(attempt as i32);
        raw.min(self.cap_ms as f64) as u64
    }
}
