// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use sam_types::{TaskResult, TaskStatusUpdateEvent};

/// A task producer/consumer outside the core (spec §6 `Gateway`). The
/// core never calls this trait directly — a gateway consumes terminal
/// responses and streaming events purely via broker subscription, same
/// as any other peer. It is modeled as a trait here only so
/// `sam-testing` can provide a recording double for integration tests
/// that assert on what a gateway would have observed.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn on_status_update(&self, event: TaskStatusUpdateEvent);
    async fn on_terminal_response(&self, result: TaskResult);
}
