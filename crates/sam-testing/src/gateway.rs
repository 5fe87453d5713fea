// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;
use sam_interfaces::Gateway;
use sam_types::{TaskResult, TaskStatusUpdateEvent};

/// A recording `Gateway` double: remembers every status update and
/// terminal response it observes, so integration tests can assert on
/// streaming + terminal ordering (spec §8 invariant 4, "terminal
/// irrevocability") without a real HTTP/SSE/Slack front-end.
#[derive(Default)]
pub struct RecordingGateway {
    pub status_updates: Mutex<Vec<TaskStatusUpdateEvent>>,
    pub terminal_responses: Mutex<Vec<TaskResult>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn on_status_update(&self, event: TaskStatusUpdateEvent) {
        self.status_updates.lock().unwrap().push(event);
    }

    async fn on_terminal_response(&self, result: TaskResult) {
        self.terminal_responses.lock().unwrap().push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sam_types::{create_status_update, A2aMessage, MessageMetadata, MessagePart, TaskStatus, TaskState};

    #[tokio::test]
    async fn records_status_updates_and_terminal_responses_separately() {
        let gw = RecordingGateway::new();
        let msg = A2aMessage {
            role: "agent".into(),
            message_id: "m1".into(),
            kind: "message".into(),
            parts: vec![MessagePart::Text { text: "working".into() }],
            metadata: MessageMetadata::default(),
        };
        gw.on_status_update(create_status_update("t1", "c1", msg, false, None)).await;
        gw.on_terminal_response(TaskResult::new(
            "t1",
            "c1",
            TaskStatus { state: TaskState::Completed, message: None, timestamp: "now".into() },
        ))
        .await;

        assert_eq!(gw.status_updates.lock().unwrap().len(), 1);
        assert_eq!(gw.terminal_responses.lock().unwrap().len(), 1);
    }
}
