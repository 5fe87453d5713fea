// SPDX-License-Identifier: Apache-2.0
//! A minimal scripted `LlmClient` used only by the `sam demo` subcommand,
//! so a demo run can exercise the turn algorithm end to end without a
//! real model endpoint. Shaped like `sven-model`'s `MockProvider`
//! (`crates/sven-model/src/mock.rs`) but kept in the binary rather than
//! `sam-testing` — that crate is a dev-dependency only, unavailable to
//! the shipped binary target.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream;
use sam_interfaces::{LlmClient, LlmEvent, LlmMessage, LlmResponseStream, LlmRole, ToolSpec};
use sam_types::SamError;

pub struct DemoLlmClient {
    calls: AtomicU32,
}

impl DemoLlmClient {
    pub fn new() -> Self {
        Self { calls: AtomicU32::new(0) }
    }
}

impl Default for DemoLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for DemoLlmClient {
    async fn invoke(&self, messages: Vec<LlmMessage>, tools: Vec<ToolSpec>) -> Result<LlmResponseStream, SamError> {
        let round = self.calls.fetch_add(1, Ordering::SeqCst);

        if round == 0 {
            if let Some(tool) = tools.iter().find(|t| !t.is_peer_delegation()) {
                let user_text = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == LlmRole::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let events = vec![
                    LlmEvent::ToolCall(sam_interfaces::LlmToolCall {
                        id: "demo-call-1".to_string(),
                        name: tool.name.clone(),
                        arguments: serde_json::json!({"text": user_text}),
                    }),
                    LlmEvent::Done,
                ];
                return Ok(Box::pin(stream::iter(events)));
            }
        }

        let tool_text = messages
            .iter()
            .rev()
            .find(|m| m.role == LlmRole::ToolResult)
            .map(|m| m.content.clone());
        let reply = match tool_text {
            Some(t) => format!("demo agent finished: {t}"),
            None => "demo agent finished with no tool calls".to_string(),
        };
        Ok(Box::pin(stream::iter(vec![LlmEvent::TextDelta(reply), LlmEvent::Done])))
    }
}
