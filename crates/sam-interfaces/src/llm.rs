// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use sam_types::SamError;

/// One entry of the message history passed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRole {
    System,
    User,
    Assistant,
    ToolResult,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: LlmRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: LlmRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: LlmRole::Assistant, content: content.into() }
    }
    pub fn tool_result(content: impl Into<String>) -> Self {
        Self { role: LlmRole::ToolResult, content: content.into() }
    }
}

/// A tool call requested by the model within one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_input_tokens: u64,
}

/// One event of a streaming completion (spec §6 `LlmClient.invoke`).
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    TextDelta(String),
    ToolCall(LlmToolCall),
    Usage(LlmUsage),
    Done,
    Error(String),
}

pub type LlmResponseStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

/// The model-inference seam (spec §6 `LlmClient`). Implementations must
/// be thread-safe — the same client is shared across all workers in the
/// pool (spec §5).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        messages: Vec<LlmMessage>,
        tools: Vec<crate::ToolSpec>,
    ) -> Result<LlmResponseStream, SamError>;
}
