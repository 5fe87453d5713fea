// SPDX-License-Identifier: Apache-2.0
//! The A2A ("Agent-to-Agent") JSON-RPC-over-broker wire protocol (spec §6).
//!
//! Field names follow `original_source/common/a2a/events.py` exactly
//! (`task_id`, `context_id`, `status.state`, `final`, `append`,
//! `last_chunk`, `kind` discriminators) so a reader familiar with the
//! original system recognizes the shapes immediately.

use serde::{Deserialize, Serialize};

/// `user_properties` accompanying every broker publish: routing
/// information the Broker Adapter uses to settle correlated responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProperties {
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(rename = "statusTo", skip_serializing_if = "Option::is_none")]
    pub status_to: Option<String>,
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One part of an A2A message body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Data { data: serde_json::Value },
    File { name: String, mime_type: String, uri: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(rename = "parentTaskId", skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct A2aMessage {
    pub role: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub kind: String,
    pub parts: Vec<MessagePart>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// `message/send` or `message/stream` request params.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessageParams {
    pub message: A2aMessage,
}

/// A JSON-RPC 2.0 request envelope carrying either a task-creation or a
/// peer-delegation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: SendMessageParams,
}

impl JsonRpcRequest {
    pub fn new_message_send(id: impl Into<String>, message: A2aMessage) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: "message/send".to_string(),
            params: SendMessageParams { message },
        }
    }
}

/// `tasks/cancel` request params (spec §4.3 "Cancellation").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelTaskParams {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// A JSON-RPC 2.0 `tasks/cancel` request envelope, delivered on the same
/// `agent/request/{agent_name}` topic as `message/send`/`message/stream`
/// and distinguished by `method`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelTaskRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: CancelTaskParams,
}

/// Terminal lifecycle state of a task (spec §6 response shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Working,
    Completed,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<A2aMessage>,
    /// RFC3339/ISO-8601 UTC timestamp, set at emission time.
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactPayload {
    pub filename: String,
    pub version: u64,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// The single terminal `task` result for a task (spec §6). Beyond this,
/// no further events are emitted for the task (testable invariant 4,
/// "terminal irrevocability").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub kind: String, // "task"
    pub id: String,
    #[serde(rename = "contextId")]
    pub context_id: String,
    pub status: TaskStatus,
    pub artifacts: Vec<ArtifactPayload>,
}

impl TaskResult {
    pub fn new(task_id: impl Into<String>, context_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            kind: "task".to_string(),
            id: task_id.into(),
            context_id: context_id.into(),
            status,
            artifacts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: impl Into<String>, result: TaskResult) -> Self {
        Self { jsonrpc: "2.0".into(), id: id.into(), result: Some(result), error: None }
    }

    pub fn err(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.into(),
            result: None,
            error: Some(JsonRpcError { code, message: message.into() }),
        }
    }
}

/// A non-final `status-update` streaming event (spec §6). `final` is
/// always `false` for these; the terminal response is a separate,
/// singular [`TaskResult`] publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusUpdateEvent {
    pub kind: String, // "status-update"
    pub task_id: String,
    pub context_id: String,
    pub status: TaskStatus,
    pub r#final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Creates a new `TaskStatusUpdateEvent`, mirroring
/// `original_source/common/a2a/events.py::create_status_update`.
pub fn create_status_update(
    task_id: impl Into<String>,
    context_id: impl Into<String>,
    message: A2aMessage,
    is_final: bool,
    metadata: Option<serde_json::Value>,
) -> TaskStatusUpdateEvent {
    TaskStatusUpdateEvent {
        kind: "status-update".to_string(),
        task_id: task_id.into(),
        context_id: context_id.into(),
        status: TaskStatus {
            state: TaskState::Working,
            message: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
        r#final: is_final,
        metadata,
    }
}

/// An `artifact-update` streaming event, used for chunked artifact
/// delivery within a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskArtifactUpdateEvent {
    pub kind: String, // "artifact-update"
    pub task_id: String,
    pub context_id: String,
    pub artifact: ArtifactPayload,
    pub append: bool,
    pub last_chunk: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Creates a new `TaskArtifactUpdateEvent`, mirroring
/// `original_source/common/a2a/events.py::create_artifact_update`.
pub fn create_artifact_update(
    task_id: impl Into<String>,
    context_id: impl Into<String>,
    artifact: ArtifactPayload,
    append: bool,
    last_chunk: bool,
    metadata: Option<serde_json::Value>,
) -> TaskArtifactUpdateEvent {
    TaskArtifactUpdateEvent {
        kind: "artifact-update".to_string(),
        task_id: task_id.into(),
        context_id: context_id.into(),
        artifact,
        append,
        last_chunk,
        metadata,
    }
}

/// The payload carried on a peer response (`agent/response/{agent}/{sub_task_id}`,
/// spec §4.3 "Result integration"). Tagged on `status` so a peer's
/// success/error outcome maps directly onto [`crate::ToolResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeerResultPayload {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        peer_tool_name: Option<String>,
    },
}

impl From<PeerResultPayload> for crate::ToolResult {
    fn from(payload: PeerResultPayload) -> Self {
        match payload {
            PeerResultPayload::Ok { text: Some(text), .. } => crate::ToolResult::Text { text },
            PeerResultPayload::Ok { data: Some(data), .. } => crate::ToolResult::Data { data },
            PeerResultPayload::Ok { .. } => crate::ToolResult::Text { text: String::new() },
            PeerResultPayload::Error { code, message, .. } => crate::ToolResult::Error { code, message },
        }
    }
}

/// The JSON-RPC envelope published on a peer response topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerResponseEnvelope {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PeerResultPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl PeerResponseEnvelope {
    pub fn ok(id: impl Into<String>, result: PeerResultPayload) -> Self {
        Self { jsonrpc: "2.0".into(), id: id.into(), result: Some(result), error: None }
    }

    pub fn err(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.into(),
            result: None,
            error: Some(JsonRpcError { code, message: message.into() }),
        }
    }

    /// Collapses the envelope down to the single [`crate::ToolResult`] the
    /// turn algorithm feeds back to the LLM (spec §4.3 step 4).
    pub fn into_tool_result(self) -> crate::ToolResult {
        if let Some(err) = self.error {
            return crate::ToolResult::Error { code: err.code.to_string(), message: err.message };
        }
        self.result.map(Into::into).unwrap_or(crate::ToolResult::Text { text: String::new() })
    }
}

/// Topic templates, namespaced `{namespace}/a2a/v1/...` (spec §4.1/§6).
pub mod topics {
    pub fn request(namespace: &str, agent_name: &str) -> String {
        format!("{namespace}/a2a/v1/agent/request/{agent_name}")
    }

    pub fn response(namespace: &str, agent_name: &str, sub_task_id: &str) -> String {
        format!("{namespace}/a2a/v1/agent/response/{agent_name}/{sub_task_id}")
    }

    pub fn status(namespace: &str, agent_name: &str, sub_task_id: &str) -> String {
        format!("{namespace}/a2a/v1/agent/status/{agent_name}/{sub_task_id}")
    }

    pub fn discovery_agentcards(namespace: &str) -> String {
        format!("{namespace}/a2a/v1/discovery/agentcards")
    }
}
