// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A logical unit of agent work (spec §3 "Task"). Owned by exactly one
/// agent process at a time; ownership transfer across processes happens
/// only via checkpoint restore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub session_id: String,
    pub user_id: String,
    pub agent_name: String,
    /// Routing metadata: effective session, parent task id (if this task
    /// is itself a peer delegation), originator gateway id.
    pub a2a_context: A2aContext,
}

/// Opaque routing metadata carried alongside a task. Kept as a typed
/// struct with a catch-all `extra` bag rather than a bare JSON map so the
/// well-known fields the turn algorithm reads are type-checked, while
/// still round-tripping any additional keys a gateway attaches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct A2aContext {
    pub effective_session_id: String,
    pub user_id: String,
    pub logical_task_id: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator_gateway_id: Option<String>,
    /// Topic this task's terminal response and any peer delegations this
    /// task itself is answering must be published to — carried over from
    /// the inbound request's `replyTo` user property (spec §4.1/§6),
    /// regardless of whether the requester was a gateway or a delegating
    /// peer agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_to: Option<String>,
    /// The inbound JSON-RPC request's `id`, echoed back on the terminal
    /// response so the requester can correlate it (spec §6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The sealed set of outcomes a tool call (local or peer) can produce,
/// replacing the source's `isinstance`-based dynamic dispatch (spec §9)
/// with exhaustive matching at the state-machine boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResult {
    Text { text: String },
    Data { data: serde_json::Value },
    Artifact { filename: String, version: u64 },
    Error { code: String, message: String },
}

impl ToolResult {
    pub fn timeout(peer_tool_name: &str) -> Self {
        ToolResult::Error {
            code: "TIMEOUT".to_string(),
            message: format!("peer tool '{peer_tool_name}' timed out"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error { .. })
    }
}

/// Correlation record for a delegated peer call (spec §3 "PeerSubTask").
/// Persisted as a `peer_sub_task` row by the Checkpoint Store; this type
/// is the in-memory projection used by [`crate::TaskExecutionContext`]
/// and the turn algorithm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerSubTaskHandle {
    pub adk_function_call_id: String,
    pub peer_tool_name: String,
    pub peer_agent_name: String,
    pub invocation_id: Option<String>,
    pub deadline_epoch_ms: i64,
}

/// The full correlation row as stored by the Checkpoint Store, including
/// the fields that never live in the in-memory TEC (deadline, claim flag).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerSubTaskRecord {
    pub sub_task_id: String,
    pub logical_task_id: String,
    pub peer_tool_name: String,
    pub peer_agent_name: String,
    pub adk_function_call_id: String,
    pub invocation_id: Option<String>,
    pub deadline_epoch_ms: i64,
}

/// Aggregator for fan-out tool calls within one LLM turn (spec §3
/// "ParallelInvocation"). `completed` is monotonically non-decreasing and
/// never exceeds `total` (testable invariant 3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParallelInvocationState {
    pub total: u32,
    pub completed: u32,
    pub results: Vec<ToolResult>,
}

impl ParallelInvocationState {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: 0,
            results: Vec::new(),
        }
    }

    /// Records one result, returning `(completed, total)` so the caller
    /// can decide whether the aggregator is complete.
    pub fn record(&mut self, result: ToolResult) -> (u32, u32) {
        self.results.push(result);
        self.completed += 1;
        debug_assert!(self.completed <= self.total, "aggregator overflow");
        (self.completed, self.total)
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}
