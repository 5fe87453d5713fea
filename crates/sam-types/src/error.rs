// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// The core's error taxonomy (spec §7). Everything originating from an
/// external collaborator (broker, LLM, tool, peer) is caught at the
/// boundary and wrapped into one of these kinds before it crosses into
/// the Agent Core's turn algorithm.
#[derive(Debug, Error)]
pub enum SamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("tool '{tool_name}' failed: {message}")]
    Tool { tool_name: String, message: String },

    #[error("peer agent '{peer_agent_name}' returned an error ({code}): {message}")]
    Peer {
        peer_agent_name: String,
        code: String,
        message: String,
    },

    #[error("peer sub-task '{sub_task_id}' timed out waiting on '{peer_agent_name}'")]
    Timeout {
        sub_task_id: String,
        peer_agent_name: String,
    },

    #[error("permission denied delegating to '{target_agent}': {reason}")]
    PermissionDenied { target_agent: String, reason: String },

    #[error("task cancelled")]
    Cancelled,

    #[error("checkpoint store unavailable: {0}")]
    Checkpoint(String),
}

impl SamError {
    /// The stable error code surfaced on a failed terminal A2A response.
    pub fn code(&self) -> &'static str {
        match self {
            SamError::Transport(_) => "TRANSPORT_FAILED",
            SamError::Llm(_) => "LLM_FAILED",
            SamError::Tool { .. } => "TOOL_FAILED",
            SamError::Peer { .. } => "PEER_FAILED",
            SamError::Timeout { .. } => "TIMEOUT",
            SamError::PermissionDenied { .. } => "PERMISSION_DENIED",
            SamError::Cancelled => "CANCELLED",
            SamError::Checkpoint(_) => "CHECKPOINT_UNAVAILABLE",
        }
    }

    /// Only [`SamError::Checkpoint`] is fatal to the process per spec §7 —
    /// every other kind is caught and fed back into the task as a result or
    /// a failed terminal response.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SamError::Checkpoint(_))
    }
}
