// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{A2aContext, ParallelInvocationState, PeerSubTaskHandle};

/// An artifact produced during a task, append-only within a turn and
/// surviving checkpoint (spec §3 TEC invariants).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRef {
    pub filename: String,
    pub version: u64,
}

/// An artifact event queued for delivery to the requester (flushed before
/// the terminal response, per the resolved Open Question on ordering).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactSignal {
    pub filename: String,
    pub version: u64,
    pub append: bool,
    pub last_chunk: bool,
}

/// Token usage totals plus per-model/per-source breakdowns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cached_input_tokens: u64,
    pub by_model: HashMap<String, TokenUsageBreakdown>,
    pub by_source: HashMap<String, TokenUsageBreakdown>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsageBreakdown {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_input_tokens: u64,
}

impl TokenUsage {
    pub fn record(&mut self, source: &str, model: &str, b: TokenUsageBreakdown) {
        self.total_input_tokens += b.input_tokens;
        self.total_output_tokens += b.output_tokens;
        self.total_cached_input_tokens += b.cached_input_tokens;

        let model_entry = self.by_model.entry(model.to_string()).or_default();
        model_entry.input_tokens += b.input_tokens;
        model_entry.output_tokens += b.output_tokens;
        model_entry.cached_input_tokens += b.cached_input_tokens;

        let source_entry = self.by_source.entry(source.to_string()).or_default();
        source_entry.input_tokens += b.input_tokens;
        source_entry.output_tokens += b.output_tokens;
        source_entry.cached_input_tokens += b.cached_input_tokens;
    }
}

/// One entry of the LLM-turn history carried across suspension and
/// checkpoint restore, so a resumed task re-prompts the model with the
/// exact context it suspended with. Kept as a plain role/content pair
/// here (rather than reusing `sam-interfaces::LlmMessage`) because
/// `sam-types` sits below `sam-interfaces` in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnMessage {
    pub role: String,
    pub content: String,
}

impl TurnMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

/// The plain-map projection of a TEC suitable for JSON persistence
/// (spec §4.2 `to_checkpoint_dict`). This is exactly the `paused_task.tec_blob`
/// column payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckpointBlob {
    pub task_id: String,
    pub a2a_context: A2aContext,
    pub current_invocation_id: Option<String>,
    pub run_based_response_buffer: String,
    pub produced_artifacts: Vec<ArtifactRef>,
    pub artifact_signals_to_return: Vec<ArtifactSignal>,
    #[serde(default)]
    pub turn_history: Vec<TurnMessage>,
    pub flags: HashMap<String, serde_json::Value>,
    pub security_context: HashMap<String, serde_json::Value>,
    pub token_usage: TokenUsage,
}

/// Per-task in-memory runtime state (spec §3/§4.2 "TaskExecutionContext").
///
/// Every mutating operation happens while the owner holds the per-task
/// lock (modeled in `sam-core` as `Arc<tokio::sync::Mutex<TaskExecutionContext>>`
/// rather than as a field here — a self-referential lock has no clean
/// Rust shape, and the teacher never does it that way either). The lock
/// is not held across I/O; callers read-copy-compute-writeback.
#[derive(Debug)]
pub struct TaskExecutionContext {
    pub task_id: String,
    pub a2a_context: A2aContext,

    pub run_based_response_buffer: String,
    pub produced_artifacts: Vec<ArtifactRef>,
    pub artifact_signals_to_return: Vec<ArtifactSignal>,
    pub current_invocation_id: Option<String>,
    /// LLM-turn history, re-sent on every `LlmClient::invoke` call so a
    /// task resumed from checkpoint re-prompts with the same context it
    /// suspended with.
    pub turn_history: Vec<TurnMessage>,

    /// Loaded on demand from the Checkpoint Store tables; never restored
    /// from a checkpoint blob (they are the tables' source of truth).
    pub active_peer_sub_tasks: HashMap<String, PeerSubTaskHandle>,
    pub parallel_tool_calls: HashMap<String, ParallelInvocationState>,

    pub flags: HashMap<String, serde_json::Value>,
    /// Opaque token material. Never logged — see the crate's tracing
    /// conventions (`SPEC_FULL.md` §10).
    pub security_context: HashMap<String, serde_json::Value>,
    pub token_usage: TokenUsage,

    // ── Transient fields: excluded from checkpoint, freshly recreated on
    // restore. ─────────────────────────────────────────────────────────
    pub streaming_buffer: String,
    cancellation: Arc<AtomicBool>,
    first_text_seen_in_turn: bool,
    need_spacing_before_next_text: bool,
}

impl TaskExecutionContext {
    pub fn new(task_id: impl Into<String>, a2a_context: A2aContext) -> Self {
        Self {
            task_id: task_id.into(),
            a2a_context,
            run_based_response_buffer: String::new(),
            produced_artifacts: Vec::new(),
            artifact_signals_to_return: Vec::new(),
            current_invocation_id: None,
            turn_history: Vec::new(),
            active_peer_sub_tasks: HashMap::new(),
            parallel_tool_calls: HashMap::new(),
            flags: HashMap::new(),
            security_context: HashMap::new(),
            token_usage: TokenUsage::default(),
            streaming_buffer: String::new(),
            cancellation: Arc::new(AtomicBool::new(false)),
            first_text_seen_in_turn: false,
            need_spacing_before_next_text: false,
        }
    }

    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancellation.store(true, Ordering::SeqCst);
    }

    pub fn push_turn(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.turn_history.push(TurnMessage::new(role, content));
    }

    /// Produces the persistable projection of this context. Deep-copies
    /// nested maps so mutating the returned blob never affects `self`
    /// (testable invariant 2, "checkpoint isolation").
    pub fn to_checkpoint(&self) -> CheckpointBlob {
        CheckpointBlob {
            task_id: self.task_id.clone(),
            a2a_context: self.a2a_context.clone(),
            current_invocation_id: self.current_invocation_id.clone(),
            run_based_response_buffer: self.run_based_response_buffer.clone(),
            produced_artifacts: self.produced_artifacts.clone(),
            artifact_signals_to_return: self.artifact_signals_to_return.clone(),
            turn_history: self.turn_history.clone(),
            flags: self.flags.clone(),
            security_context: self.security_context.clone(),
            token_usage: self.token_usage.clone(),
        }
    }

    /// Rebuilds a context from a checkpoint blob, freshly initializing all
    /// transient fields. `active_peer_sub_tasks`/`parallel_tool_calls` are
    /// always empty here — they are loaded from the Checkpoint Store
    /// tables on demand, never from the blob (spec §4.2).
    pub fn from_checkpoint(blob: CheckpointBlob) -> Self {
        Self {
            task_id: blob.task_id,
            a2a_context: blob.a2a_context,
            run_based_response_buffer: blob.run_based_response_buffer,
            produced_artifacts: blob.produced_artifacts,
            artifact_signals_to_return: blob.artifact_signals_to_return,
            current_invocation_id: blob.current_invocation_id,
            turn_history: blob.turn_history,
            active_peer_sub_tasks: HashMap::new(),
            parallel_tool_calls: HashMap::new(),
            flags: blob.flags,
            security_context: blob.security_context,
            token_usage: blob.token_usage,
            streaming_buffer: String::new(),
            cancellation: Arc::new(AtomicBool::new(false)),
            first_text_seen_in_turn: false,
            need_spacing_before_next_text: false,
        }
    }
}
