// SPDX-License-Identifier: Apache-2.0
//! The turn algorithm (spec §4.3): request intake, LLM invocation with
//! streaming status, tool-call dispatch for K=0/K=1-local/K=1-peer/K>1,
//! result integration on peer/local-parallel completion, and
//! finalization. Grounded on `sven-core/agent.rs`'s round-counter loop
//! and `tokio::spawn`-based parallel tool dispatch, generalized so a
//! peer-delegation tool call suspends the task instead of recursing
//! in-process.

use std::sync::Arc;

use futures::StreamExt;
use sam_broker::BackoffPolicy;
use sam_interfaces::{LlmEvent, LlmMessage, LlmRole, LlmToolCall};
use sam_types::{
    create_artifact_update, create_status_update, now_epoch_ms, topics, A2aContext, A2aMessage,
    ArtifactPayload, ArtifactSignal, JsonRpcRequest, JsonRpcResponse, MessageMetadata, MessagePart,
    ParallelInvocationState, PeerSubTaskHandle, PeerSubTaskRecord, SamError, TaskExecutionContext,
    TaskResult, TaskState, TaskStatus, TokenUsageBreakdown, ToolResult, TurnMessage, UserProperties,
};
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{run_post_chain, run_pre_chain, AgentDeps, PreToolOutcome, TecRegistry, ToolCallContext};

/// A hard backstop against a misbehaving LLM that never stops calling
/// tools — not a normal exit path (spec has no notion of a "max turns"
/// limit; this only guards against runaway loops eating the worker).
const MAX_TURN_ROUNDS: u32 = 200;

/// Retry budget for a single broker publish (spec §7 *TransportError*:
/// "Retried with backoff; terminal after retry budget -> task fails with
/// code TRANSPORT_FAILED"). Five attempts at the default `BackoffPolicy`
/// schedule (250ms, 500ms, 1s, 2s) spend a few seconds riding out a
/// transient disconnect before giving up.
const MAX_PUBLISH_ATTEMPTS: u32 = 5;

type TecHandle = Arc<Mutex<TaskExecutionContext>>;

/// Begins a brand-new task: constructs its TEC, seeds turn history with
/// the inbound request, registers it as resident, and drives the turn
/// loop until it either finalizes or suspends.
pub async fn start_new_task(
    deps: Arc<AgentDeps>,
    registry: Arc<TecRegistry>,
    task_id: String,
    a2a_context: A2aContext,
    user_text: String,
) -> Result<(), SamError> {
    let mut tec = TaskExecutionContext::new(task_id, a2a_context);
    tec.push_turn("system", format!("You are the '{}' agent.", deps.config.agent_name));
    tec.push_turn("user", user_text);
    let handle = registry.insert(tec);
    drive_turn_loop(deps, registry, handle).await
}

/// Entry point used both by a genuine peer-response arrival and by the
/// Timeout Sweeper's synthesized timeout result (spec §4.3 "Result
/// integration", §4.5). Restores the TEC if it isn't resident, folds
/// `result` into the right place (a standalone sub-task, or one slot of
/// a parallel aggregator), and resumes the loop once every outstanding
/// slot is filled.
pub async fn integrate_result(
    deps: Arc<AgentDeps>,
    registry: Arc<TecRegistry>,
    task_id: &str,
    invocation_id: Option<&str>,
    result: ToolResult,
) -> Result<(), SamError> {
    let handle = registry.get_or_restore(task_id, &deps.checkpoint).await?;

    let Some(invocation_id) = invocation_id else {
        let mut tec = handle.lock().await;
        tec.push_turn("tool_result", render_tool_result(&result));
        drop(tec);
        return drive_turn_loop(deps, registry, handle).await;
    };

    let (completed, total) = deps.checkpoint.record_parallel_result(task_id, invocation_id, result)?;
    if completed < total {
        return Ok(());
    }

    let state = deps.checkpoint.load_parallel_result_rows(task_id, invocation_id)?;
    deps.checkpoint.clear_parallel_invocation(task_id, invocation_id)?;

    let mut tec = handle.lock().await;
    tec.parallel_tool_calls.remove(invocation_id);
    if tec.current_invocation_id.as_deref() == Some(invocation_id) {
        tec.current_invocation_id = None;
    }
    tec.push_turn("tool_result", render_tool_results(&state.results));
    drop(tec);

    drive_turn_loop(deps, registry, handle).await
}

/// The core loop: invoke the LLM, classify the tool calls it requests,
/// and either finalize (K=0), continue in-process (K=1 local), or
/// suspend the task (K=1 peer, or K>1).
async fn drive_turn_loop(deps: Arc<AgentDeps>, registry: Arc<TecRegistry>, tec_handle: TecHandle) -> Result<(), SamError> {
    let mut rounds = 0u32;

    loop {
        rounds += 1;
        if rounds > MAX_TURN_ROUNDS {
            return finalize_failed(&deps, &registry, &tec_handle, SamError::Llm("exceeded maximum turn rounds".into())).await;
        }

        if tec_handle.lock().await.is_cancelled() {
            return finalize_cancelled(&deps, &registry, &tec_handle).await;
        }

        let (text, tool_calls) = match invoke_llm_with_retry(&deps, &tec_handle).await {
            Ok(outcome) => outcome,
            Err(e) => return finalize_failed(&deps, &registry, &tec_handle, e).await,
        };

        if !text.is_empty() {
            tec_handle.lock().await.push_turn("assistant", text.clone());
        }

        if tool_calls.is_empty() {
            let mut tec = tec_handle.lock().await;
            tec.run_based_response_buffer.push_str(&text);
            drop(tec);
            return finalize_success(&deps, &registry, &tec_handle).await;
        }

        if tool_calls.len() == 1 {
            let call = tool_calls.into_iter().next().unwrap();
            match dispatch_one_tool_call(&deps, &registry, &tec_handle, call).await {
                Ok(DispatchOutcome::Suspended) => return Ok(()),
                Ok(DispatchOutcome::Resolved(result)) => {
                    tec_handle.lock().await.push_turn("tool_result", render_tool_result(&result));
                    continue;
                }
                // A failed checkpoint write means the task can never safely
                // suspend (spec §7 CheckpointError: "refuse to transition to
                // awaiting_peer/awaiting_parallel; instead, fail the task
                // with CHECKPOINT_UNAVAILABLE"). Every other error kind is
                // already caught at its own boundary before reaching here.
                Err(e) if e.is_fatal() => return finalize_failed(&deps, &registry, &tec_handle, e).await,
                Err(e) => return Err(e),
            }
        }

        if let Err(e) = dispatch_parallel_tool_calls(&deps, &registry, &tec_handle, tool_calls).await {
            if e.is_fatal() {
                return finalize_failed(&deps, &registry, &tec_handle, e).await;
            }
            return Err(e);
        }
        return Ok(());
    }
}

enum DispatchOutcome {
    Resolved(ToolResult),
    Suspended,
}

/// K=1 dispatch: middleware pre-chain, then either a local execution
/// (resolved synchronously) or a peer delegation (task suspends).
async fn dispatch_one_tool_call(
    deps: &Arc<AgentDeps>,
    registry: &Arc<TecRegistry>,
    tec_handle: &TecHandle,
    call: LlmToolCall,
) -> Result<DispatchOutcome, SamError> {
    let (task_id, a2a_context) = {
        let tec = tec_handle.lock().await;
        (tec.task_id.clone(), tec.a2a_context.clone())
    };
    let ctx = ToolCallContext {
        task_id: task_id.clone(),
        a2a_context: a2a_context.clone(),
        tool_name: call.name.clone(),
        arguments: call.arguments.clone(),
    };

    if let PreToolOutcome::ShortCircuit(result) = run_pre_chain(&deps.middlewares, &ctx) {
        run_post_chain(&deps.middlewares, &ctx, &result);
        return Ok(DispatchOutcome::Resolved(result));
    }

    let Some(spec) = deps.tools.lookup(&call.name) else {
        let result = unknown_tool_result(&call.name);
        run_post_chain(&deps.middlewares, &ctx, &result);
        return Ok(DispatchOutcome::Resolved(result));
    };

    let Some(peer_agent_name) = spec.peer_agent_name else {
        let result = execute_local(deps, &call).await;
        run_post_chain(&deps.middlewares, &ctx, &result);
        return Ok(DispatchOutcome::Resolved(result));
    };

    if let Err(e) = deps.access.validate_agent_access(&serde_json::json!({}), &peer_agent_name).await {
        let result = ToolResult::Error { code: e.code().to_string(), message: e.to_string() };
        run_post_chain(&deps.middlewares, &ctx, &result);
        return Ok(DispatchOutcome::Resolved(result));
    }

    let sub_task_id = format!("sub_{}", Uuid::new_v4());
    let deadline = now_epoch_ms() + deps.config.default_peer_timeout_seconds as i64 * 1000;

    {
        let mut tec = tec_handle.lock().await;
        tec.active_peer_sub_tasks.insert(
            sub_task_id.clone(),
            PeerSubTaskHandle {
                adk_function_call_id: call.id.clone(),
                peer_tool_name: call.name.clone(),
                peer_agent_name: peer_agent_name.clone(),
                invocation_id: None,
                deadline_epoch_ms: deadline,
            },
        );
    }

    checkpoint_tec(deps, tec_handle).await?;
    publish_peer_request(deps, &peer_agent_name, &sub_task_id, &task_id, &a2a_context, &call).await?;
    registry.evict(&task_id);
    Ok(DispatchOutcome::Suspended)
}

/// K>1 dispatch: allocate an aggregator, classify every call, publish
/// peer requests and spawn local executions concurrently, then suspend.
/// Each local execution is routed through [`integrate_result`] exactly
/// like a genuine peer response (spec §4.3 "the same aggregation path"),
/// so this function never waits on them directly.
async fn dispatch_parallel_tool_calls(
    deps: &Arc<AgentDeps>,
    registry: &Arc<TecRegistry>,
    tec_handle: &TecHandle,
    calls: Vec<LlmToolCall>,
) -> Result<(), SamError> {
    let invocation_id = format!("inv_{}", Uuid::new_v4());
    let total = calls.len() as u32;
    let (task_id, a2a_context) = {
        let tec = tec_handle.lock().await;
        (tec.task_id.clone(), tec.a2a_context.clone())
    };

    {
        let mut tec = tec_handle.lock().await;
        tec.current_invocation_id = Some(invocation_id.clone());
        tec.parallel_tool_calls.insert(invocation_id.clone(), ParallelInvocationState::new(total));
    }

    struct LocalJob {
        call: LlmToolCall,
        precomputed: Option<ToolResult>,
    }
    let mut local_jobs = Vec::new();
    let mut peer_publishes: Vec<(String, String, LlmToolCall)> = Vec::new();

    for call in calls {
        let ctx = ToolCallContext {
            task_id: task_id.clone(),
            a2a_context: a2a_context.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        };

        if let PreToolOutcome::ShortCircuit(result) = run_pre_chain(&deps.middlewares, &ctx) {
            run_post_chain(&deps.middlewares, &ctx, &result);
            local_jobs.push(LocalJob { call, precomputed: Some(result) });
            continue;
        }

        let Some(spec) = deps.tools.lookup(&call.name) else {
            let result = unknown_tool_result(&call.name);
            local_jobs.push(LocalJob { call, precomputed: Some(result) });
            continue;
        };

        let Some(peer_agent_name) = spec.peer_agent_name else {
            local_jobs.push(LocalJob { call, precomputed: None });
            continue;
        };

        if let Err(e) = deps.access.validate_agent_access(&serde_json::json!({}), &peer_agent_name).await {
            let result = ToolResult::Error { code: e.code().to_string(), message: e.to_string() };
            local_jobs.push(LocalJob { call, precomputed: Some(result) });
            continue;
        }

        let sub_task_id = format!("sub_{}", Uuid::new_v4());
        let deadline = now_epoch_ms() + deps.config.default_peer_timeout_seconds as i64 * 1000;
        {
            let mut tec = tec_handle.lock().await;
            tec.active_peer_sub_tasks.insert(
                sub_task_id.clone(),
                PeerSubTaskHandle {
                    adk_function_call_id: call.id.clone(),
                    peer_tool_name: call.name.clone(),
                    peer_agent_name: peer_agent_name.clone(),
                    invocation_id: Some(invocation_id.clone()),
                    deadline_epoch_ms: deadline,
                },
            );
        }
        peer_publishes.push((sub_task_id, peer_agent_name, call));
    }

    checkpoint_tec(deps, tec_handle).await?;

    for (sub_task_id, peer_agent_name, call) in &peer_publishes {
        publish_peer_request(deps, peer_agent_name, sub_task_id, &task_id, &a2a_context, call).await?;
    }

    registry.evict(&task_id);

    for job in local_jobs {
        let deps = deps.clone();
        let registry = registry.clone();
        let task_id = task_id.clone();
        let invocation_id = invocation_id.clone();
        tokio::spawn(async move {
            let result = match job.precomputed {
                Some(r) => r,
                None => execute_local(&deps, &job.call).await,
            };
            if let Err(e) = integrate_result(deps, registry, &task_id, Some(&invocation_id), result).await {
                error!(task_id, error = %e, "failed integrating parallel tool result");
            }
        });
    }

    Ok(())
}

async fn execute_local(deps: &Arc<AgentDeps>, call: &LlmToolCall) -> ToolResult {
    match deps.tools.execute_local(&call.name, call.arguments.clone()).await {
        Ok(result) => result,
        Err(e) => ToolResult::Error { code: e.code().to_string(), message: e.to_string() },
    }
}

fn unknown_tool_result(name: &str) -> ToolResult {
    ToolResult::Error { code: "TOOL_FAILED".to_string(), message: format!("unknown tool '{name}'") }
}

async fn checkpoint_tec(deps: &Arc<AgentDeps>, tec_handle: &TecHandle) -> Result<(), SamError> {
    let tec = tec_handle.lock().await;
    let blob = tec.to_checkpoint();
    let peer_sub_tasks: Vec<PeerSubTaskRecord> = tec
        .active_peer_sub_tasks
        .iter()
        .map(|(sub_task_id, h)| PeerSubTaskRecord {
            sub_task_id: sub_task_id.clone(),
            logical_task_id: tec.task_id.clone(),
            peer_tool_name: h.peer_tool_name.clone(),
            peer_agent_name: h.peer_agent_name.clone(),
            adk_function_call_id: h.adk_function_call_id.clone(),
            invocation_id: h.invocation_id.clone(),
            deadline_epoch_ms: h.deadline_epoch_ms,
        })
        .collect();
    let parallel_invocations: Vec<(String, ParallelInvocationState)> =
        tec.parallel_tool_calls.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    deps.checkpoint.checkpoint(&deps.config.agent_name, &blob, &peer_sub_tasks, &parallel_invocations, now_epoch_ms())
}

/// Publishes with exponential backoff (spec §7 *TransportError*,
/// SPEC_FULL.md §4.1's `BackoffPolicy` defaults), exhausting after
/// [`MAX_PUBLISH_ATTEMPTS`] and surfacing the last `SamError::Transport`
/// to the caller, who finalizes the task as failed with `TRANSPORT_FAILED`.
async fn publish_with_retry(
    deps: &Arc<AgentDeps>,
    topic: &str,
    payload: serde_json::Value,
    props: UserProperties,
) -> Result<(), SamError> {
    let backoff = BackoffPolicy::default();
    let mut attempt = 0;
    loop {
        match deps.broker.publish(topic, payload.clone(), props.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt + 1 < MAX_PUBLISH_ATTEMPTS => {
                warn!(attempt, topic, error = %e, "broker publish failed, retrying with backoff");
                tokio::time::sleep(std::time::Duration::from_millis(backoff.delay_ms(attempt))).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn publish_peer_request(
    deps: &Arc<AgentDeps>,
    peer_agent_name: &str,
    sub_task_id: &str,
    task_id: &str,
    a2a_context: &A2aContext,
    call: &LlmToolCall,
) -> Result<(), SamError> {
    let message = A2aMessage {
        role: "user".to_string(),
        message_id: Uuid::new_v4().to_string(),
        kind: "message".to_string(),
        parts: vec![MessagePart::Data { data: call.arguments.clone() }],
        metadata: MessageMetadata {
            agent_name: Some(peer_agent_name.to_string()),
            parent_task_id: Some(task_id.to_string()),
            extra: Default::default(),
        },
    };
    let request = JsonRpcRequest::new_message_send(Uuid::new_v4().to_string(), message);
    let payload = serde_json::to_value(&request).map_err(|e| SamError::Transport(e.to_string()))?;

    let props = UserProperties {
        reply_to: Some(topics::response(&deps.config.namespace, &deps.config.agent_name, sub_task_id)),
        status_to: Some(topics::status(&deps.config.namespace, &deps.config.agent_name, sub_task_id)),
        client_id: None,
        user_id: Some(a2a_context.user_id.clone()),
    };

    let topic = topics::request(&deps.config.namespace, peer_agent_name);
    publish_with_retry(deps, &topic, payload, props).await
}

async fn invoke_llm_with_retry(deps: &Arc<AgentDeps>, tec_handle: &TecHandle) -> Result<(String, Vec<LlmToolCall>), SamError> {
    let max_attempts = deps.config.llm_retry_max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..max_attempts {
        let messages = {
            let tec = tec_handle.lock().await;
            to_llm_messages(&tec.turn_history)
        };
        {
            let mut tec = tec_handle.lock().await;
            tec.streaming_buffer.clear();
        }

        match stream_one_turn(deps, tec_handle, messages).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                warn!(attempt, error = %e, "LLM turn failed, retrying");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| SamError::Llm("no LLM attempts were made".to_string())))
}

async fn stream_one_turn(
    deps: &Arc<AgentDeps>,
    tec_handle: &TecHandle,
    messages: Vec<LlmMessage>,
) -> Result<(String, Vec<LlmToolCall>), SamError> {
    let mut stream = deps.llm.invoke(messages, Vec::new()).await?;
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let (task_id, a2a_context) = {
        let tec = tec_handle.lock().await;
        (tec.task_id.clone(), tec.a2a_context.clone())
    };

    while let Some(event) = stream.next().await {
        match event {
            LlmEvent::TextDelta(delta) => {
                text.push_str(&delta);
                {
                    let mut tec = tec_handle.lock().await;
                    tec.streaming_buffer.push_str(&delta);
                }
                publish_status_update(deps, &task_id, &a2a_context, &delta).await?;
            }
            LlmEvent::ToolCall(call) => tool_calls.push(call),
            LlmEvent::Usage(usage) => {
                let mut tec = tec_handle.lock().await;
                tec.token_usage.record(
                    "agent",
                    "default",
                    TokenUsageBreakdown {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        cached_input_tokens: usage.cached_input_tokens,
                    },
                );
            }
            LlmEvent::Done => break,
            LlmEvent::Error(message) => return Err(SamError::Llm(message)),
        }
    }

    Ok((text, tool_calls))
}

async fn publish_status_update(
    deps: &Arc<AgentDeps>,
    task_id: &str,
    a2a_context: &A2aContext,
    delta: &str,
) -> Result<(), SamError> {
    let Some(status_to) = &a2a_context.status_to else {
        return Ok(());
    };
    let message = A2aMessage {
        role: "agent".to_string(),
        message_id: Uuid::new_v4().to_string(),
        kind: "message".to_string(),
        parts: vec![MessagePart::Text { text: delta.to_string() }],
        metadata: MessageMetadata::default(),
    };
    let event = create_status_update(task_id, &a2a_context.effective_session_id, message, false, None);
    let payload = serde_json::to_value(&event).map_err(|e| SamError::Transport(e.to_string()))?;
    publish_with_retry(deps, status_to, payload, UserProperties::default()).await
}

async fn finalize_success(deps: &Arc<AgentDeps>, registry: &Arc<TecRegistry>, tec_handle: &TecHandle) -> Result<(), SamError> {
    finalize(deps, registry, tec_handle, TaskState::Completed, None).await
}

async fn finalize_cancelled(deps: &Arc<AgentDeps>, registry: &Arc<TecRegistry>, tec_handle: &TecHandle) -> Result<(), SamError> {
    finalize(deps, registry, tec_handle, TaskState::Canceled, Some("task cancelled".to_string())).await
}

async fn finalize_failed(deps: &Arc<AgentDeps>, registry: &Arc<TecRegistry>, tec_handle: &TecHandle, err: SamError) -> Result<(), SamError> {
    warn!(error = %err, "task finalizing as failed");
    finalize(deps, registry, tec_handle, TaskState::Failed, Some(err.to_string())).await
}

/// Entry point for a `tasks/cancel` request (spec §4.3 "Cancellation",
/// §5 "Cancellation semantics"). If the task is currently resident, an
/// in-process `drive_turn_loop` is (or may be) actively running it —
/// setting the signal is enough, since the loop checks it at the top of
/// every iteration and will finalize exactly once on its own. If the
/// task is suspended (`awaiting_peer`/`awaiting_parallel`, evicted from
/// memory), there is no loop left to observe the signal, so this
/// restores the TEC and drives it straight to a cancelled terminal
/// response itself.
pub async fn cancel_task(deps: Arc<AgentDeps>, registry: Arc<TecRegistry>, task_id: &str) -> Result<(), SamError> {
    let already_resident = registry.get(task_id).is_some();
    let handle = registry.get_or_restore(task_id, &deps.checkpoint).await?;
    handle.lock().await.cancel();
    if already_resident {
        return Ok(());
    }
    finalize_cancelled(&deps, &registry, &handle).await
}

/// Step 5 (spec §4.3): flush queued artifact-update events, then publish
/// exactly one terminal `task` result and clean up durable state. Once
/// this runs, no further status/artifact events are ever emitted for
/// the task (testable invariant 4).
async fn finalize(
    deps: &Arc<AgentDeps>,
    registry: &Arc<TecRegistry>,
    tec_handle: &TecHandle,
    state: TaskState,
    override_text: Option<String>,
) -> Result<(), SamError> {
    let (task_id, a2a_context, buffer, artifacts, signals) = {
        let tec = tec_handle.lock().await;
        (
            tec.task_id.clone(),
            tec.a2a_context.clone(),
            tec.run_based_response_buffer.clone(),
            tec.produced_artifacts.clone(),
            tec.artifact_signals_to_return.clone(),
        )
    };

    publish_artifact_updates(deps, &task_id, &a2a_context, &signals).await?;

    let final_text = override_text.unwrap_or(buffer);
    let message = A2aMessage {
        role: "agent".to_string(),
        message_id: Uuid::new_v4().to_string(),
        kind: "message".to_string(),
        parts: vec![MessagePart::Text { text: final_text }],
        metadata: MessageMetadata::default(),
    };
    let status = TaskStatus { state, message: Some(message), timestamp: chrono::Utc::now().to_rfc3339() };
    let mut result = TaskResult::new(&task_id, &a2a_context.effective_session_id, status);
    result.artifacts = resolve_artifact_payloads(deps, &artifacts).await;

    publish_terminal(deps, &a2a_context, &result).await?;
    deps.checkpoint.cleanup_task(&task_id)?;
    registry.evict(&task_id);
    Ok(())
}

async fn resolve_artifact_payloads(
    deps: &Arc<AgentDeps>,
    artifacts: &[sam_types::ArtifactRef],
) -> Vec<ArtifactPayload> {
    let mut payloads = Vec::with_capacity(artifacts.len());
    for a in artifacts {
        let size_bytes = deps.artifacts.load(&a.filename, a.version).await.map(|b| b.len() as u64).unwrap_or(0);
        payloads.push(ArtifactPayload {
            filename: a.filename.clone(),
            version: a.version,
            mime_type: "application/octet-stream".to_string(),
            size_bytes,
        });
    }
    payloads
}

async fn publish_artifact_updates(
    deps: &Arc<AgentDeps>,
    task_id: &str,
    a2a_context: &A2aContext,
    signals: &[ArtifactSignal],
) -> Result<(), SamError> {
    let Some(reply_to) = &a2a_context.reply_to else {
        return Ok(());
    };
    for signal in signals {
        let size_bytes = deps.artifacts.load(&signal.filename, signal.version).await.map(|b| b.len() as u64).unwrap_or(0);
        let artifact = ArtifactPayload {
            filename: signal.filename.clone(),
            version: signal.version,
            mime_type: "application/octet-stream".to_string(),
            size_bytes,
        };
        let event = create_artifact_update(
            task_id,
            &a2a_context.effective_session_id,
            artifact,
            signal.append,
            signal.last_chunk,
            None,
        );
        let payload = serde_json::to_value(&event).map_err(|e| SamError::Transport(e.to_string()))?;
        publish_with_retry(deps, reply_to, payload, UserProperties::default()).await?;
    }
    Ok(())
}

async fn publish_terminal(deps: &Arc<AgentDeps>, a2a_context: &A2aContext, result: &TaskResult) -> Result<(), SamError> {
    let Some(reply_to) = &a2a_context.reply_to else {
        warn!(task_id = %result.id, "no reply_to on context; dropping terminal response");
        return Ok(());
    };
    let rpc_id = a2a_context.rpc_id.clone().unwrap_or_else(|| result.id.clone());
    let envelope = JsonRpcResponse::ok(rpc_id, result.clone());
    let payload = serde_json::to_value(&envelope).map_err(|e| SamError::Transport(e.to_string()))?;
    publish_with_retry(deps, reply_to, payload, UserProperties::default()).await
}

fn to_llm_messages(history: &[TurnMessage]) -> Vec<LlmMessage> {
    history
        .iter()
        .map(|m| LlmMessage {
            role: match m.role.as_str() {
                "system" => LlmRole::System,
                "user" => LlmRole::User,
                "assistant" => LlmRole::Assistant,
                _ => LlmRole::ToolResult,
            },
            content: m.content.clone(),
        })
        .collect()
}

fn render_tool_result(result: &ToolResult) -> String {
    match result {
        ToolResult::Text { text } => text.clone(),
        ToolResult::Data { data } => data.to_string(),
        ToolResult::Artifact { filename, version } => format!("artifact produced: {filename} v{version}"),
        ToolResult::Error { code, message } => format!("error[{code}]: {message}"),
    }
}

fn render_tool_results(results: &[ToolResult]) -> String {
    results.iter().map(render_tool_result).collect::<Vec<_>>().join("\n")
}
