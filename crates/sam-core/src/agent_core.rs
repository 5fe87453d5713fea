// SPDX-License-Identifier: Apache-2.0
//! The Agent Core's process-level wiring (spec §4.3, §5 "Concurrency &
//! Resource Model"): subscribes to this agent's request and response
//! topics, classifies inbound JSON-RPC envelopes, and dispatches each to
//! a bounded worker pool. Grounded on `sven-node/control/service.rs`'s
//! `ControlService::run()` — a `tokio::select!`-driven loop pulling off
//! a handful of channels, each message handled by a pooled worker —
//! generalized to two broker subscriptions (request, response) instead
//! of in-process command channels.

use std::sync::Arc;

use sam_types::{topics, CancelTaskRequest, PeerResponseEnvelope, SamError, SendMessageParams};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::{cancel_task, integrate_result, start_new_task, AgentDeps, TecRegistry};

/// Peeks at a JSON-RPC envelope's `method` field without committing to
/// either request shape.
#[derive(Debug, Deserialize)]
struct MethodPeek {
    method: String,
}

/// Owns the bounded worker pool and the two broker subscriptions this
/// agent process consumes: `agent/request/{self}` (new tasks and
/// cancellations) and `agent/response/{self}/*` (peer responses).
pub struct AgentCore {
    deps: Arc<AgentDeps>,
    registry: Arc<TecRegistry>,
    workers: Arc<Semaphore>,
}

impl AgentCore {
    pub fn new(deps: Arc<AgentDeps>) -> Arc<Self> {
        let workers = Arc::new(Semaphore::new(deps.config.worker_pool_size.max(1) as usize));
        Arc::new(Self { deps, registry: Arc::new(TecRegistry::new()), workers })
    }

    /// The `TecRegistry` backing this core, shared with the Timeout
    /// Sweeper and Discovery publisher constructed alongside it.
    pub fn registry(&self) -> Arc<TecRegistry> {
        self.registry.clone()
    }

    /// Subscribes to this agent's request and response topics and runs
    /// both consumption loops to completion (they never return under
    /// normal operation; `Err` only propagates a subscribe-time
    /// transport failure).
    pub async fn run(self: Arc<Self>) -> Result<(), SamError> {
        let ns = self.deps.config.namespace.clone();
        let name = self.deps.config.agent_name.clone();

        let request_topic = topics::request(&ns, &name);
        let response_pattern = format!("{ns}/a2a/v1/agent/response/{name}/*");

        let mut request_sub = self.deps.broker.subscribe(&request_topic).await?;
        let mut response_sub = self.deps.broker.subscribe(&response_pattern).await?;

        let request_loop = {
            let this = self.clone();
            async move {
                while let Some(msg) = request_sub.recv().await {
                    AgentCore::dispatch(this.clone(), msg, AgentCore::handle_request).await;
                }
            }
        };
        let response_loop = {
            let this = self.clone();
            async move {
                while let Some(msg) = response_sub.recv().await {
                    AgentCore::dispatch(this.clone(), msg, AgentCore::handle_response).await;
                }
            }
        };

        tokio::join!(request_loop, response_loop);
        Ok(())
    }

    /// Bounds concurrent in-flight handlers to `worker_pool_size` (spec
    /// §5 "A fixed-size worker pool handles inbound broker messages").
    /// When every worker is busy, the message is negatively-acknowledged
    /// so the broker can redeliver it rather than blocking this loop
    /// (spec §5 "Backpressure").
    async fn dispatch<F, Fut>(this: Arc<Self>, msg: sam_broker::IncomingMessage, handler: F)
    where
        F: FnOnce(Arc<Self>, sam_broker::IncomingMessage) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), SamError>> + Send,
    {
        let Ok(permit) = this.workers.clone().try_acquire_owned() else {
            if let Err(e) = this.deps.broker.negative_acknowledge(msg.handle).await {
                warn!(error = %e, "failed to nack backpressured message");
            }
            return;
        };
        tokio::spawn(async move {
            let _permit = permit;
            let handle = msg.handle;
            match handler(this.clone(), msg).await {
                Ok(()) => {
                    if let Err(e) = this.deps.broker.acknowledge(handle).await {
                        warn!(error = %e, "failed to acknowledge processed message");
                    }
                }
                Err(e) => {
                    error!(error = %e, "message handling failed");
                    if let Err(e) = this.deps.broker.negative_acknowledge(handle).await {
                        warn!(error = %e, "failed to nack failed message");
                    }
                }
            }
        });
    }

    /// Classifies and handles one inbound `agent/request/{self}` message:
    /// `message/send`/`message/stream` starts a new task (spec §4.3 step
    /// 1); `tasks/cancel` drives the named task's cancellation path.
    async fn handle_request(self: Arc<Self>, msg: sam_broker::IncomingMessage) -> Result<(), SamError> {
        let method = match serde_json::from_value::<MethodPeek>(msg.payload.clone()) {
            Ok(peek) => peek.method,
            Err(e) => {
                warn!(error = %e, "dropping malformed request envelope");
                return Ok(());
            }
        };

        match method.as_str() {
            "message/send" | "message/stream" => self.handle_new_task(msg).await,
            "tasks/cancel" => self.handle_cancel(msg).await,
            other => {
                warn!(method = other, "dropping request with unknown method");
                Ok(())
            }
        }
    }

    async fn handle_new_task(self: Arc<Self>, msg: sam_broker::IncomingMessage) -> Result<(), SamError> {
        let params: SendMessageParams = match serde_json::from_value(msg.payload) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "dropping malformed message/send request");
                return Ok(());
            }
        };

        let task_id = format!("task_{}", uuid::Uuid::new_v4());
        let user_text = params
            .message
            .parts
            .iter()
            .filter_map(|p| match p {
                sam_types::MessagePart::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let a2a_context = sam_types::A2aContext {
            effective_session_id: params.message.message_id.clone(),
            user_id: msg.user_properties.user_id.clone().unwrap_or_default(),
            logical_task_id: task_id.clone(),
            agent_name: params.message.metadata.agent_name.clone().unwrap_or_else(|| self.deps.config.agent_name.clone()),
            parent_task_id: params.message.metadata.parent_task_id.clone(),
            originator_gateway_id: msg.user_properties.client_id.clone(),
            reply_to: msg.user_properties.reply_to.clone(),
            status_to: msg.user_properties.status_to.clone(),
            rpc_id: None,
            extra: Default::default(),
        };

        debug!(task_id = %task_id, "starting new task");
        start_new_task(self.deps.clone(), self.registry.clone(), task_id, a2a_context, user_text).await
    }

    async fn handle_cancel(self: Arc<Self>, msg: sam_broker::IncomingMessage) -> Result<(), SamError> {
        let request: CancelTaskRequest = match serde_json::from_value(msg.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "dropping malformed tasks/cancel request");
                return Ok(());
            }
        };
        cancel_task(self.deps.clone(), self.registry.clone(), &request.params.task_id).await
    }

    /// Handles one inbound `agent/response/{self}/{sub_task_id}` message
    /// (spec §4.3 step 4 "Result integration"). The claim is the sole
    /// arbiter of at-most-once delivery: a `None` means this response is
    /// a duplicate or a late arrival racing a timeout sweep, and is
    /// ack-and-dropped per spec §8 boundary behavior.
    async fn handle_response(self: Arc<Self>, msg: sam_broker::IncomingMessage) -> Result<(), SamError> {
        let Some(sub_task_id) = msg.topic.rsplit('/').next() else {
            warn!(topic = %msg.topic, "response topic missing sub_task_id segment");
            return Ok(());
        };

        let Some(record) = self.deps.checkpoint.claim_peer_sub_task(sub_task_id)? else {
            debug!(sub_task_id, "no claimable peer sub-task; duplicate or post-timeout late arrival");
            return Ok(());
        };

        let envelope: PeerResponseEnvelope = match serde_json::from_value(msg.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, sub_task_id, "malformed peer response envelope after claim");
                return Ok(());
            }
        };
        let result = envelope.into_tool_result();

        integrate_result(self.deps.clone(), self.registry.clone(), &record.logical_task_id, record.invocation_id.as_deref(), result).await
    }
}
