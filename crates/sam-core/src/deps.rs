// SPDX-License-Identifier: Apache-2.0
//! Construction-time dependency bundle (spec §9 design note: "Global
//! mutable registries" — the source keeps thread-local tool registries
//! and process-wide histograms; here every collaborator is owned by the
//! `AgentCore` instance that was constructed with it, never a
//! process-global singleton).

use std::sync::Arc;

use sam_broker::BrokerAdapter;
use sam_checkpoint::CheckpointStore;
use sam_config::AgentConfig;
use sam_interfaces::{AccessValidator, ArtifactStore, LlmClient, ToolRegistry};

use crate::ToolMiddleware;

/// Every external collaborator the Agent Core consumes (spec §6), bundled
/// once at process construction and shared (via `Arc`) across the worker
/// pool, the Timeout Sweeper, and the discovery publisher.
pub struct AgentDeps {
    pub config: Arc<AgentConfig>,
    pub broker: Arc<dyn BrokerAdapter>,
    pub checkpoint: Arc<CheckpointStore>,
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<dyn ToolRegistry>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub access: Arc<dyn AccessValidator>,
    pub middlewares: Vec<Box<dyn ToolMiddleware>>,
}

impl AgentDeps {
    pub fn new(
        config: Arc<AgentConfig>,
        broker: Arc<dyn BrokerAdapter>,
        checkpoint: Arc<CheckpointStore>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolRegistry>,
        artifacts: Arc<dyn ArtifactStore>,
        access: Arc<dyn AccessValidator>,
    ) -> Self {
        Self { config, broker, checkpoint, llm, tools, artifacts, access, middlewares: Vec::new() }
    }

    pub fn with_middleware(mut self, mw: Box<dyn ToolMiddleware>) -> Self {
        self.middlewares.push(mw);
        self
    }
}
