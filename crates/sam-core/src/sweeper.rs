// SPDX-License-Identifier: Apache-2.0
//! The Timeout Sweeper (spec §4.5): a single dedicated background
//! worker that advances time for paused tasks waiting on a peer
//! response. Grounded on `sven-node/control/service.rs`'s dedicated
//! background-worker pattern; the sweep operation itself has no direct
//! teacher precedent (new, per spec §4.5).

use std::sync::Arc;
use std::time::Duration;

use sam_types::{now_epoch_ms, SamError, ToolResult};
use tracing::{error, info, warn};

use crate::{integrate_result, AgentDeps, TecRegistry};

/// Drives the loop described in spec §4.5: every `timeout_sweep_interval_ms`,
/// claim every expired `peer_sub_task` row for this agent and synthesize a
/// timeout result for each, injected into the Agent Core exactly as if it
/// had arrived on the response topic (restore → integrate → resume).
pub struct TimeoutSweeper {
    deps: Arc<AgentDeps>,
    registry: Arc<TecRegistry>,
}

impl TimeoutSweeper {
    pub fn new(deps: Arc<AgentDeps>, registry: Arc<TecRegistry>) -> Self {
        Self { deps, registry }
    }

    /// Runs forever, sweeping on a fixed interval. Intended to be spawned
    /// as its own background task alongside the worker pool.
    pub async fn run(self) {
        let interval_ms = self.deps.config.timeout_sweep_interval_ms.max(1);
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "timeout sweep cycle failed");
            }
        }
    }

    /// One sweep cycle (spec §4.5 steps 1–3). Exposed separately from
    /// [`TimeoutSweeper::run`] so tests can drive exactly one cycle
    /// deterministically instead of waiting on a real timer.
    pub async fn sweep_once(&self) -> Result<(), SamError> {
        let now = now_epoch_ms();
        let expired = self.deps.checkpoint.sweep_expired_timeouts(&self.deps.config.agent_name, now)?;
        if expired.is_empty() {
            return Ok(());
        }
        info!(count = expired.len(), "sweeping expired peer sub-tasks");

        for record in expired {
            let result = ToolResult::timeout(&record.peer_tool_name);
            let deps = self.deps.clone();
            let registry = self.registry.clone();
            let task_id = record.logical_task_id.clone();
            let invocation_id = record.invocation_id.clone();
            if let Err(e) =
                integrate_result(deps, registry, &task_id, invocation_id.as_deref(), result).await
            {
                warn!(task_id, error = %e, "failed integrating synthesized timeout result");
            }
        }
        Ok(())
    }
}
