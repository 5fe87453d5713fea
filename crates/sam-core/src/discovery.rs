// SPDX-License-Identifier: Apache-2.0
//! The Discovery publisher (spec §4.6 "Discovery"): a single dedicated
//! background worker that periodically announces this agent's
//! `AgentCard` on `{ns}/a2a/v1/discovery/agentcards`. Grounded on
//! `sven-node/control/service.rs`'s dedicated-background-worker pattern,
//! the same shape `TimeoutSweeper` reuses — one fixed-interval
//! `tokio::time::interval` loop owned by its own task.

use std::sync::Arc;
use std::time::Duration;

use sam_types::{topics, AgentCard, SamError, ToolSignature, UserProperties};
use tracing::{error, warn};

use crate::AgentDeps;

/// Publishes this agent's [`AgentCard`] on a fixed interval. Setting
/// `discovery_publish_interval_seconds` to 0 in config disables the
/// publisher entirely (spec §6 "Configuration").
pub struct DiscoveryPublisher {
    deps: Arc<AgentDeps>,
}

impl DiscoveryPublisher {
    pub fn new(deps: Arc<AgentDeps>) -> Self {
        Self { deps }
    }

    /// Runs forever, publishing on a fixed interval. Returns immediately
    /// without publishing anything if the interval is configured as 0.
    pub async fn run(self) {
        let interval_seconds = self.deps.config.discovery_publish_interval_seconds;
        if interval_seconds == 0 {
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            ticker.tick().await;
            if let Err(e) = self.publish_once().await {
                error!(error = %e, "discovery heartbeat publish failed");
            }
        }
    }

    /// Publishes exactly one heartbeat. Exposed separately from
    /// [`DiscoveryPublisher::run`] so tests can drive it deterministically.
    pub async fn publish_once(&self) -> Result<(), SamError> {
        let card = self.build_card();
        let topic = topics::discovery_agentcards(&self.deps.config.namespace);
        let payload = serde_json::to_value(&card).map_err(|e| SamError::Transport(e.to_string()))?;
        self.deps.broker.publish(&topic, payload, UserProperties::default()).await
    }

    fn build_card(&self) -> AgentCard {
        let specs = self.deps.tools.all_specs();
        let skills: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let tool_signatures: Vec<ToolSignature> = specs
            .into_iter()
            .map(|s| ToolSignature {
                name: s.name,
                description: s.description,
                parameters_schema: s.parameters_schema,
            })
            .collect();
        if skills.is_empty() {
            warn!(agent_name = %self.deps.config.agent_name, "publishing agent card with no registered tools");
        }
        AgentCard::new(self.deps.config.agent_name.clone(), skills, tool_signatures)
    }
}
