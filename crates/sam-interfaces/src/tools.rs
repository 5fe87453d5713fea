// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use sam_types::SamError;

/// Describes one callable tool (local or peer delegation) as seen by the
/// turn algorithm (spec §6 `ToolRegistry`).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    pub required_scopes: Vec<String>,
    /// `Some(peer_agent_name)` when this tool name routes to a peer agent
    /// via the Broker Adapter instead of executing in-process.
    pub peer_agent_name: Option<String>,
}

impl ToolSpec {
    pub fn is_peer_delegation(&self) -> bool {
        self.peer_agent_name.is_some()
    }
}

/// The tool catalog a delegating agent consults to classify a tool call
/// as local-synchronous or peer-delegation (spec §6 `ToolRegistry`).
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<ToolSpec>;

    fn is_peer_delegation(&self, name: &str) -> bool {
        self.lookup(name).map(|s| s.is_peer_delegation()).unwrap_or(false)
    }

    /// Enumerates every tool this registry knows about, local and
    /// peer-delegation alike. Used to populate an `AgentCard`'s
    /// `tool_signatures` when the Discovery publisher announces this
    /// agent (spec §4.6 "Discovery").
    fn all_specs(&self) -> Vec<ToolSpec>;

    /// Executes a local (non-peer-delegation) tool synchronously. Never
    /// called for a tool where [`ToolRegistry::is_peer_delegation`] is true.
    async fn execute_local(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<sam_types::ToolResult, SamError>;
}
