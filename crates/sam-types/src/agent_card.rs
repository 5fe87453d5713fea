// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// One tool signature advertised on an agent's discovery card, used by
/// peers to decide whether (and how) to delegate to this agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSignature {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Published periodically on the `discovery/agentcards` topic (spec §3
/// "AgentCard"). Consumed by peers to build their own delegation catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCard {
    pub agent_name: String,
    pub skills: Vec<String>,
    pub tool_signatures: Vec<ToolSignature>,
    pub published_at_epoch_ms: i64,
}

impl AgentCard {
    pub fn new(agent_name: impl Into<String>, skills: Vec<String>, tool_signatures: Vec<ToolSignature>) -> Self {
        Self {
            agent_name: agent_name.into(),
            skills,
            tool_signatures,
            published_at_epoch_ms: crate::now_epoch_ms(),
        }
    }
}
