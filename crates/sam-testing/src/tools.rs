// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sam_interfaces::{ToolRegistry, ToolSpec};
use sam_types::{SamError, ToolResult};

/// A fixed catalog of tool specs (local and peer-delegation) with
/// canned local-execution results, modeled on `sven-tools`'s
/// `HashMap<String, Arc<dyn Tool>>` registry generalized to the
/// spec's local-vs-peer-delegation split (spec §6 `ToolRegistry`).
pub struct StaticToolRegistry {
    specs: HashMap<String, ToolSpec>,
    local_results: Mutex<HashMap<String, ToolResult>>,
    /// Names of local tools invoked, in call order — lets tests assert
    /// dispatch order and idempotency (spec §4.3 "Idempotency").
    pub local_invocations: Mutex<Vec<String>>,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self { specs: HashMap::new(), local_results: Mutex::new(HashMap::new()), local_invocations: Mutex::new(Vec::new()) }
    }

    /// Registers a peer-delegation tool: calling it routes through the
    /// Broker Adapter to `peer_agent_name` instead of executing locally.
    pub fn with_peer_tool(mut self, name: impl Into<String>, peer_agent_name: impl Into<String>) -> Self {
        let name = name.into();
        self.specs.insert(
            name.clone(),
            ToolSpec {
                name,
                description: "peer delegation".to_string(),
                parameters_schema: serde_json::json!({"type": "object"}),
                required_scopes: vec![],
                peer_agent_name: Some(peer_agent_name.into()),
            },
        );
        self
    }

    /// Registers a local tool with a fixed result returned every time it
    /// is executed.
    pub fn with_local_tool(mut self, name: impl Into<String>, result: ToolResult) -> Self {
        let name = name.into();
        self.specs.insert(
            name.clone(),
            ToolSpec {
                name: name.clone(),
                description: "local tool".to_string(),
                parameters_schema: serde_json::json!({"type": "object"}),
                required_scopes: vec![],
                peer_agent_name: None,
            },
        );
        self.local_results.lock().unwrap().insert(name, result);
        self
    }
}

impl Default for StaticToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    fn lookup(&self, name: &str) -> Option<ToolSpec> {
        self.specs.get(name).cloned()
    }

    fn all_specs(&self) -> Vec<ToolSpec> {
        self.specs.values().cloned().collect()
    }

    async fn execute_local(&self, name: &str, _arguments: serde_json::Value) -> Result<ToolResult, SamError> {
        self.local_invocations.lock().unwrap().push(name.to_string());
        self.local_results
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SamError::Tool { tool_name: name.to_string(), message: "no scripted result".to_string() })
    }
}
