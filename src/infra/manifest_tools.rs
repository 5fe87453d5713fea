// SPDX-License-Identifier: Apache-2.0
//! A `ToolRegistry` populated from a YAML manifest file, separate from
//! `AgentConfig` (spec §6's configuration table is exact; a tool catalog
//! is deployment-specific, not part of that schema). Grounded on
//! `sven-tools/registry.rs`'s `HashMap<String, Arc<dyn Tool>>` registry,
//! generalized to the local-vs-peer-delegation split and loaded
//! declaratively instead of by `register()` call per built-in type.

use std::collections::HashMap;

use async_trait::async_trait;
use sam_interfaces::{ToolRegistry, ToolSpec};
use sam_types::{SamError, ToolResult};
use serde::Deserialize;

/// One manifest entry. `peer_agent_name` being present makes this a
/// peer-delegation tool; otherwise it must name a built-in local tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolManifestEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub parameters_schema: serde_json::Value,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    #[serde(default)]
    pub peer_agent_name: Option<String>,
    /// Name of the built-in local handler, e.g. `"echo"`. Ignored for
    /// peer-delegation entries.
    #[serde(default)]
    pub builtin: Option<String>,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

#[derive(Debug, Deserialize)]
struct ToolManifest {
    #[serde(default)]
    tools: Vec<ToolManifestEntry>,
}

pub struct ManifestToolRegistry {
    specs: HashMap<String, ToolSpec>,
    builtins: HashMap<String, String>,
}

impl ManifestToolRegistry {
    /// An empty registry (no local or peer-delegation tools). Useful as a
    /// starting point for a process that only ever receives peer
    /// delegations from others and never itself delegates.
    pub fn empty() -> Self {
        Self { specs: HashMap::new(), builtins: HashMap::new() }
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let manifest: ToolManifest = serde_yaml::from_str(&text)?;
        let mut specs = HashMap::new();
        let mut builtins = HashMap::new();
        for entry in manifest.tools {
            let builtin_name = entry.builtin.clone().unwrap_or_else(|| entry.name.clone());
            if entry.peer_agent_name.is_none() {
                builtins.insert(entry.name.clone(), builtin_name);
            }
            specs.insert(
                entry.name.clone(),
                ToolSpec {
                    name: entry.name,
                    description: entry.description,
                    parameters_schema: entry.parameters_schema,
                    required_scopes: entry.required_scopes,
                    peer_agent_name: entry.peer_agent_name,
                },
            );
        }
        Ok(Self { specs, builtins })
    }
}

#[async_trait]
impl ToolRegistry for ManifestToolRegistry {
    fn lookup(&self, name: &str) -> Option<ToolSpec> {
        self.specs.get(name).cloned()
    }

    fn all_specs(&self) -> Vec<ToolSpec> {
        self.specs.values().cloned().collect()
    }

    async fn execute_local(&self, name: &str, arguments: serde_json::Value) -> Result<ToolResult, SamError> {
        let builtin = self.builtins.get(name).ok_or_else(|| SamError::Tool {
            tool_name: name.to_string(),
            message: "no local handler registered".to_string(),
        })?;

        match builtin.as_str() {
            "echo" => {
                let text = arguments.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                Ok(ToolResult::Text { text })
            }
            other => Err(SamError::Tool { tool_name: name.to_string(), message: format!("unknown builtin '{other}'") }),
        }
    }
}
