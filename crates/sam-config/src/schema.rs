// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// The agent process's configuration, assembled from the layered YAML
/// search path (see [`crate::load`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Validated/sanitized at load time: non `[A-Za-z0-9_]` characters are
    /// replaced with `_` and a warning is logged.
    pub agent_name: String,
    pub namespace: String,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: u32,
    #[serde(default = "default_timeout_sweep_interval_ms")]
    pub timeout_sweep_interval_ms: u64,
    #[serde(default = "default_llm_retry_max_attempts")]
    pub llm_retry_max_attempts: u32,
    #[serde(default = "default_peer_timeout_seconds")]
    pub default_peer_timeout_seconds: u64,
    #[serde(default = "default_discovery_publish_interval_seconds")]
    pub discovery_publish_interval_seconds: u64,
    pub checkpoint_backend_url: String,
}

fn default_worker_pool_size() -> u32 {
    8
}

fn default_timeout_sweep_interval_ms() -> u64 {
    1000
}

fn default_llm_retry_max_attempts() -> u32 {
    3
}

fn default_peer_timeout_seconds() -> u64 {
    300
}

fn default_discovery_publish_interval_seconds() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_name: String::new(),
            namespace: String::new(),
            worker_pool_size: default_worker_pool_size(),
            timeout_sweep_interval_ms: default_timeout_sweep_interval_ms(),
            llm_retry_max_attempts: default_llm_retry_max_attempts(),
            default_peer_timeout_seconds: default_peer_timeout_seconds(),
            discovery_publish_interval_seconds: default_discovery_publish_interval_seconds(),
            checkpoint_backend_url: "sqlite::memory:".to_string(),
        }
    }
}

impl AgentConfig {
    /// Sanitize `agent_name` in place, returning `true` if it was changed.
    pub fn sanitize_agent_name(&mut self) -> bool {
        let sanitized: String = self
            .agent_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let changed = sanitized != self.agent_name;
        self.agent_name = sanitized;
        changed
    }
}
