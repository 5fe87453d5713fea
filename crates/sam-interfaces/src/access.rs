// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use sam_types::SamError;

/// Authorization seam consulted before every peer delegation (spec §6
/// `AccessValidator`). A rejection is surfaced as
/// [`SamError::PermissionDenied`], which the turn algorithm feeds back to
/// the LLM as a tool error rather than propagating (spec §7).
#[async_trait]
pub trait AccessValidator: Send + Sync {
    async fn validate_agent_access(
        &self,
        user_config: &serde_json::Value,
        target_agent: &str,
    ) -> Result<(), SamError>;
}

/// An `AccessValidator` that rejects self-delegation and otherwise always
/// allows — the minimum policy spec §8's boundary behaviors require
/// ("agents MUST NOT delegate to themselves; the validator rejects this").
pub struct DefaultAccessValidator {
    pub own_agent_name: String,
}

#[async_trait]
impl AccessValidator for DefaultAccessValidator {
    async fn validate_agent_access(
        &self,
        _user_config: &serde_json::Value,
        target_agent: &str,
    ) -> Result<(), SamError> {
        if target_agent == self.own_agent_name {
            return Err(SamError::PermissionDenied {
                target_agent: target_agent.to_string(),
                reason: "agents may not delegate to themselves".to_string(),
            });
        }
        Ok(())
    }
}
