// SPDX-License-Identifier: Apache-2.0
//! The narrow trait boundaries the Agent Core consumes (spec §6):
//! `LlmClient`, `ToolRegistry`, `ArtifactStore`, `AccessValidator`, and
//! `Gateway`. None of these are implemented as real integrations in this
//! repository — they are the external-collaborator seams; `sam-testing`
//! provides deterministic doubles for every one of them.

mod access;
mod artifact;
mod gateway;
mod llm;
mod tools;

pub use access::*;
pub use artifact::*;
pub use gateway::*;
pub use llm::*;
pub use tools::*;
