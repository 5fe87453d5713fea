// SPDX-License-Identifier: Apache-2.0
//! Deterministic test doubles for every external collaborator the core
//! consumes (spec §6, §13): an `LlmClient`, `ToolRegistry`, `ArtifactStore`,
//! and a recording `Gateway`, modeled on `sven-model`'s
//! `ScriptedMockProvider` (`crates/sven-model/src/mock.rs`).

mod artifact;
mod gateway;
mod llm;
mod tools;

pub use artifact::*;
pub use gateway::*;
pub use llm::*;
pub use tools::*;
