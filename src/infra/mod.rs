// SPDX-License-Identifier: Apache-2.0
//! Concrete default implementations of the external-collaborator traits
//! `sam-interfaces` defines, wired up by the binary. None of these live
//! in the library crates: spec §6 treats the LLM, tool catalog, and
//! artifact store as pluggable seams, so a real default belongs at the
//! process's composition root, same as `sven`'s `main.rs::build_agent_for_gateway`
//! constructs concrete tools/providers rather than the library crates
//! doing it themselves.

pub mod demo_llm;
pub mod fs_artifacts;
pub mod http_llm;
pub mod manifest_tools;
