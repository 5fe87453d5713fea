// SPDX-License-Identifier: Apache-2.0
//! The Agent Core (spec §4.3): the task lifecycle state machine that owns
//! a task from arrival to terminal response, including peer delegation,
//! parallel-tool aggregation, streaming status, checkpoint/restore, and
//! timeout sweeping.
//!
//! Grounded on `sven-core/agent.rs`'s model↔tool run loop (round counter,
//! parallel tool dispatch via `tokio::spawn`) and `sven-node/control/
//! service.rs`'s `tokio::select!`-driven single-owner service loop,
//! generalized so a tool call classified as peer-delegation suspends via
//! the Broker Adapter + Checkpoint Store instead of recursing in-process.

mod agent_core;
mod deps;
mod discovery;
mod middleware;
mod registry;
mod sweeper;
mod turn;

pub use agent_core::*;
pub use deps::*;
pub use discovery::*;
pub use middleware::*;
pub use registry::*;
pub use sweeper::*;
pub use turn::*;
