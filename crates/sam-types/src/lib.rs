// SPDX-License-Identifier: Apache-2.0
//! Core data model shared by every SAM crate: the `Task`/`TaskExecutionContext`
//! family, the A2A wire envelope, and the error taxonomy.

mod a2a;
mod agent_card;
mod error;
mod task;
mod tec;

pub use a2a::*;
pub use agent_card::*;
pub use error::*;
pub use task::*;
pub use tec::*;

/// Current wall-clock time as epoch-milliseconds, the only timestamp
/// representation the Checkpoint Store ever persists.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
