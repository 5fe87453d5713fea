// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use sam_checkpoint::CheckpointStore;
use sam_types::{SamError, TaskExecutionContext};
use tokio::sync::Mutex;
use tracing::trace;

/// The resident set of in-memory `TaskExecutionContext`s, guarded by a
/// per-task lock (spec §4.2 "Concurrency"). A task is evicted from this
/// map on transition to `awaiting_peer`/`awaiting_parallel` (spec §4.3)
/// and restored on demand when its response or timeout arrives — the
/// Checkpoint Store, not this map, is the durable source of truth.
#[derive(Default)]
pub struct TecRegistry {
    resident: StdMutex<HashMap<String, Arc<Mutex<TaskExecutionContext>>>>,
    /// Serializes the check-then-restore-then-insert sequence in
    /// `get_or_restore` so two concurrent callers for the same task (a
    /// peer response racing a `tasks/cancel`, say) can never each
    /// restore their own handle and silently diverge. Restores are rare
    /// enough that a single global lock here costs nothing worth
    /// optimizing away.
    restore_lock: Mutex<()>,
}

impl TecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly constructed or freshly restored TEC, making it
    /// resident.
    pub fn insert(&self, tec: TaskExecutionContext) -> Arc<Mutex<TaskExecutionContext>> {
        let handle = Arc::new(Mutex::new(tec));
        self.resident
            .lock()
            .unwrap()
            .insert(handle_task_id(&handle), handle.clone());
        handle
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<Mutex<TaskExecutionContext>>> {
        self.resident.lock().unwrap().get(task_id).cloned()
    }

    /// Evicts a task from memory (spec §4.3 `awaiting_peer`: "TEC may be
    /// evicted from memory"). The caller is responsible for having
    /// checkpointed it first.
    pub fn evict(&self, task_id: &str) {
        self.resident.lock().unwrap().remove(task_id);
        trace!(task_id, "evicted TEC from residency");
    }

    /// Returns the resident TEC for `task_id`, restoring it from the
    /// Checkpoint Store if it isn't currently in memory (spec §4.3 step 4,
    /// "Restore TEC from checkpoint if not resident").
    pub async fn get_or_restore(
        &self,
        task_id: &str,
        checkpoint: &CheckpointStore,
    ) -> Result<Arc<Mutex<TaskExecutionContext>>, SamError> {
        let _guard = self.restore_lock.lock().await;
        if let Some(existing) = self.get(task_id) {
            return Ok(existing);
        }
        let blob = checkpoint
            .restore(task_id)?
            .ok_or_else(|| SamError::Checkpoint(format!("no paused_task row for {task_id}")))?;
        let tec = TaskExecutionContext::from_checkpoint(blob);
        Ok(self.insert(tec))
    }
}

/// Helper since `TaskExecutionContext` doesn't implement `Clone` — reads
/// the task id out of an already-locked-free handle by taking the lock
/// briefly. Only ever called immediately after construction, before the
/// handle has been shared, so this never contends.
fn handle_task_id(handle: &Arc<Mutex<TaskExecutionContext>>) -> String {
    handle
        .try_lock()
        .expect("freshly constructed TEC handle is never contended")
        .task_id
        .clone()
}
