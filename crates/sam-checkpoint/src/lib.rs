// SPDX-License-Identifier: Apache-2.0
//! The Checkpoint Store (spec §4.4): durable, database-backed persistence
//! of paused task state and peer correlations.
//!
//! Grounded on `lanegrid-agtrace`'s `agtrace-index/src/db.rs` (`init_schema`
//! via `execute_batch`, upsert via `ON CONFLICT DO UPDATE`, `query_row`
//! + `.optional()`), extended with the one operation that repo has no
//! precedent for: the destructive claim.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use sam_types::{CheckpointBlob, ParallelInvocationState, PeerSubTaskRecord, SamError, ToolResult};
use tracing::{debug, trace, warn};

/// Wraps the SQLite connection in a `Mutex` because, unlike
/// `agtrace-index`'s single-threaded CLI use, the Checkpoint Store here
/// is shared across every worker in the pool (spec §5) — mutual
/// exclusion on the connection itself is cheap compared to the
/// transactional work each call does anyway.
pub struct CheckpointStore {
    conn: Mutex<Connection>,
}

fn sam_err(e: rusqlite::Error) -> SamError {
    SamError::Checkpoint(e.to_string())
}

impl CheckpointStore {
    pub fn open(db_path: &Path) -> Result<Self, SamError> {
        let conn = Connection::open(db_path).map_err(sam_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, SamError> {
        let conn = Connection::open_in_memory().map_err(sam_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), SamError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS paused_task (
                task_id     TEXT PRIMARY KEY,
                agent_name  TEXT NOT NULL,
                tec_blob    TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS peer_sub_task (
                sub_task_id         TEXT PRIMARY KEY,
                logical_task_id     TEXT NOT NULL REFERENCES paused_task(task_id),
                agent_name          TEXT NOT NULL,
                peer_tool_name      TEXT NOT NULL,
                peer_agent_name     TEXT NOT NULL,
                adk_function_call_id TEXT NOT NULL,
                invocation_id       TEXT,
                deadline_epoch_ms   INTEGER NOT NULL,
                claimed             INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_peer_sub_task_logical_task
                ON peer_sub_task(logical_task_id);
            CREATE INDEX IF NOT EXISTS idx_peer_sub_task_agent_deadline
                ON peer_sub_task(agent_name, deadline_epoch_ms, claimed);

            CREATE TABLE IF NOT EXISTS parallel_invocation (
                task_id       TEXT NOT NULL REFERENCES paused_task(task_id),
                invocation_id TEXT NOT NULL,
                total         INTEGER NOT NULL,
                completed     INTEGER NOT NULL,
                results_blob  TEXT NOT NULL,
                PRIMARY KEY (task_id, invocation_id)
            );
            ",
        )
        .map_err(sam_err)?;
        Ok(())
    }

    /// Transactionally upserts `paused_task`, replaces the set of
    /// `peer_sub_task` rows for `task_id`, and writes/updates
    /// `parallel_invocation` rows derived from the TEC (spec §4.4
    /// `checkpoint`).
    pub fn checkpoint(
        &self,
        agent_name: &str,
        blob: &CheckpointBlob,
        peer_sub_tasks: &[PeerSubTaskRecord],
        parallel_invocations: &[(String, ParallelInvocationState)],
        now_epoch_ms: i64,
    ) -> Result<(), SamError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(sam_err)?;

        let tec_json = serde_json::to_string(blob)
            .map_err(|e| SamError::Checkpoint(format!("serializing TEC blob: {e}")))?;

        tx.execute(
            "INSERT INTO paused_task (task_id, agent_name, tec_blob, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(task_id) DO UPDATE SET
                tec_blob = excluded.tec_blob,
                updated_at = excluded.updated_at",
            params![blob.task_id, agent_name, tec_json, now_epoch_ms],
        )
        .map_err(sam_err)?;

        tx.execute(
            "DELETE FROM peer_sub_task WHERE logical_task_id = ?1",
            params![blob.task_id],
        )
        .map_err(sam_err)?;
        for record in peer_sub_tasks {
            tx.execute(
                "INSERT INTO peer_sub_task
                    (sub_task_id, logical_task_id, agent_name, peer_tool_name,
                     peer_agent_name, adk_function_call_id, invocation_id,
                     deadline_epoch_ms, claimed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
                params![
                    record.sub_task_id,
                    record.logical_task_id,
                    agent_name,
                    record.peer_tool_name,
                    record.peer_agent_name,
                    record.adk_function_call_id,
                    record.invocation_id,
                    record.deadline_epoch_ms,
                ],
            )
            .map_err(sam_err)?;
        }

        for (invocation_id, state) in parallel_invocations {
            let results_json = serde_json::to_string(&state.results)
                .map_err(|e| SamError::Checkpoint(format!("serializing results: {e}")))?;
            tx.execute(
                "INSERT INTO parallel_invocation (task_id, invocation_id, total, completed, results_blob)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(task_id, invocation_id) DO UPDATE SET
                    total = excluded.total,
                    completed = excluded.completed,
                    results_blob = excluded.results_blob",
                params![blob.task_id, invocation_id, state.total, state.completed, results_json],
            )
            .map_err(sam_err)?;
        }

        tx.commit().map_err(sam_err)?;
        trace!(task_id = %blob.task_id, peers = peer_sub_tasks.len(), "checkpointed");
        Ok(())
    }

    /// Loads the `paused_task` row's TEC blob. Returns `None` if absent
    /// (spec §4.4 `restore`).
    pub fn restore(&self, task_id: &str) -> Result<Option<CheckpointBlob>, SamError> {
        let conn = self.conn.lock().unwrap();
        let blob_json: Option<String> = conn
            .query_row(
                "SELECT tec_blob FROM paused_task WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sam_err)?;

        match blob_json {
            None => Ok(None),
            Some(json) => {
                let blob: CheckpointBlob = serde_json::from_str(&json)
                    .map_err(|e| SamError::Checkpoint(format!("deserializing TEC blob: {e}")))?;
                Ok(Some(blob))
            }
        }
    }

    /// The mutual-exclusion primitive of the entire system (spec §4.4,
    /// testable invariant 1): atomically claims and removes the
    /// `peer_sub_task` row, returning its correlation data on success or
    /// `None` if it was already claimed/absent (duplicate delivery or
    /// post-timeout late arrival).
    pub fn claim_peer_sub_task(
        &self,
        sub_task_id: &str,
    ) -> Result<Option<PeerSubTaskRecord>, SamError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(sam_err)?;

        let row: Option<(String, String, String, String, Option<String>, i64)> = tx
            .query_row(
                "SELECT logical_task_id, peer_tool_name, peer_agent_name,
                        adk_function_call_id, invocation_id, deadline_epoch_ms
                 FROM peer_sub_task
                 WHERE sub_task_id = ?1 AND claimed = 0",
                params![sub_task_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .map_err(sam_err)?;

        let Some((logical_task_id, peer_tool_name, peer_agent_name, adk_function_call_id, invocation_id, deadline_epoch_ms)) = row else {
            trace!(sub_task_id, "claim miss: already claimed or absent");
            return Ok(None);
        };

        let changed = tx
            .execute(
                "DELETE FROM peer_sub_task WHERE sub_task_id = ?1 AND claimed = 0",
                params![sub_task_id],
            )
            .map_err(sam_err)?;

        if changed == 0 {
            // Lost a race with a concurrent claim between the SELECT and
            // the DELETE; treat exactly like an absent row.
            tx.commit().map_err(sam_err)?;
            trace!(sub_task_id, "claim lost race");
            return Ok(None);
        }

        tx.commit().map_err(sam_err)?;
        debug!(sub_task_id, %logical_task_id, "claimed peer sub-task");
        Ok(Some(PeerSubTaskRecord {
            sub_task_id: sub_task_id.to_string(),
            logical_task_id,
            peer_tool_name,
            peer_agent_name,
            adk_function_call_id,
            invocation_id,
            deadline_epoch_ms,
        }))
    }

    /// Atomic read-modify-write appending `result` to the aggregator's
    /// `results_blob` and incrementing `completed` (spec §4.4
    /// `record_parallel_result`).
    pub fn record_parallel_result(
        &self,
        task_id: &str,
        invocation_id: &str,
        result: ToolResult,
    ) -> Result<(u32, u32), SamError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(sam_err)?;

        let (total, completed, results_json): (u32, u32, String) = tx
            .query_row(
                "SELECT total, completed, results_blob FROM parallel_invocation
                 WHERE task_id = ?1 AND invocation_id = ?2",
                params![task_id, invocation_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(sam_err)?;

        let mut results: Vec<ToolResult> = serde_json::from_str(&results_json)
            .map_err(|e| SamError::Checkpoint(format!("deserializing results: {e}")))?;
        results.push(result);
        let new_completed = completed + 1;
        let new_json = serde_json::to_string(&results)
            .map_err(|e| SamError::Checkpoint(format!("serializing results: {e}")))?;

        tx.execute(
            "UPDATE parallel_invocation SET completed = ?1, results_blob = ?2
             WHERE task_id = ?3 AND invocation_id = ?4",
            params![new_completed, new_json, task_id, invocation_id],
        )
        .map_err(sam_err)?;

        tx.commit().map_err(sam_err)?;
        Ok((new_completed, total))
    }

    /// Reads the full aggregator row back out once every slot has
    /// reported (spec §4.3 "Result integration", K>1 branch) — the
    /// counts alone from [`CheckpointStore::record_parallel_result`]
    /// don't carry the accumulated results.
    pub fn load_parallel_result_rows(
        &self,
        task_id: &str,
        invocation_id: &str,
    ) -> Result<ParallelInvocationState, SamError> {
        let conn = self.conn.lock().unwrap();
        let (total, completed, results_json): (u32, u32, String) = conn
            .query_row(
                "SELECT total, completed, results_blob FROM parallel_invocation
                 WHERE task_id = ?1 AND invocation_id = ?2",
                params![task_id, invocation_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(sam_err)?;
        let results: Vec<ToolResult> = serde_json::from_str(&results_json)
            .map_err(|e| SamError::Checkpoint(format!("deserializing results: {e}")))?;
        Ok(ParallelInvocationState { total, completed, results })
    }

    /// Removes a consumed aggregator row so it isn't re-checkpointed on
    /// the task's next suspension.
    pub fn clear_parallel_invocation(&self, task_id: &str, invocation_id: &str) -> Result<(), SamError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM parallel_invocation WHERE task_id = ?1 AND invocation_id = ?2",
            params![task_id, invocation_id],
        )
        .map_err(sam_err)?;
        Ok(())
    }

    pub fn reset_timeout_deadline(
        &self,
        sub_task_id: &str,
        new_deadline_epoch_ms: i64,
    ) -> Result<bool, SamError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE peer_sub_task SET deadline_epoch_ms = ?1 WHERE sub_task_id = ?2 AND claimed = 0",
                params![new_deadline_epoch_ms, sub_task_id],
            )
            .map_err(sam_err)?;
        Ok(changed > 0)
    }

    /// Atomically claims (destructively) all `peer_sub_task` rows for
    /// `agent_name` whose deadline has passed (spec §4.5). Equivalent to
    /// running [`CheckpointStore::claim_peer_sub_task`] on each expired
    /// row inside one transaction.
    pub fn sweep_expired_timeouts(
        &self,
        agent_name: &str,
        now_epoch_ms: i64,
    ) -> Result<Vec<PeerSubTaskRecord>, SamError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(sam_err)?;

        let mut expired = Vec::new();
        {
            let mut stmt = tx
                .prepare(
                    "SELECT sub_task_id, logical_task_id, peer_tool_name, peer_agent_name,
                            adk_function_call_id, invocation_id, deadline_epoch_ms
                     FROM peer_sub_task
                     WHERE agent_name = ?1 AND deadline_epoch_ms <= ?2 AND claimed = 0",
                )
                .map_err(sam_err)?;
            let rows = stmt
                .query_map(params![agent_name, now_epoch_ms], |row| {
                    Ok(PeerSubTaskRecord {
                        sub_task_id: row.get(0)?,
                        logical_task_id: row.get(1)?,
                        peer_tool_name: row.get(2)?,
                        peer_agent_name: row.get(3)?,
                        adk_function_call_id: row.get(4)?,
                        invocation_id: row.get(5)?,
                        deadline_epoch_ms: row.get(6)?,
                    })
                })
                .map_err(sam_err)?;
            for row in rows {
                expired.push(row.map_err(sam_err)?);
            }
        }

        for record in &expired {
            tx.execute(
                "DELETE FROM peer_sub_task WHERE sub_task_id = ?1 AND claimed = 0",
                params![record.sub_task_id],
            )
            .map_err(sam_err)?;
        }

        tx.commit().map_err(sam_err)?;
        if !expired.is_empty() {
            warn!(agent_name, count = expired.len(), "swept expired peer sub-tasks");
        }
        Ok(expired)
    }

    /// Removes all rows across the three tables for `task_id` (spec
    /// §4.4 `cleanup_task`), called on transition to TERMINAL.
    pub fn cleanup_task(&self, task_id: &str) -> Result<(), SamError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(sam_err)?;
        tx.execute("DELETE FROM parallel_invocation WHERE task_id = ?1", params![task_id])
            .map_err(sam_err)?;
        tx.execute("DELETE FROM peer_sub_task WHERE logical_task_id = ?1", params![task_id])
            .map_err(sam_err)?;
        tx.execute("DELETE FROM paused_task WHERE task_id = ?1", params![task_id])
            .map_err(sam_err)?;
        tx.commit().map_err(sam_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sam_types::{A2aContext, TaskExecutionContext};

    fn sample_blob(task_id: &str) -> CheckpointBlob {
        TaskExecutionContext::new(
            task_id,
            A2aContext { user_id: "u1".into(), ..Default::default() },
        )
        .to_checkpoint()
    }

    fn sample_peer_record(task_id: &str, sub_task_id: &str, deadline: i64) -> PeerSubTaskRecord {
        PeerSubTaskRecord {
            sub_task_id: sub_task_id.to_string(),
            logical_task_id: task_id.to_string(),
            peer_tool_name: "ask_research_agent".into(),
            peer_agent_name: "research".into(),
            adk_function_call_id: "fc-0".into(),
            invocation_id: None,
            deadline_epoch_ms: deadline,
        }
    }

    // ── checkpoint / restore round trip ──

    #[test]
    fn checkpoint_then_restore_round_trips() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        store.checkpoint("math", &blob, &[], &[], 1000).unwrap();

        let restored = store.restore("task-1").unwrap().unwrap();
        assert_eq!(restored, blob);
    }

    #[test]
    fn restore_missing_task_returns_none() {
        let store = CheckpointStore::open_in_memory().unwrap();
        assert!(store.restore("no-such-task").unwrap().is_none());
    }

    #[test]
    fn checkpoint_is_idempotent_upsert() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let mut blob = sample_blob("task-1");
        store.checkpoint("math", &blob, &[], &[], 1000).unwrap();
        blob.run_based_response_buffer = "updated".into();
        store.checkpoint("math", &blob, &[], &[], 2000).unwrap();

        let restored = store.restore("task-1").unwrap().unwrap();
        assert_eq!(restored.run_based_response_buffer, "updated");
    }

    // ── destructive claim: the at-most-one-claim invariant ──

    #[test]
    fn claim_succeeds_exactly_once() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        let record = sample_peer_record("task-1", "sub-1", 5000);
        store.checkpoint("math", &blob, &[record], &[], 1000).unwrap();

        let first = store.claim_peer_sub_task("sub-1").unwrap();
        assert!(first.is_some());
        let second = store.claim_peer_sub_task("sub-1").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn claim_on_unknown_sub_task_returns_none() {
        let store = CheckpointStore::open_in_memory().unwrap();
        assert!(store.claim_peer_sub_task("never-existed").unwrap().is_none());
    }

    // ── parallel aggregation monotonicity ──

    #[test]
    fn record_parallel_result_tracks_completion() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        let agg = ParallelInvocationState::new(2);
        store
            .checkpoint("math", &blob, &[], &[("inv-1".to_string(), agg)], 1000)
            .unwrap();

        let (completed, total) = store
            .record_parallel_result("task-1", "inv-1", ToolResult::Text { text: "a".into() })
            .unwrap();
        assert_eq!((completed, total), (1, 2));

        let (completed, total) = store
            .record_parallel_result("task-1", "inv-1", ToolResult::Text { text: "b".into() })
            .unwrap();
        assert_eq!((completed, total), (2, 2));
    }

    #[test]
    fn load_parallel_result_rows_returns_accumulated_results() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        store
            .checkpoint("math", &blob, &[], &[("inv-1".to_string(), ParallelInvocationState::new(2))], 1000)
            .unwrap();
        store.record_parallel_result("task-1", "inv-1", ToolResult::Text { text: "a".into() }).unwrap();
        store.record_parallel_result("task-1", "inv-1", ToolResult::Text { text: "b".into() }).unwrap();

        let state = store.load_parallel_result_rows("task-1", "inv-1").unwrap();
        assert_eq!(state.total, 2);
        assert_eq!(state.completed, 2);
        assert_eq!(state.results, vec![ToolResult::Text { text: "a".into() }, ToolResult::Text { text: "b".into() }]);
    }

    #[test]
    fn clear_parallel_invocation_removes_row() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        store
            .checkpoint("math", &blob, &[], &[("inv-1".to_string(), ParallelInvocationState::new(1))], 1000)
            .unwrap();
        store.clear_parallel_invocation("task-1", "inv-1").unwrap();
        assert!(store.load_parallel_result_rows("task-1", "inv-1").is_err());
    }

    // ── timeout sweep ──

    #[test]
    fn sweep_claims_only_expired_rows_for_agent() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob_a = sample_blob("task-a");
        let blob_b = sample_blob("task-b");
        store
            .checkpoint("math", &blob_a, &[sample_peer_record("task-a", "sub-expired", 500)], &[], 0)
            .unwrap();
        store
            .checkpoint("math", &blob_b, &[sample_peer_record("task-b", "sub-future", 5_000_000)], &[], 0)
            .unwrap();

        let expired = store.sweep_expired_timeouts("math", 1000).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].sub_task_id, "sub-expired");

        // Already claimed by the sweep; the real response is dropped.
        assert!(store.claim_peer_sub_task("sub-expired").unwrap().is_none());
        // Unexpired row is untouched.
        assert!(store.claim_peer_sub_task("sub-future").unwrap().is_some());
    }

    #[test]
    fn sweep_does_not_cross_agent_boundaries() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        store
            .checkpoint("research", &blob, &[sample_peer_record("task-1", "sub-1", 0)], &[], 0)
            .unwrap();
        let expired = store.sweep_expired_timeouts("math", 1000).unwrap();
        assert!(expired.is_empty());
    }

    // ── cleanup ──

    #[test]
    fn cleanup_removes_all_rows_for_task() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        store
            .checkpoint(
                "math",
                &blob,
                &[sample_peer_record("task-1", "sub-1", 5000)],
                &[("inv-1".to_string(), ParallelInvocationState::new(1))],
                1000,
            )
            .unwrap();
        store.cleanup_task("task-1").unwrap();

        assert!(store.restore("task-1").unwrap().is_none());
        assert!(store.claim_peer_sub_task("sub-1").unwrap().is_none());
    }

    #[test]
    fn reset_timeout_deadline_updates_unclaimed_row() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let blob = sample_blob("task-1");
        store
            .checkpoint("math", &blob, &[sample_peer_record("task-1", "sub-1", 100)], &[], 0)
            .unwrap();
        assert!(store.reset_timeout_deadline("sub-1", 999_999).unwrap());
        let expired = store.sweep_expired_timeouts("math", 500).unwrap();
        assert!(expired.is_empty());
    }
}
