// SPDX-License-Identifier: Apache-2.0
//! A filesystem-backed `ArtifactStore`. Grounded on `sven-tools`'s
//! `WriteTool`/`ReadFileTool` idiom (`tokio::fs::write`/`read`,
//! `create_dir_all` for parents) generalized to the versioned
//! per-filename layout spec §6 requires: each save is written to
//! `<root>/<task_id>/<filename>.v<version>`.

use async_trait::async_trait;
use sam_interfaces::ArtifactStore;
use sam_types::SamError;
use tokio::sync::Mutex;

pub struct FilesystemArtifactStore {
    root: std::path::PathBuf,
    next_version: Mutex<std::collections::HashMap<String, u64>>,
}

impl FilesystemArtifactStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into(), next_version: Mutex::new(std::collections::HashMap::new()) }
    }

    fn blob_path(&self, filename: &str, version: u64) -> std::path::PathBuf {
        self.root.join(format!("{filename}.v{version}"))
    }
}

fn tool_err(message: impl Into<String>) -> SamError {
    SamError::Tool { tool_name: "artifact_store".to_string(), message: message.into() }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn save(&self, task_id: &str, filename: &str, bytes: Vec<u8>, _mime_type: &str) -> Result<u64, SamError> {
        let version = {
            let mut versions = self.next_version.lock().await;
            let entry = versions.entry(filename.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| tool_err(format!("creating artifact root: {e}")))?;
        let path = self.blob_path(filename, version);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| tool_err(format!("writing {}: {e}", path.display())))?;
        tracing::debug!(task_id, filename, version, "saved artifact");
        Ok(version)
    }

    async fn load(&self, filename: &str, version: u64) -> Result<Vec<u8>, SamError> {
        let path = self.blob_path(filename, version);
        tokio::fs::read(&path)
            .await
            .map_err(|e| tool_err(format!("reading {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_root() -> std::path::PathBuf {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("sam_artifacts_test_{}_{n}", std::process::id()))
    }

    #[tokio::test]
    async fn versions_increase_monotonically_per_filename() {
        let store = FilesystemArtifactStore::new(tmp_root());
        let v1 = store.save("t1", "report.pdf", b"a".to_vec(), "application/pdf").await.unwrap();
        let v2 = store.save("t1", "report.pdf", b"b".to_vec(), "application/pdf").await.unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert_eq!(store.load("report.pdf", 1).await.unwrap(), b"a".to_vec());
        assert_eq!(store.load("report.pdf", 2).await.unwrap(), b"b".to_vec());
    }

    #[tokio::test]
    async fn loading_unknown_version_errors() {
        let store = FilesystemArtifactStore::new(tmp_root());
        assert!(store.load("missing.pdf", 1).await.is_err());
    }
}
