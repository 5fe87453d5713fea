// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sam_interfaces::ArtifactStore;
use sam_types::SamError;

/// An in-memory `ArtifactStore` double. Versions are assigned
/// monotonically per `filename`, matching the spec §6 contract.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<(String, u64), Vec<u8>>>,
    next_version: Mutex<HashMap<String, u64>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, _task_id: &str, filename: &str, bytes: Vec<u8>, _mime_type: &str) -> Result<u64, SamError> {
        let mut versions = self.next_version.lock().unwrap();
        let version = versions.entry(filename.to_string()).or_insert(0);
        *version += 1;
        let v = *version;
        self.blobs.lock().unwrap().insert((filename.to_string(), v), bytes);
        Ok(v)
    }

    async fn load(&self, filename: &str, version: u64) -> Result<Vec<u8>, SamError> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(filename.to_string(), version))
            .cloned()
            .ok_or_else(|| SamError::Tool { tool_name: "artifact_store".to_string(), message: format!("no such artifact {filename}@{version}") })
    }
}
