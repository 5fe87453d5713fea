// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use sam_types::SamError;

/// Artifact storage seam (spec §6 `ArtifactStore`). Versions are
/// monotonically increasing integers per filename, assigned by the
/// implementation — the core never invents a version number itself.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(
        &self,
        task_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<u64, SamError>;

    async fn load(&self, filename: &str, version: u64) -> Result<Vec<u8>, SamError>;
}
