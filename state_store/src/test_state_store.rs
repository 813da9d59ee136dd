use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use crate::FileVaultState;

pub const TEST_UPLOAD_LEASE_SECS: u64 = 60;

pub struct TestStateStore {
    pub filevault_state: Arc<FileVaultState>,
    _temp_dir: TempDir,
}

impl TestStateStore {
    pub async fn new() -> Result<TestStateStore> {
        let temp_dir = tempfile::tempdir()?;
        let filevault_state =
            FileVaultState::new(temp_dir.path().join("state"), TEST_UPLOAD_LEASE_SECS).await?;
        Ok(TestStateStore {
            filevault_state,
            _temp_dir: temp_dir,
        })
    }
}
