//! JSON file persistence for schedule state
//!
//! Persists the single outstanding `PersistedSchedule` as a small JSON
//! file. Writes go through a sibling temp file plus rename so a crash
//! mid-write never leaves a truncated schedule behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rewake_core::ScheduleStore;
use rewake_domain::{PersistedSchedule, Result, RewakeError};
use tracing::debug;

/// File-backed schedule store.
pub struct JsonScheduleStore {
    path: PathBuf,
}

impl JsonScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl ScheduleStore for JsonScheduleStore {
    async fn save(&self, schedule: &PersistedSchedule) -> Result<()> {
        let contents = serde_json::to_vec_pretty(schedule)
            .map_err(|e| RewakeError::Storage(format!("Failed to serialize schedule: {}", e)))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, &contents)
            .await
            .map_err(|e| RewakeError::Storage(format!("Failed to write schedule file: {}", e)))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| RewakeError::Storage(format!("Failed to commit schedule file: {}", e)))?;

        debug!(path = %self.path.display(), task_id = %schedule.task_id, "Persisted schedule");
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedSchedule>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RewakeError::Storage(format!("Failed to read schedule file: {}", e)))
            }
        };

        let schedule = serde_json::from_str(&contents)
            .map_err(|e| RewakeError::Storage(format!("Corrupt schedule file: {}", e)))?;
        Ok(Some(schedule))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RewakeError::Storage(format!("Failed to remove schedule file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> JsonScheduleStore {
        JsonScheduleStore::new(dir.path().join("schedule.json"))
    }

    fn schedule() -> PersistedSchedule {
        PersistedSchedule {
            task_id: "daily".into(),
            intended_time: Utc::now() + chrono::Duration::hours(1),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let persisted = schedule();

        store.save(&persisted).await.expect("saved");
        let loaded = store.load().await.expect("loaded").expect("present");
        assert_eq!(loaded, persisted);
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        assert!(store.load().await.expect("loaded").is_none());
    }

    #[tokio::test]
    async fn save_replaces_the_previous_schedule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store.save(&schedule()).await.expect("saved");
        let mut replacement = schedule();
        replacement.task_id = "weekly".into();
        store.save(&replacement).await.expect("replaced");

        let loaded = store.load().await.expect("loaded").expect("present");
        assert_eq!(loaded.task_id, "weekly");
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store.save(&schedule()).await.expect("saved");
        store.clear().await.expect("cleared");
        store.clear().await.expect("cleared again");
        assert!(store.load().await.expect("loaded").is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        tokio::fs::write(store.path(), b"{ not json").await.expect("wrote garbage");

        let err = store.load().await.expect_err("corrupt");
        assert!(matches!(err, RewakeError::Storage(_)));
    }
}
