use crate::commands::{AppState, CommandError};
use crate::config::Config;
use crate::drive::DriveClient;
use crate::sync::{AlwaysOnline, StaticToken, SyncCoordinator, SyncError};

/// Coordinator backed by Google Drive and the configured access token
pub fn drive_coordinator(config: &Config) -> Result<SyncCoordinator, CommandError> {
  if config.drive_access_token.is_none() {
    return Err(CommandError::NotConfigured("Google Drive"));
  }
  let drive = DriveClient::new(config.http_timeout)?;

  Ok(SyncCoordinator::new(
    Box::new(drive),
    Box::new(StaticToken(config.drive_access_token.clone())),
    Box::new(AlwaysOnline),
    config.backup_filename.clone(),
  ))
}

/// Sync local data with the backup. The snapshot handed to the pull
/// callback replaces local state and is persisted before the message is
/// returned.
pub async fn sync_backup(state: &AppState, coordinator: &SyncCoordinator) -> Result<String, CommandError> {
  let local = state.store.snapshot().await;
  let mut pulled = None;
  let outcome = coordinator
    .sync(&local, |remote| pulled = Some(remote))
    .await;

  if outcome.is_error() {
    let message = outcome.message;
    return Err(outcome.error.unwrap_or(SyncError::Request(message)).into());
  }

  if let Some(pulled) = pulled {
    state
      .store
      .update(|s| {
        s.replace_with(pulled);
        Ok(())
      })
      .await?;
  }

  Ok(outcome.message)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::commands::tests::memory_state;
  use crate::models::snapshot::Snapshot;
  use crate::sync::{RemoteFile, RemoteStore};
  use crate::test_utils::mock_snapshot;
  use async_trait::async_trait;
  use std::sync::{Arc, Mutex};

  /// Remote holding at most one backup
  #[derive(Default)]
  struct SingleFileRemote(Mutex<Option<Snapshot>>);

  fn file() -> RemoteFile {
    RemoteFile {
      id: "backup".to_string(),
      name: None,
      modified_time: None,
    }
  }

  #[async_trait]
  impl RemoteStore for Arc<SingleFileRemote> {
    fn display_name(&self) -> &str {
      "Google Drive"
    }

    async fn find_by_name(&self, _token: &str, _name: &str) -> Result<Option<RemoteFile>, SyncError> {
      Ok(self.0.lock().unwrap().as_ref().map(|_| file()))
    }

    async fn download(&self, _token: &str, _file_id: &str) -> Result<Snapshot, SyncError> {
      self.0.lock().unwrap().clone().ok_or(SyncError::Http {
        status: 404,
        context: "Download",
      })
    }

    async fn create(&self, _token: &str, _name: &str, snapshot: &Snapshot) -> Result<RemoteFile, SyncError> {
      *self.0.lock().unwrap() = Some(snapshot.clone());
      Ok(file())
    }

    async fn update(&self, _token: &str, _file_id: &str, snapshot: &Snapshot) -> Result<RemoteFile, SyncError> {
      *self.0.lock().unwrap() = Some(snapshot.clone());
      Ok(file())
    }
  }

  fn coordinator(remote: &Arc<SingleFileRemote>, token: Option<&str>) -> SyncCoordinator {
    SyncCoordinator::new(
      Box::new(remote.clone()),
      Box::new(StaticToken(token.map(str::to_string))),
      Box::new(AlwaysOnline),
      "casey-rides-backup.json",
    )
  }

  #[tokio::test]
  async fn test_empty_local_restores_from_backup() {
    // Arrange
    let remote = Arc::new(SingleFileRemote::default());
    *remote.0.lock().unwrap() = Some(mock_snapshot(5, Some("2025-01-01T00:00:00.000Z")));
    let state = memory_state(mock_snapshot(0, Some("2025-03-01T00:00:00.000Z")));

    // Act
    let message = sync_backup(&state, &coordinator(&remote, Some("tok"))).await.unwrap();

    // Assert
    assert_eq!(message, "Restored 5 rides from Google Drive");
    let local = state.store.snapshot().await;
    assert_eq!(local.ride_count(), 5);
    assert!(local.last_synced_at.is_some());
  }

  #[tokio::test]
  async fn test_newer_backup_is_pulled_and_persisted() {
    // Arrange
    let pool = crate::test_utils::setup_test_db().await;
    let remote = Arc::new(SingleFileRemote::default());
    *remote.0.lock().unwrap() = Some(mock_snapshot(4, Some("2025-03-01T00:00:00.000Z")));
    let state = AppState {
      store: crate::store::SharedStore::open(pool.clone(), 240.0).await.unwrap(),
      config: Config::default(),
    };
    state
      .store
      .update(|s| {
        s.replace_with(mock_snapshot(2, Some("2025-01-01T00:00:00.000Z")));
        Ok(())
      })
      .await
      .unwrap();

    // Act
    let message = sync_backup(&state, &coordinator(&remote, Some("tok"))).await.unwrap();

    // Assert
    assert!(message.contains("4 rides"));
    let stored = crate::db::load_snapshot(&pool).await.unwrap().unwrap();
    assert_eq!(stored.ride_count(), 4);
    assert_eq!(stored, state.store.snapshot().await);

    crate::test_utils::teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_second_sync_after_create_is_noop() {
    let remote = Arc::new(SingleFileRemote::default());
    let state = memory_state(mock_snapshot(2, Some("2025-01-01T00:00:00.000Z")));
    let coordinator = coordinator(&remote, Some("tok"));

    let first = sync_backup(&state, &coordinator).await.unwrap();
    let second = sync_backup(&state, &coordinator).await.unwrap();

    assert_eq!(first, "Backup created in Google Drive (2 rides)");
    assert_eq!(second, "Already in sync (2 rides)");
  }

  #[tokio::test]
  async fn test_missing_token_is_an_error() {
    let remote = Arc::new(SingleFileRemote::default());
    let state = memory_state(mock_snapshot(1, None));

    let result = sync_backup(&state, &coordinator(&remote, None)).await;

    assert!(matches!(result, Err(CommandError::Sync(SyncError::Credential(_)))));
    assert!(remote.0.lock().unwrap().is_none());
  }

  #[test]
  fn test_drive_coordinator_needs_token() {
    let result = drive_coordinator(&Config::default());

    assert!(matches!(result, Err(CommandError::NotConfigured("Google Drive"))));
  }
}
