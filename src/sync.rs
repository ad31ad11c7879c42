//! Backup synchronization
//!
//! One sync attempt compares the local snapshot with a single named backup
//! in a remote store and moves the whole snapshot in one direction:
//!
//! ```text
//! Idle -> Authenticating -> Locating -> Creating              -> Done
//!                                    -> Downloading -> Uploading -> Done
//!                                                   -> Pulling   -> Done
//!                                                   -> NoOp      -> Done
//! any step -> Error
//! ```
//!
//! The newer `exportedAt` wins. A local snapshot without rides never
//! overwrites a remote one that has rides; it pulls instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::snapshot::{timestamp_now, Snapshot};

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
  #[error("No internet connection")]
  Offline,

  #[error("Session expired. Please try again.")]
  Unauthorized,

  #[error("Too many requests. Please wait a moment.")]
  RateLimited,

  #[error("{context} error: {status}")]
  Http { status: u16, context: &'static str },

  #[error("Network error: {0}")]
  Request(String),

  #[error("Invalid backup data: {0}")]
  Decode(String),

  #[error("Authentication failed: {0}")]
  Credential(String),
}

impl Serialize for SyncError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Collaborator Seams
/// ---------------------------------------------------------------------------

/// Remote file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub modified_time: Option<String>,
}

/// Storage holding the backup snapshot
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Human name used in result messages
  fn display_name(&self) -> &str;

  async fn find_by_name(&self, token: &str, name: &str) -> Result<Option<RemoteFile>, SyncError>;

  async fn download(&self, token: &str, file_id: &str) -> Result<Snapshot, SyncError>;

  async fn create(&self, token: &str, name: &str, snapshot: &Snapshot) -> Result<RemoteFile, SyncError>;

  async fn update(&self, token: &str, file_id: &str, snapshot: &Snapshot) -> Result<RemoteFile, SyncError>;
}

/// Source of bearer tokens for the remote store
#[async_trait]
pub trait CredentialProvider: Send + Sync {
  async fn acquire(&self) -> Result<String, SyncError>;
}

/// A token supplied up front (environment or `.env`)
#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl CredentialProvider for StaticToken {
  async fn acquire(&self) -> Result<String, SyncError> {
    self
      .0
      .clone()
      .ok_or_else(|| SyncError::Credential("no Google Drive access token configured".to_string()))
  }
}

pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
  fn is_online(&self) -> bool {
    true
  }
}

/// ---------------------------------------------------------------------------
/// Outcome
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
  Idle,
  Authenticating,
  Locating,
  Creating,
  Downloading,
  Uploading,
  Pulling,
  NoOp,
  Done,
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
  Created,
  Pushed,
  Pulled,
  Synced,
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
  Push,
  Pull,
  None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
  pub status: SyncStatus,
  pub message: String,
  pub action: SyncAction,
  /// Remote snapshot handed to the pull callback
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<Snapshot>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<SyncError>,
  pub phases: Vec<SyncPhase>,
}

impl SyncOutcome {
  pub fn is_error(&self) -> bool {
    self.status == SyncStatus::Error
  }
}

/// Successful end state of one attempt
struct Resolved {
  status: SyncStatus,
  message: String,
  action: SyncAction,
  data: Option<Snapshot>,
}

/// ---------------------------------------------------------------------------
/// Coordinator
/// ---------------------------------------------------------------------------

pub struct SyncCoordinator {
  remote: Box<dyn RemoteStore>,
  credentials: Box<dyn CredentialProvider>,
  connectivity: Box<dyn Connectivity>,
  backup_name: String,
  token: Mutex<Option<String>>,
}

impl SyncCoordinator {
  pub fn new(
    remote: Box<dyn RemoteStore>,
    credentials: Box<dyn CredentialProvider>,
    connectivity: Box<dyn Connectivity>,
    backup_name: impl Into<String>,
  ) -> Self {
    Self {
      remote,
      credentials,
      connectivity,
      backup_name: backup_name.into(),
      token: Mutex::new(None),
    }
  }

  /// Whether a bearer token is currently cached
  pub async fn has_token(&self) -> bool {
    self.token.lock().await.is_some()
  }

  /// Run one sync attempt. `on_pull` receives the remote snapshot when it
  /// should replace local state; it is not called otherwise.
  pub async fn sync<F>(&self, local: &Snapshot, on_pull: F) -> SyncOutcome
  where
    F: FnOnce(Snapshot),
  {
    let mut phases = vec![SyncPhase::Idle];

    if !self.connectivity.is_online() {
      return self.fail(SyncError::Offline, phases).await;
    }

    match self.run(local, on_pull, &mut phases).await {
      Ok(resolved) => {
        phases.push(SyncPhase::Done);
        tracing::info!(status = ?resolved.status, message = %resolved.message, "Sync finished");
        SyncOutcome {
          status: resolved.status,
          message: resolved.message,
          action: resolved.action,
          data: resolved.data,
          error: None,
          phases,
        }
      }
      Err(err) => self.fail(err, phases).await,
    }
  }

  async fn run<F>(&self, local: &Snapshot, on_pull: F, phases: &mut Vec<SyncPhase>) -> Result<Resolved, SyncError>
  where
    F: FnOnce(Snapshot),
  {
    let remote_name = self.remote.display_name().to_string();

    phases.push(SyncPhase::Authenticating);
    let token = self.authenticate().await?;

    phases.push(SyncPhase::Locating);
    let existing = self.remote.find_by_name(&token, &self.backup_name).await?;
    tracing::debug!(found = existing.is_some(), "Located backup");

    let local_rides = local.ride_count();

    let Some(file) = existing else {
      phases.push(SyncPhase::Creating);
      let now = timestamp_now();
      let upload = Snapshot {
        sync_version: Some(1),
        last_synced_at: Some(now.clone()),
        exported_at: Some(local.exported_at.clone().unwrap_or(now)),
        ..local.clone()
      };
      self.remote.create(&token, &self.backup_name, &upload).await?;

      return Ok(Resolved {
        status: SyncStatus::Created,
        message: format!("Backup created in {} ({} rides)", remote_name, local_rides),
        action: SyncAction::Push,
        data: None,
      });
    };

    phases.push(SyncPhase::Downloading);
    let mut remote = self.remote.download(&token, &file.id).await?;
    let remote_rides = remote.ride_count();

    let local_time = local.exported_at_time();
    let remote_time = remote.exported_at_time();
    tracing::debug!(
      local_rides,
      remote_rides,
      local_exported_at = %local_time,
      remote_exported_at = %remote_time,
      "Comparing snapshots"
    );

    let pull = (local_rides == 0 && remote_rides > 0) || remote_time > local_time;

    if pull {
      if local_rides == 0 && remote_time <= local_time {
        tracing::info!("Local is empty but remote has data, forcing pull");
      }
      phases.push(SyncPhase::Pulling);
      remote.last_synced_at = Some(timestamp_now());
      on_pull(remote.clone());

      return Ok(Resolved {
        status: SyncStatus::Pulled,
        message: format!("Restored {} rides from {}", remote_rides, remote_name),
        action: SyncAction::Pull,
        data: Some(remote),
      });
    }

    if local_time > remote_time {
      phases.push(SyncPhase::Uploading);
      let upload = Snapshot {
        sync_version: Some(local.sync_version.unwrap_or(1)),
        last_synced_at: Some(timestamp_now()),
        ..local.clone()
      };
      self.remote.update(&token, &file.id, &upload).await?;

      return Ok(Resolved {
        status: SyncStatus::Pushed,
        message: format!("Uploaded {} rides to {}", local_rides, remote_name),
        action: SyncAction::Push,
        data: None,
      });
    }

    phases.push(SyncPhase::NoOp);
    Ok(Resolved {
      status: SyncStatus::Synced,
      message: format!("Already in sync ({} rides)", local_rides),
      action: SyncAction::None,
      data: None,
    })
  }

  async fn authenticate(&self) -> Result<String, SyncError> {
    let mut cached = self.token.lock().await;
    if let Some(token) = cached.as_ref() {
      return Ok(token.clone());
    }
    let token = self.credentials.acquire().await?;
    *cached = Some(token.clone());
    Ok(token)
  }

  async fn fail(&self, err: SyncError, mut phases: Vec<SyncPhase>) -> SyncOutcome {
    if err == SyncError::Unauthorized {
      tracing::warn!("Remote rejected the token, clearing it");
      *self.token.lock().await = None;
    }
    tracing::error!(error = %err, "Sync failed");
    phases.push(SyncPhase::Error);

    SyncOutcome {
      status: SyncStatus::Error,
      message: err.to_string(),
      action: SyncAction::None,
      data: None,
      error: Some(err),
      phases,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
