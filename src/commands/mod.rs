//! User-triggered actions. Each resolves to a success message or a
//! `CommandError` whose text is shown to the user as-is.

pub mod import;
pub mod sync;
pub mod workouts;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{Config, ConfigError};
use crate::db::{self, DbError};
use crate::insights::Severity;
use crate::intervals::IntervalsError;
use crate::paste::PasteError;
use crate::progression::format_change;
use crate::store::{SharedStore, StoreError};
use crate::sync::SyncError;
use crate::zones;

/// ---------------------------------------------------------------------------
/// State and Errors
/// ---------------------------------------------------------------------------

/// Everything a command needs
#[derive(Debug, Clone)]
pub struct AppState {
  pub store: SharedStore,
  pub config: Config,
}

impl AppState {
  /// Open the database named in `config` and load the stored snapshot
  pub async fn open(config: Config) -> Result<Self, CommandError> {
    let pool = db::initialize_db(&config.db_path).await?;
    let store = SharedStore::open(pool, config.ftp).await?;
    Ok(Self { store, config })
  }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Paste(#[from] PasteError),

  #[error("Import failed: {0}")]
  Import(#[from] IntervalsError),

  #[error(transparent)]
  Sync(#[from] SyncError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Db(#[from] DbError),

  #[error("{0} is not configured")]
  NotConfigured(&'static str),

  #[error("Failed to render data: {0}")]
  Render(#[from] serde_json::Error),

  #[error("Failed to read input: {0}")]
  Input(#[from] std::io::Error),
}

impl Serialize for CommandError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Read Commands
/// ---------------------------------------------------------------------------

fn severity_tag(severity: Severity) -> &'static str {
  match severity {
    Severity::Warning => "!!",
    Severity::Caution => "!",
    Severity::Positive => "+",
    Severity::Info => "i",
  }
}

/// Analysis report followed by form, insights, recent level changes and
/// rides waiting for classification
pub async fn get_status(state: &AppState, today: NaiveDate) -> Result<String, CommandError> {
  let text = state
    .store
    .read(|store| {
      let loads = store.loads(today);
      let mut lines = vec![
        store.report(today),
        String::new(),
        format!("**Form:** {} (TSB {})", loads.form_status().label(), loads.tsb),
      ];

      let insights = store.insights(today);
      if !insights.is_empty() {
        lines.push(String::new());
        lines.push("**Insights:**".to_string());
        lines.extend(
          insights
            .iter()
            .map(|i| format!("[{}] {}", severity_tag(i.severity), i.message)),
        );
      }

      let changes = store.recent_changes();
      if !changes.is_empty() {
        lines.push(String::new());
        lines.push("**Recent Level Changes:**".to_string());
        lines.extend(changes.iter().map(|(zone, change)| {
          format!(
            "- {}: {} ({})",
            zone.display_name(),
            format_change(change.change),
            change.date
          )
        }));
      }

      let ftp = store.ftp();
      let pending = store.unclassified();
      if !pending.is_empty() {
        lines.push(String::new());
        lines.push(format!("**Awaiting classification ({}):**", pending.len()));
        lines.extend(pending.iter().map(|w| {
          format!(
            "- #{} {}: {}min, NP {}W (looks like {})",
            w.id,
            w.date,
            w.duration,
            w.normalized_power,
            zones::classify(w.normalized_power, ftp).display_name()
          )
        }));
      }

      lines.join("\n")
    })
    .await;

  Ok(text)
}

/// Snapshot as pretty JSON, the same shape accepted by the data paste
pub async fn export_data(state: &AppState) -> Result<String, CommandError> {
  let snapshot = state.store.snapshot().await;
  Ok(snapshot.to_pretty_json()?)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
