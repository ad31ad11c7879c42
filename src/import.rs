//! Sequential activity import
//!
//! Lists activities from a source, then fetches each detail one at a time.
//! A single failed fetch is counted and the batch moves on; only a failed
//! listing aborts the run. Cancellation is checked before every fetch and
//! whatever was fetched up to that point is still reconciled.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::intervals::{to_candidate, IntervalsClient, IntervalsError};
use crate::models::workout::{parse_day, WorkoutRecord};
use crate::reconcile::{import_records, ActivityCandidate, ReconcileOutcome, MAX_ISSUES};

/// Progress is logged every this many activities
const PROGRESS_EVERY: usize = 10;

/// Smallest eFTP difference (watts) worth reporting
const EFTP_HINT_THRESHOLD: f64 = 1.0;

/// ---------------------------------------------------------------------------
/// Activity Source Seam
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait ActivitySource: Send + Sync {
  /// Upstream ids of every activity in the import window
  async fn list_ids(&self) -> Result<Vec<String>, IntervalsError>;

  /// Fetch one activity and normalize it
  async fn fetch(&self, id: &str) -> Result<ActivityCandidate, IntervalsError>;
}

/// intervals.icu as an import source
pub struct IntervalsSource {
  client: IntervalsClient,
  oldest: NaiveDate,
}

impl IntervalsSource {
  pub fn new(client: IntervalsClient, oldest: NaiveDate) -> Self {
    Self { client, oldest }
  }
}

#[async_trait]
impl ActivitySource for IntervalsSource {
  async fn list_ids(&self) -> Result<Vec<String>, IntervalsError> {
    let activities = self.client.list_activities(self.oldest).await?;
    Ok(activities.iter().map(|a| a.id_string()).collect())
  }

  async fn fetch(&self, id: &str) -> Result<ActivityCandidate, IntervalsError> {
    let detail = self.client.fetch_activity(id).await?;
    Ok(to_candidate(&detail))
  }
}

/// ---------------------------------------------------------------------------
/// Options and Summary
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
  /// Upper bound on one detail fetch
  pub request_timeout: Duration,
  /// Extra attempts after a rate-limited response
  pub max_retries: u32,
  /// Wait before the first retry; doubles on each further retry
  pub backoff: Duration,
}

impl Default for ImportOptions {
  fn default() -> Self {
    Self {
      request_timeout: Duration::from_secs(30),
      max_retries: 2,
      backoff: Duration::from_secs(1),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
  /// Activities returned by the listing
  pub listed: usize,
  /// Details actually requested before finishing or cancelling
  pub attempted: usize,
  pub fetch_errors: usize,
  pub outcome: ReconcileOutcome,
  pub cancelled: bool,
  /// Latest upstream FTP estimate when it differs from the athlete's FTP
  pub eftp_hint: Option<f64>,
}

impl ImportSummary {
  pub fn imported(&self) -> usize {
    self.outcome.accepted.len()
  }

  /// Status line shown after an import
  pub fn message(&self, current_ftp: f64) -> String {
    let skipped = &self.outcome.skipped;
    let mut message = String::new();

    if self.cancelled {
      message.push_str(&format!(
        "Import cancelled after {} of {} activities. ",
        self.attempted, self.listed
      ));
    }

    if self.imported() > 0 {
      message.push_str(&format!("Imported {} activities!", self.imported()));
      if skipped.total() > 0 || self.fetch_errors > 0 {
        message.push_str(&format!(
          " Skipped: {} without power, {} duplicates, {} fetch errors.",
          skipped.no_power, skipped.duplicate, self.fetch_errors
        ));
      }
    } else {
      let total = skipped.total() + self.fetch_errors;
      message.push_str(&format!("No activities imported. Skipped {} total:\n", total));
      message.push_str(&format!("- {} missing power data\n", skipped.no_power));
      message.push_str(&format!("- {} duplicates\n", skipped.duplicate));
      message.push_str(&format!("- {} fetch errors\n", self.fetch_errors));
      if skipped.other > 0 {
        message.push_str(&format!("- {} other\n", skipped.other));
      }
      if !self.outcome.issues.is_empty() {
        message.push_str(&format!("\nFirst few issues:\n{}", self.outcome.issues.join("\n")));
      }
    }

    if let Some(eftp) = self.eftp_hint {
      message.push_str(&format!(
        "\nintervals.icu estimates your FTP at {:.0} W (current: {:.0} W).",
        eftp, current_ftp
      ));
    }

    message
  }
}

/// ---------------------------------------------------------------------------
/// Pipeline
/// ---------------------------------------------------------------------------

/// Fetch every listed activity in order and reconcile the batch against
/// `existing`. Nothing is committed here; the caller merges the outcome.
pub async fn run_import(
  source: &dyn ActivitySource,
  existing: &[WorkoutRecord],
  ftp: f64,
  options: ImportOptions,
  cancel: &CancellationToken,
) -> Result<ImportSummary, IntervalsError> {
  let ids = source.list_ids().await?;
  tracing::info!(count = ids.len(), "Found activities, fetching details");

  let mut summary = ImportSummary {
    listed: ids.len(),
    ..ImportSummary::default()
  };
  let mut candidates = Vec::new();
  let mut fetch_issues = Vec::new();

  for (index, id) in ids.iter().enumerate() {
    if cancel.checkpoint().is_err() {
      tracing::warn!(fetched = index, total = ids.len(), "Import cancelled");
      summary.cancelled = true;
      break;
    }
    if index > 0 && index % PROGRESS_EVERY == 0 {
      tracing::info!("Processing activity {} of {}...", index + 1, ids.len());
    }

    summary.attempted += 1;
    match fetch_with_retry(source, id, options).await {
      Ok(candidate) => candidates.push(candidate),
      Err(err) => {
        tracing::warn!(activity = %id, error = %err, "Activity fetch failed");
        summary.fetch_errors += 1;
        if fetch_issues.len() < MAX_ISSUES {
          fetch_issues.push(format!("Activity {} - fetch failed ({})", id, err));
        }
      }
    }
  }

  summary.eftp_hint = latest_eftp(&candidates).filter(|eftp| (eftp - ftp).abs() >= EFTP_HINT_THRESHOLD);

  let mut outcome = import_records(candidates, existing, ftp);
  fetch_issues.append(&mut outcome.issues);
  fetch_issues.truncate(MAX_ISSUES);
  outcome.issues = fetch_issues;
  summary.outcome = outcome;

  Ok(summary)
}

/// One detail fetch under the per-request timeout, retrying rate limits
/// with exponential backoff
async fn fetch_with_retry(
  source: &dyn ActivitySource,
  id: &str,
  options: ImportOptions,
) -> Result<ActivityCandidate, IntervalsError> {
  let mut attempt = 0;
  loop {
    let result = match tokio::time::timeout(options.request_timeout, source.fetch(id)).await {
      Ok(result) => result,
      Err(_) => Err(IntervalsError::Timeout),
    };

    match result {
      Err(IntervalsError::RateLimited) if attempt < options.max_retries => {
        let wait = options.backoff * 2u32.pow(attempt);
        tracing::debug!(activity = %id, attempt, wait_ms = wait.as_millis() as u64, "Rate limited, backing off");
        tokio::time::sleep(wait).await;
        attempt += 1;
      }
      other => return other,
    }
  }
}

/// eFTP of the most recently dated candidate carrying one
fn latest_eftp(candidates: &[ActivityCandidate]) -> Option<f64> {
  candidates
    .iter()
    .filter_map(|c| Some((parse_day(&c.date)?, c.eftp.filter(|e| *e > 0.0)?)))
    .max_by_key(|(day, _)| *day)
    .map(|(_, eftp)| eftp)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
