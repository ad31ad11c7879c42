//! Record reconciliation for imported activities
//!
//! Imported rides are deduplicated against the existing history, given a TSS
//! and Intensity Factor, and staged as unclassified. Zone and progression are
//! only assigned later by an explicit classify action.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{intensity_factor, training_stress_score};
use crate::models::workout::{parse_day, sort_newest_first, Classification, WorkoutRecord};

/// Two rides on the same day within this many watts are the same ride
pub const DUPLICATE_POWER_TOLERANCE: f64 = 5.0;

/// Human-readable issue lines kept per batch
pub const MAX_ISSUES: usize = 5;

/// ---------------------------------------------------------------------------
/// Import Candidate
/// ---------------------------------------------------------------------------

/// Normalized activity shape handed over by any import source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCandidate {
  /// Identifier in the upstream system, for issue messages
  #[serde(default)]
  pub source_id: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  /// `YYYY-MM-DD` (a longer timestamp is truncated to the day)
  pub date: String,
  #[serde(default)]
  pub normalized_power: Option<f64>,
  #[serde(default)]
  pub duration_minutes: f64,
  /// Upstream-computed training load, preferred over our own TSS
  #[serde(default)]
  pub tss: Option<f64>,
  /// Upstream-estimated FTP
  #[serde(default)]
  pub eftp: Option<f64>,
  #[serde(default)]
  pub notes: Option<String>,
}

impl ActivityCandidate {
  fn label(&self) -> String {
    self
      .name
      .clone()
      .or_else(|| self.source_id.clone())
      .unwrap_or_else(|| "Unnamed".to_string())
  }

  /// Normalized power when it is usable (finite and positive)
  pub fn usable_power(&self) -> Option<f64> {
    self.normalized_power.filter(|np| np.is_finite() && *np > 0.0)
  }
}

/// ---------------------------------------------------------------------------
/// Reconciliation Outcome
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCounts {
  pub no_power: usize,
  pub duplicate: usize,
  pub other: usize,
}

impl SkipCounts {
  pub fn total(&self) -> usize {
    self.no_power + self.duplicate + self.other
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
  pub accepted: Vec<WorkoutRecord>,
  pub skipped: SkipCounts,
  /// First few skip reasons, for the end-of-batch summary
  pub issues: Vec<String>,
}

impl ReconcileOutcome {
  fn note(&mut self, issue: String) {
    if self.issues.len() < MAX_ISSUES {
      self.issues.push(issue);
    }
  }
}

/// True when `history` already holds a ride on `day` within the power
/// tolerance. Stored dates carrying a time of day count as that day.
pub fn is_duplicate(history: &[WorkoutRecord], day: NaiveDate, normalized_power: f64) -> bool {
  history.iter().any(|w| {
    w.day() == Some(day)
      && (w.normalized_power - normalized_power).abs() < DUPLICATE_POWER_TOLERANCE
  })
}

/// Turn candidates into unclassified records, skipping rides without power,
/// duplicates and unusable dates.
///
/// Duplicates are checked against `existing` and against rides accepted
/// earlier in the same batch.
pub fn import_records(
  candidates: Vec<ActivityCandidate>,
  existing: &[WorkoutRecord],
  ftp: f64,
) -> ReconcileOutcome {
  let mut outcome = ReconcileOutcome::default();
  let mut next_id = first_free_id(existing);

  for candidate in candidates {
    let Some(np) = candidate.usable_power() else {
      outcome.skipped.no_power += 1;
      outcome.note(format!("\"{}\" - no power data", candidate.label()));
      continue;
    };

    let Some(day) = parse_day(&candidate.date) else {
      outcome.skipped.other += 1;
      outcome.note(format!(
        "\"{}\" - invalid date '{}'",
        candidate.label(),
        candidate.date
      ));
      continue;
    };
    let date = day.format("%Y-%m-%d").to_string();

    if is_duplicate(existing, day, np) || is_duplicate(&outcome.accepted, day, np) {
      outcome.skipped.duplicate += 1;
      continue;
    }

    let duration = candidate.duration_minutes.max(0.0).round();
    let tss = candidate
      .tss
      .filter(|t| t.is_finite() && *t > 0.0)
      .unwrap_or_else(|| training_stress_score(np, duration, ftp));

    let notes = candidate
      .notes
      .clone()
      .unwrap_or_else(|| format!("Imported: {}", candidate.label()));

    outcome.accepted.push(WorkoutRecord {
      id: next_id,
      date,
      completed: true,
      duration,
      normalized_power: np.round(),
      tss: Some(tss),
      intensity_factor: Some(intensity_factor(np, ftp)),
      notes,
      classification: Classification::Unclassified,
    });
    next_id += 1;
  }

  tracing::info!(
    accepted = outcome.accepted.len(),
    no_power = outcome.skipped.no_power,
    duplicate = outcome.skipped.duplicate,
    other = outcome.skipped.other,
    "Reconciled import batch"
  );

  outcome
}

/// Prepend accepted records and restore newest-first order
pub fn merge_history(history: &mut Vec<WorkoutRecord>, accepted: Vec<WorkoutRecord>) {
  let mut merged = accepted;
  merged.append(history);
  sort_newest_first(&mut merged);
  *history = merged;
}

/// Millisecond clock id, bumped past every existing id
pub fn first_free_id(existing: &[WorkoutRecord]) -> i64 {
  let clock = Utc::now().timestamp_millis();
  let max_existing = existing.iter().map(|w| w.id).max().unwrap_or(0);
  clock.max(max_existing + 1)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
