//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories
//! - Helper assertions

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::models::snapshot::{default_levels, Snapshot};
use crate::models::workout::{Classification, ClassifiedEffort, ProgressionDelta, WorkoutRecord};
use crate::reconcile::ActivityCandidate;
use crate::zones::ZoneId;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// Parse a `YYYY-MM-DD` literal
pub fn day(raw: &str) -> NaiveDate {
  NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("Invalid test date")
}

/// Unclassified one-hour ride carrying the given TSS
pub fn mock_unclassified(id: i64, date: &str, tss: f64) -> WorkoutRecord {
  WorkoutRecord {
    id,
    date: date.to_string(),
    completed: true,
    duration: 60.0,
    normalized_power: 180.0,
    tss: Some(tss),
    intensity_factor: Some(180.0 / 235.0),
    notes: String::new(),
    classification: Classification::Unclassified,
  }
}

/// Unclassified one-hour ride at the given normalized power
pub fn mock_unclassified_with_power(id: i64, date: &str, normalized_power: f64) -> WorkoutRecord {
  WorkoutRecord {
    normalized_power,
    ..mock_unclassified(id, date, 50.0)
  }
}

/// Classified ride; `progression` is `(previous_level, new_level)`
pub fn mock_classified(
  id: i64,
  date: &str,
  zone: ZoneId,
  progression: Option<(f64, f64)>,
) -> WorkoutRecord {
  WorkoutRecord {
    classification: Classification::Classified(ClassifiedEffort {
      zone,
      workout_level: 3.0,
      rpe: Some(6.0),
      progression: progression.map(|(previous, new)| ProgressionDelta::new(previous, new)),
    }),
    ..mock_unclassified(id, date, 60.0)
  }
}

/// One-hour import candidate
pub fn mock_candidate(date: &str, normalized_power: Option<f64>) -> ActivityCandidate {
  ActivityCandidate {
    source_id: Some(format!("i{}", date)),
    name: Some("Lunch Ride".to_string()),
    date: date.to_string(),
    normalized_power,
    duration_minutes: 60.0,
    tss: None,
    eftp: None,
    notes: None,
  }
}

/// Snapshot with `rides` unclassified rides and the given `exportedAt`
pub fn mock_snapshot(rides: usize, exported_at: Option<&str>) -> Snapshot {
  let history = (0..rides)
    .map(|i| mock_unclassified(i as i64 + 1, &format!("2025-01-{:02}", 28 - (i % 28)), 50.0))
    .collect();

  Snapshot {
    levels: default_levels(),
    history,
    exported_at: exported_at.map(str::to_string),
    ..Snapshot::default()
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> =
      sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = 'app_state'")
        .fetch_all(&pool)
        .await
        .expect("Failed to query tables");

    assert_eq!(tables.len(), 1);

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    let ride = mock_unclassified(1, "2025-01-01", 40.0);
    assert!(!ride.is_classified());
    assert_eq!(ride.tss_or_zero(), 40.0);

    let classified = mock_classified(2, "2025-01-02", ZoneId::Tempo, Some((1.0, 1.5)));
    assert_eq!(classified.zone(), Some(ZoneId::Tempo));
    assert_approx_eq!(classified.progression().unwrap().change, 0.5, 1e-9);

    let snapshot = mock_snapshot(3, None);
    assert_eq!(snapshot.ride_count(), 3);
    assert!(snapshot.history.iter().all(|w| w.day().is_some()));
  }
}
