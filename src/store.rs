//! Training data store
//!
//! `TrainingStore` owns the snapshot and is the only place history and
//! levels change. Every mutation stamps `exportedAt`. `SharedStore` wraps it
//! for async callers: one writer at a time, each mutation applied to the
//! stored snapshot inside a write transaction, and an import lock that
//! rejects a second concurrent import from this or any other process.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::analysis::{analysis_report, intensity_factor, training_stress_score, TrainingLoads};
use crate::db::{self, DbError, DbPool};
use crate::insights::{generate_insights, Insight};
use crate::models::snapshot::Snapshot;
use crate::models::workout::{
  parse_day, sort_newest_first, Classification, ClassifiedEffort, WorkoutRecord,
};
use crate::paste::DataPatch;
use crate::progression::{self, apply_workout, RecentChange, MAX_LEVEL, MIN_LEVEL};
use crate::reconcile::{first_free_id, is_duplicate, merge_history, ReconcileOutcome};
use crate::zones::ZoneId;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("No workout with id {0}")]
  NotFound(i64),

  #[error("Workout {0} is already classified")]
  AlreadyClassified(i64),

  #[error("FTP must be a positive number of watts, got {0}")]
  InvalidFtp(f64),

  #[error("Invalid workout: {0}")]
  InvalidWorkout(String),

  #[error("Pasted data has neither levels nor history")]
  EmptyPatch,

  #[error("An import is already running")]
  ImportInProgress,

  #[error(transparent)]
  Db(#[from] DbError),
}

impl Serialize for StoreError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Inputs
/// ---------------------------------------------------------------------------

/// A manually logged ride
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkout {
  pub date: String,
  pub zone: ZoneId,
  pub workout_level: f64,
  pub rpe: f64,
  pub completed: bool,
  /// Minutes
  pub duration: f64,
  pub normalized_power: f64,
  #[serde(default)]
  pub notes: String,
}

/// Zone and effort assigned to an imported ride after the fact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classify {
  pub zone: ZoneId,
  pub workout_level: f64,
  pub rpe: f64,
  pub completed: bool,
}

fn validate_effort(workout_level: f64, rpe: f64) -> Result<(), StoreError> {
  if !(MIN_LEVEL..=MAX_LEVEL).contains(&workout_level) {
    return Err(StoreError::InvalidWorkout(format!(
      "workout level {} is outside 1-10",
      workout_level
    )));
  }
  if !(1.0..=10.0).contains(&rpe) {
    return Err(StoreError::InvalidWorkout(format!("RPE {} is outside 1-10", rpe)));
  }
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Training Store
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStore {
  snapshot: Snapshot,
}

impl TrainingStore {
  pub fn new(mut snapshot: Snapshot) -> Self {
    sort_newest_first(&mut snapshot.history);
    Self { snapshot }
  }

  pub fn snapshot(&self) -> &Snapshot {
    &self.snapshot
  }

  pub fn ftp(&self) -> f64 {
    self.snapshot.ftp
  }

  /// Log a ride: compute its load, move the zone level and prepend it to
  /// history.
  pub fn log_workout(&mut self, new: NewWorkout) -> Result<WorkoutRecord, StoreError> {
    let day = parse_day(&new.date)
      .ok_or_else(|| StoreError::InvalidWorkout(format!("invalid date '{}'", new.date)))?;
    validate_effort(new.workout_level, new.rpe)?;
    if !(new.duration >= 0.0 && new.normalized_power >= 0.0) {
      return Err(StoreError::InvalidWorkout(
        "duration and power must not be negative".to_string(),
      ));
    }

    let ftp = self.snapshot.ftp;
    let progression = apply_workout(
      &mut self.snapshot.levels,
      new.zone,
      new.workout_level,
      new.rpe,
      new.completed,
    );

    let record = WorkoutRecord {
      id: first_free_id(&self.snapshot.history),
      date: day.format("%Y-%m-%d").to_string(),
      completed: new.completed,
      duration: new.duration,
      normalized_power: new.normalized_power,
      tss: Some(training_stress_score(new.normalized_power, new.duration, ftp)),
      intensity_factor: Some(intensity_factor(new.normalized_power, ftp)),
      notes: new.notes,
      classification: Classification::Classified(ClassifiedEffort {
        zone: new.zone,
        workout_level: new.workout_level,
        rpe: Some(new.rpe),
        progression,
      }),
    };

    self.snapshot.history.insert(0, record.clone());
    sort_newest_first(&mut self.snapshot.history);
    self.snapshot.touch();

    tracing::info!(id = record.id, zone = %new.zone, "Workout logged");
    Ok(record)
  }

  /// Assign zone and effort to an unclassified ride, running progression
  /// against the zone's current level.
  pub fn classify_workout(&mut self, id: i64, classify: Classify) -> Result<WorkoutRecord, StoreError> {
    validate_effort(classify.workout_level, classify.rpe)?;

    let index = self
      .snapshot
      .history
      .iter()
      .position(|w| w.id == id)
      .ok_or(StoreError::NotFound(id))?;
    if self.snapshot.history[index].is_classified() {
      return Err(StoreError::AlreadyClassified(id));
    }

    let progression = apply_workout(
      &mut self.snapshot.levels,
      classify.zone,
      classify.workout_level,
      classify.rpe,
      classify.completed,
    );

    let record = &mut self.snapshot.history[index];
    record.completed = classify.completed;
    record.classification = Classification::Classified(ClassifiedEffort {
      zone: classify.zone,
      workout_level: classify.workout_level,
      rpe: Some(classify.rpe),
      progression,
    });
    let record = record.clone();
    self.snapshot.touch();

    tracing::info!(id, zone = %classify.zone, "Workout classified");
    Ok(record)
  }

  /// Remove a ride. Levels are left as they are.
  pub fn delete_workout(&mut self, id: i64) -> Result<WorkoutRecord, StoreError> {
    let index = self
      .snapshot
      .history
      .iter()
      .position(|w| w.id == id)
      .ok_or(StoreError::NotFound(id))?;
    let removed = self.snapshot.history.remove(index);
    self.snapshot.touch();
    Ok(removed)
  }

  pub fn set_ftp(&mut self, ftp: f64) -> Result<(), StoreError> {
    if !(ftp.is_finite() && ftp > 0.0) {
      return Err(StoreError::InvalidFtp(ftp));
    }
    self.snapshot.ftp = ftp;
    self.snapshot.touch();
    Ok(())
  }

  /// Merge reconciled import records into the current history and return
  /// the outcome as applied.
  ///
  /// Reconciliation may have run against an older copy of the history, so
  /// records duplicating a ride stored since then are dropped and counted as
  /// duplicates, and ids already taken are reassigned.
  pub fn apply_import(&mut self, mut outcome: ReconcileOutcome) -> ReconcileOutcome {
    let staged = std::mem::take(&mut outcome.accepted);
    let mut next_id = staged
      .iter()
      .map(|w| w.id + 1)
      .fold(first_free_id(&self.snapshot.history), i64::max);

    for mut record in staged {
      let stored_since = record
        .day()
        .is_some_and(|day| is_duplicate(&self.snapshot.history, day, record.normalized_power));
      if stored_since {
        outcome.skipped.duplicate += 1;
        continue;
      }
      if self.snapshot.history.iter().any(|w| w.id == record.id) {
        record.id = next_id;
        next_id += 1;
      }
      outcome.accepted.push(record);
    }

    if !outcome.accepted.is_empty() {
      merge_history(&mut self.snapshot.history, outcome.accepted.clone());
      self.snapshot.touch();
    }
    outcome
  }

  /// Replace levels and/or history with a pasted document
  pub fn apply_paste(&mut self, patch: DataPatch) -> Result<(), StoreError> {
    if patch.is_empty() {
      return Err(StoreError::EmptyPatch);
    }
    if let Some(levels) = patch.levels {
      self.snapshot.levels.extend(levels);
    }
    if let Some(mut history) = patch.history {
      sort_newest_first(&mut history);
      self.snapshot.history = history;
    }
    self.snapshot.touch();
    Ok(())
  }

  /// Take a pulled remote snapshot as-is
  pub fn replace_with(&mut self, mut snapshot: Snapshot) {
    sort_newest_first(&mut snapshot.history);
    self.snapshot = snapshot;
  }

  pub fn loads(&self, today: NaiveDate) -> TrainingLoads {
    TrainingLoads::compute(&self.snapshot.history, today)
  }

  pub fn insights(&self, today: NaiveDate) -> Vec<Insight> {
    generate_insights(
      &self.loads(today),
      &self.snapshot.history,
      &self.snapshot.levels,
      today,
    )
  }

  pub fn recent_changes(&self) -> BTreeMap<ZoneId, RecentChange> {
    progression::recent_changes(&self.snapshot.history)
  }

  pub fn report(&self, today: NaiveDate) -> String {
    analysis_report(
      &self.loads(today),
      &self.snapshot.levels,
      &self.snapshot.history,
      today,
    )
  }

  pub fn unclassified(&self) -> Vec<&WorkoutRecord> {
    self.snapshot.history.iter().filter(|w| !w.is_classified()).collect()
  }
}

/// ---------------------------------------------------------------------------
/// Shared Store
/// ---------------------------------------------------------------------------

/// Held for the duration of one import. Hand it back with
/// [`ImportGuard::release`]; a guard that is only dropped frees the database
/// lock from a background task.
#[derive(Debug)]
pub struct ImportGuard {
  _local: OwnedMutexGuard<()>,
  lock: Option<(DbPool, String)>,
}

impl ImportGuard {
  pub async fn release(mut self) -> Result<(), StoreError> {
    if let Some((db, owner)) = self.lock.take() {
      db::release_import_lock(&db, &owner).await?;
    }
    Ok(())
  }
}

impl Drop for ImportGuard {
  fn drop(&mut self) {
    let Some((db, owner)) = self.lock.take() else {
      return;
    };
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          if let Err(e) = db::release_import_lock(&db, &owner).await {
            tracing::warn!(error = %e, "Failed to release import lock");
          }
        });
      }
      Err(_) => tracing::warn!("Import lock left behind; it expires on its own"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct SharedStore {
  inner: Arc<Mutex<TrainingStore>>,
  db: Option<DbPool>,
  import_gate: Arc<Mutex<()>>,
}

impl SharedStore {
  /// In-memory store without persistence
  pub fn new(store: TrainingStore) -> Self {
    Self {
      inner: Arc::new(Mutex::new(store)),
      db: None,
      import_gate: Arc::new(Mutex::new(())),
    }
  }

  /// Load the persisted snapshot, or start fresh at `default_ftp`
  pub async fn open(db: DbPool, default_ftp: f64) -> Result<Self, StoreError> {
    let snapshot = match db::load_snapshot(&db).await? {
      Some(snapshot) => snapshot,
      None => {
        tracing::info!("No stored data, starting fresh");
        Snapshot {
          ftp: default_ftp,
          ..Snapshot::default()
        }
      }
    };

    Ok(Self {
      db: Some(db),
      ..Self::new(TrainingStore::new(snapshot))
    })
  }

  pub async fn read<R>(&self, f: impl FnOnce(&TrainingStore) -> R) -> R {
    let store = self.inner.lock().await;
    f(&store)
  }

  /// Run one mutation and persist the result. A failed mutation or a failed
  /// write leaves both the stored and the in-memory state as they were.
  pub async fn update<R>(
    &self,
    f: impl FnOnce(&mut TrainingStore) -> Result<R, StoreError>,
  ) -> Result<R, StoreError> {
    let mut store = self.inner.lock().await;
    let (draft, result) = match &self.db {
      Some(db) => Self::update_stored(db, &store, f).await?,
      None => {
        let mut draft = store.clone();
        let result = f(&mut draft)?;
        (draft, result)
      }
    };
    *store = draft;
    Ok(result)
  }

  /// Apply `f` to the stored snapshot under a write lock on the database.
  /// The row is read again inside the transaction, so writes committed by
  /// other processes since this store loaded are kept. `cached` stands in
  /// when nothing is stored yet.
  async fn update_stored<R>(
    pool: &DbPool,
    cached: &TrainingStore,
    f: impl FnOnce(&mut TrainingStore) -> Result<R, StoreError>,
  ) -> Result<(TrainingStore, R), StoreError> {
    let mut conn = pool.acquire().await.map_err(DbError::from)?;
    sqlx::query("BEGIN IMMEDIATE")
      .execute(&mut *conn)
      .await
      .map_err(DbError::from)?;

    let applied = async {
      let mut draft = match db::load_snapshot(&mut *conn).await? {
        Some(stored) => TrainingStore::new(stored),
        None => cached.clone(),
      };
      let result = f(&mut draft)?;
      db::save_snapshot(&mut *conn, draft.snapshot()).await?;
      Ok::<_, StoreError>((draft, result))
    }
    .await;

    let end = match applied {
      Ok(_) => sqlx::query("COMMIT").execute(&mut *conn).await,
      Err(_) => sqlx::query("ROLLBACK").execute(&mut *conn).await,
    };
    if let Err(e) = end {
      if applied.is_ok() {
        let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
        return Err(DbError::from(e).into());
      }
      tracing::warn!(error = %e, "Rollback failed");
    }
    applied
  }

  pub async fn snapshot(&self) -> Snapshot {
    self.inner.lock().await.snapshot().clone()
  }

  /// Claim the import slot; fails while another import holds it, in this
  /// process or in any other process sharing the database
  pub async fn begin_import(&self) -> Result<ImportGuard, StoreError> {
    let local = self
      .import_gate
      .clone()
      .try_lock_owned()
      .map_err(|_| StoreError::ImportInProgress)?;

    let lock = match &self.db {
      Some(db) => {
        let owner = db::import_lock_owner();
        if !db::try_acquire_import_lock(db, &owner).await? {
          return Err(StoreError::ImportInProgress);
        }
        Some((db.clone(), owner))
      }
      None => None,
    };

    Ok(ImportGuard { _local: local, lock })
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::snapshot::DEFAULT_LEVEL;
  use crate::reconcile::import_records;
  use crate::test_utils::{
    day, mock_candidate, mock_snapshot, mock_unclassified, mock_unclassified_with_power,
    setup_test_db, teardown_test_db,
  };

  fn threshold_ride(date: &str) -> NewWorkout {
    NewWorkout {
      date: date.to_string(),
      zone: ZoneId::Threshold,
      workout_level: 2.5,
      rpe: 6.0,
      completed: true,
      duration: 60.0,
      normalized_power: 235.0,
      notes: "2x20".to_string(),
    }
  }

  #[test]
  fn test_log_workout_records_progression_and_load() {
    // Arrange
    let mut store = TrainingStore::default();

    // Act
    let record = store.log_workout(threshold_ride("2025-02-10")).unwrap();

    // Assert
    let progression = record.progression().unwrap();
    assert_eq!(progression.previous_level, 1.0);
    assert!((progression.new_level - 1.7).abs() < 1e-9);
    assert_eq!(record.tss, Some(100.0));
    assert_eq!(record.intensity_factor, Some(1.0));
    assert!((store.snapshot().level(ZoneId::Threshold) - 1.7).abs() < 1e-9);
    assert!(store.snapshot().exported_at.is_some());
  }

  #[test]
  fn test_log_keeps_history_newest_first() {
    let mut store = TrainingStore::default();
    store.log_workout(threshold_ride("2025-02-10")).unwrap();
    store.log_workout(threshold_ride("2025-02-01")).unwrap();
    store.log_workout(threshold_ride("2025-02-12")).unwrap();

    let dates: Vec<&str> = store.snapshot().history.iter().map(|w| w.date.as_str()).collect();
    assert_eq!(dates, vec!["2025-02-12", "2025-02-10", "2025-02-01"]);
  }

  #[test]
  fn test_recovery_log_leaves_levels_alone() {
    let mut store = TrainingStore::default();
    let before = store.snapshot().levels.clone();

    let record = store
      .log_workout(NewWorkout {
        zone: ZoneId::Recovery,
        ..threshold_ride("2025-02-10")
      })
      .unwrap();

    assert!(record.progression().is_none());
    assert_eq!(store.snapshot().levels, before);
  }

  #[test]
  fn test_invalid_inputs_are_rejected_without_changes() {
    let mut store = TrainingStore::default();

    let bad_date = store.log_workout(threshold_ride("tomorrow"));
    let bad_rpe = store.log_workout(NewWorkout {
      rpe: 11.0,
      ..threshold_ride("2025-02-10")
    });

    assert!(matches!(bad_date, Err(StoreError::InvalidWorkout(_))));
    assert!(matches!(bad_rpe, Err(StoreError::InvalidWorkout(_))));
    assert_eq!(store, TrainingStore::default());
  }

  #[test]
  fn test_classify_imported_workout() {
    // Arrange
    let mut store = TrainingStore::new(mock_snapshot(0, None));
    let outcome = import_records(vec![mock_candidate("2025-02-03", Some(200.0))], &[], 235.0);
    store.apply_import(outcome);
    let id = store.unclassified()[0].id;

    // Act
    let record = store
      .classify_workout(
        id,
        Classify {
          zone: ZoneId::Sweetspot,
          workout_level: 2.0,
          rpe: 5.0,
          completed: true,
        },
      )
      .unwrap();

    // Assert: difficulty 1 at rpe 5 -> +0.5
    assert_eq!(record.zone(), Some(ZoneId::Sweetspot));
    assert!((record.progression().unwrap().change - 0.5).abs() < 1e-9);
    assert!((store.snapshot().level(ZoneId::Sweetspot) - 1.5).abs() < 1e-9);
    assert!(store.unclassified().is_empty());
  }

  #[test]
  fn test_classify_errors() {
    let mut store = TrainingStore::default();
    let logged = store.log_workout(threshold_ride("2025-02-10")).unwrap();
    let classify = Classify {
      zone: ZoneId::Tempo,
      workout_level: 2.0,
      rpe: 5.0,
      completed: true,
    };

    assert!(matches!(
      store.classify_workout(999, classify),
      Err(StoreError::NotFound(999))
    ));
    assert!(matches!(
      store.classify_workout(logged.id, classify),
      Err(StoreError::AlreadyClassified(_))
    ));
  }

  #[test]
  fn test_delete_does_not_rewind_levels() {
    let mut store = TrainingStore::default();
    let record = store.log_workout(threshold_ride("2025-02-10")).unwrap();

    store.delete_workout(record.id).unwrap();

    assert!(store.snapshot().history.is_empty());
    assert!(store.snapshot().level(ZoneId::Threshold) > DEFAULT_LEVEL);
    assert!(matches!(store.delete_workout(record.id), Err(StoreError::NotFound(_))));
  }

  #[test]
  fn test_set_ftp_validates() {
    let mut store = TrainingStore::default();

    assert!(matches!(store.set_ftp(0.0), Err(StoreError::InvalidFtp(_))));
    assert!(matches!(store.set_ftp(f64::NAN), Err(StoreError::InvalidFtp(_))));
    store.set_ftp(250.0).unwrap();

    assert_eq!(store.ftp(), 250.0);
  }

  #[test]
  fn test_apply_paste_replaces_only_present_parts() {
    let mut store = TrainingStore::new(mock_snapshot(3, None));
    let mut levels = store.snapshot().levels.clone();
    levels.insert(ZoneId::Vo2max, 4.0);

    store
      .apply_paste(DataPatch {
        levels: Some(levels),
        history: None,
      })
      .unwrap();

    assert_eq!(store.snapshot().ride_count(), 3);
    assert_eq!(store.snapshot().level(ZoneId::Vo2max), 4.0);
    assert!(matches!(
      store.apply_paste(DataPatch::default()),
      Err(StoreError::EmptyPatch)
    ));
  }

  #[test]
  fn test_read_models() {
    let store = TrainingStore::new(Snapshot {
      history: vec![
        mock_unclassified(1, "2025-02-09", 60.0),
        mock_unclassified(2, "2025-02-11", 40.0),
      ],
      ..Snapshot::default()
    });
    let today = day("2025-02-11");

    assert_eq!(store.snapshot().history[0].date, "2025-02-11");
    assert_eq!(store.loads(today).weekly_tss, 100);
    assert!(store.recent_changes().is_empty());
    assert!(store.report(today).contains("- Weekly TSS: 100"));
    assert!(!store.insights(today).is_empty());
  }

  #[tokio::test]
  async fn test_shared_store_persists_mutations() {
    // Arrange
    let pool = setup_test_db().await;
    let shared = SharedStore::open(pool.clone(), 240.0).await.unwrap();
    assert_eq!(shared.read(|s| s.ftp()).await, 240.0);

    // Act
    shared
      .update(|s| s.log_workout(threshold_ride("2025-02-10")))
      .await
      .unwrap();

    // Assert
    let stored = db::load_snapshot(&pool).await.unwrap().unwrap();
    assert_eq!(stored.ride_count(), 1);
    assert_eq!(stored, shared.snapshot().await);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_failed_update_leaves_state_untouched() {
    let shared = SharedStore::new(TrainingStore::new(mock_snapshot(2, None)));
    let before = shared.snapshot().await;

    let result = shared.update(|s| s.delete_workout(12345)).await;

    assert!(matches!(result, Err(StoreError::NotFound(12345))));
    assert_eq!(shared.snapshot().await, before);
  }

  #[tokio::test]
  async fn test_second_import_is_rejected_while_first_runs() {
    let shared = SharedStore::new(TrainingStore::default());

    let first = shared.begin_import().await.unwrap();
    let second = shared.clone().begin_import().await;
    assert!(matches!(second, Err(StoreError::ImportInProgress)));

    first.release().await.unwrap();
    assert!(shared.begin_import().await.is_ok());
  }

  #[tokio::test]
  async fn test_updates_from_two_openers_are_both_kept() {
    // Arrange: two stores over one database, as two processes would be
    let pool = setup_test_db().await;
    let first = SharedStore::open(pool.clone(), 240.0).await.unwrap();
    let second = SharedStore::open(pool.clone(), 240.0).await.unwrap();

    // Act
    first
      .update(|s| s.log_workout(threshold_ride("2025-02-10")))
      .await
      .unwrap();
    second
      .update(|s| s.log_workout(threshold_ride("2025-02-11")))
      .await
      .unwrap();

    // Assert
    let stored = db::load_snapshot(&pool).await.unwrap().unwrap();
    let dates: Vec<&str> = stored.history.iter().map(|w| w.date.as_str()).collect();
    assert_eq!(dates, vec!["2025-02-11", "2025-02-10"]);
    assert_eq!(second.snapshot().await, stored);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_failed_update_rolls_back_the_transaction() {
    let pool = setup_test_db().await;
    let shared = SharedStore::open(pool.clone(), 240.0).await.unwrap();
    shared
      .update(|s| s.log_workout(threshold_ride("2025-02-10")))
      .await
      .unwrap();

    let result = shared.update(|s| s.delete_workout(12345)).await;
    shared.update(|s| s.set_ftp(250.0)).await.unwrap();

    assert!(matches!(result, Err(StoreError::NotFound(12345))));
    let stored = db::load_snapshot(&pool).await.unwrap().unwrap();
    assert_eq!(stored.ride_count(), 1);
    assert_eq!(stored.ftp, 250.0);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_import_lock_is_shared_through_the_database() {
    // Arrange
    let pool = setup_test_db().await;
    let first = SharedStore::open(pool.clone(), 240.0).await.unwrap();
    let second = SharedStore::open(pool.clone(), 240.0).await.unwrap();

    // Act
    let running = first.begin_import().await.unwrap();
    let rejected = second.begin_import().await;
    running.release().await.unwrap();
    let after = second.begin_import().await;

    // Assert
    assert!(matches!(rejected, Err(StoreError::ImportInProgress)));
    assert!(after.is_ok());

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_apply_import_drops_rides_stored_since_reconcile() {
    // Arrange: reconciled against an empty history, then the same ride lands
    let outcome = import_records(
      vec![
        mock_candidate("2025-02-03", Some(200.0)),
        mock_candidate("2025-02-04", Some(210.0)),
      ],
      &[],
      235.0,
    );
    let taken_id = outcome.accepted[1].id;
    let mut store = TrainingStore::new(Snapshot {
      history: vec![
        mock_unclassified_with_power(taken_id, "2025-02-03T07:30:00", 202.0),
      ],
      ..Snapshot::default()
    });

    // Act
    let applied = store.apply_import(outcome);

    // Assert
    assert_eq!(applied.accepted.len(), 1);
    assert_eq!(applied.skipped.duplicate, 1);
    assert_eq!(store.snapshot().ride_count(), 2);
    let ids: Vec<i64> = store.snapshot().history.iter().map(|w| w.id).collect();
    assert_ne!(ids[0], ids[1]);
  }
}
