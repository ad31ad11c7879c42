use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::zones::ZoneId;

/// Progression fields recorded when a workout moved a zone level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressionDelta {
  pub previous_level: f64,
  pub new_level: f64,
  pub change: f64,
}

impl ProgressionDelta {
  pub fn new(previous_level: f64, new_level: f64) -> Self {
    Self {
      previous_level,
      new_level,
      change: new_level - previous_level,
    }
  }
}

/// User-assigned classification of an effort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEffort {
  pub zone: ZoneId,
  pub workout_level: f64,
  pub rpe: Option<f64>,
  /// None for recovery-zone workouts, which never move a level
  pub progression: Option<ProgressionDelta>,
}

/// Imported rides start unclassified and wait for a manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Classification {
  Unclassified,
  Classified(ClassifiedEffort),
}

/// A single logged or imported ride.
///
/// Serialized in the flat camelCase shape used by exports and sync, where the
/// classification fields are nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawWorkoutRecord", into = "RawWorkoutRecord")]
pub struct WorkoutRecord {
  pub id: i64,
  /// Calendar day, `YYYY-MM-DD`
  pub date: String,
  pub completed: bool,
  /// Minutes
  pub duration: f64,
  /// Watts
  pub normalized_power: f64,
  pub tss: Option<f64>,
  pub intensity_factor: Option<f64>,
  pub notes: String,
  pub classification: Classification,
}

impl WorkoutRecord {
  /// Parsed calendar day, None when the stored date is malformed
  pub fn day(&self) -> Option<NaiveDate> {
    parse_day(&self.date)
  }

  pub fn zone(&self) -> Option<ZoneId> {
    match &self.classification {
      Classification::Classified(effort) => Some(effort.zone),
      Classification::Unclassified => None,
    }
  }

  pub fn effort(&self) -> Option<&ClassifiedEffort> {
    match &self.classification {
      Classification::Classified(effort) => Some(effort),
      Classification::Unclassified => None,
    }
  }

  pub fn progression(&self) -> Option<&ProgressionDelta> {
    self.effort().and_then(|e| e.progression.as_ref())
  }

  pub fn is_classified(&self) -> bool {
    matches!(self.classification, Classification::Classified(_))
  }

  pub fn tss_or_zero(&self) -> f64 {
    self.tss.filter(|t| t.is_finite()).unwrap_or(0.0)
  }
}

/// Parse a record date. Accepts a bare day or a timestamp whose first ten
/// characters are the day.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  let day = trimmed.get(..10).unwrap_or(trimmed);
  NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Sort newest first; records with malformed dates sink to the end
pub fn sort_newest_first(history: &mut [WorkoutRecord]) {
  history.sort_by(|a, b| b.day().cmp(&a.day()));
}

/// ---------------------------------------------------------------------------
/// Wire Shape
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkoutRecord {
  id: i64,
  date: String,
  zone: Option<ZoneId>,
  workout_level: Option<f64>,
  rpe: Option<f64>,
  #[serde(default)]
  completed: Option<bool>,
  #[serde(default)]
  duration: Option<f64>,
  #[serde(default)]
  normalized_power: Option<f64>,
  #[serde(default)]
  notes: Option<String>,
  #[serde(default)]
  previous_level: Option<f64>,
  #[serde(default)]
  new_level: Option<f64>,
  #[serde(default)]
  change: Option<f64>,
  #[serde(default)]
  tss: Option<f64>,
  #[serde(default)]
  intensity_factor: Option<f64>,
}

impl From<RawWorkoutRecord> for WorkoutRecord {
  fn from(raw: RawWorkoutRecord) -> Self {
    let progression = match (raw.previous_level, raw.new_level, raw.change) {
      (Some(previous_level), Some(new_level), Some(change)) => Some(ProgressionDelta {
        previous_level,
        new_level,
        change,
      }),
      _ => None,
    };

    let classification = match (raw.zone, raw.workout_level) {
      (Some(zone), Some(workout_level)) => Classification::Classified(ClassifiedEffort {
        zone,
        workout_level,
        rpe: raw.rpe,
        progression,
      }),
      _ => Classification::Unclassified,
    };

    Self {
      id: raw.id,
      date: raw.date,
      completed: raw.completed.unwrap_or(true),
      duration: raw.duration.unwrap_or(0.0),
      normalized_power: raw.normalized_power.unwrap_or(0.0),
      tss: raw.tss,
      intensity_factor: raw.intensity_factor,
      notes: raw.notes.unwrap_or_default(),
      classification,
    }
  }
}

impl From<WorkoutRecord> for RawWorkoutRecord {
  fn from(record: WorkoutRecord) -> Self {
    let (zone, workout_level, rpe, progression) = match record.classification {
      Classification::Classified(effort) => (
        Some(effort.zone),
        Some(effort.workout_level),
        effort.rpe,
        effort.progression,
      ),
      Classification::Unclassified => (None, None, None, None),
    };

    Self {
      id: record.id,
      date: record.date,
      zone,
      workout_level,
      rpe,
      completed: Some(record.completed),
      duration: Some(record.duration),
      normalized_power: Some(record.normalized_power),
      notes: Some(record.notes),
      previous_level: progression.map(|p| p.previous_level),
      new_level: progression.map(|p| p.new_level),
      change: progression.map(|p| p.change),
      tss: record.tss,
      intensity_factor: record.intensity_factor,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
