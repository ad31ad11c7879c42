use crate::commands::{AppState, CommandError};
use crate::models::workout::WorkoutRecord;
use crate::progression::{describe_change, format_change};
use crate::store::{Classify, NewWorkout};
use crate::zones::{power_range, ZoneId};

/// "Threshold: 1.0 -> 1.7 (+0.7, Breakthrough!)", or the zone name alone
/// when the ride moved no level
fn progression_line(record: &WorkoutRecord) -> String {
  let zone = record.zone().map_or("Unclassified", |z| z.display_name());
  match record.progression() {
    Some(p) => format!(
      "{}: {:.1} -> {:.1} ({}, {})",
      zone,
      p.previous_level,
      p.new_level,
      format_change(p.change),
      describe_change(p.change)
    ),
    None => zone.to_string(),
  }
}

/// ---------------------------------------------------------------------------
/// Workout Commands
/// ---------------------------------------------------------------------------

pub async fn log_workout(state: &AppState, workout: NewWorkout) -> Result<String, CommandError> {
  let record = state.store.update(|s| s.log_workout(workout)).await?;
  let tss = record.tss.unwrap_or_default().round();

  Ok(format!(
    "Logged workout #{} on {}. {}. TSS {}",
    record.id,
    record.date,
    progression_line(&record),
    tss
  ))
}

pub async fn classify_workout(
  state: &AppState,
  id: i64,
  classify: Classify,
) -> Result<String, CommandError> {
  let record = state
    .store
    .update(|s| s.classify_workout(id, classify))
    .await?;

  Ok(format!("Classified workout #{}. {}", record.id, progression_line(&record)))
}

pub async fn delete_workout(state: &AppState, id: i64) -> Result<String, CommandError> {
  let removed = state.store.update(|s| s.delete_workout(id)).await?;
  Ok(format!("Deleted workout #{} from {}", removed.id, removed.date))
}

/// Set FTP and list the resulting zone power ranges
pub async fn set_ftp(state: &AppState, ftp: f64) -> Result<String, CommandError> {
  state.store.update(|s| s.set_ftp(ftp)).await?;

  let mut lines = vec![format!("FTP set to {} W", ftp.round())];
  lines.extend(ZoneId::ALL.iter().map(|zone| {
    let range = power_range(*zone, ftp);
    match range.max {
      Some(max) => format!("- {}: {}-{} W", zone.display_name(), range.min.round(), max.round() - 1.0),
      None => format!("- {}: {}+ W", zone.display_name(), range.min.round()),
    }
  }));
  Ok(lines.join("\n"))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::commands::tests::memory_state;
  use crate::models::snapshot::Snapshot;
  use crate::store::StoreError;
  use crate::test_utils::mock_unclassified;

  fn sweetspot(date: &str) -> NewWorkout {
    NewWorkout {
      date: date.to_string(),
      zone: ZoneId::Sweetspot,
      workout_level: 3.0,
      rpe: 6.0,
      completed: true,
      duration: 90.0,
      normalized_power: 200.0,
      notes: String::new(),
    }
  }

  #[tokio::test]
  async fn test_log_workout_message() {
    // Arrange
    let state = memory_state(Snapshot::default());

    // Act
    let message = log_workout(&state, sweetspot("2025-02-10")).await.unwrap();

    // Assert: difficulty 2 at rpe 6 -> +0.7
    assert!(message.starts_with("Logged workout #"));
    assert!(message.ends_with(" on 2025-02-10. Sweet Spot: 1.0 -> 1.7 (+0.7, Breakthrough!). TSS 109"));
  }

  #[tokio::test]
  async fn test_classify_and_delete_messages() {
    let state = memory_state(Snapshot {
      history: vec![mock_unclassified(4, "2025-02-11", 40.0)],
      ..Snapshot::default()
    });

    let classified = classify_workout(
      &state,
      4,
      Classify {
        zone: ZoneId::Recovery,
        workout_level: 1.0,
        rpe: 2.0,
        completed: true,
      },
    )
    .await
    .unwrap();
    let deleted = delete_workout(&state, 4).await.unwrap();

    assert_eq!(classified, "Classified workout #4. Recovery");
    assert_eq!(deleted, "Deleted workout #4 from 2025-02-11");
  }

  #[tokio::test]
  async fn test_store_errors_pass_through() {
    let state = memory_state(Snapshot::default());

    let result = delete_workout(&state, 9).await;

    assert!(matches!(result, Err(CommandError::Store(StoreError::NotFound(9)))));
  }

  #[tokio::test]
  async fn test_set_ftp_lists_zone_ranges() {
    let state = memory_state(Snapshot::default());

    let message = set_ftp(&state, 200.0).await.unwrap();

    assert!(message.starts_with("FTP set to 200 W\n- Recovery: 0-109 W"));
    assert!(message.contains("- Threshold: 188-199 W"));
    assert!(message.ends_with("- Anaerobic: 238+ W"));
    assert_eq!(state.store.read(|s| s.ftp()).await, 200.0);
  }
}
