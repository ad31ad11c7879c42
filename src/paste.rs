//! Pasted and file-imported data
//!
//! Two shapes are accepted. A JSON data document (`{levels?, history?}`, the
//! same shape as an export) replaces whichever parts it carries. A CSV
//! activity table becomes import candidates that go through the reconciler
//! like any other import.

use serde_json::Value;

use crate::models::snapshot::Levels;
use crate::models::workout::WorkoutRecord;
use crate::progression::clamp_level;
use crate::reconcile::ActivityCandidate;
use crate::zones::ZoneId;

#[derive(Debug, thiserror::Error)]
pub enum PasteError {
  #[error("Nothing to import")]
  Empty,

  #[error("Invalid JSON format. Please check and try again.")]
  InvalidJson(#[source] serde_json::Error),

  #[error("Expected a JSON object with levels and/or history")]
  NotAnObject,

  #[error("Invalid history: {0}")]
  InvalidHistory(#[source] serde_json::Error),

  #[error("Invalid CSV: {0}")]
  InvalidCsv(#[from] csv::Error),
}

/// ---------------------------------------------------------------------------
/// JSON Data Paste
/// ---------------------------------------------------------------------------

/// Parts of a pasted document that will replace local state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPatch {
  pub levels: Option<Levels>,
  pub history: Option<Vec<WorkoutRecord>>,
}

impl DataPatch {
  pub fn is_empty(&self) -> bool {
    self.levels.is_none() && self.history.is_none()
  }
}

/// Parse a pasted or file-imported JSON document.
///
/// Unknown zone keys and non-numeric levels are dropped; levels are clamped
/// into the valid range.
pub fn parse_data_json(raw: &str) -> Result<DataPatch, PasteError> {
  if raw.trim().is_empty() {
    return Err(PasteError::Empty);
  }
  let value: Value = serde_json::from_str(raw).map_err(PasteError::InvalidJson)?;
  let Value::Object(mut object) = value else {
    return Err(PasteError::NotAnObject);
  };

  let levels = match object.remove("levels") {
    Some(Value::Object(entries)) => Some(
      entries
        .iter()
        .filter_map(|(key, level)| {
          let zone = key.parse::<ZoneId>().ok().filter(|z| !z.is_recovery())?;
          Some((zone, clamp_level(level.as_f64()?)))
        })
        .collect::<Levels>(),
    ),
    _ => None,
  };

  let history = match object.remove("history") {
    Some(Value::Null) | None => None,
    Some(history) => Some(serde_json::from_value(history).map_err(PasteError::InvalidHistory)?),
  };

  Ok(DataPatch { levels, history })
}

/// ---------------------------------------------------------------------------
/// CSV Activity Paste
/// ---------------------------------------------------------------------------

/// Header index for each recognized column
#[derive(Debug, Default)]
struct ColumnMap {
  date: Option<usize>,
  power: Option<usize>,
  load: Option<usize>,
  duration: Option<usize>,
  duration_in_seconds: bool,
  name: Option<usize>,
}

impl ColumnMap {
  fn from_headers(headers: &csv::StringRecord) -> Self {
    let mut map = ColumnMap::default();
    for (index, header) in headers.iter().enumerate() {
      let h = header.trim().to_lowercase();
      if map.date.is_none() && h.contains("date") {
        map.date = Some(index);
      } else if map.power.is_none()
        && (h.contains("normalized") || h.contains("weighted") || h == "np" || h.contains("np "))
      {
        map.power = Some(index);
      } else if map.load.is_none() && (h.contains("load") || h.contains("tss")) {
        map.load = Some(index);
      } else if map.duration.is_none()
        && (h.contains("time") || h.contains("duration") || h.contains("moving"))
      {
        map.duration = Some(index);
        map.duration_in_seconds = h.contains("sec") || h.contains("moving") || h.contains("elapsed");
      } else if map.name.is_none() && h.contains("name") {
        map.name = Some(index);
      }
    }
    map
  }
}

/// Tab when the header row has tabs, otherwise comma
fn detect_delimiter(raw: &str) -> u8 {
  let header = raw.lines().next().unwrap_or_default();
  if header.contains('\t') {
    b'\t'
  } else {
    b','
  }
}

fn cell<'a>(record: &'a csv::StringRecord, index: Option<usize>) -> Option<&'a str> {
  index
    .and_then(|i| record.get(i))
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

fn number(raw: &str) -> Option<f64> {
  raw.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `h:mm:ss` or `mm:ss` to minutes; plain numbers per the column unit
fn duration_minutes(raw: &str, plain_is_seconds: bool) -> Option<f64> {
  if raw.contains(':') {
    let parts: Vec<f64> = raw.split(':').map(|p| p.trim().parse::<f64>().ok()).collect::<Option<_>>()?;
    let seconds = match parts.as_slice() {
      [h, m, s] => h * 3600.0 + m * 60.0 + s,
      [m, s] => m * 60.0 + s,
      _ => return None,
    };
    return Some(seconds / 60.0);
  }
  let value = number(raw)?;
  Some(if plain_is_seconds { value / 60.0 } else { value })
}

/// Pasted CSV rows plus the count of rows lacking a required value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvActivities {
  pub candidates: Vec<ActivityCandidate>,
  pub skipped_rows: usize,
}

/// Parse a pasted activity table. Rows without a date, normalized power or
/// load are skipped individually.
pub fn parse_activity_csv(raw: &str) -> Result<CsvActivities, PasteError> {
  if raw.trim().is_empty() {
    return Err(PasteError::Empty);
  }

  let mut reader = csv::ReaderBuilder::new()
    .delimiter(detect_delimiter(raw))
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(raw.as_bytes());

  let columns = ColumnMap::from_headers(reader.headers()?);
  tracing::debug!(?columns, "Mapped CSV columns");

  let mut parsed = CsvActivities::default();
  for record in reader.records() {
    let record = record?;

    let date = cell(&record, columns.date);
    let power = cell(&record, columns.power).and_then(number);
    let load = cell(&record, columns.load).and_then(number);
    let (Some(date), Some(power), Some(load)) = (date, power, load) else {
      parsed.skipped_rows += 1;
      continue;
    };

    let name = cell(&record, columns.name).map(str::to_string);
    parsed.candidates.push(ActivityCandidate {
      source_id: None,
      notes: Some(format!("Imported from CSV: {}", name.as_deref().unwrap_or("Ride"))),
      name,
      date: date.to_string(),
      normalized_power: Some(power),
      duration_minutes: cell(&record, columns.duration)
        .and_then(|d| duration_minutes(d, columns.duration_in_seconds))
        .unwrap_or(0.0),
      tss: Some(load),
      eftp: None,
    });
  }

  Ok(parsed)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_json_patch_with_levels_and_history() {
    let raw = r#"{
      "levels": { "endurance": 2.5, "threshold": 12, "recovery": 4, "mystery": 3 },
      "history": [{ "id": 1, "date": "2025-01-02", "zone": "tempo", "workoutLevel": 3 }]
    }"#;

    let patch = parse_data_json(raw).unwrap();

    let levels = patch.levels.unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[&ZoneId::Endurance], 2.5);
    assert_eq!(levels[&ZoneId::Threshold], 10.0);
    assert_eq!(patch.history.unwrap()[0].zone(), Some(ZoneId::Tempo));
  }

  #[test]
  fn test_json_patch_with_only_history_leaves_levels_unset() {
    let patch = parse_data_json(r#"{ "history": [] }"#).unwrap();

    assert!(patch.levels.is_none());
    assert_eq!(patch.history, Some(vec![]));
  }

  #[test]
  fn test_json_errors_are_user_messages() {
    let err = parse_data_json("{ not json").unwrap_err();
    assert_eq!(err.to_string(), "Invalid JSON format. Please check and try again.");

    assert!(matches!(parse_data_json("[1, 2]"), Err(PasteError::NotAnObject)));
    assert!(matches!(parse_data_json("   "), Err(PasteError::Empty)));
    assert!(matches!(
      parse_data_json(r#"{ "history": [{ "date": 5 }] }"#),
      Err(PasteError::InvalidHistory(_))
    ));
  }

  #[test]
  fn test_comma_csv_with_quoted_fields() {
    let raw = "Date,Name,Moving Time,Weighted Avg Power,Training Load\n\
               2025-01-04,\"Hills, then coffee\",3600,205,72\n\
               2025-01-05,Spin,1800,,20\n";

    let parsed = parse_activity_csv(raw).unwrap();

    assert_eq!(parsed.candidates.len(), 1);
    assert_eq!(parsed.skipped_rows, 1);
    let ride = &parsed.candidates[0];
    assert_eq!(ride.name.as_deref(), Some("Hills, then coffee"));
    assert_eq!(ride.normalized_power, Some(205.0));
    assert_eq!(ride.tss, Some(72.0));
    assert_eq!(ride.duration_minutes, 60.0);
  }

  #[test]
  fn test_tab_csv_with_clock_durations() {
    let raw = "DATE\tDuration\tNP\tTSS\n2025-02-01\t1:30:00\t190\t95\n";

    let parsed = parse_activity_csv(raw).unwrap();

    let ride = &parsed.candidates[0];
    assert_eq!(ride.date, "2025-02-01");
    assert_eq!(ride.duration_minutes, 90.0);
    assert_eq!(ride.normalized_power, Some(190.0));
  }

  #[test]
  fn test_csv_missing_required_column_skips_rows() {
    let raw = "Date,Duration,Normalized Power\n2025-02-01,60,190\n2025-02-02,45,180\n";

    let parsed = parse_activity_csv(raw).unwrap();

    assert!(parsed.candidates.is_empty());
    assert_eq!(parsed.skipped_rows, 2);
  }
}
