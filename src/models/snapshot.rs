use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::workout::WorkoutRecord;
use crate::zones::ZoneId;

pub const DEFAULT_FTP: f64 = 235.0;
pub const DEFAULT_LEVEL: f64 = 1.0;

/// Current progression level per zone
pub type Levels = BTreeMap<ZoneId, f64>;

/// Every progression zone at the starting level
pub fn default_levels() -> Levels {
  ZoneId::PROGRESSIVE
    .iter()
    .map(|zone| (*zone, DEFAULT_LEVEL))
    .collect()
}

/// Athlete details that do not drive the core calculations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteProfile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_hr: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resting_hr: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub weight: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub age: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sex: Option<String>,
}

/// The unit exchanged with exports and the remote backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
  #[serde(default = "default_levels")]
  pub levels: Levels,
  #[serde(default)]
  pub history: Vec<WorkoutRecord>,
  #[serde(default = "default_ftp")]
  pub ftp: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile: Option<AthleteProfile>,
  /// Target event, opaque to the core
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exported_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sync_version: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_synced_at: Option<String>,
  /// Fields written by other app versions, kept as-is
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_ftp() -> f64 {
  DEFAULT_FTP
}

impl Default for Snapshot {
  fn default() -> Self {
    Self {
      levels: default_levels(),
      history: Vec::new(),
      ftp: DEFAULT_FTP,
      profile: None,
      event: None,
      exported_at: None,
      sync_version: None,
      last_synced_at: None,
      extra: serde_json::Map::new(),
    }
  }
}

impl Snapshot {
  pub fn ride_count(&self) -> usize {
    self.history.len()
  }

  /// Level for a zone, falling back to the starting level
  pub fn level(&self, zone: ZoneId) -> f64 {
    self.levels.get(&zone).copied().unwrap_or(DEFAULT_LEVEL)
  }

  /// `exportedAt` as a timestamp; missing or malformed values count as the epoch
  pub fn exported_at_time(&self) -> DateTime<Utc> {
    parse_timestamp(self.exported_at.as_deref())
  }

  /// Record that the snapshot changed
  pub fn touch(&mut self) {
    self.exported_at = Some(timestamp_now());
  }

  pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(self)
  }
}

/// Current UTC time in the `2025-01-01T12:00:00.000Z` form
pub fn timestamp_now() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
  raw
    .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or(DateTime::UNIX_EPOCH)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
