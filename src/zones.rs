//! Training zones and FTP-relative power ranges
//!
//! Every boundary is derived from FTP alone, so ranges follow FTP changes
//! without any stored state.

use serde::{Deserialize, Serialize};

/// ---------------------------------------------------------------------------
/// Zone Identifiers
/// ---------------------------------------------------------------------------

/// Training zones, declared in ascending order of intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneId {
  Recovery,
  Endurance,
  Tempo,
  Sweetspot,
  Threshold,
  Vo2max,
  Anaerobic,
}

impl ZoneId {
  /// All zones, lowest intensity first
  pub const ALL: [ZoneId; 7] = [
    ZoneId::Recovery,
    ZoneId::Endurance,
    ZoneId::Tempo,
    ZoneId::Sweetspot,
    ZoneId::Threshold,
    ZoneId::Vo2max,
    ZoneId::Anaerobic,
  ];

  /// Zones that carry a progression level (everything but recovery)
  pub const PROGRESSIVE: [ZoneId; 6] = [
    ZoneId::Endurance,
    ZoneId::Tempo,
    ZoneId::Sweetspot,
    ZoneId::Threshold,
    ZoneId::Vo2max,
    ZoneId::Anaerobic,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ZoneId::Recovery => "recovery",
      ZoneId::Endurance => "endurance",
      ZoneId::Tempo => "tempo",
      ZoneId::Sweetspot => "sweetspot",
      ZoneId::Threshold => "threshold",
      ZoneId::Vo2max => "vo2max",
      ZoneId::Anaerobic => "anaerobic",
    }
  }

  pub fn display_name(&self) -> &'static str {
    match self {
      ZoneId::Recovery => "Recovery",
      ZoneId::Endurance => "Endurance",
      ZoneId::Tempo => "Tempo",
      ZoneId::Sweetspot => "Sweet Spot",
      ZoneId::Threshold => "Threshold",
      ZoneId::Vo2max => "VO2max",
      ZoneId::Anaerobic => "Anaerobic",
    }
  }

  /// Position in the intensity order (0 = lowest)
  pub fn rank(&self) -> usize {
    *self as usize
  }

  /// Pure-recovery zones never touch progression levels
  pub fn is_recovery(&self) -> bool {
    matches!(self, ZoneId::Recovery)
  }

  /// Lower bound of the zone as a fraction of FTP
  pub fn min_fraction(&self) -> f64 {
    match self {
      ZoneId::Recovery => 0.0,
      ZoneId::Endurance => 0.55,
      ZoneId::Tempo => 0.70,
      ZoneId::Sweetspot => 0.83,
      ZoneId::Threshold => 0.94,
      ZoneId::Vo2max => 1.00,
      ZoneId::Anaerobic => 1.19,
    }
  }

  /// The next zone up, if any
  pub fn next(&self) -> Option<ZoneId> {
    ZoneId::ALL.get(self.rank() + 1).copied()
  }
}

impl std::fmt::Display for ZoneId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for ZoneId {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ZoneId::ALL
      .iter()
      .find(|z| z.as_str().eq_ignore_ascii_case(s.trim()))
      .copied()
      .ok_or_else(|| format!("Unknown zone: {}", s))
  }
}

/// ---------------------------------------------------------------------------
/// Power Ranges
/// ---------------------------------------------------------------------------

/// Absolute power range for a zone at a given FTP
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRange {
  pub min: f64,
  /// None for the open-ended top zone
  pub max: Option<f64>,
}

impl PowerRange {
  pub fn contains(&self, watts: f64) -> bool {
    watts >= self.min && self.max.map_or(true, |max| watts < max)
  }
}

/// Power range for `zone` derived from `ftp`
pub fn power_range(zone: ZoneId, ftp: f64) -> PowerRange {
  PowerRange {
    min: zone.min_fraction() * ftp,
    max: zone.next().map(|next| next.min_fraction() * ftp),
  }
}

/// Pick the highest zone whose lower bound `avg_watts` meets
pub fn classify(avg_watts: f64, ftp: f64) -> ZoneId {
  ZoneId::ALL
    .iter()
    .rev()
    .find(|zone| avg_watts >= power_range(**zone, ftp).min)
    .copied()
    .unwrap_or(ZoneId::Recovery)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
