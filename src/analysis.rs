//! Deterministic training load layer
//!
//! TSS and Intensity Factor per workout, and the CTL/ATL/TSB exponentially
//! weighted series over the whole history. Everything here is a pure function
//! of the history and the calendar day passed in as `today`.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::snapshot::Levels;
use crate::models::workout::WorkoutRecord;
use crate::zones::ZoneId;

/// ---------------------------------------------------------------------------
/// Constants
/// ---------------------------------------------------------------------------

/// Chronic Training Load time constant (days)
pub const CTL_DAYS: f64 = 42.0;

/// Acute Training Load time constant (days)
pub const ATL_DAYS: f64 = 7.0;

const CTL_ALPHA: f64 = 2.0 / (CTL_DAYS + 1.0);
const ATL_ALPHA: f64 = 2.0 / (ATL_DAYS + 1.0);

/// ---------------------------------------------------------------------------
/// Tier 1: Per-Workout Metrics
/// ---------------------------------------------------------------------------

/// Training Stress Score, rounded to the nearest integer.
///
/// Proportional to duration and to the square of relative intensity.
pub fn training_stress_score(normalized_power: f64, duration_minutes: f64, ftp: f64) -> f64 {
  if ftp <= 0.0 {
    return 0.0;
  }
  let intensity = normalized_power / ftp;
  let tss = (duration_minutes * normalized_power * intensity) / (ftp * 60.0) * 100.0;
  tss.round()
}

/// Intensity Factor (NP / FTP), deliberately unclamped
pub fn intensity_factor(normalized_power: f64, ftp: f64) -> f64 {
  normalized_power / ftp
}

/// ---------------------------------------------------------------------------
/// Tier 2: Rolling Training Loads
/// ---------------------------------------------------------------------------

/// Snapshot of fitness, fatigue and form on a given day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingLoads {
  /// Chronic Training Load (fitness)
  pub ctl: i64,
  /// Acute Training Load (fatigue)
  pub atl: i64,
  /// Training Stress Balance (form): CTL - ATL
  pub tsb: i64,
  /// TSS over the trailing 7 days
  #[serde(rename = "weeklyTSS")]
  pub weekly_tss: i64,
  /// TSS over the 7 days before that
  #[serde(rename = "prevWeeklyTSS")]
  pub prev_weekly_tss: i64,
}

impl TrainingLoads {
  /// Compute loads from the full history as of `today`
  pub fn compute(history: &[WorkoutRecord], today: NaiveDate) -> Self {
    let daily = daily_tss(history);
    let first_day = match daily.keys().next() {
      Some(day) => *day,
      None => return Self::default(),
    };

    let (ctl, atl) = walk_days(&daily, first_day, today);

    let week_start = today - Duration::days(6);
    let prev_week_start = today - Duration::days(13);
    let tomorrow = today + Duration::days(1);

    let weekly_tss = tss_between(history, Some(week_start), Some(tomorrow));
    let prev_weekly_tss = tss_between(history, Some(prev_week_start), Some(week_start));

    Self {
      ctl: ctl.round() as i64,
      atl: atl.round() as i64,
      tsb: (ctl - atl).round() as i64,
      weekly_tss: weekly_tss.round() as i64,
      prev_weekly_tss: prev_weekly_tss.round() as i64,
    }
  }

  /// Week-over-week TSS change in percent, None without a prior week
  pub fn week_over_week_pct(&self) -> Option<f64> {
    if self.prev_weekly_tss > 0 {
      let prev = self.prev_weekly_tss as f64;
      Some((self.weekly_tss as f64 - prev) / prev * 100.0)
    } else {
      None
    }
  }

  pub fn form_status(&self) -> FormStatus {
    FormStatus::from_tsb(self.tsb)
  }
}

/// Total TSS per calendar day. Records with malformed dates are skipped.
pub fn daily_tss(history: &[WorkoutRecord]) -> BTreeMap<NaiveDate, f64> {
  let mut daily = BTreeMap::new();
  for workout in history {
    match workout.day() {
      Some(day) => *daily.entry(day).or_insert(0.0) += workout.tss_or_zero(),
      None => {
        tracing::warn!(id = workout.id, date = %workout.date, "Skipping workout with invalid date");
      }
    }
  }
  daily
}

/// Run both EWMAs over every day from `first_day` through `today`, inclusive
fn walk_days(daily: &BTreeMap<NaiveDate, f64>, first_day: NaiveDate, today: NaiveDate) -> (f64, f64) {
  let mut ctl = 0.0;
  let mut atl = 0.0;

  for day in first_day.iter_days().take_while(|d| *d <= today) {
    let day_tss = daily.get(&day).copied().unwrap_or(0.0);
    ctl = ctl * (1.0 - CTL_ALPHA) + day_tss * CTL_ALPHA;
    atl = atl * (1.0 - ATL_ALPHA) + day_tss * ATL_ALPHA;
  }

  (ctl, atl)
}

/// Sum TSS for records dated in `[from, until)`; open bounds when None
pub fn tss_between(history: &[WorkoutRecord], from: Option<NaiveDate>, until: Option<NaiveDate>) -> f64 {
  history
    .iter()
    .filter(|w| match w.day() {
      Some(day) => from.map_or(true, |f| day >= f) && until.map_or(true, |u| day < u),
      None => false,
    })
    .map(|w| w.tss_or_zero())
    .sum()
}

/// Records dated within the trailing `days` calendar days (today included,
/// future-dated records excluded)
pub fn within_days(history: &[WorkoutRecord], today: NaiveDate, days: i64) -> Vec<&WorkoutRecord> {
  let start = today - Duration::days(days - 1);
  history
    .iter()
    .filter(|w| w.day().is_some_and(|d| d >= start && d <= today))
    .collect()
}

/// ---------------------------------------------------------------------------
/// Form Status
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
  VeryFresh,
  Fresh,
  Neutral,
  Tired,
  VeryTired,
}

impl FormStatus {
  pub fn from_tsb(tsb: i64) -> Self {
    match tsb {
      t if t > 25 => FormStatus::VeryFresh,
      t if t > 5 => FormStatus::Fresh,
      t if t > -10 => FormStatus::Neutral,
      t if t > -25 => FormStatus::Tired,
      _ => FormStatus::VeryTired,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      FormStatus::VeryFresh => "Very Fresh",
      FormStatus::Fresh => "Fresh",
      FormStatus::Neutral => "Neutral",
      FormStatus::Tired => "Tired",
      FormStatus::VeryTired => "Very Tired",
    }
  }
}

/// ---------------------------------------------------------------------------
/// Tier 3: Analysis Report
/// ---------------------------------------------------------------------------

/// Workouts listed in the analysis report
pub const REPORT_RECENT_WORKOUTS: usize = 7;

/// Markdown summary of loads, levels and recent rides for pasting into an
/// external analysis tool. Expects history sorted newest first.
pub fn analysis_report(loads: &TrainingLoads, levels: &Levels, history: &[WorkoutRecord], today: NaiveDate) -> String {
  let level_lines: Vec<String> = ZoneId::PROGRESSIVE
    .iter()
    .map(|zone| {
      let level = levels.get(zone).copied().unwrap_or(crate::models::snapshot::DEFAULT_LEVEL);
      format!("- {}: {:.1}", zone.display_name(), level)
    })
    .collect();

  let workout_lines: Vec<String> = history
    .iter()
    .take(REPORT_RECENT_WORKOUTS)
    .map(|w| {
      let zone = w.zone().map_or("Unclassified", |z| z.display_name());
      let tss = w.tss.map_or_else(|| "-".to_string(), |t| format!("{}", t.round()));
      let rpe = w
        .effort()
        .and_then(|e| e.rpe)
        .map_or_else(|| "-".to_string(), |r| format!("{}", r));
      let notes = if w.notes.is_empty() {
        String::new()
      } else {
        format!(" ({})", w.notes)
      };
      format!(
        "- {}: {}, {}min, NP {}W, TSS {}, RPE {}{}",
        w.date, zone, w.duration, w.normalized_power, tss, rpe, notes
      )
    })
    .collect();

  format!(
    "## Training Status - {today}\n\n\
     **Training Loads:**\n\
     - CTL (Fitness): {ctl}\n\
     - ATL (Fatigue): {atl}\n\
     - TSB (Form): {tsb}\n\
     - Weekly TSS: {weekly}\n\
     - Previous Week TSS: {prev}\n\n\
     **Progression Levels:**\n\
     {levels}\n\n\
     **Recent Workouts:**\n\
     {workouts}\n\n\
     Please analyze my current training status and provide personalized insights.",
    today = today.format("%Y-%m-%d"),
    ctl = loads.ctl,
    atl = loads.atl,
    tsb = loads.tsb,
    weekly = loads.weekly_tss,
    prev = loads.prev_weekly_tss,
    levels = level_lines.join("\n"),
    workouts = workout_lines.join("\n"),
  )
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
