//! Rule-based training insights
//!
//! A fixed battery of independent threshold rules evaluated in order over the
//! current loads, the history and the progression levels. Every triggered
//! rule appends one insight; no rule suppresses another, and the output order
//! is the evaluation order (not severity).

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analysis::{within_days, TrainingLoads};
use crate::models::snapshot::{Levels, DEFAULT_LEVEL};
use crate::models::workout::WorkoutRecord;
use crate::zones::ZoneId;

/// ---------------------------------------------------------------------------
/// Insight Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Caution,
  Warning,
  Positive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
  #[serde(rename = "type")]
  pub severity: Severity,
  pub message: String,
}

impl Insight {
  fn new(severity: Severity, message: impl Into<String>) -> Self {
    Self {
      severity,
      message: message.into(),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Thresholds
/// ---------------------------------------------------------------------------

const TSB_VERY_FATIGUED: i64 = -25;
const TSB_FATIGUED: i64 = -15;
const TSB_VERY_FRESH: i64 = 25;

const ACUTE_SPIKE_WARNING: i64 = 20;
const ACUTE_SPIKE_CAUTION: i64 = 10;

const WEEK_DROP_PCT: f64 = -40.0;
const WEEK_JUMP_PCT: f64 = 30.0;

const MIN_WORKOUTS_14D: usize = 4;
/// Zone balance rules only run with at least this many rides in 28 days
const MIN_WORKOUTS_FOR_BALANCE: usize = 8;
const MIN_ENDURANCE_28D: usize = 2;
const MAX_HIGH_INTENSITY_SHARE: f64 = 0.5;

const THRESHOLD_LAG: f64 = 1.5;

/// ---------------------------------------------------------------------------
/// Rule Evaluation
/// ---------------------------------------------------------------------------

/// Evaluate every rule and collect the insights that fire
pub fn generate_insights(
  loads: &TrainingLoads,
  history: &[WorkoutRecord],
  levels: &Levels,
  today: NaiveDate,
) -> Vec<Insight> {
  let mut insights = Vec::new();

  form_rule(loads, &mut insights);
  acute_spike_rule(loads, &mut insights);
  week_over_week_rule(loads, &mut insights);
  fitness_band_rule(loads, &mut insights);
  frequency_rule(history, today, &mut insights);
  zone_balance_rule(history, today, &mut insights);
  level_balance_rule(loads, levels, &mut insights);

  insights
}

fn form_rule(loads: &TrainingLoads, insights: &mut Vec<Insight>) {
  let tsb = loads.tsb;
  if tsb < TSB_VERY_FATIGUED {
    insights.push(Insight::new(
      Severity::Warning,
      "TSB below -25: High fatigue accumulation. Consider extra recovery or reducing intensity.",
    ));
  } else if tsb < TSB_FATIGUED {
    insights.push(Insight::new(
      Severity::Caution,
      "TSB below -15: Significant fatigue. Monitor for signs of overreaching.",
    ));
  } else if tsb > TSB_VERY_FRESH {
    insights.push(Insight::new(
      Severity::Info,
      "TSB above +25: Very fresh but fitness may be declining. Consider adding training stimulus.",
    ));
  } else if (5..=20).contains(&tsb) {
    insights.push(Insight::new(
      Severity::Positive,
      "TSB in optimal fresh range (+5 to +20): Good form for hard efforts or events.",
    ));
  }
}

fn acute_spike_rule(loads: &TrainingLoads, insights: &mut Vec<Insight>) {
  if loads.atl > loads.ctl + ACUTE_SPIKE_WARNING {
    insights.push(Insight::new(
      Severity::Warning,
      "ATL exceeds CTL by 20+: Acute load spike. Risk of burnout if sustained.",
    ));
  } else if loads.atl > loads.ctl + ACUTE_SPIKE_CAUTION {
    insights.push(Insight::new(
      Severity::Caution,
      "ATL exceeds CTL by 10+: Building load aggressively. Ensure adequate recovery.",
    ));
  }
}

fn week_over_week_rule(loads: &TrainingLoads, insights: &mut Vec<Insight>) {
  let Some(change) = loads.week_over_week_pct() else {
    return;
  };

  if change < WEEK_DROP_PCT {
    insights.push(Insight::new(
      Severity::Info,
      format!(
        "Weekly TSS down {}% from last week. Recovery week or missed sessions?",
        change.round().abs()
      ),
    ));
  } else if change > WEEK_JUMP_PCT {
    insights.push(Insight::new(
      Severity::Caution,
      format!(
        "Weekly TSS up {}% from last week. Large jump, monitor fatigue.",
        change.round()
      ),
    ));
  }
}

fn fitness_band_rule(loads: &TrainingLoads, insights: &mut Vec<Insight>) {
  let ctl = loads.ctl;
  if ctl < 30 {
    insights.push(Insight::new(
      Severity::Info,
      "CTL below 30: Early base building phase. Focus on consistency.",
    ));
  } else if (70..85).contains(&ctl) {
    insights.push(Insight::new(
      Severity::Positive,
      "CTL 70-85: Solid fitness base. On track for event readiness.",
    ));
  } else if ctl >= 85 {
    insights.push(Insight::new(
      Severity::Positive,
      "CTL 85+: Strong fitness. Maintain and begin considering taper timing.",
    ));
  }
}

fn frequency_rule(history: &[WorkoutRecord], today: NaiveDate, insights: &mut Vec<Insight>) {
  let count = within_days(history, today, 14).len();
  if count < MIN_WORKOUTS_14D {
    insights.push(Insight::new(
      Severity::Caution,
      format!(
        "Only {} workouts in last 14 days. Consistency is key for adaptation.",
        count
      ),
    ));
  }
}

fn zone_balance_rule(history: &[WorkoutRecord], today: NaiveDate, insights: &mut Vec<Insight>) {
  let recent = within_days(history, today, 28);
  if recent.len() < MIN_WORKOUTS_FOR_BALANCE {
    return;
  }

  let mut per_zone: HashMap<ZoneId, usize> = HashMap::new();
  for zone in recent.iter().filter_map(|w| w.zone()) {
    *per_zone.entry(zone).or_insert(0) += 1;
  }
  let count = |zone: ZoneId| per_zone.get(&zone).copied().unwrap_or(0);

  if count(ZoneId::Endurance) < MIN_ENDURANCE_28D {
    insights.push(Insight::new(
      Severity::Caution,
      "Low endurance work in last 28 days. Z2 base supports all other adaptations.",
    ));
  }

  let high_intensity = count(ZoneId::Vo2max) + count(ZoneId::Anaerobic);
  if high_intensity as f64 > recent.len() as f64 * MAX_HIGH_INTENSITY_SHARE {
    insights.push(Insight::new(
      Severity::Caution,
      "High-intensity work exceeds 50% of sessions. Risk of burnout without adequate base.",
    ));
  }
}

fn level_balance_rule(loads: &TrainingLoads, levels: &Levels, insights: &mut Vec<Insight>) {
  if levels.is_empty() {
    return;
  }

  let average = levels.values().sum::<f64>() / levels.len() as f64;
  let level = |zone: ZoneId| levels.get(&zone).copied().unwrap_or(DEFAULT_LEVEL);

  if level(ZoneId::Threshold) < average - THRESHOLD_LAG {
    insights.push(Insight::new(
      Severity::Info,
      "Threshold level lagging behind other zones. Consider adding FTP-focused work.",
    ));
  }
  if level(ZoneId::Endurance) < 2.0 && loads.ctl > 40 {
    insights.push(Insight::new(
      Severity::Info,
      "Endurance level low relative to fitness. Longer Z2 rides would help.",
    ));
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
