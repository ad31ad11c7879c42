//! Zone Progression Engine
//!
//! Each progression zone carries a single level in [1.0, 10.0]. After a
//! workout is logged (or classified later) the level for its zone moves by a
//! deterministic rule table driven by:
//! - whether the session was completed
//! - how far the workout's difficulty sits above the current level
//! - the athlete's perceived exertion
//!
//! Key principles:
//! - Handling a harder-than-current workout at low RPE is the fastest way up
//! - Only failing a workout that was within current capability costs a level
//! - Recovery rides never touch a level

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::snapshot::Levels;
use crate::models::workout::{ProgressionDelta, WorkoutRecord};
use crate::zones::ZoneId;

pub const MIN_LEVEL: f64 = 1.0;
pub const MAX_LEVEL: f64 = 10.0;

/// Level lost when a manageable workout is not completed
const MISSED_PENALTY: f64 = 0.5;

// ---------------------------------------------------------------------------
/// Rule Table
// ---------------------------------------------------------------------------

/// Next level for a zone after one workout.
///
/// Pure: callers persist the result and derive `change = new - current`.
pub fn next_level(current_level: f64, workout_level: f64, rpe: f64, completed: bool) -> f64 {
    let next = if !completed {
        if workout_level <= current_level {
            current_level - MISSED_PENALTY
        } else {
            current_level
        }
    } else {
        current_level + completed_gain(workout_level - current_level, rpe)
    };

    clamp_level(next)
}

/// Gain for a completed workout at `difficulty = workout_level - current_level`
fn completed_gain(difficulty: f64, rpe: f64) -> f64 {
    if difficulty <= -2.0 {
        0.0
    } else if difficulty <= 0.0 {
        if rpe <= 5.0 {
            0.1
        } else {
            0.0
        }
    } else if difficulty <= 1.0 {
        if rpe <= 6.0 {
            0.5
        } else if rpe <= 8.0 {
            0.3
        } else {
            0.1
        }
    } else if difficulty <= 2.0 {
        if rpe <= 7.0 {
            0.7
        } else if rpe <= 9.0 {
            0.4
        } else {
            0.2
        }
    } else if rpe <= 8.0 {
        1.0
    } else {
        0.5
    }
}

pub fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        return MIN_LEVEL;
    }
    level.clamp(MIN_LEVEL, MAX_LEVEL)
}

// ---------------------------------------------------------------------------
/// Applying a Workout to the Live Levels
// ---------------------------------------------------------------------------

/// Run the rule table for `zone` and write the new level back.
///
/// Returns None for recovery, which is exempt and leaves `levels` untouched.
pub fn apply_workout(
    levels: &mut Levels,
    zone: ZoneId,
    workout_level: f64,
    rpe: f64,
    completed: bool,
) -> Option<ProgressionDelta> {
    if zone.is_recovery() {
        return None;
    }

    let current = levels
        .get(&zone)
        .copied()
        .unwrap_or(crate::models::snapshot::DEFAULT_LEVEL);
    let new_level = next_level(current, workout_level, rpe, completed);
    levels.insert(zone, new_level);

    tracing::debug!(
        zone = %zone,
        previous = current,
        new = new_level,
        "Progression level updated"
    );

    Some(ProgressionDelta::new(current, new_level))
}

// ---------------------------------------------------------------------------
/// Change Reporting
// ---------------------------------------------------------------------------

/// Short label for the size of a level change
pub fn describe_change(change: f64) -> &'static str {
    if change >= 0.7 {
        "Breakthrough!"
    } else if change >= 0.4 {
        "Strong progress"
    } else if change >= 0.2 {
        "Solid work"
    } else if change > 0.0 {
        "Maintained"
    } else if change == 0.0 {
        "No change"
    } else {
        "Level adjusted down"
    }
}

/// Signed one-decimal rendering of a change (`+0.5`, `-0.5`, `0`)
pub fn format_change(change: f64) -> String {
    if change > 0.0 {
        format!("+{:.1}", change)
    } else if change < 0.0 {
        format!("{:.1}", change)
    } else {
        "0".to_string()
    }
}

/// Most recent non-zero change for a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentChange {
    pub change: f64,
    pub date: String,
}

/// Latest non-zero level change per zone.
///
/// Only the newest workout of each zone is considered; expects history sorted
/// newest first.
pub fn recent_changes(history: &[WorkoutRecord]) -> BTreeMap<ZoneId, RecentChange> {
    let mut changes = BTreeMap::new();

    for zone in ZoneId::PROGRESSIVE {
        let Some(workout) = history.iter().find(|w| w.zone() == Some(zone)) else {
            continue;
        };
        if let Some(progression) = workout.progression().filter(|p| p.change != 0.0) {
            changes.insert(
                zone,
                RecentChange {
                    change: progression.change,
                    date: workout.date.clone(),
                },
            );
        }
    }

    changes
}

// ---------------------------------------------------------------------------
/// Tests
// ---------------------------------------------------------------------------
