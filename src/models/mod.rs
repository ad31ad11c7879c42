pub mod snapshot;
pub mod workout;

pub use snapshot::{AthleteProfile, Levels, Snapshot};
pub use workout::{Classification, ClassifiedEffort, ProgressionDelta, WorkoutRecord};
