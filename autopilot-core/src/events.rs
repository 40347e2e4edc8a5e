//! State-change event types flowing through the pipeline.
//!
//! A [`StateChange`] is what the recorder extractor emits; an
//! [`EnrichedEvent`] is the same transition with temporal and
//! environmental context attached. Events are immutable once the noise
//! filter has stamped them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// States that never carry behavioral signal; filtered on both sides of
/// every transition.
pub const IGNORED_STATES: [&str; 2] = ["unavailable", "unknown"];

/// Returns true when a state is `unavailable` or `unknown`.
#[must_use]
pub fn is_ignored_state(state: &str) -> bool {
    IGNORED_STATES.contains(&state)
}

/// A single state transition pulled from the recorder.
///
/// `old_state` is `None` for the entity's first observation in the
/// extraction range; otherwise `old_state != new_state` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: String,
    /// Seconds since the Unix epoch, sub-second precision preserved
    pub timestamp: f64,
}

/// Coarse time-of-day buckets used as transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    EarlyMorning,
    Morning,
    Midday,
    Afternoon,
    Evening,
    Night,
    LateNight,
}

impl TimeBucket {
    /// Bucket boundaries: 5-9 early morning, 9-12 morning, 12-14 midday,
    /// 14-17 afternoon, 17-20 evening, 20-23 night, else late night.
    #[must_use]
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=8 => TimeBucket::EarlyMorning,
            9..=11 => TimeBucket::Morning,
            12..=13 => TimeBucket::Midday,
            14..=16 => TimeBucket::Afternoon,
            17..=19 => TimeBucket::Evening,
            20..=22 => TimeBucket::Night,
            _ => TimeBucket::LateNight,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::EarlyMorning => "early_morning",
            TimeBucket::Morning => "morning",
            TimeBucket::Midday => "midday",
            TimeBucket::Afternoon => "afternoon",
            TimeBucket::Evening => "evening",
            TimeBucket::Night => "night",
            TimeBucket::LateNight => "late_night",
        }
    }
}

/// Weekday/weekend split used as transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    #[must_use]
    pub fn from_weekend(is_weekend: bool) -> Self {
        if is_weekend {
            DayType::Weekend
        } else {
            DayType::Weekday
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DayType::Weekday => "weekday",
            DayType::Weekend => "weekend",
        }
    }
}

/// Another entity's transition observed near an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrentChange {
    pub entity_id: String,
    pub new_state: String,
    /// Signed seconds relative to the owning event
    pub offset_seconds: f64,
}

/// A state change enriched with temporal fields, a concurrent-state
/// snapshot, presence counts, and the noise filter's quality markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: String,
    pub timestamp: f64,

    pub hour: u32,
    pub minute: u32,
    /// 0 = Monday
    pub weekday: u32,
    pub is_weekend: bool,
    /// Calendar date in `YYYY-MM-DD`
    pub date: String,
    pub seconds_since_last_change: Option<f64>,
    pub time_bucket: TimeBucket,

    /// Sun elevation state at the event time, when `sun.sun` is tracked
    pub sun_position: Option<String>,
    /// State of every context entity at the event time, excluding self
    pub concurrent_states: BTreeMap<String, String>,
    /// Other events within the concurrent window
    pub concurrent_changes: Vec<ConcurrentChange>,

    pub people_home: usize,
    pub anyone_home: bool,

    pub during_flap: bool,
    pub quality_score: f64,
}

impl EnrichedEvent {
    /// Item string used in mining transactions.
    #[must_use]
    pub fn item(&self) -> String {
        format!("{}:{}", self.entity_id, self.new_state)
    }

    /// Seconds since local midnight, using the offset the event was
    /// enriched with.
    #[must_use]
    pub fn seconds_from_midnight(&self, offset_seconds: i32) -> f64 {
        (self.timestamp + f64::from(offset_seconds)).rem_euclid(86_400.0)
    }
}
