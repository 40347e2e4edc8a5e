//! Transaction synthesis for association mining.
//!
//! Overlapping half-open windows over the sorted event stream. The 50%
//! advance guarantees every adjacent event pair shares at least one
//! window without a quadratic number of windows.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{DayType, EnrichedEvent, TimeBucket};
use crate::stats::mean;

/// Default transaction window width in seconds.
pub const DEFAULT_WINDOW_SECONDS: f64 = 900.0;

/// A bag of `entity:state` items co-occurring in one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionWindow {
    /// Inclusive start
    pub window_start: f64,
    /// Exclusive end (`window_start + width`)
    pub window_end: f64,
    pub items: BTreeSet<String>,
    /// Weekday/weekend of the first member event
    pub day_type: DayType,
    /// Time bucket of the first member event
    pub time_bucket: TimeBucket,
    /// Mean quality of the member events
    pub quality_score: f64,
    pub event_count: usize,
}

/// Build overlapping transaction windows from a timestamp-sorted event
/// stream.
///
/// A candidate window is `[t_i, t_i + width)`. Windows with fewer than
/// two events are skipped; the walk always advances by
/// `max(1, floor(n/2))` where `n` is the member count.
#[must_use]
pub fn build_transactions(events: &[EnrichedEvent], width: f64) -> Vec<TransactionWindow> {
    let mut sorted: Vec<&EnrichedEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut windows = Vec::new();
    let mut i = 0usize;

    while i < sorted.len() {
        let start = sorted[i].timestamp;
        let end = start + width;

        let mut members = Vec::new();
        for event in &sorted[i..] {
            if event.timestamp >= end {
                break;
            }
            members.push(*event);
        }

        let count = members.len();
        if count >= 2 {
            let items: BTreeSet<String> = members.iter().map(|e| e.item()).collect();
            let quality = mean(&members.iter().map(|e| e.quality_score).collect::<Vec<_>>());
            let first = members[0];

            windows.push(TransactionWindow {
                window_start: start,
                window_end: end,
                items,
                day_type: DayType::from_weekend(first.is_weekend),
                time_bucket: first.time_bucket,
                quality_score: quality,
                event_count: count,
            });
        }

        i += (count / 2).max(1);
    }

    debug!(
        "Built {} transactions from {} events (window {width}s)",
        windows.len(),
        events.len()
    );
    windows
}
