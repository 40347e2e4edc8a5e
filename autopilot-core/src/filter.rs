//! Noise reduction.
//!
//! Two passes over the enriched stream: the first collects per-entity
//! statistics (event counts, unique states, flap periods), the second
//! drops unreliable events and stamps the survivors with a quality
//! score. Events inside a flap period are kept but marked.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::events::{is_ignored_state, EnrichedEvent};
use crate::stats::wilson_lower_bound;

/// Filter configuration. Defaults match the external contract.
#[derive(Debug, Clone)]
pub struct NoiseFilterConfig {
    /// Changes within `flap_window` that count as flapping
    pub flap_threshold: usize,
    /// Sliding window width in seconds
    pub flap_window: f64,
    /// Entities with fewer events are dropped entirely
    pub min_events_per_entity: usize,
}

impl Default for NoiseFilterConfig {
    fn default() -> Self {
        Self {
            flap_threshold: 5,
            flap_window: 60.0,
            min_events_per_entity: 5,
        }
    }
}

/// Rejection counters, logged after every pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RejectionCounts {
    pub low_activity: usize,
    pub unavailable_transition: usize,
}

#[derive(Debug, Clone)]
struct EntityStats {
    event_count: usize,
    unique_states: usize,
    flap_periods: Vec<(f64, f64)>,
}

/// Per-entity quality summary for manual review.
#[derive(Debug, Clone, Serialize)]
pub struct EntityQuality {
    pub total_events: usize,
    pub flap_periods: usize,
    pub events_during_flaps: usize,
    pub flap_percentage: f64,
    pub unique_states: usize,
    pub recommendation: &'static str,
}

/// Drops unreliable events and scores the rest.
#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    config: NoiseFilterConfig,
}

impl NoiseFilter {
    #[must_use]
    pub fn new(config: NoiseFilterConfig) -> Self {
        Self { config }
    }

    /// Apply all filters. Returns surviving events (stamped with
    /// `during_flap` and `quality_score`) and the rejection counters.
    #[must_use]
    pub fn filter_events(
        &self,
        events: Vec<EnrichedEvent>,
    ) -> (Vec<EnrichedEvent>, RejectionCounts) {
        let stats = self.entity_stats(&events);

        let total = events.len();
        let mut counts = RejectionCounts::default();
        let mut filtered = Vec::with_capacity(total);

        for mut event in events {
            let Some(entity_stats) = stats.get(&event.entity_id) else {
                continue;
            };

            if entity_stats.event_count < self.config.min_events_per_entity {
                counts.low_activity += 1;
                continue;
            }

            let old_ignored = event
                .old_state
                .as_deref()
                .is_some_and(is_ignored_state);
            if old_ignored || is_ignored_state(&event.new_state) {
                counts.unavailable_transition += 1;
                continue;
            }

            event.during_flap =
                Self::in_flap_period(event.timestamp, &entity_stats.flap_periods);
            event.quality_score = Self::quality(&event, entity_stats);

            filtered.push(event);
        }

        info!(
            "Filtered {total} events to {} ({} low activity, {} unavailable transitions)",
            filtered.len(),
            counts.low_activity,
            counts.unavailable_transition
        );
        (filtered, counts)
    }

    /// Per-entity quality report for tuning exclusion lists.
    #[must_use]
    pub fn entity_report(&self, events: &[EnrichedEvent]) -> HashMap<String, EntityQuality> {
        let stats = self.entity_stats(events);

        stats
            .into_iter()
            .map(|(entity_id, s)| {
                let entity_events: Vec<&EnrichedEvent> = events
                    .iter()
                    .filter(|e| e.entity_id == entity_id)
                    .collect();
                let flap_count = entity_events
                    .iter()
                    .filter(|e| Self::in_flap_period(e.timestamp, &s.flap_periods))
                    .count();
                let total = entity_events.len();

                let quality = EntityQuality {
                    total_events: total,
                    flap_periods: s.flap_periods.len(),
                    events_during_flaps: flap_count,
                    flap_percentage: if total > 0 {
                        (100.0 * flap_count as f64 / total as f64 * 10.0).round() / 10.0
                    } else {
                        0.0
                    },
                    unique_states: s.unique_states,
                    recommendation: self.recommend(total, flap_count, &s.flap_periods),
                };
                (entity_id, quality)
            })
            .collect()
    }

    fn entity_stats(&self, events: &[EnrichedEvent]) -> HashMap<String, EntityStats> {
        let mut by_entity: HashMap<&str, Vec<&EnrichedEvent>> = HashMap::new();
        for event in events {
            by_entity.entry(&event.entity_id).or_default().push(event);
        }

        by_entity
            .into_iter()
            .map(|(entity_id, entity_events)| {
                let mut states: Vec<&str> =
                    entity_events.iter().map(|e| e.new_state.as_str()).collect();
                states.sort_unstable();
                states.dedup();

                let mut timestamps: Vec<f64> =
                    entity_events.iter().map(|e| e.timestamp).collect();
                timestamps.sort_by(f64::total_cmp);

                (
                    entity_id.to_string(),
                    EntityStats {
                        event_count: entity_events.len(),
                        unique_states: states.len(),
                        flap_periods: self.detect_flapping(&timestamps),
                    },
                )
            })
            .collect()
    }

    /// Slide a window over sorted timestamps; whenever at least
    /// `flap_threshold` events fall inside `flap_window` seconds the
    /// enclosing interval is recorded. Periods separated by at most one
    /// window merge.
    fn detect_flapping(&self, timestamps: &[f64]) -> Vec<(f64, f64)> {
        if timestamps.len() < self.config.flap_threshold {
            return Vec::new();
        }

        let mut periods: Vec<(f64, f64)> = Vec::new();
        let mut window_start = 0usize;

        for (i, &ts) in timestamps.iter().enumerate() {
            while window_start < i && ts - timestamps[window_start] > self.config.flap_window {
                window_start += 1;
            }

            let events_in_window = i - window_start + 1;
            if events_in_window >= self.config.flap_threshold {
                let period_start = timestamps[window_start];
                let period_end = ts;

                match periods.last_mut() {
                    Some(last) if last.1 >= period_start - self.config.flap_window => {
                        last.1 = period_end;
                    }
                    _ => periods.push((period_start, period_end)),
                }
            }
        }

        periods
    }

    fn in_flap_period(ts: f64, periods: &[(f64, f64)]) -> bool {
        periods.iter().any(|&(start, end)| start <= ts && ts <= end)
    }

    /// Quality multipliers: 0.3 inside a flap period, 0.9 for entities
    /// stuck on two or fewer states, 0.7 for sub-10-second rebounds.
    /// Rounded to two decimals.
    fn quality(event: &EnrichedEvent, stats: &EntityStats) -> f64 {
        let mut score: f64 = 1.0;

        if event.during_flap {
            score *= 0.3;
        }
        if stats.unique_states <= 2 {
            score *= 0.9;
        }
        if event
            .seconds_since_last_change
            .is_some_and(|secs| secs < 10.0)
        {
            score *= 0.7;
        }

        (score * 100.0).round() / 100.0
    }

    fn recommend(
        &self,
        total: usize,
        flap_count: usize,
        flap_periods: &[(f64, f64)],
    ) -> &'static str {
        if total < self.config.min_events_per_entity {
            return "exclude_low_activity";
        }
        // Conservative flap ratio so a handful of noisy events cannot
        // condemn an otherwise healthy entity
        if wilson_lower_bound(flap_count, total) > 0.5 {
            return "exclude_high_flap";
        }
        if !flap_periods.is_empty() {
            return "include_with_caution";
        }
        "include"
    }
}
