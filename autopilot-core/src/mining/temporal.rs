//! Time-of-day and solar clustering.
//!
//! Per entity and target state: a schedule cluster accepts tightly
//! grouped times of day (low coefficient of variation), a solar cluster
//! accepts transitions dominated by one sun position. Both produce the
//! single-action pattern shape with the shared service inference.

use std::collections::HashMap;

use tracing::info;

use crate::events::EnrichedEvent;
use crate::pattern::{infer_service, ActionSpec, Pattern, PatternKind, Trigger};
use crate::stats::{mean, std_dev};

/// States worth clustering on.
pub const TARGET_STATES: [&str; 6] = ["on", "off", "open", "closed", "locked", "unlocked"];

/// Pseudo-entity used as the trigger of schedule patterns.
pub const CLOCK_ENTITY: &str = "time";

/// Clustering thresholds. Defaults are the external contract.
#[derive(Debug, Clone)]
pub struct TemporalAnalyzerConfig {
    /// Minimum occurrences for either cluster kind
    pub min_occurrences: usize,
    /// Maximum coefficient of variation for a schedule cluster
    pub max_cv: f64,
    /// Maximum standard deviation, seconds
    pub tolerance_seconds: f64,
    /// Minimum share of one sun position for a solar cluster
    pub min_solar_confidence: f64,
}

impl Default for TemporalAnalyzerConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 10,
            max_cv: 0.3,
            tolerance_seconds: 900.0,
            min_solar_confidence: 0.70,
        }
    }
}

/// Fixed-clock and solar pattern discovery.
#[derive(Debug, Clone)]
pub struct TemporalAnalyzer {
    config: TemporalAnalyzerConfig,
    /// Local-time UTC offset used for time-of-day math
    offset_seconds: i32,
}

impl TemporalAnalyzer {
    #[must_use]
    pub fn new(config: TemporalAnalyzerConfig, offset_seconds: i32) -> Self {
        Self {
            config,
            offset_seconds,
        }
    }

    /// Mine schedule and solar patterns.
    #[must_use]
    pub fn mine(&self, events: &[EnrichedEvent]) -> Vec<Pattern> {
        let mut by_target: HashMap<(&str, &str), Vec<&EnrichedEvent>> = HashMap::new();
        for event in events {
            if TARGET_STATES.contains(&event.new_state.as_str()) {
                by_target
                    .entry((&event.entity_id, &event.new_state))
                    .or_default()
                    .push(event);
            }
        }

        let mut patterns = Vec::new();
        for ((entity_id, state), target_events) in &by_target {
            if target_events.len() < self.config.min_occurrences {
                continue;
            }
            if let Some(pattern) = self.schedule_cluster(entity_id, state, target_events) {
                patterns.push(pattern);
            }
            patterns.extend(self.solar_clusters(entity_id, state, target_events));
        }

        // Deterministic order for a fixed input
        patterns.sort_by(|a, b| {
            b.pattern_score
                .total_cmp(&a.pattern_score)
                .then_with(|| a.description.cmp(&b.description))
        });

        info!("{} temporal patterns accepted", patterns.len());
        patterns
    }

    /// Accept a schedule when the times of day cluster tightly:
    /// CV < `max_cv` and sigma < `tolerance_seconds`.
    fn schedule_cluster(
        &self,
        entity_id: &str,
        state: &str,
        events: &[&EnrichedEvent],
    ) -> Option<Pattern> {
        let service = infer_service(entity_id, state)?;

        let times: Vec<f64> = events
            .iter()
            .map(|e| e.seconds_from_midnight(self.offset_seconds))
            .collect();
        let mu = mean(&times);
        if mu <= 0.0 {
            return None;
        }
        let sigma = std_dev(&times);
        let cv = sigma / mu;

        if cv >= self.config.max_cv || sigma >= self.config.tolerance_seconds {
            return None;
        }

        let count = events.len();
        let confidence = 1.0 - cv;
        let score = 0.60 * confidence + 0.40 * (count as f64 / 30.0).min(1.0);

        let typical_time = format_time_of_day(mu);
        let tolerance_minutes = (sigma / 60.0).floor() as u64;
        let description = format!(
            "{entity_id} -> '{state}' at {typical_time} (±{tolerance_minutes}m, \
             {:.0}% confidence, {count} times)",
            confidence * 100.0
        );

        Some(Pattern {
            kind: PatternKind::Temporal,
            triggers: vec![Trigger::new(CLOCK_ENTITY, typical_time).with_context("schedule")],
            action: ActionSpec::Single {
                entity_id: entity_id.to_string(),
                state: state.to_string(),
                service,
            },
            confidence,
            // Scaled count, mirroring the sequence miner
            support: (count as f64 / 100.0).min(1.0),
            lift: None,
            conviction: None,
            pattern_score: score,
            occurrence_count: count as u64,
            description,
        })
    }

    /// Accept a solar cluster when one sun position dominates the
    /// sun-annotated transitions.
    fn solar_clusters(
        &self,
        entity_id: &str,
        state: &str,
        events: &[&EnrichedEvent],
    ) -> Vec<Pattern> {
        let Some(service) = infer_service(entity_id, state) else {
            return Vec::new();
        };

        let annotated: Vec<&&EnrichedEvent> = events
            .iter()
            .filter(|e| e.sun_position.is_some())
            .collect();
        if annotated.is_empty() {
            return Vec::new();
        }

        let mut by_position: HashMap<&str, usize> = HashMap::new();
        for event in &annotated {
            if let Some(position) = &event.sun_position {
                *by_position.entry(position.as_str()).or_insert(0) += 1;
            }
        }

        let total = annotated.len();
        let mut patterns = Vec::new();

        for (position, count) in by_position {
            if count < self.config.min_occurrences {
                continue;
            }
            let confidence = count as f64 / total as f64;
            if confidence < self.config.min_solar_confidence {
                continue;
            }

            let score = 0.60 * confidence + 0.40 * (count as f64 / 30.0).min(1.0);
            let description = format!(
                "{entity_id} -> '{state}' while sun is {position} \
                 ({:.0}% confidence, {count} times)",
                confidence * 100.0
            );

            patterns.push(Pattern {
                kind: PatternKind::Temporal,
                triggers: vec![Trigger::new("sun.sun", position).with_context("solar")],
                action: ActionSpec::Single {
                    entity_id: entity_id.to_string(),
                    state: state.to_string(),
                    service: service.clone(),
                },
                confidence,
                support: (count as f64 / 100.0).min(1.0),
                lift: None,
                conviction: None,
                pattern_score: score,
                occurrence_count: count as u64,
                description,
            });
        }

        patterns
    }
}

/// Seconds since midnight as `HH:MM`.
fn format_time_of_day(seconds: f64) -> String {
    let total = seconds.round() as u64 % 86_400;
    format!("{:02}:{:02}", total / 3600, (total % 3600) / 60)
}
