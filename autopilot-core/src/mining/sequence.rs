//! Ordered sequence discovery.
//!
//! Multi-step routines where order matters: partition events by calendar
//! day, greedily grow gap-bounded chains, and accept candidates that
//! recur across enough days. Confidence comes from timing variance, not
//! from a proportion.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::events::EnrichedEvent;
use crate::pattern::{ActionSpec, Pattern, PatternKind, SequenceStep, Trigger};
use crate::stats::{mean, variance};

/// Sequence mining bounds. Defaults are the external contract.
#[derive(Debug, Clone)]
pub struct SequenceMinerConfig {
    /// Minimum gap between consecutive steps, seconds
    pub min_gap: f64,
    /// Maximum gap between consecutive steps, seconds
    pub max_gap: f64,
    /// Maximum chain length
    pub max_len: usize,
    /// Absolute occurrence floor
    pub min_occurrences: usize,
    /// Fraction of corpus days a candidate must recur in
    pub day_fraction: f64,
}

impl Default for SequenceMinerConfig {
    fn default() -> Self {
        Self {
            min_gap: 10.0,
            max_gap: 1800.0,
            max_len: 6,
            min_occurrences: 3,
            day_fraction: 0.15,
        }
    }
}

/// One observed run of a candidate: the per-step gaps.
#[derive(Debug, Clone)]
struct Occurrence {
    gaps: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Candidate {
    steps: Vec<(String, String)>,
    occurrences: Vec<Occurrence>,
}

/// Discovers ordered, gap-bounded multi-event routines.
#[derive(Debug, Clone, Default)]
pub struct SequenceMiner {
    config: SequenceMinerConfig,
}

impl SequenceMiner {
    #[must_use]
    pub fn new(config: SequenceMinerConfig) -> Self {
        Self { config }
    }

    /// Mine sequence patterns. Depends on the timestamp-monotonic event
    /// order upstream guarantees.
    #[must_use]
    pub fn mine(&self, events: &[EnrichedEvent]) -> Vec<Pattern> {
        let days: BTreeSet<&str> = events.iter().map(|e| e.date.as_str()).collect();
        let days_in_corpus = days.len();
        if days_in_corpus == 0 {
            return Vec::new();
        }

        let mut by_day: HashMap<&str, Vec<&EnrichedEvent>> = HashMap::new();
        for event in events {
            by_day.entry(&event.date).or_default().push(event);
        }

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        for day_events in by_day.values() {
            let mut sorted = day_events.clone();
            sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            self.collect_day_candidates(&sorted, &mut candidates);
        }
        debug!(
            "{} sequence candidates over {days_in_corpus} days",
            candidates.len()
        );

        let min_occ = (self.config.day_fraction * days_in_corpus as f64)
            .max(self.config.min_occurrences as f64);

        let mut patterns: Vec<Pattern> = candidates
            .into_values()
            .filter(|c| c.occurrences.len() as f64 >= min_occ)
            .filter_map(|c| self.candidate_to_pattern(&c))
            .collect();

        // Deterministic order for a fixed input
        patterns.sort_by(|a, b| {
            b.pattern_score
                .total_cmp(&a.pattern_score)
                .then_with(|| a.description.cmp(&b.description))
        });

        info!("{} sequence patterns accepted", patterns.len());
        patterns
    }

    /// Grow chains from every start index; every prefix of length >= 2
    /// becomes a candidate occurrence.
    fn collect_day_candidates(
        &self,
        day_events: &[&EnrichedEvent],
        candidates: &mut HashMap<String, Candidate>,
    ) {
        for start in 0..day_events.len() {
            let mut chain: Vec<&EnrichedEvent> = vec![day_events[start]];
            let mut gaps: Vec<f64> = Vec::new();
            let mut prior_ts = day_events[start].timestamp;

            for event in &day_events[start + 1..] {
                if chain.len() >= self.config.max_len {
                    break;
                }
                let gap = event.timestamp - prior_ts;
                if gap > self.config.max_gap {
                    break;
                }
                if gap < self.config.min_gap {
                    continue;
                }

                chain.push(event);
                gaps.push(gap);
                prior_ts = event.timestamp;

                // Record this prefix
                let steps: Vec<(String, String)> = chain
                    .iter()
                    .map(|e| (e.entity_id.clone(), e.new_state.clone()))
                    .collect();
                let key = steps
                    .iter()
                    .map(|(entity, state)| format!("{entity}:{state}"))
                    .collect::<Vec<_>>()
                    .join(" -> ");

                candidates
                    .entry(key)
                    .or_insert_with(|| Candidate {
                        steps,
                        occurrences: Vec::new(),
                    })
                    .occurrences
                    .push(Occurrence { gaps: gaps.clone() });
            }
        }
    }

    fn candidate_to_pattern(&self, candidate: &Candidate) -> Option<Pattern> {
        let step_count = candidate.steps.len();
        let gap_count = step_count - 1;
        let occurrences = candidate.occurrences.len();

        // Per-position gap statistics across occurrences
        let mut typical_gaps = Vec::with_capacity(gap_count);
        let mut variances = Vec::with_capacity(gap_count);
        for position in 0..gap_count {
            let gaps: Vec<f64> = candidate
                .occurrences
                .iter()
                .filter_map(|o| o.gaps.get(position).copied())
                .collect();
            typical_gaps.push(mean(&gaps));
            variances.push(variance(&gaps));
        }

        let avg_variance = mean(&variances);
        let confidence = 1.0 / (1.0 + avg_variance / 100.0);

        let length_factor = if step_count <= 4 { 1.0 } else { 0.7 };
        let first_gap_factor = if typical_gaps.first().copied().unwrap_or(f64::MAX) < 300.0 {
            1.0
        } else {
            0.5
        };
        let score = 0.40 * confidence
            + 0.30 * (occurrences as f64 / 30.0).min(1.0)
            + 0.20 * length_factor
            + 0.10 * first_gap_factor;

        let (first_entity, first_state) = candidate.steps.first()?;
        let steps: Vec<SequenceStep> = candidate
            .steps
            .iter()
            .skip(1)
            .zip(typical_gaps.iter())
            .map(|((entity, state), gap)| SequenceStep {
                entity_id: entity.clone(),
                state: state.clone(),
                typical_delay_seconds: Some(gap.round() as u64),
            })
            .collect();

        let description = format!(
            "{} ({} steps, {occurrences} occurrences, {:.0}% confidence)",
            candidate
                .steps
                .iter()
                .map(|(entity, state)| format!("{entity}:{state}"))
                .collect::<Vec<_>>()
                .join(" -> "),
            step_count,
            confidence * 100.0
        );

        Some(Pattern {
            kind: PatternKind::Sequence,
            triggers: vec![Trigger::new(first_entity.clone(), first_state.clone())],
            action: ActionSpec::Steps { steps },
            confidence,
            // Scaled count, not a probability
            support: (occurrences as f64 / 100.0).min(1.0),
            lift: None,
            conviction: None,
            pattern_score: score,
            occurrence_count: occurrences as u64,
            description,
        })
    }
}
