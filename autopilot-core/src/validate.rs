//! Pattern validation and final scoring.
//!
//! Rules apply in a fixed order, each with a reason code: anti-pattern
//! and circularity checks, the safety confidence floor, breadth bounds,
//! score adjustments, the acceptance threshold, and the recommendation
//! tier. The conflict flag against existing automations is advisory and
//! never rejects.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::pattern::{Pattern, Recommendation, ValidatedPattern};

/// Substrings that disqualify a trigger or action outright.
const FORBIDDEN_FRAGMENTS: [&str; 4] = ["unavailable", "unknown", "automations.", "script."];

/// Why a pattern was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    AntiPattern,
    Circular,
    SafetyCheck,
    TooBroad,
    TooSpecific,
    LowScore,
}

impl RejectionReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::AntiPattern => "anti_pattern",
            RejectionReason::Circular => "circular",
            RejectionReason::SafetyCheck => "safety_check",
            RejectionReason::TooBroad => "too_broad",
            RejectionReason::TooSpecific => "too_specific",
            RejectionReason::LowScore => "low_score",
        }
    }
}

/// Validator configuration.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Extra entities subject to the safety floor
    pub safety_entities: HashSet<String>,
    /// Aliases of installed automations, for the advisory conflict flag
    pub automation_names: Vec<String>,
    /// Confidence floor for safety entities
    pub safety_confidence: f64,
    /// Minimum adjusted score
    pub min_score: f64,
    /// Broadest acceptable support
    pub max_support: f64,
    /// Support below which a pattern needs real occurrences
    pub min_support: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            safety_entities: HashSet::new(),
            automation_names: Vec::new(),
            safety_confidence: 0.90,
            min_score: 0.50,
            max_support: 0.40,
            min_support: 0.02,
        }
    }
}

/// Applies the rule cascade and assigns the recommendation tier.
#[derive(Debug, Clone, Default)]
pub struct PatternValidator {
    config: ValidatorConfig,
}

impl PatternValidator {
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate one pattern. Ok carries the adjusted pattern with its
    /// recommendation; Err carries the reason code.
    pub fn validate(&self, mut pattern: Pattern) -> Result<ValidatedPattern, RejectionReason> {
        self.check_anti_pattern(&pattern)?;
        self.check_safety(&pattern)?;
        self.check_breadth(&pattern)?;

        pattern.pattern_score = self.adjusted_score(&pattern);
        if pattern.pattern_score < self.config.min_score {
            return Err(RejectionReason::LowScore);
        }

        let recommendation = Recommendation::from_score(pattern.pattern_score);
        let conflict_warning = self.conflicts_with_existing(&pattern);
        let pattern_hash = pattern.hash();

        Ok(ValidatedPattern {
            pattern,
            pattern_hash,
            recommendation,
            conflict_warning,
        })
    }

    /// Validate a batch; rejected patterns are returned with their
    /// reasons for observability.
    #[must_use]
    pub fn validate_all(
        &self,
        patterns: Vec<Pattern>,
    ) -> (Vec<ValidatedPattern>, Vec<(Pattern, RejectionReason)>) {
        let total = patterns.len();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for pattern in patterns {
            match self.validate(pattern.clone()) {
                Ok(validated) => accepted.push(validated),
                Err(reason) => {
                    debug!("Rejected ({}): {}", reason.as_str(), pattern.description);
                    rejected.push((pattern, reason));
                }
            }
        }

        info!(
            "Validated {} of {total} patterns ({} rejected)",
            accepted.len(),
            rejected.len()
        );
        (accepted, rejected)
    }

    fn check_anti_pattern(&self, pattern: &Pattern) -> Result<(), RejectionReason> {
        let mut fragments: Vec<&str> = Vec::new();
        for trigger in &pattern.triggers {
            fragments.push(&trigger.entity_id);
            fragments.push(&trigger.state);
        }
        for (entity, state) in pattern.action.entity_states() {
            fragments.push(entity);
            fragments.push(state);
        }

        for fragment in fragments {
            if FORBIDDEN_FRAGMENTS
                .iter()
                .any(|forbidden| fragment.contains(forbidden))
            {
                return Err(RejectionReason::AntiPattern);
            }
        }

        let trigger_entities: HashSet<&str> =
            pattern.trigger_entities().into_iter().collect();
        if pattern
            .action
            .entity_ids()
            .iter()
            .any(|entity| trigger_entities.contains(entity))
        {
            return Err(RejectionReason::Circular);
        }

        Ok(())
    }

    fn check_safety(&self, pattern: &Pattern) -> Result<(), RejectionReason> {
        let touches_safety = pattern
            .action
            .entity_ids()
            .iter()
            .any(|entity| self.is_safety_entity(entity));

        if touches_safety && pattern.confidence < self.config.safety_confidence {
            return Err(RejectionReason::SafetyCheck);
        }
        Ok(())
    }

    /// Entities whose misactuation has physical-security impact.
    #[must_use]
    pub fn is_safety_entity(&self, entity_id: &str) -> bool {
        entity_id.starts_with("lock.")
            || entity_id.contains("garage")
            || entity_id.contains("door")
            || self.config.safety_entities.contains(entity_id)
    }

    fn check_breadth(&self, pattern: &Pattern) -> Result<(), RejectionReason> {
        if pattern.support > self.config.max_support {
            return Err(RejectionReason::TooBroad);
        }
        if pattern.support < self.config.min_support && pattern.occurrence_count < 3 {
            return Err(RejectionReason::TooSpecific);
        }
        Ok(())
    }

    /// +0.05 for two or fewer triggers, -0.10 for weak conviction,
    /// clamped to [0, 1].
    fn adjusted_score(&self, pattern: &Pattern) -> f64 {
        let mut score = pattern.pattern_score;
        if pattern.triggers.len() <= 2 {
            score += 0.05;
        }
        if pattern.conviction.is_some_and(|conviction| conviction < 1.5) {
            score -= 0.10;
        }
        score.clamp(0.0, 1.0)
    }

    /// Advisory only: the action's local entity name appears in an
    /// installed automation's alias.
    fn conflicts_with_existing(&self, pattern: &Pattern) -> bool {
        pattern.action.entity_ids().iter().any(|entity| {
            let local = entity.split('.').nth(1).unwrap_or(entity);
            self.config
                .automation_names
                .iter()
                .any(|name| name.contains(local))
        })
    }
}
