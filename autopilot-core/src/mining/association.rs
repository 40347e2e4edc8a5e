//! Association rule mining.
//!
//! Frequent itemsets become rules A => B; rules survive on confidence,
//! lift, and conviction thresholds, and single-consequent rules are
//! promoted to patterns with an inferred service call.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::mining::fp_growth::frequent_itemsets;
use crate::mining::transactions::TransactionWindow;
use crate::pattern::{infer_service, ActionSpec, Pattern, PatternKind, Trigger};

/// Mining thresholds. Defaults are the external contract.
#[derive(Debug, Clone)]
pub struct AssociationMinerConfig {
    pub min_support: f64,
    pub min_confidence: f64,
    pub min_lift: f64,
    pub min_conviction: f64,
    /// Below this many transactions nothing is mined
    pub min_transactions: usize,
}

impl Default for AssociationMinerConfig {
    fn default() -> Self {
        Self {
            min_support: 0.10,
            min_confidence: 0.75,
            min_lift: 1.2,
            min_conviction: 1.5,
            min_transactions: 10,
        }
    }
}

/// An association rule with its interestingness metrics.
#[derive(Debug, Clone, Serialize)]
pub struct AssociationRule {
    pub antecedent: Vec<String>,
    pub consequent: Vec<String>,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    /// Infinite when confidence is 1
    pub conviction: f64,
    /// Transactions containing the full itemset
    pub itemset_count: usize,
}

/// Largest itemset expanded into rules. Subset enumeration costs 2^k per
/// itemset; past this point the cost explodes while the rules describe
/// window-wide coincidences no automation could express. Skips are
/// logged.
pub const MAX_RULE_ITEMSET: usize = 20;

/// FP-Growth-based association miner.
#[derive(Debug, Clone, Default)]
pub struct AssociationMiner {
    config: AssociationMinerConfig,
}

impl AssociationMiner {
    #[must_use]
    pub fn new(config: AssociationMinerConfig) -> Self {
        Self { config }
    }

    /// Mine association patterns from transaction windows. Returns an
    /// empty set below the transaction floor.
    #[must_use]
    pub fn mine(&self, transactions: &[TransactionWindow]) -> Vec<Pattern> {
        if transactions.len() < self.config.min_transactions {
            info!(
                "Skipping association mining: {} transactions (< {})",
                transactions.len(),
                self.config.min_transactions
            );
            return Vec::new();
        }

        let item_sets: Vec<_> = transactions.iter().map(|t| t.items.clone()).collect();
        let itemsets = frequent_itemsets(&item_sets, self.config.min_support);
        debug!("{} frequent itemsets", itemsets.len());

        let rules = self.generate_rules(&itemsets, transactions.len());
        info!("{} association rules pass thresholds", rules.len());

        rules
            .into_iter()
            .filter_map(|rule| self.rule_to_pattern(&rule))
            .collect()
    }

    /// Enumerate A => B for every frequent itemset of size >= 2 and every
    /// non-empty proper subset A.
    #[must_use]
    pub fn generate_rules(
        &self,
        itemsets: &HashMap<Vec<String>, usize>,
        total_transactions: usize,
    ) -> Vec<AssociationRule> {
        let total = total_transactions as f64;
        let mut rules = Vec::new();

        for (itemset, &itemset_count) in itemsets {
            let k = itemset.len();
            if k < 2 {
                continue;
            }
            if k > MAX_RULE_ITEMSET {
                warn!(
                    "Skipping {k}-item frequent itemset in rule generation \
                     (subset enumeration is 2^k)"
                );
                continue;
            }

            let support = itemset_count as f64 / total;

            for mask in 1u64..((1u64 << k) - 1) {
                let mut antecedent = Vec::new();
                let mut consequent = Vec::new();
                for (bit, item) in itemset.iter().enumerate() {
                    if mask & (1 << bit) != 0 {
                        antecedent.push(item.clone());
                    } else {
                        consequent.push(item.clone());
                    }
                }

                let Some(&antecedent_count) = itemsets.get(&antecedent) else {
                    continue;
                };
                let Some(&consequent_count) = itemsets.get(&consequent) else {
                    continue;
                };

                let confidence = itemset_count as f64 / antecedent_count as f64;
                if confidence < self.config.min_confidence {
                    continue;
                }

                let consequent_support = consequent_count as f64 / total;
                let lift = confidence / consequent_support;
                if lift < self.config.min_lift {
                    continue;
                }

                let conviction = if confidence >= 1.0 {
                    f64::INFINITY
                } else {
                    (1.0 - consequent_support) / (1.0 - confidence)
                };
                if conviction < self.config.min_conviction {
                    continue;
                }

                rules.push(AssociationRule {
                    antecedent,
                    consequent,
                    support,
                    confidence,
                    lift,
                    conviction,
                    itemset_count,
                });
            }
        }

        // Deterministic output order for a fixed input
        rules.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.antecedent.cmp(&b.antecedent))
                .then_with(|| a.consequent.cmp(&b.consequent))
        });
        rules
    }

    /// Promote a single-consequent rule to a pattern. Multi-item
    /// consequents and unactionable targets are suppressed.
    #[must_use]
    pub fn rule_to_pattern(&self, rule: &AssociationRule) -> Option<Pattern> {
        let [consequent_item] = rule.consequent.as_slice() else {
            return None;
        };
        let (entity_id, state) = split_item(consequent_item)?;
        let service = infer_service(entity_id, state)?;

        let triggers: Vec<Trigger> = rule
            .antecedent
            .iter()
            .filter_map(|item| {
                let (entity, state) = split_item(item)?;
                Some(Trigger::new(entity, state))
            })
            .collect();
        if triggers.len() != rule.antecedent.len() {
            return None;
        }

        let score = self.composite_score(rule);
        let description = format!(
            "{} => {} ({:.0}% confidence, lift {:.2})",
            rule.antecedent.join(" + "),
            consequent_item,
            rule.confidence * 100.0,
            rule.lift
        );

        Some(Pattern {
            kind: PatternKind::Association,
            triggers,
            action: ActionSpec::Single {
                entity_id: entity_id.to_string(),
                state: state.to_string(),
                service,
            },
            confidence: rule.confidence,
            support: rule.support,
            lift: Some(rule.lift),
            conviction: rule.conviction.is_finite().then_some(rule.conviction),
            pattern_score: score,
            occurrence_count: rule.itemset_count as u64,
            description,
        })
    }

    /// 0.30 confidence + 0.25 lift + 0.20 conviction + 0.15 support +
    /// 0.10 simplicity, with lift and conviction saturating at 5.
    fn composite_score(&self, rule: &AssociationRule) -> f64 {
        let simplicity = if rule.antecedent.len() <= 3 { 1.0 } else { 0.5 };
        0.30 * rule.confidence
            + 0.25 * (rule.lift / 5.0).min(1.0)
            + 0.20 * (rule.conviction / 5.0).min(1.0)
            + 0.15 * rule.support
            + 0.10 * simplicity
    }
}

/// Split an `entity:state` item.
fn split_item(item: &str) -> Option<(&str, &str)> {
    let (entity, state) = item.split_once(':')?;
    (!entity.is_empty() && !state.is_empty()).then_some((entity, state))
}
