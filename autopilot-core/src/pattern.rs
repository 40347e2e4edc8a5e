//! Pattern model shared by the three miners, the validator, and the store.
//!
//! A [`Pattern`] is a single envelope with a `kind` discriminant rather
//! than a hierarchy: every miner produces the same shape, so validation,
//! hashing, and persistence never branch on the producer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which miner produced a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Association,
    Sequence,
    Temporal,
}

impl PatternKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Association => "association",
            PatternKind::Sequence => "sequence",
            PatternKind::Temporal => "temporal",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "association" => Some(PatternKind::Association),
            "sequence" => Some(PatternKind::Sequence),
            "temporal" => Some(PatternKind::Temporal),
            _ => None,
        }
    }
}

/// A single trigger condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub entity_id: String,
    pub state: String,
    /// Optional context tag, e.g. `schedule` or `solar`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<String>,
}

impl Trigger {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// One step of a multi-step routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub entity_id: String,
    pub state: String,
    /// Mean observed delay from the previous step
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub typical_delay_seconds: Option<u64>,
}

/// What the automation would do: a single service call, or an ordered
/// list of steps with per-step delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    Single {
        entity_id: String,
        state: String,
        service: String,
    },
    Steps {
        steps: Vec<SequenceStep>,
    },
}

impl ActionSpec {
    /// Entity ids touched by this action.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<&str> {
        match self {
            ActionSpec::Single { entity_id, .. } => vec![entity_id.as_str()],
            ActionSpec::Steps { steps } => steps.iter().map(|s| s.entity_id.as_str()).collect(),
        }
    }

    /// States this action would set, paired with the entity.
    #[must_use]
    pub fn entity_states(&self) -> Vec<(&str, &str)> {
        match self {
            ActionSpec::Single {
                entity_id, state, ..
            } => vec![(entity_id.as_str(), state.as_str())],
            ActionSpec::Steps { steps } => steps
                .iter()
                .map(|s| (s.entity_id.as_str(), s.state.as_str()))
                .collect(),
        }
    }
}

/// A discovered pattern before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub triggers: Vec<Trigger>,
    pub action: ActionSpec,
    pub confidence: f64,
    /// For sequence patterns this is a scaled count (occurrences / 100),
    /// not a probability
    pub support: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub conviction: Option<f64>,
    pub pattern_score: f64,
    pub occurrence_count: u64,
    pub description: String,
}

impl Pattern {
    /// Entity ids appearing in the trigger list.
    #[must_use]
    pub fn trigger_entities(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.entity_id.as_str()).collect()
    }

    /// Deterministic dedup hash over the canonicalised triggers and action.
    #[must_use]
    pub fn hash(&self) -> String {
        pattern_hash(&self.triggers, &self.action)
    }
}

/// User verdict on a suggested pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Approved,
    Rejected,
    Ignored,
}

impl Feedback {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Approved => "approved",
            Feedback::Rejected => "rejected",
            Feedback::Ignored => "ignored",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Feedback::Approved),
            "rejected" => Some(Feedback::Rejected),
            "ignored" => Some(Feedback::Ignored),
            _ => None,
        }
    }
}

/// Lifecycle status of a stored pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Deprecated,
    Conflicting,
}

impl PatternStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternStatus::Active => "active",
            PatternStatus::Deprecated => "deprecated",
            PatternStatus::Conflicting => "conflicting",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PatternStatus::Active),
            "deprecated" => Some(PatternStatus::Deprecated),
            "conflicting" => Some(PatternStatus::Conflicting),
            _ => None,
        }
    }
}

/// Discretisation of the pattern score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    AutoSuggest,
    Suggest,
    Review,
}

impl Recommendation {
    /// auto_suggest at >= 0.85, suggest at >= 0.70, review below.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            Recommendation::AutoSuggest
        } else if score >= 0.70 {
            Recommendation::Suggest
        } else {
            Recommendation::Review
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::AutoSuggest => "auto_suggest",
            Recommendation::Suggest => "suggest",
            Recommendation::Review => "review",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto_suggest" => Some(Recommendation::AutoSuggest),
            "suggest" => Some(Recommendation::Suggest),
            "review" => Some(Recommendation::Review),
            _ => None,
        }
    }
}

/// A pattern that passed validation, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPattern {
    pub pattern: Pattern,
    pub pattern_hash: String,
    pub recommendation: Recommendation,
    pub conflict_warning: bool,
}

/// Serialise a JSON value with all object keys sorted, so two
/// structurally equal values always produce the same byte string.
#[must_use]
pub fn canonical_json(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Deterministic 16-hex-char dedup hash.
///
/// Triggers are sorted by (entity, state) before serialisation and all
/// map keys are sorted, so the hash depends only on the canonical
/// structure of (triggers, action). Metrics never participate.
#[must_use]
pub fn pattern_hash(triggers: &[Trigger], action: &ActionSpec) -> String {
    let mut sorted: Vec<&Trigger> = triggers.iter().collect();
    sorted.sort_by(|a, b| {
        a.entity_id
            .cmp(&b.entity_id)
            .then_with(|| a.state.cmp(&b.state))
    });

    let trigger_value = serde_json::to_value(&sorted).unwrap_or_default();
    let action_value = serde_json::to_value(action).unwrap_or_default();

    let combined = format!(
        "{}|{}",
        canonical_json(&trigger_value),
        canonical_json(&action_value)
    );

    let digest = Sha256::digest(combined.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Map a (domain, target state) pair to the service that would produce
/// that state. Domains without a safe mapping (notably `climate`) return
/// `None` and are never auto-acted.
#[must_use]
pub fn infer_service(entity_id: &str, state: &str) -> Option<String> {
    let domain = entity_id.split('.').next()?;
    match (domain, state) {
        ("light" | "switch", "on" | "off") => Some(format!("turn_{state}")),
        ("lock", "locked") => Some("lock".to_string()),
        ("lock", "unlocked") => Some("unlock".to_string()),
        ("cover", "open") => Some("open_cover".to_string()),
        ("cover", "closed") => Some("close_cover".to_string()),
        ("media_player", "playing") => Some("media_play".to_string()),
        ("media_player", "paused") => Some("media_pause".to_string()),
        ("media_player", "idle" | "off") => Some("media_stop".to_string()),
        _ => None,
    }
}
