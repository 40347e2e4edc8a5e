//! YAML automation drafts.
//!
//! Pure formatting: validated, stored patterns become a YAML list a user
//! can review and paste into their automation file. Nothing is deployed
//! from here.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::pattern::{infer_service, ActionSpec, PatternKind};
use crate::storage::StoredPattern;
use crate::Result;

/// One draft automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationDraft {
    pub id: String,
    pub alias: String,
    pub description: String,
    pub triggers: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conditions: Vec<Value>,
    pub actions: Vec<Value>,
    pub mode: String,
}

/// Render drafts for every convertible pattern as a YAML list.
///
/// `date` is the draft date as `YYYYMMDD`; it participates in the draft
/// identifiers only.
pub fn draft_automations(patterns: &[StoredPattern], date: &str) -> Result<String> {
    let drafts: Vec<AutomationDraft> = patterns
        .iter()
        .filter_map(|pattern| draft_one(pattern, date))
        .collect();
    Ok(serde_yaml::to_string(&drafts)?)
}

/// Identifier format: `autopilot_<type>_<YYYYMMDD>_<8hex>` where the hex
/// is the MD5 of `type + "_" + joined args`.
#[must_use]
pub fn automation_id(kind: &str, date: &str, args: &[&str]) -> String {
    let digest = md5::compute(format!("{kind}_{}", args.join("_")));
    let hex = format!("{digest:x}");
    format!("autopilot_{kind}_{date}_{}", &hex[..8])
}

fn draft_one(pattern: &StoredPattern, date: &str) -> Option<AutomationDraft> {
    match (&pattern.kind, &pattern.action) {
        (PatternKind::Temporal, ActionSpec::Single { entity_id, state, service }) => {
            let trigger = pattern.triggers.first()?;
            let (yaml_trigger, alias) = if trigger.entity_id == "time" {
                (
                    json!({"trigger": "time", "at": format!("{}:00", trigger.state)}),
                    format!("[Autopilot] {} at {}", friendly_name(entity_id), trigger.state),
                )
            } else {
                (
                    json!({
                        "trigger": "state",
                        "entity_id": trigger.entity_id,
                        "to": trigger.state,
                    }),
                    format!(
                        "[Autopilot] {} when sun is {}",
                        friendly_name(entity_id),
                        trigger.state
                    ),
                )
            };

            Some(AutomationDraft {
                id: automation_id("temporal", date, &[entity_id, state, &trigger.state]),
                alias,
                description: describe(pattern),
                triggers: vec![yaml_trigger],
                conditions: Vec::new(),
                actions: vec![service_call(entity_id, service)?],
                mode: "single".to_string(),
            })
        }

        (PatternKind::Association, ActionSpec::Single { entity_id, state, service }) => {
            let triggers: Vec<Value> = pattern
                .triggers
                .iter()
                .map(|t| {
                    json!({
                        "trigger": "state",
                        "entity_id": t.entity_id,
                        "to": t.state,
                    })
                })
                .collect();

            let mut args: Vec<&str> = pattern
                .triggers
                .iter()
                .map(|t| t.entity_id.as_str())
                .collect();
            args.push(entity_id);
            args.push(state);

            Some(AutomationDraft {
                id: automation_id("association", date, &args),
                alias: format!(
                    "[Autopilot] {} with {}",
                    friendly_name(entity_id),
                    pattern
                        .triggers
                        .iter()
                        .map(|t| friendly_name(&t.entity_id))
                        .collect::<Vec<_>>()
                        .join(" + ")
                ),
                description: describe(pattern),
                triggers,
                conditions: Vec::new(),
                actions: vec![service_call(entity_id, service)?],
                mode: "single".to_string(),
            })
        }

        (PatternKind::Sequence, ActionSpec::Steps { steps }) => {
            let first = pattern.triggers.first()?;
            let trigger = json!({
                "trigger": "state",
                "entity_id": first.entity_id,
                "to": first.state,
            });

            let mut actions = Vec::new();
            for step in steps {
                let service = infer_service(&step.entity_id, &step.state)?;
                if let Some(delay) = step.typical_delay_seconds {
                    actions.push(json!({"delay": {"seconds": delay}}));
                }
                actions.push(service_call(&step.entity_id, &service)?);
            }

            let mut args: Vec<&str> = vec![first.entity_id.as_str()];
            args.extend(steps.iter().map(|s| s.entity_id.as_str()));

            Some(AutomationDraft {
                id: automation_id("sequence", date, &args),
                alias: format!(
                    "[Autopilot] routine after {}",
                    friendly_name(&first.entity_id)
                ),
                description: describe(pattern),
                triggers: vec![trigger],
                conditions: Vec::new(),
                actions,
                mode: "restart".to_string(),
            })
        }

        _ => None,
    }
}

fn service_call(entity_id: &str, service: &str) -> Option<Value> {
    let domain = entity_id.split('.').next()?;
    Some(json!({
        "action": format!("{domain}.{service}"),
        "target": {"entity_id": entity_id},
    }))
}

fn describe(pattern: &StoredPattern) -> String {
    format!(
        "Auto-generated from pattern detection. {:.0}% confidence based on {} occurrences. Pattern: {}",
        pattern.confidence * 100.0,
        pattern.occurrence_count,
        pattern.pattern_hash
    )
}

fn friendly_name(entity_id: &str) -> String {
    entity_id
        .split('.')
        .nth(1)
        .unwrap_or(entity_id)
        .replace('_', " ")
}
