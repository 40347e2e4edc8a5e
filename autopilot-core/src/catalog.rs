//! Entity inventory and signal classification.
//!
//! Every entity in the recorder is classified into one of four signal
//! levels. The fixed domain and device-class sets are part of the
//! external contract; user overrides always win.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::RecorderBackend;
use crate::Result;

/// Domains that always produce meaningful state changes.
pub const HIGH_SIGNAL_DOMAINS: [&str; 8] = [
    "light",
    "switch",
    "lock",
    "cover",
    "media_player",
    "input_boolean",
    "person",
    "input_select",
];

/// Meaningful but less frequent domains.
pub const MEDIUM_SIGNAL_DOMAINS: [&str; 5] =
    ["climate", "fan", "vacuum", "humidifier", "water_heater"];

/// Domains that never represent user actions.
pub const EXCLUDE_DOMAINS: [&str; 13] = [
    "weather",
    "sun",
    "automation",
    "script",
    "scene",
    "persistent_notification",
    "zone",
    "device_tracker",
    "update",
    "button",
    "number",
    "select",
    "text",
];

/// Binary-sensor device classes that make high-value triggers.
pub const HIGH_SIGNAL_BINARY_CLASSES: [&str; 9] = [
    "door",
    "window",
    "motion",
    "occupancy",
    "presence",
    "garage_door",
    "lock",
    "opening",
    "safety",
];

/// Binary-sensor device classes of moderate value.
pub const MEDIUM_SIGNAL_BINARY_CLASSES: [&str; 5] =
    ["plug", "running", "moving", "sound", "vibration"];

/// Signal quality of an entity's state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalLevel {
    High,
    Medium,
    Low,
    Exclude,
}

impl SignalLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLevel::High => "high",
            SignalLevel::Medium => "medium",
            SignalLevel::Low => "low",
            SignalLevel::Exclude => "exclude",
        }
    }
}

/// A classified entity. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub metadata_id: i64,
    pub entity_id: String,
    pub domain: String,
    pub device_class: Option<String>,
    pub signal_level: SignalLevel,
}

/// Per-level entity id lists for manual review.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub counts: HashMap<String, usize>,
    pub entities: HashMap<String, Vec<String>>,
}

/// Loads the entity inventory and classifies it.
///
/// Classification cascade: custom exclude, custom include, excluded
/// domains, high domains, medium domains, binary-sensor device class,
/// then low. Entity and attribute lookups are cached per run.
pub struct EntityCatalog {
    recorder: Arc<dyn RecorderBackend>,
    custom_includes: HashSet<String>,
    custom_excludes: HashSet<String>,
    entity_cache: Option<Vec<Entity>>,
    attribute_cache: HashMap<String, Option<String>>,
}

impl EntityCatalog {
    #[must_use]
    pub fn new(
        recorder: Arc<dyn RecorderBackend>,
        custom_includes: HashSet<String>,
        custom_excludes: HashSet<String>,
    ) -> Self {
        Self {
            recorder,
            custom_includes,
            custom_excludes,
            entity_cache: None,
            attribute_cache: HashMap::new(),
        }
    }

    /// Classify from domain and (for binary sensors) device class.
    #[must_use]
    pub fn classify(
        &self,
        entity_id: &str,
        domain: &str,
        device_class: Option<&str>,
    ) -> SignalLevel {
        if self.custom_excludes.contains(entity_id) {
            return SignalLevel::Exclude;
        }
        if self.custom_includes.contains(entity_id) {
            return SignalLevel::High;
        }
        if EXCLUDE_DOMAINS.contains(&domain) {
            return SignalLevel::Exclude;
        }
        if HIGH_SIGNAL_DOMAINS.contains(&domain) {
            return SignalLevel::High;
        }
        if MEDIUM_SIGNAL_DOMAINS.contains(&domain) {
            return SignalLevel::Medium;
        }
        if domain == "binary_sensor" {
            return match device_class {
                Some(class) if HIGH_SIGNAL_BINARY_CLASSES.contains(&class) => SignalLevel::High,
                Some(class) if MEDIUM_SIGNAL_BINARY_CLASSES.contains(&class) => {
                    SignalLevel::Medium
                }
                _ => SignalLevel::Low,
            };
        }
        SignalLevel::Low
    }

    /// Load and classify every entity in the recorder. Cached.
    pub async fn all_entities(&mut self) -> Result<Vec<Entity>> {
        if let Some(cached) = &self.entity_cache {
            return Ok(cached.clone());
        }

        let records = self.recorder.entities().await?;
        info!("Loaded {} entities from recorder", records.len());

        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            let domain = record
                .entity_id
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string();

            // Only binary sensors need the attribute lookup
            let device_class = if domain == "binary_sensor" {
                self.device_class_cached(&record.entity_id).await?
            } else {
                None
            };

            let signal_level =
                self.classify(&record.entity_id, &domain, device_class.as_deref());

            entities.push(Entity {
                metadata_id: record.metadata_id,
                entity_id: record.entity_id,
                domain,
                device_class,
                signal_level,
            });
        }

        self.entity_cache = Some(entities.clone());
        Ok(entities)
    }

    /// Entities at or above the minimum signal level.
    ///
    /// `min_signal` is `"high"` or `"medium"`; low and excluded entities
    /// never pass.
    pub async fn filtered_entities(&mut self, min_signal: &str) -> Result<Vec<Entity>> {
        let all = self.all_entities().await?;
        let total = all.len();

        let filtered: Vec<Entity> = all
            .into_iter()
            .filter(|e| match e.signal_level {
                SignalLevel::High => true,
                SignalLevel::Medium => min_signal != "high",
                SignalLevel::Low | SignalLevel::Exclude => false,
            })
            .collect();

        info!("Filtered to {} entities from {} total", filtered.len(), total);
        Ok(filtered)
    }

    /// Per-level report for tuning custom includes/excludes.
    pub async fn report(&mut self) -> Result<ClassificationReport> {
        let all = self.all_entities().await?;

        let mut entities: HashMap<String, Vec<String>> = HashMap::new();
        for entity in &all {
            entities
                .entry(entity.signal_level.as_str().to_string())
                .or_default()
                .push(entity.entity_id.clone());
        }

        let counts = entities.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        Ok(ClassificationReport { counts, entities })
    }

    async fn device_class_cached(&mut self, entity_id: &str) -> Result<Option<String>> {
        if let Some(cached) = self.attribute_cache.get(entity_id) {
            return Ok(cached.clone());
        }

        let device_class = match self.recorder.device_class(entity_id).await {
            Ok(class) => class,
            // Unparseable attribute blobs degrade to "no device class"
            Err(crate::Error::Malformed(reason)) => {
                warn!("Skipping malformed attributes for {entity_id}: {reason}");
                None
            }
            Err(e) => return Err(e),
        };

        debug!("device_class({entity_id}) = {device_class:?}");
        self.attribute_cache
            .insert(entity_id.to_string(), device_class.clone());
        Ok(device_class)
    }
}
