//! Run orchestration.
//!
//! The engine drives the pipeline sequentially: classify, extract,
//! enrich, filter, build transactions, run the three miners, validate,
//! and upsert. A run is all-or-nothing at the boundary: any error is
//! recorded as a failed run with zero patterns stored. A single retry is
//! attempted when extraction fails with a recoverable error.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{FixedOffset, Local, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::catalog::EntityCatalog;
use crate::config::EngineConfig;
use crate::context::{apply_derived_features, ContextBuilder, SUN_ENTITY};
use crate::events::EnrichedEvent;
use crate::export::{draft_automations, PatternExport};
use crate::filter::{NoiseFilter, NoiseFilterConfig};
use crate::mining::{
    build_transactions, AssociationMiner, AssociationMinerConfig, SequenceMiner,
    SequenceMinerConfig, TemporalAnalyzer, TemporalAnalyzerConfig,
};
use crate::pattern::Pattern;
use crate::storage::{PatternFilter, PatternStore, RecorderBackend};
use crate::validate::{PatternValidator, ValidatorConfig};
use crate::{Error, Result};

/// Metadata key holding the end timestamp of the last successful run.
pub const LAST_RUN_END_KEY: &str = "last_run_end";

/// Metadata key holding the serialised metadata of the last run.
pub const LAST_RUN_KEY: &str = "last_run";

/// Counters describing one mining run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub events_loaded: usize,
    pub transactions_built: usize,
    pub patterns_discovered: usize,
    pub patterns_validated: usize,
    pub patterns_stored: usize,
    pub duration_seconds: f64,
    pub days_analyzed: u32,
}

/// Orchestrates the mining pipeline over a recorder and a pattern store.
pub struct Engine {
    recorder: Arc<dyn RecorderBackend>,
    store: Arc<dyn PatternStore>,
    config: EngineConfig,
    offset: FixedOffset,
}

impl Engine {
    /// Engine in the machine's local timezone.
    #[must_use]
    pub fn new(
        recorder: Arc<dyn RecorderBackend>,
        store: Arc<dyn PatternStore>,
        config: EngineConfig,
    ) -> Self {
        let offset = Local::now().offset().fix();
        Self::with_offset(recorder, store, config, offset)
    }

    /// Engine with an explicit UTC offset (tests pin this).
    #[must_use]
    pub fn with_offset(
        recorder: Arc<dyn RecorderBackend>,
        store: Arc<dyn PatternStore>,
        config: EngineConfig,
        offset: FixedOffset,
    ) -> Self {
        Self {
            recorder,
            store,
            config,
            offset,
        }
    }

    /// Run a full discovery pass over the last `days` of history.
    ///
    /// Returns the run counters. On error the run is recorded as failed
    /// and nothing is stored.
    pub async fn discover_patterns(&self, days: u32, incremental: bool) -> Result<RunMetadata> {
        let started = std::time::Instant::now();

        let result = self.run_pipeline(days, incremental).await;
        match result {
            Ok(mut metadata) => {
                metadata.duration_seconds = started.elapsed().as_secs_f64();
                info!(
                    "Run complete: {} events, {} transactions, {} discovered, {} stored in {:.1}s",
                    metadata.events_loaded,
                    metadata.transactions_built,
                    metadata.patterns_discovered,
                    metadata.patterns_stored,
                    metadata.duration_seconds
                );
                if let Ok(json) = serde_json::to_string(&metadata) {
                    let _ = self.store.set_metadata(LAST_RUN_KEY, &json).await;
                }
                Ok(metadata)
            }
            Err(e) => {
                error!("Run failed, no patterns stored: {e}");
                let failed = serde_json::json!({ "failed": e.to_string() });
                let _ = self
                    .store
                    .set_metadata(LAST_RUN_KEY, &failed.to_string())
                    .await;
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, days: u32, incremental: bool) -> Result<RunMetadata> {
        self.config.validate()?;
        self.store.initialize_schema().await?;

        let end_ts = Utc::now().timestamp() as f64;
        let mut start_ts = end_ts - f64::from(days) * 86_400.0;
        if incremental {
            if let Some(raw) = self.store.get_metadata(LAST_RUN_END_KEY).await? {
                if let Ok(last_end) = raw.parse::<f64>() {
                    start_ts = start_ts.max(last_end);
                }
            }
        }

        let mut metadata = RunMetadata {
            days_analyzed: days,
            ..Default::default()
        };

        let events = self.load_events(start_ts, end_ts).await?;
        metadata.events_loaded = events.len();
        if events.is_empty() {
            info!("No events in range, nothing to mine");
            self.store
                .set_metadata(LAST_RUN_END_KEY, &end_ts.to_string())
                .await?;
            return Ok(metadata);
        }

        // Transactions are persisted before mining so a later run can
        // inspect what the miners saw
        let transactions = build_transactions(&events, self.config.window_seconds);
        metadata.transactions_built = transactions.len();
        self.store.store_transactions(&transactions).await?;

        // Miners run independently; a failing miner contributes nothing
        let association = AssociationMiner::new(AssociationMinerConfig {
            min_support: self.config.min_support,
            min_confidence: self.config.min_confidence,
            ..Default::default()
        });
        let sequence = SequenceMiner::new(SequenceMinerConfig::default());
        let temporal = TemporalAnalyzer::new(
            TemporalAnalyzerConfig::default(),
            self.offset.local_minus_utc(),
        );

        let mut discovered: Vec<Pattern> = Vec::new();
        discovered.extend(run_miner("association", || association.mine(&transactions)));
        discovered.extend(run_miner("sequence", || sequence.mine(&events)));
        discovered.extend(run_miner("temporal", || temporal.mine(&events)));
        metadata.patterns_discovered = discovered.len();

        let validator = PatternValidator::new(ValidatorConfig {
            safety_entities: self.config.safety_entities.clone(),
            automation_names: self.config.automation_names.clone(),
            ..Default::default()
        });
        let (validated, rejected) = validator.validate_all(discovered);
        metadata.patterns_validated = validated.len();
        for (_, reason) in &rejected {
            info!("Rejection: {}", reason.as_str());
        }

        for pattern in &validated {
            self.store.upsert_pattern(pattern).await?;
            metadata.patterns_stored += 1;
        }

        self.store
            .set_metadata(LAST_RUN_END_KEY, &end_ts.to_string())
            .await?;
        Ok(metadata)
    }

    /// Extract, enrich, and filter events for a window. The offline
    /// extraction surface; fails with `EmptyInput` when nothing matches.
    pub async fn extract_events(&self, days: u32) -> Result<Vec<EnrichedEvent>> {
        let end_ts = Utc::now().timestamp() as f64;
        let start_ts = end_ts - f64::from(days) * 86_400.0;
        let events = self.load_events(start_ts, end_ts).await?;
        if events.is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(events)
    }

    /// Load the enriched, filtered event stream for a window.
    async fn load_events(&self, start_ts: f64, end_ts: f64) -> Result<Vec<EnrichedEvent>> {
        let mut catalog = EntityCatalog::new(
            Arc::clone(&self.recorder),
            self.config.custom_includes.clone(),
            self.config.custom_excludes.clone(),
        );
        let entities = catalog.filtered_entities(&self.config.min_signal).await?;
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let entity_ids: Vec<String> = entities.into_iter().map(|e| e.entity_id).collect();
        let mut context_entities = entity_ids.clone();
        if !context_entities.iter().any(|e| e == SUN_ENTITY) {
            context_entities.push(SUN_ENTITY.to_string());
        }

        // One retry on a recoverable storage failure
        let changes = match self
            .recorder
            .state_changes(&entity_ids, start_ts, end_ts)
            .await
        {
            Ok(changes) => changes,
            Err(e) if e.is_recoverable() => {
                warn!("Extraction failed ({e}), retrying once");
                self.recorder
                    .state_changes(&entity_ids, start_ts, end_ts)
                    .await?
            }
            Err(e) => return Err(e),
        };
        info!("Extracted {} state changes", changes.len());

        let mut builder =
            ContextBuilder::new(Arc::clone(&self.recorder), context_entities, self.offset);
        let enriched = builder.enrich(changes).await?;

        let filter = NoiseFilter::new(NoiseFilterConfig {
            flap_threshold: self.config.flap_threshold,
            flap_window: self.config.flap_window,
            ..Default::default()
        });
        let (mut filtered, _) = filter.filter_events(enriched);

        for event in &mut filtered {
            apply_derived_features(event);
        }
        Ok(filtered)
    }

    /// Export stored patterns as the review JSON and a YAML draft.
    /// Returns (json path, yaml path).
    pub async fn export_patterns(&self, min_score: f64) -> Result<(PathBuf, PathBuf)> {
        let patterns = self
            .store
            .get_patterns(&PatternFilter {
                min_score,
                ..Default::default()
            })
            .await?;

        let export = PatternExport::from_patterns(&patterns, min_score)?;
        let json_path = export.write_to(&self.config.export_dir)?;

        let now = Utc::now();
        let yaml = draft_automations(&patterns, &now.format("%Y%m%d").to_string())?;
        let yaml_path = self
            .config
            .export_dir
            .join(format!("automations_{}.yaml", now.format("%Y%m%d_%H%M%S")));
        std::fs::write(&yaml_path, yaml)?;

        // Exporting counts as showing the suggestion
        for pattern in &patterns {
            self.store.mark_suggested(pattern.pattern_id).await?;
        }

        info!(
            "Exported {} patterns to {} and {}",
            patterns.len(),
            json_path.display(),
            yaml_path.display()
        );
        Ok((json_path, yaml_path))
    }

    /// Destructive wipe of all pattern data. Requires confirmation.
    pub async fn clear_patterns(&self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(Error::InvalidInput(
                "clearing patterns requires confirm=true".to_string(),
            ));
        }
        warn!("Clearing all pattern data");
        self.store.clear_all().await
    }
}

/// Run one miner, turning a panic into an empty result so the other
/// miners still contribute.
fn run_miner(name: &str, mine: impl FnOnce() -> Vec<Pattern>) -> Vec<Pattern> {
    match catch_unwind(AssertUnwindSafe(mine)) {
        Ok(patterns) => {
            info!("{name} miner produced {} patterns", patterns.len());
            patterns
        }
        Err(_) => {
            error!("{name} miner failed; treating its output as empty");
            Vec::new()
        }
    }
}
