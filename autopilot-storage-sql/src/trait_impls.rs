//! Trait wiring: the inherent query methods exposed through the core
//! storage traits.

use std::collections::HashMap;

use async_trait::async_trait;
use autopilot_core::storage::{
    PatternFilter, PatternStore, RecorderBackend, StoreStatistics, UpsertOutcome,
};
use autopilot_core::{
    EntityRecord, RecorderStats, Result, StateChange, StoredPattern, TransactionWindow,
    ValidatedPattern,
};

use crate::SqlStorage;

#[async_trait]
impl RecorderBackend for SqlStorage {
    async fn entities(&self) -> Result<Vec<EntityRecord>> {
        self.entities_impl().await
    }

    async fn device_class(&self, entity_id: &str) -> Result<Option<String>> {
        self.device_class_impl(entity_id).await
    }

    async fn state_changes(
        &self,
        entities: &[String],
        start_ts: f64,
        end_ts: f64,
    ) -> Result<Vec<StateChange>> {
        self.state_changes_impl(entities, start_ts, end_ts).await
    }

    async fn state_at(&self, entities: &[String], ts: f64) -> Result<HashMap<String, String>> {
        self.state_at_impl(entities, ts).await
    }

    async fn recorder_stats(&self) -> Result<RecorderStats> {
        self.recorder_stats_impl().await
    }
}

#[async_trait]
impl PatternStore for SqlStorage {
    async fn initialize_schema(&self) -> Result<()> {
        self.initialize_schema_impl().await
    }

    async fn upsert_pattern(&self, pattern: &ValidatedPattern) -> Result<(i64, UpsertOutcome)> {
        self.upsert_pattern_impl(pattern).await
    }

    async fn get_patterns(&self, filter: &PatternFilter) -> Result<Vec<StoredPattern>> {
        self.get_patterns_impl(filter).await
    }

    async fn update_feedback(
        &self,
        pattern_id: i64,
        feedback: autopilot_core::Feedback,
    ) -> Result<()> {
        self.update_feedback_impl(pattern_id, feedback).await
    }

    async fn mark_suggested(&self, pattern_id: i64) -> Result<()> {
        self.mark_suggested_impl(pattern_id).await
    }

    async fn store_transactions(&self, transactions: &[TransactionWindow]) -> Result<usize> {
        self.store_transactions_impl(transactions).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.clear_all_impl().await
    }

    async fn statistics(&self) -> Result<StoreStatistics> {
        self.statistics_impl().await
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.get_metadata_impl(key).await
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.set_metadata_impl(key, value).await
    }
}
