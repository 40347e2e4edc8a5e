//! Storage abstractions.
//!
//! Two traits separate the read side from the write side: the
//! [`RecorderBackend`] answers a fixed query set against the host's
//! recorder database (never written), while the [`PatternStore`] owns the
//! engine's own tables. Backends implement both over SQLite or
//! MySQL-family servers.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::events::StateChange;
use crate::mining::TransactionWindow;
use crate::pattern::{
    ActionSpec, Feedback, PatternKind, PatternStatus, Recommendation, Trigger, ValidatedPattern,
};
use crate::Result;

/// One row of the recorder's entity inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub metadata_id: i64,
    pub entity_id: String,
}

/// Coarse statistics about the recorder database.
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStats {
    pub total_states: i64,
    pub entity_count: i64,
    pub earliest_timestamp: Option<f64>,
    pub latest_timestamp: Option<f64>,
    pub database_type: String,
}

/// Read-only access to the host recorder.
///
/// All operations fail with `StorageUnavailable` on connection errors,
/// `SchemaMismatch` when the expected tables are missing, and
/// `StorageTimeout` when a query exceeds the per-query budget.
#[async_trait]
pub trait RecorderBackend: Send + Sync {
    /// Entity inventory from `states_meta`, ordered by entity id.
    async fn entities(&self) -> Result<Vec<EntityRecord>>;

    /// `device_class` attribute from the most recent state-attributes
    /// blob of an entity, or `None` when absent or unparseable.
    async fn device_class(&self, entity_id: &str) -> Result<Option<String>>;

    /// State transitions for the given entities in `[start_ts, end_ts]`,
    /// in non-decreasing timestamp order. Only rows whose state differs
    /// from the entity's predecessor (or first observations) are
    /// returned; `unavailable`/`unknown` are filtered at source on both
    /// sides of the comparison.
    async fn state_changes(
        &self,
        entities: &[String],
        start_ts: f64,
        end_ts: f64,
    ) -> Result<Vec<StateChange>>;

    /// Most recent state at or before `ts` for each entity; entities with
    /// no earlier state are absent from the map.
    async fn state_at(&self, entities: &[String], ts: f64) -> Result<HashMap<String, String>>;

    /// Row counts and covered time range.
    async fn recorder_stats(&self) -> Result<RecorderStats>;
}

/// Filter for pattern retrieval. Fields compose with AND; `None` means
/// no constraint.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    pub min_score: f64,
    pub kind: Option<PatternKind>,
    pub status: Option<PatternStatus>,
    pub feedback: Option<Feedback>,
    pub limit: Option<usize>,
}

/// A pattern as persisted, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPattern {
    pub pattern_id: i64,
    pub kind: PatternKind,
    pub pattern_hash: String,
    pub triggers: Vec<Trigger>,
    pub action: ActionSpec,
    pub confidence: f64,
    pub support: f64,
    pub lift: Option<f64>,
    pub conviction: Option<f64>,
    pub pattern_score: f64,
    pub first_seen: f64,
    pub last_seen: f64,
    pub occurrence_count: u64,
    pub user_feedback: Option<Feedback>,
    pub status: PatternStatus,
    pub recommendation: Recommendation,
    pub suggestion_shown: bool,
}

/// Counts and mean score for one (type, status) cell.
#[derive(Debug, Clone, Serialize)]
pub struct TypeStatusStats {
    pub count: i64,
    pub avg_score: f64,
}

/// Pattern database statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStatistics {
    pub by_type_status: HashMap<String, TypeStatusStats>,
    pub total_patterns: i64,
    pub total_transactions: i64,
}

/// Outcome of an upsert: whether the hash was already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Write-capable persistence for patterns, transactions, and run
/// metadata. Implementations serialise writes on a dedicated handle.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Create the pattern tables and indexes. Idempotent.
    async fn initialize_schema(&self) -> Result<()>;

    /// Insert or update by `pattern_hash`. On a hash hit the metrics and
    /// `last_seen` are overwritten, `occurrence_count` grows by the new
    /// pattern's count, and `first_seen` is preserved.
    async fn upsert_pattern(&self, pattern: &ValidatedPattern) -> Result<(i64, UpsertOutcome)>;

    /// Retrieve patterns matching a filter, ordered by score descending.
    async fn get_patterns(&self, filter: &PatternFilter) -> Result<Vec<StoredPattern>>;

    /// Record user feedback on a pattern.
    async fn update_feedback(&self, pattern_id: i64, feedback: Feedback) -> Result<()>;

    /// Mark that a suggestion was shown to the user.
    async fn mark_suggested(&self, pattern_id: i64) -> Result<()>;

    /// Persist mining transactions for later inspection.
    async fn store_transactions(&self, transactions: &[TransactionWindow]) -> Result<usize>;

    /// Wipe sequences, patterns, and transactions, in that order.
    async fn clear_all(&self) -> Result<()>;

    /// Counts and score means grouped by type and status.
    async fn statistics(&self) -> Result<StoreStatistics>;

    /// Read a metadata value.
    async fn get_metadata(&self, key: &str) -> Result<Option<String>>;

    /// Write a metadata value.
    async fn set_metadata(&self, key: &str, value: &str) -> Result<()>;
}
