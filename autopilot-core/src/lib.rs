#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::float_cmp)]

//! # Autopilot Core
//!
//! Mines behavioral patterns from a smart home's recorder history and
//! turns them into ranked automation suggestions.
//!
//! ## Pipeline
//!
//! 1. [`catalog`]: classify the entity inventory by signal quality
//! 2. [`storage`]: read the state-change stream from the recorder
//! 3. [`context`]: enrich each change with temporal and environmental context
//! 4. [`filter`]: drop noise, stamp flap markers and quality scores
//! 5. [`mining`]: association, sequence, and temporal discoverers
//! 6. [`validate`]: anti-pattern, safety, and breadth checks with final scoring
//! 7. [`storage`]: deduplicating upsert keyed by a canonical hash
//! 8. [`export`]: JSONL events, review JSON, YAML automation draft
//!
//! The [`engine::Engine`] drives the whole run; storage backends live in
//! a separate crate and implement [`storage::RecorderBackend`] and
//! [`storage::PatternStore`].

pub mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod filter;
pub mod mining;
pub mod pattern;
pub mod stats;
pub mod storage;
pub mod validate;

// Re-export commonly used types
pub use catalog::{Entity, EntityCatalog, SignalLevel};
pub use config::EngineConfig;
pub use context::{apply_derived_features, ContextBuilder, SnapshotCache};
pub use engine::{Engine, RunMetadata};
pub use error::{Error, Result};
pub use events::{EnrichedEvent, StateChange, TimeBucket};
pub use filter::{NoiseFilter, NoiseFilterConfig};
pub use mining::{
    build_transactions, AssociationMiner, SequenceMiner, TemporalAnalyzer, TransactionWindow,
};
pub use pattern::{
    infer_service, pattern_hash, ActionSpec, Feedback, Pattern, PatternKind, PatternStatus,
    Recommendation, SequenceStep, Trigger, ValidatedPattern,
};
pub use storage::{
    EntityRecord, PatternFilter, PatternStore, RecorderBackend, RecorderStats, StoredPattern,
    UpsertOutcome,
};
pub use validate::{PatternValidator, RejectionReason, ValidatorConfig};
