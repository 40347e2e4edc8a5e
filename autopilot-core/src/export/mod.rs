//! Export surfaces: JSONL event dumps, the pattern review document, and
//! the YAML automation draft.

pub mod automation;
pub mod jsonl;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::StoredPattern;
use crate::Result;

pub use automation::{draft_automations, AutomationDraft};
pub use jsonl::{export_jsonl, export_metadata, load_jsonl};

/// File name of the pattern review document.
pub const PATTERN_EXPORT_FILE: &str = "patterns_for_review.json";

/// One pattern in the review document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternExportEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub trigger: serde_json::Value,
    pub action: serde_json::Value,
    pub confidence: f64,
    pub support: f64,
    pub score: f64,
    pub occurrences: u64,
    pub recommendation: String,
}

/// The pattern review document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternExport {
    pub generated_at: String,
    pub pattern_count: usize,
    pub min_score: f64,
    pub patterns: Vec<PatternExportEntry>,
}

impl PatternExport {
    /// Build the document from stored patterns (already score-ordered).
    pub fn from_patterns(patterns: &[StoredPattern], min_score: f64) -> Result<Self> {
        let entries = patterns
            .iter()
            .map(|p| {
                Ok(PatternExportEntry {
                    id: p.pattern_id,
                    kind: p.kind.as_str().to_string(),
                    trigger: serde_json::to_value(&p.triggers)?,
                    action: serde_json::to_value(&p.action)?,
                    confidence: p.confidence,
                    support: p.support,
                    score: p.pattern_score,
                    occurrences: p.occurrence_count,
                    recommendation: p.recommendation.as_str().to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            pattern_count: entries.len(),
            min_score,
            patterns: entries,
        })
    }

    /// Write the document under `export_dir`.
    pub fn write_to(&self, export_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(export_dir)?;
        let path = export_dir.join(PATTERN_EXPORT_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        info!("Exported {} patterns to {}", self.pattern_count, path.display());
        Ok(path)
    }

    /// Read a previously written document.
    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
