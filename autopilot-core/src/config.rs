//! Engine configuration.
//!
//! All keys are recognised from the TOML configuration file loaded by the
//! CLI; every field has a working default so an empty file is valid.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::mining::transactions::DEFAULT_WINDOW_SECONDS;

/// Configuration for a mining run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where JSONL exports and the pattern review document are written
    pub export_dir: PathBuf,
    /// Association support floor (relative to transaction count)
    pub min_support: f64,
    /// Association confidence floor
    pub min_confidence: f64,
    /// Schedule the daily 03:00 mining run
    pub mining_enabled: bool,
    /// History window for a run, in days
    pub days: u32,
    /// Only process events after the previous run's end
    pub incremental: bool,
    /// Minimum signal level for mined entities ("high" or "medium")
    pub min_signal: String,
    /// Entities always included regardless of classification
    pub custom_includes: HashSet<String>,
    /// Entities always excluded regardless of classification
    pub custom_excludes: HashSet<String>,
    /// Entities subject to the 0.90 safety confidence floor, in addition
    /// to the built-in lock/garage/door predicate
    pub safety_entities: HashSet<String>,
    /// Aliases of already-installed automations, used for the advisory
    /// conflict flag
    pub automation_names: Vec<String>,
    /// Transaction window width in seconds
    pub window_seconds: f64,
    /// State changes within this many seconds that trip flap detection
    pub flap_window: f64,
    /// Number of changes within `flap_window` that counts as flapping
    pub flap_threshold: usize,
    /// Optional MySQL-family recorder URL; probed before the SQLite fallback
    pub db_url: Option<String>,
    /// SQLite recorder database path used when no MySQL backend is found
    pub db_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("/config/ha_autopilot/exports"),
            min_support: 0.10,
            min_confidence: 0.75,
            mining_enabled: true,
            days: 30,
            incremental: false,
            min_signal: "medium".to_string(),
            custom_includes: HashSet::new(),
            custom_excludes: HashSet::new(),
            safety_entities: HashSet::new(),
            automation_names: Vec::new(),
            window_seconds: DEFAULT_WINDOW_SECONDS,
            flap_window: 60.0,
            flap_threshold: 5,
            db_url: None,
            db_path: PathBuf::from("/config/home-assistant_v2.db"),
        }
    }
}

impl EngineConfig {
    /// Validate ranges that would otherwise silently break mining.
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.min_support) {
            return Err(crate::Error::Configuration(format!(
                "min_support must be in [0, 1], got {}",
                self.min_support
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(crate::Error::Configuration(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.min_signal != "high" && self.min_signal != "medium" {
            return Err(crate::Error::Configuration(format!(
                "min_signal must be \"high\" or \"medium\", got {:?}",
                self.min_signal
            )));
        }
        if self.days == 0 {
            return Err(crate::Error::Configuration(
                "days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
