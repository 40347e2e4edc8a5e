//! Shared plumbing for the end-to-end scenarios: a seeded recorder, a
//! storage backend over it, and an engine pinned to UTC.

use std::path::PathBuf;
use std::sync::Arc;

use autopilot_core::{Engine, EngineConfig};
use autopilot_storage_sql::{SqlStorage, SqlStorageConfig};
use autopilot_test_utils::RecorderFixture;
use chrono::{Duration, FixedOffset, Utc};
use tempfile::TempDir;

/// A recorder fixture wired to a storage backend and an engine.
pub struct World {
    pub fixture: RecorderFixture,
    pub export_dir: TempDir,
}

impl World {
    pub async fn new() -> Self {
        Self {
            fixture: RecorderFixture::new().await,
            export_dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Unix timestamp for `days_ago` days back at `tod_secs` seconds
    /// after UTC midnight. Timestamps land strictly in the past.
    pub fn at(days_ago: i64, tod_secs: f64) -> f64 {
        let midnight = (Utc::now() - Duration::days(days_ago))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight")
            .and_utc()
            .timestamp() as f64;
        midnight + tod_secs
    }

    /// Build the engine over the seeded fixture. UTC offset so
    /// time-of-day assertions are machine-independent.
    pub async fn engine(&self) -> (Engine, Arc<SqlStorage>) {
        self.fixture.close().await;
        let storage = Arc::new(
            SqlStorage::connect(SqlStorageConfig {
                db_path: self.fixture.db_path().to_path_buf(),
                ..Default::default()
            })
            .await
            .expect("connect storage"),
        );

        let config = EngineConfig {
            export_dir: PathBuf::from(self.export_dir.path()),
            ..Default::default()
        };
        let engine = Engine::with_offset(
            storage.clone(),
            storage.clone(),
            config,
            FixedOffset::east_opt(0).expect("utc offset"),
        );
        (engine, storage)
    }
}
