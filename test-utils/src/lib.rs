//! Shared test fixtures.
//!
//! [`RecorderFixture`] builds a throwaway SQLite database with the
//! recorder schema (`states_meta`, `states`, `state_attributes`) and
//! helpers to seed entities and state rows. Storage backends under test
//! connect to [`RecorderFixture::db_path`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// A seeded recorder database on disk.
pub struct RecorderFixture {
    _dir: TempDir,
    db_path: PathBuf,
    pool: SqlitePool,
    metadata_ids: HashMap<String, i64>,
    next_metadata_id: i64,
    next_attributes_id: i64,
}

impl RecorderFixture {
    /// Create an empty recorder database in a temp directory.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("recorder.db");

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
            .expect("sqlite options")
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("connect fixture db");

        for ddl in [
            "CREATE TABLE states_meta (metadata_id INTEGER PRIMARY KEY, entity_id TEXT NOT NULL)",
            "CREATE TABLE states (
                state_id INTEGER PRIMARY KEY AUTOINCREMENT,
                metadata_id INTEGER NOT NULL,
                state TEXT,
                last_updated_ts REAL,
                attributes_id INTEGER
            )",
            "CREATE TABLE state_attributes (
                attributes_id INTEGER PRIMARY KEY,
                shared_attrs TEXT
            )",
        ] {
            sqlx::query(ddl).execute(&pool).await.expect("create table");
        }

        Self {
            _dir: dir,
            db_path,
            pool,
            metadata_ids: HashMap::new(),
            next_metadata_id: 1,
            next_attributes_id: 1,
        }
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Register an entity. Idempotent; returns its metadata id.
    pub async fn add_entity(&mut self, entity_id: &str) -> i64 {
        if let Some(&id) = self.metadata_ids.get(entity_id) {
            return id;
        }
        let id = self.next_metadata_id;
        self.next_metadata_id += 1;

        sqlx::query("INSERT INTO states_meta (metadata_id, entity_id) VALUES (?, ?)")
            .bind(id)
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .expect("insert entity");
        self.metadata_ids.insert(entity_id.to_string(), id);
        id
    }

    /// Insert a state row.
    pub async fn add_state(&mut self, entity_id: &str, state: &str, ts: f64) {
        let metadata_id = self.add_entity(entity_id).await;
        sqlx::query(
            "INSERT INTO states (metadata_id, state, last_updated_ts, attributes_id) \
             VALUES (?, ?, ?, NULL)",
        )
        .bind(metadata_id)
        .bind(state)
        .bind(ts)
        .execute(&self.pool)
        .await
        .expect("insert state");
    }

    /// Insert a state row carrying an attributes blob (e.g. a
    /// `device_class`).
    pub async fn add_state_with_attrs(
        &mut self,
        entity_id: &str,
        state: &str,
        ts: f64,
        shared_attrs: &str,
    ) {
        let metadata_id = self.add_entity(entity_id).await;
        let attributes_id = self.next_attributes_id;
        self.next_attributes_id += 1;

        sqlx::query("INSERT INTO state_attributes (attributes_id, shared_attrs) VALUES (?, ?)")
            .bind(attributes_id)
            .bind(shared_attrs)
            .execute(&self.pool)
            .await
            .expect("insert attributes");

        sqlx::query(
            "INSERT INTO states (metadata_id, state, last_updated_ts, attributes_id) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(metadata_id)
        .bind(state)
        .bind(ts)
        .bind(attributes_id)
        .execute(&self.pool)
        .await
        .expect("insert state");
    }

    /// Insert an alternating on/off history for an entity: `count`
    /// changes starting at `start_ts`, `gap` seconds apart.
    pub async fn add_toggle_history(
        &mut self,
        entity_id: &str,
        start_ts: f64,
        gap: f64,
        count: usize,
    ) {
        for i in 0..count {
            let state = if i % 2 == 0 { "on" } else { "off" };
            self.add_state(entity_id, state, start_ts + i as f64 * gap)
                .await;
        }
    }

    /// Close the fixture's own handle so backends see a quiesced file.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
