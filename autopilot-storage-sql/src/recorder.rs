//! Read-only recorder queries.
//!
//! The recorder schema is assumed, never created: `states_meta`,
//! `states`, and `state_attributes`. Entities are processed in chunks of
//! 50 to bound query size; chunk queries run concurrently up to the read
//! pool's fan-out.

use std::collections::HashMap;

use autopilot_core::{EntityRecord, Error, RecorderStats, Result, StateChange};
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::Row;
use tracing::debug;

use crate::{map_sqlx_err, Dialect, SqlStorage};

/// Entities per recorder query.
pub const ENTITY_CHUNK_SIZE: usize = 50;

impl SqlStorage {
    /// Chunk queries in flight at once: the read pool's configured
    /// capacity, so the fan-out tracks `read_pool_size`.
    fn chunk_fan_out(&self) -> usize {
        (self.read_pool().options().get_max_connections() as usize).max(1)
    }

    pub(crate) async fn entities_impl(&self) -> Result<Vec<EntityRecord>> {
        let rows = self
            .with_timeout(
                sqlx::query("SELECT metadata_id, entity_id FROM states_meta ORDER BY entity_id")
                    .fetch_all(self.read_pool()),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(EntityRecord {
                    metadata_id: row.try_get(0).map_err(map_sqlx_err)?,
                    entity_id: row.try_get(1).map_err(map_sqlx_err)?,
                })
            })
            .collect()
    }

    pub(crate) async fn device_class_impl(&self, entity_id: &str) -> Result<Option<String>> {
        let sql = r"
            SELECT sa.shared_attrs
            FROM states s
            JOIN states_meta sm ON s.metadata_id = sm.metadata_id
            JOIN state_attributes sa ON s.attributes_id = sa.attributes_id
            WHERE sm.entity_id = ?
            AND sa.shared_attrs IS NOT NULL
            ORDER BY s.last_updated_ts DESC
            LIMIT 1
        ";
        let row = self
            .with_timeout(sqlx::query(sql).bind(entity_id).fetch_optional(self.read_pool()))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get(0).map_err(map_sqlx_err)?;

        let attrs: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Malformed(format!("attributes of {entity_id}: {e}")))?;
        Ok(attrs
            .get("device_class")
            .and_then(|v| v.as_str())
            .map(String::from))
    }

    pub(crate) async fn state_changes_impl(
        &self,
        entities: &[String],
        start_ts: f64,
        end_ts: f64,
    ) -> Result<Vec<StateChange>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<Vec<String>> = entities
            .chunks(ENTITY_CHUNK_SIZE)
            .map(<[String]>::to_vec)
            .collect();
        let chunk_results: Vec<Vec<StateChange>> = stream::iter(chunks)
            .map(|chunk| async move { self.state_changes_chunk(&chunk, start_ts, end_ts).await })
            .buffered(self.chunk_fan_out())
            .try_collect()
            .await?;

        // Each chunk is ordered; a stable sort restores the global order
        let mut changes: Vec<StateChange> = chunk_results.into_iter().flatten().collect();
        changes.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        debug!(
            "Extracted {} state changes for {} entities",
            changes.len(),
            entities.len()
        );
        Ok(changes)
    }

    /// LAG window query: emit only rows whose state differs from the
    /// entity's predecessor, with unavailable/unknown filtered before
    /// the comparison.
    async fn state_changes_chunk(
        &self,
        entities: &[String],
        start_ts: f64,
        end_ts: f64,
    ) -> Result<Vec<StateChange>> {
        let placeholders = vec!["?"; entities.len()].join(", ");
        let sql = format!(
            r"
            WITH state_sequence AS (
                SELECT
                    sm.entity_id AS entity_id,
                    s.state AS state,
                    s.last_updated_ts AS last_updated_ts,
                    LAG(s.state) OVER (
                        PARTITION BY sm.entity_id
                        ORDER BY s.last_updated_ts
                    ) AS prev_state
                FROM states s
                JOIN states_meta sm ON s.metadata_id = sm.metadata_id
                WHERE sm.entity_id IN ({placeholders})
                AND s.last_updated_ts >= ?
                AND s.last_updated_ts <= ?
                AND s.state IS NOT NULL
                AND s.state NOT IN ('unavailable', 'unknown')
            )
            SELECT entity_id, prev_state, state, last_updated_ts
            FROM state_sequence
            WHERE state != prev_state OR prev_state IS NULL
            ORDER BY last_updated_ts
            "
        );

        let mut query = sqlx::query(&sql);
        for entity in entities {
            query = query.bind(entity);
        }
        query = query.bind(start_ts).bind(end_ts);

        let rows = self.with_timeout(query.fetch_all(self.read_pool())).await?;
        rows.iter()
            .map(|row| {
                Ok(StateChange {
                    entity_id: row.try_get(0).map_err(map_sqlx_err)?,
                    old_state: row.try_get(1).map_err(map_sqlx_err)?,
                    new_state: row.try_get(2).map_err(map_sqlx_err)?,
                    timestamp: row.try_get(3).map_err(map_sqlx_err)?,
                })
            })
            .collect()
    }

    pub(crate) async fn state_at_impl(
        &self,
        entities: &[String],
        ts: f64,
    ) -> Result<HashMap<String, String>> {
        let mut states = HashMap::new();

        for chunk in entities.chunks(ENTITY_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                r"
                SELECT sm.entity_id, s.state
                FROM states s
                JOIN states_meta sm ON s.metadata_id = sm.metadata_id
                WHERE sm.entity_id IN ({placeholders})
                AND s.last_updated_ts <= ?
                AND s.last_updated_ts = (
                    SELECT MAX(s2.last_updated_ts)
                    FROM states s2
                    JOIN states_meta sm2 ON s2.metadata_id = sm2.metadata_id
                    WHERE sm2.entity_id = sm.entity_id
                    AND s2.last_updated_ts <= ?
                )
                "
            );

            let mut query = sqlx::query(&sql);
            for entity in chunk {
                query = query.bind(entity);
            }
            query = query.bind(ts).bind(ts);

            let rows = self.with_timeout(query.fetch_all(self.read_pool())).await?;
            for row in &rows {
                let entity: String = row.try_get(0).map_err(map_sqlx_err)?;
                let state: Option<String> = row.try_get(1).map_err(map_sqlx_err)?;
                if let Some(state) = state {
                    states.insert(entity, state);
                }
            }
        }

        Ok(states)
    }

    pub(crate) async fn recorder_stats_impl(&self) -> Result<RecorderStats> {
        let states_row = self
            .with_timeout(sqlx::query("SELECT COUNT(*) FROM states").fetch_one(self.read_pool()))
            .await?;
        let total_states: i64 = states_row.try_get(0).map_err(map_sqlx_err)?;

        let meta_row = self
            .with_timeout(
                sqlx::query("SELECT COUNT(*) FROM states_meta").fetch_one(self.read_pool()),
            )
            .await?;
        let entity_count: i64 = meta_row.try_get(0).map_err(map_sqlx_err)?;

        let range_row = self
            .with_timeout(
                sqlx::query(
                    "SELECT MIN(last_updated_ts), MAX(last_updated_ts) FROM states \
                     WHERE last_updated_ts IS NOT NULL",
                )
                .fetch_one(self.read_pool()),
            )
            .await?;

        Ok(RecorderStats {
            total_states,
            entity_count,
            earliest_timestamp: range_row.try_get(0).ok(),
            latest_timestamp: range_row.try_get(1).ok(),
            database_type: match self.dialect() {
                Dialect::Sqlite => "SQLite".to_string(),
                Dialect::MySql => "MySQL".to_string(),
            },
        })
    }
}
