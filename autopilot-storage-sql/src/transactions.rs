//! Transaction persistence, metadata, statistics, and the destructive
//! wipe.

use autopilot_core::storage::{StoreStatistics, TypeStatusStats};
use autopilot_core::{Result, TransactionWindow};
use sqlx::Row;
use tracing::{info, warn};

use crate::schema::{
    create_metadata_table, create_patterns_table, create_sequences_table,
    create_transactions_table, index_statements, TABLE_METADATA, TABLE_PATTERNS,
    TABLE_SEQUENCES, TABLE_TRANSACTIONS,
};
use crate::{map_sqlx_err, SqlStorage};

impl SqlStorage {
    pub(crate) async fn initialize_schema_impl(&self) -> Result<()> {
        let dialect = self.dialect();
        for ddl in [
            create_patterns_table(dialect),
            create_transactions_table(dialect),
            create_sequences_table(dialect),
            create_metadata_table(),
        ] {
            self.with_timeout(sqlx::query(&ddl).execute(self.write_pool()))
                .await?;
        }

        for ddl in index_statements() {
            // MySQL predates IF NOT EXISTS for indexes; a duplicate is fine
            if let Err(e) = self
                .with_timeout(sqlx::query(&ddl).execute(self.write_pool()))
                .await
            {
                tracing::debug!("Index creation note: {e}");
            }
        }

        info!("Pattern storage schema initialized");
        Ok(())
    }

    pub(crate) async fn store_transactions_impl(
        &self,
        transactions: &[TransactionWindow],
    ) -> Result<usize> {
        let now = chrono::Utc::now().timestamp() as f64;

        for window in transactions {
            let items: Vec<&str> = window.items.iter().map(String::as_str).collect();
            let items_json = serde_json::to_string(&items)?;

            self.with_timeout(
                sqlx::query(&format!(
                    "INSERT INTO {TABLE_TRANSACTIONS} (window_start, window_end, \
                     context_day_type, context_time_bucket, items, quality_score, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)"
                ))
                .bind(window.window_start)
                .bind(window.window_end)
                .bind(window.day_type.as_str())
                .bind(window.time_bucket.as_str())
                .bind(&items_json)
                .bind(window.quality_score)
                .bind(now)
                .execute(self.write_pool()),
            )
            .await?;
        }

        info!("Stored {} transactions", transactions.len());
        Ok(transactions.len())
    }

    pub(crate) async fn clear_all_impl(&self) -> Result<()> {
        for table in [TABLE_SEQUENCES, TABLE_PATTERNS, TABLE_TRANSACTIONS] {
            self.with_timeout(
                sqlx::query(&format!("DELETE FROM {table}")).execute(self.write_pool()),
            )
            .await?;
        }
        warn!("All pattern data cleared");
        Ok(())
    }

    pub(crate) async fn statistics_impl(&self) -> Result<StoreStatistics> {
        let rows = self
            .with_timeout(
                sqlx::query(&format!(
                    "SELECT pattern_type, status, COUNT(*), AVG(pattern_score) \
                     FROM {TABLE_PATTERNS} GROUP BY pattern_type, status"
                ))
                .fetch_all(self.write_pool()),
            )
            .await?;

        let mut stats = StoreStatistics::default();
        for row in &rows {
            let pattern_type: String = row.try_get(0).map_err(map_sqlx_err)?;
            let status: Option<String> = row.try_get(1).map_err(map_sqlx_err)?;
            let count: i64 = row.try_get(2).map_err(map_sqlx_err)?;
            let avg_score: Option<f64> = row.try_get(3).map_err(map_sqlx_err)?;

            let key = format!("{pattern_type}_{}", status.as_deref().unwrap_or("active"));
            stats.by_type_status.insert(
                key,
                TypeStatusStats {
                    count,
                    avg_score: avg_score.map_or(0.0, |s| (s * 1000.0).round() / 1000.0),
                },
            );
            stats.total_patterns += count;
        }

        let tx_row = self
            .with_timeout(
                sqlx::query(&format!("SELECT COUNT(*) FROM {TABLE_TRANSACTIONS}"))
                    .fetch_one(self.write_pool()),
            )
            .await?;
        stats.total_transactions = tx_row.try_get(0).map_err(map_sqlx_err)?;

        Ok(stats)
    }

    pub(crate) async fn get_metadata_impl(&self, key: &str) -> Result<Option<String>> {
        let row = self
            .with_timeout(
                sqlx::query(&format!(
                    "SELECT meta_value FROM {TABLE_METADATA} WHERE meta_key = ?"
                ))
                .bind(key)
                .fetch_optional(self.write_pool()),
            )
            .await?;

        match row {
            Some(row) => Ok(row.try_get(0).map_err(map_sqlx_err)?),
            None => Ok(None),
        }
    }

    pub(crate) async fn set_metadata_impl(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp() as f64;
        self.with_timeout(
            sqlx::query(&format!(
                "REPLACE INTO {TABLE_METADATA} (meta_key, meta_value, updated_at) \
                 VALUES (?, ?, ?)"
            ))
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(self.write_pool()),
        )
        .await?;
        Ok(())
    }
}
