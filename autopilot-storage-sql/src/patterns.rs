//! Pattern persistence: deduplicating upsert and filtered retrieval.

use autopilot_core::pattern::{ActionSpec, Feedback, PatternKind, PatternStatus, Recommendation};
use autopilot_core::{
    Error, PatternFilter, Result, StoredPattern, UpsertOutcome, ValidatedPattern,
};
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::{debug, info};

use crate::schema::{TABLE_PATTERNS, TABLE_SEQUENCES};
use crate::{map_sqlx_err, SqlStorage};

/// Column list shared by every pattern SELECT.
pub const PATTERN_COLUMNS: &str = "pattern_id, pattern_type, pattern_hash, trigger_conditions, \
     action_target, confidence, support, lift, conviction, pattern_score, first_seen, \
     last_seen, occurrence_count, user_feedback, status, recommendation, suggestion_shown";

impl SqlStorage {
    pub(crate) async fn upsert_pattern_impl(
        &self,
        validated: &ValidatedPattern,
    ) -> Result<(i64, UpsertOutcome)> {
        let pattern = &validated.pattern;
        let hash = &validated.pattern_hash;
        let now = chrono::Utc::now().timestamp() as f64;

        let triggers_json = serde_json::to_string(&pattern.triggers)?;
        let action_json = serde_json::to_string(&pattern.action)?;

        let existing = self
            .with_timeout(
                sqlx::query(&format!(
                    "SELECT pattern_id, occurrence_count FROM {TABLE_PATTERNS} \
                     WHERE pattern_hash = ?"
                ))
                .bind(hash)
                .fetch_optional(self.write_pool()),
            )
            .await?;

        let (pattern_id, outcome) = if let Some(row) = existing {
            let pattern_id: i64 = row.try_get(0).map_err(map_sqlx_err)?;
            let occurrence_count: i64 = row.try_get(1).map_err(map_sqlx_err)?;
            let new_count = occurrence_count + pattern.occurrence_count as i64;

            self.with_timeout(
                sqlx::query(&format!(
                    "UPDATE {TABLE_PATTERNS} SET confidence = ?, support = ?, lift = ?, \
                     conviction = ?, pattern_score = ?, last_seen = ?, occurrence_count = ?, \
                     recommendation = ?, updated_at = ? WHERE pattern_id = ?"
                ))
                .bind(pattern.confidence)
                .bind(pattern.support)
                .bind(pattern.lift)
                .bind(pattern.conviction)
                .bind(pattern.pattern_score)
                .bind(now)
                .bind(new_count)
                .bind(validated.recommendation.as_str())
                .bind(now)
                .bind(pattern_id)
                .execute(self.write_pool()),
            )
            .await?;

            debug!("Updated existing pattern {pattern_id} (hash {hash})");
            (pattern_id, UpsertOutcome::Updated)
        } else {
            let status = if validated.conflict_warning {
                PatternStatus::Conflicting
            } else {
                PatternStatus::Active
            };

            self.with_timeout(
                sqlx::query(&format!(
                    "INSERT INTO {TABLE_PATTERNS} (pattern_type, pattern_hash, \
                     trigger_conditions, action_target, confidence, support, lift, conviction, \
                     pattern_score, first_seen, last_seen, occurrence_count, status, \
                     recommendation, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ))
                .bind(pattern.kind.as_str())
                .bind(hash)
                .bind(&triggers_json)
                .bind(&action_json)
                .bind(pattern.confidence)
                .bind(pattern.support)
                .bind(pattern.lift)
                .bind(pattern.conviction)
                .bind(pattern.pattern_score)
                .bind(now)
                .bind(now)
                .bind(pattern.occurrence_count as i64)
                .bind(status.as_str())
                .bind(validated.recommendation.as_str())
                .bind(now)
                .bind(now)
                .execute(self.write_pool()),
            )
            .await?;

            let row = self
                .with_timeout(
                    sqlx::query(&format!(
                        "SELECT pattern_id FROM {TABLE_PATTERNS} WHERE pattern_hash = ?"
                    ))
                    .bind(hash)
                    .fetch_one(self.write_pool()),
                )
                .await?;
            let pattern_id: i64 = row.try_get(0).map_err(map_sqlx_err)?;

            info!(
                "Stored new pattern {pattern_id} (score {:.2}, hash {hash})",
                pattern.pattern_score
            );
            (pattern_id, UpsertOutcome::Inserted)
        };

        self.replace_sequence_steps(pattern_id, &pattern.action)
            .await?;
        Ok((pattern_id, outcome))
    }

    /// Sequence steps live in their own table, replaced wholesale on
    /// every upsert.
    async fn replace_sequence_steps(&self, pattern_id: i64, action: &ActionSpec) -> Result<()> {
        let ActionSpec::Steps { steps } = action else {
            return Ok(());
        };

        self.with_timeout(
            sqlx::query(&format!(
                "DELETE FROM {TABLE_SEQUENCES} WHERE pattern_id = ?"
            ))
            .bind(pattern_id)
            .execute(self.write_pool()),
        )
        .await?;

        for (order, step) in steps.iter().enumerate() {
            self.with_timeout(
                sqlx::query(&format!(
                    "INSERT INTO {TABLE_SEQUENCES} (pattern_id, step_order, entity_id, state, \
                     typical_delay_seconds) VALUES (?, ?, ?, ?, ?)"
                ))
                .bind(pattern_id)
                .bind(order as i64)
                .bind(&step.entity_id)
                .bind(&step.state)
                .bind(step.typical_delay_seconds.map(|d| d as i64))
                .execute(self.write_pool()),
            )
            .await?;
        }
        Ok(())
    }

    pub(crate) async fn get_patterns_impl(
        &self,
        filter: &PatternFilter,
    ) -> Result<Vec<StoredPattern>> {
        let mut sql =
            format!("SELECT {PATTERN_COLUMNS} FROM {TABLE_PATTERNS} WHERE pattern_score >= ?");
        let mut kind_bind = None;
        let mut status_bind = None;
        let mut feedback_bind = None;

        if let Some(kind) = filter.kind {
            sql.push_str(" AND pattern_type = ?");
            kind_bind = Some(kind.as_str());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            status_bind = Some(status.as_str());
        }
        if let Some(feedback) = filter.feedback {
            sql.push_str(" AND user_feedback = ?");
            feedback_bind = Some(feedback.as_str());
        }
        sql.push_str(" ORDER BY pattern_score DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql).bind(filter.min_score);
        if let Some(kind) = kind_bind {
            query = query.bind(kind);
        }
        if let Some(status) = status_bind {
            query = query.bind(status);
        }
        if let Some(feedback) = feedback_bind {
            query = query.bind(feedback);
        }

        let rows = self.with_timeout(query.fetch_all(self.write_pool())).await?;
        let patterns = rows
            .iter()
            .map(row_to_pattern)
            .collect::<Result<Vec<_>>>()?;

        debug!("Found {} patterns matching filter", patterns.len());
        Ok(patterns)
    }

    pub(crate) async fn update_feedback_impl(
        &self,
        pattern_id: i64,
        feedback: Feedback,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp() as f64;
        let result = self
            .with_timeout(
                sqlx::query(&format!(
                    "UPDATE {TABLE_PATTERNS} SET user_feedback = ?, updated_at = ? \
                     WHERE pattern_id = ?"
                ))
                .bind(feedback.as_str())
                .bind(now)
                .bind(pattern_id)
                .execute(self.write_pool()),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::InvalidInput(format!(
                "no pattern with id {pattern_id}"
            )));
        }
        info!("Pattern {pattern_id} feedback: {}", feedback.as_str());
        Ok(())
    }

    pub(crate) async fn mark_suggested_impl(&self, pattern_id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp() as f64;
        self.with_timeout(
            sqlx::query(&format!(
                "UPDATE {TABLE_PATTERNS} SET suggestion_shown = 1, updated_at = ? \
                 WHERE pattern_id = ?"
            ))
            .bind(now)
            .bind(pattern_id)
            .execute(self.write_pool()),
        )
        .await?;
        Ok(())
    }
}

/// Decode one pattern row.
fn row_to_pattern(row: &AnyRow) -> Result<StoredPattern> {
    let kind_raw: String = row.try_get(1).map_err(map_sqlx_err)?;
    let kind = PatternKind::parse(&kind_raw)
        .ok_or_else(|| Error::Malformed(format!("unknown pattern type {kind_raw:?}")))?;

    let triggers_json: String = row.try_get(3).map_err(map_sqlx_err)?;
    let action_json: String = row.try_get(4).map_err(map_sqlx_err)?;

    let feedback_raw: Option<String> = row.try_get(13).map_err(map_sqlx_err)?;
    let status_raw: Option<String> = row.try_get(14).map_err(map_sqlx_err)?;
    let recommendation_raw: Option<String> = row.try_get(15).map_err(map_sqlx_err)?;
    let suggestion_shown: i64 = row.try_get(16).map_err(map_sqlx_err)?;

    Ok(StoredPattern {
        pattern_id: row.try_get(0).map_err(map_sqlx_err)?,
        kind,
        pattern_hash: row.try_get(2).map_err(map_sqlx_err)?,
        triggers: serde_json::from_str(&triggers_json)?,
        action: serde_json::from_str(&action_json)?,
        confidence: row.try_get(5).map_err(map_sqlx_err)?,
        support: row.try_get(6).map_err(map_sqlx_err)?,
        lift: row.try_get(7).map_err(map_sqlx_err)?,
        conviction: row.try_get(8).map_err(map_sqlx_err)?,
        pattern_score: row.try_get(9).map_err(map_sqlx_err)?,
        first_seen: row.try_get(10).map_err(map_sqlx_err)?,
        last_seen: row.try_get(11).map_err(map_sqlx_err)?,
        occurrence_count: row.try_get::<i64, _>(12).map_err(map_sqlx_err)? as u64,
        user_feedback: feedback_raw.as_deref().and_then(Feedback::parse),
        status: status_raw
            .as_deref()
            .and_then(PatternStatus::parse)
            .unwrap_or(PatternStatus::Active),
        recommendation: recommendation_raw
            .as_deref()
            .and_then(Recommendation::parse)
            .unwrap_or(Recommendation::Review),
        suggestion_shown: suggestion_shown != 0,
    })
}
