//! Pattern table definitions.
//!
//! Everything is created with `IF NOT EXISTS` so schema initialisation
//! is idempotent. Only the autoincrement keyword differs by dialect.

use crate::Dialect;

/// Main pattern table name.
pub const TABLE_PATTERNS: &str = "ha_autopilot_patterns";
/// Transaction window table name.
pub const TABLE_TRANSACTIONS: &str = "ha_autopilot_transactions";
/// Sequence step table name.
pub const TABLE_SEQUENCES: &str = "ha_autopilot_sequences";
/// Run metadata key-value table name.
pub const TABLE_METADATA: &str = "ha_autopilot_metadata";

/// DDL for the patterns table.
#[must_use]
pub fn create_patterns_table(dialect: Dialect) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {TABLE_PATTERNS} (
    pattern_id INTEGER PRIMARY KEY {auto},
    pattern_type TEXT NOT NULL,
    pattern_hash VARCHAR(16) UNIQUE,
    trigger_conditions TEXT NOT NULL,
    action_target TEXT NOT NULL,
    confidence REAL NOT NULL,
    support REAL NOT NULL,
    lift REAL,
    conviction REAL,
    pattern_score REAL NOT NULL,
    first_seen REAL NOT NULL,
    last_seen REAL NOT NULL,
    occurrence_count INTEGER NOT NULL,
    user_feedback TEXT,
    automation_id TEXT,
    suggestion_shown INTEGER NOT NULL DEFAULT 0,
    status TEXT DEFAULT 'active',
    recommendation TEXT,
    deprecated_by INTEGER,
    created_at REAL NOT NULL,
    updated_at REAL NOT NULL
)
",
        auto = dialect.autoincrement()
    )
}

/// DDL for the transactions table.
#[must_use]
pub fn create_transactions_table(dialect: Dialect) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {TABLE_TRANSACTIONS} (
    transaction_id INTEGER PRIMARY KEY {auto},
    window_start REAL NOT NULL,
    window_end REAL NOT NULL,
    context_day_type TEXT,
    context_time_bucket TEXT,
    items TEXT NOT NULL,
    quality_score REAL,
    created_at REAL NOT NULL
)
",
        auto = dialect.autoincrement()
    )
}

/// DDL for the sequence steps table.
#[must_use]
pub fn create_sequences_table(dialect: Dialect) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {TABLE_SEQUENCES} (
    sequence_id INTEGER PRIMARY KEY {auto},
    pattern_id INTEGER NOT NULL,
    step_order INTEGER NOT NULL,
    entity_id TEXT NOT NULL,
    state TEXT NOT NULL,
    typical_delay_seconds INTEGER
)
",
        auto = dialect.autoincrement()
    )
}

/// DDL for the metadata table.
#[must_use]
pub fn create_metadata_table() -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {TABLE_METADATA} (
    meta_key VARCHAR(64) PRIMARY KEY,
    meta_value TEXT,
    updated_at REAL NOT NULL
)
"
    )
}

/// Index DDL, applied best-effort after table creation.
#[must_use]
pub fn index_statements() -> Vec<String> {
    vec![
        format!("CREATE INDEX IF NOT EXISTS idx_patterns_type ON {TABLE_PATTERNS}(pattern_type)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_patterns_score ON {TABLE_PATTERNS}(pattern_score DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_patterns_feedback ON {TABLE_PATTERNS}(user_feedback)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_patterns_status ON {TABLE_PATTERNS}(status)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_transactions_window ON {TABLE_TRANSACTIONS}(window_start, window_end)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_sequences_pattern ON {TABLE_SEQUENCES}(pattern_id)"
        ),
    ]
}
