//! Backend tests against seeded SQLite fixtures.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;

use autopilot_core::pattern::{
    ActionSpec, Pattern, PatternKind, Recommendation, SequenceStep, Trigger, ValidatedPattern,
};
use autopilot_core::storage::{PatternFilter, PatternStore, RecorderBackend, UpsertOutcome};
use autopilot_core::{Feedback, TransactionWindow};
use autopilot_test_utils::RecorderFixture;

use crate::{Dialect, SqlStorage, SqlStorageConfig};

async fn storage_for(fixture: &RecorderFixture) -> SqlStorage {
    fixture.close().await;
    SqlStorage::connect(SqlStorageConfig {
        db_path: fixture.db_path().to_path_buf(),
        ..Default::default()
    })
    .await
    .expect("connect storage")
}

fn validated(trigger: (&str, &str), action_entity: &str, score: f64) -> ValidatedPattern {
    let pattern = Pattern {
        kind: PatternKind::Association,
        triggers: vec![Trigger::new(trigger.0, trigger.1)],
        action: ActionSpec::Single {
            entity_id: action_entity.to_string(),
            state: "on".to_string(),
            service: "turn_on".to_string(),
        },
        confidence: 0.9,
        support: 0.2,
        lift: Some(2.0),
        conviction: Some(2.5),
        pattern_score: score,
        occurrence_count: 5,
        description: "test".to_string(),
    };
    let pattern_hash = pattern.hash();
    ValidatedPattern {
        pattern,
        pattern_hash,
        recommendation: Recommendation::Suggest,
        conflict_warning: false,
    }
}

#[tokio::test]
async fn test_detects_sqlite_dialect() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    assert_eq!(storage.dialect(), Dialect::Sqlite);
}

#[tokio::test]
async fn test_missing_database_is_unavailable() {
    let result = SqlStorage::connect(SqlStorageConfig {
        db_path: "/nonexistent/recorder.db".into(),
        ..Default::default()
    })
    .await;
    assert!(matches!(
        result,
        Err(autopilot_core::Error::StorageUnavailable(_))
    ));
}

#[tokio::test]
async fn test_entities_ordered_by_id() {
    let mut fixture = RecorderFixture::new().await;
    fixture.add_entity("switch.b").await;
    fixture.add_entity("light.a").await;
    let storage = storage_for(&fixture).await;

    let entities = storage.entities().await.expect("entities");
    let ids: Vec<&str> = entities.iter().map(|e| e.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["light.a", "switch.b"]);
}

#[tokio::test]
async fn test_state_changes_skip_repeats_and_unavailable() {
    let mut fixture = RecorderFixture::new().await;
    fixture.add_state("light.a", "on", 1000.0).await;
    fixture.add_state("light.a", "on", 1100.0).await; // repeat, dropped
    fixture.add_state("light.a", "unavailable", 1200.0).await; // filtered at source
    fixture.add_state("light.a", "off", 1300.0).await;
    let storage = storage_for(&fixture).await;

    let changes = storage
        .state_changes(&["light.a".to_string()], 0.0, 2000.0)
        .await
        .expect("state changes");

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].old_state, None);
    assert_eq!(changes[0].new_state, "on");
    // The unavailable row is invisible to the predecessor comparison
    assert_eq!(changes[1].old_state.as_deref(), Some("on"));
    assert_eq!(changes[1].new_state, "off");
}

#[tokio::test]
async fn test_state_changes_merge_across_chunks_in_order() {
    let mut fixture = RecorderFixture::new().await;
    // More entities than one chunk, with interleaved timestamps
    let mut entity_ids = Vec::new();
    for i in 0..60 {
        let entity = format!("light.l{i:02}");
        fixture.add_state(&entity, "on", 1000.0 + f64::from(i)).await;
        fixture
            .add_state(&entity, "off", 5000.0 - f64::from(i))
            .await;
        entity_ids.push(entity);
    }
    let storage = storage_for(&fixture).await;

    let changes = storage
        .state_changes(&entity_ids, 0.0, 10_000.0)
        .await
        .expect("state changes");

    assert_eq!(changes.len(), 120);
    assert!(changes
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[tokio::test]
async fn test_state_at_most_recent_before() {
    let mut fixture = RecorderFixture::new().await;
    fixture.add_state("light.a", "on", 1000.0).await;
    fixture.add_state("light.a", "off", 2000.0).await;
    fixture.add_state("switch.b", "on", 1500.0).await;
    let storage = storage_for(&fixture).await;

    let states = storage
        .state_at(&["light.a".to_string(), "switch.b".to_string()], 1800.0)
        .await
        .expect("state at");

    assert_eq!(states.get("light.a").map(String::as_str), Some("on"));
    assert_eq!(states.get("switch.b").map(String::as_str), Some("on"));

    let early = storage
        .state_at(&["light.a".to_string(), "switch.b".to_string()], 1200.0)
        .await
        .expect("state at");
    assert_eq!(early.get("light.a").map(String::as_str), Some("on"));
    // switch.b has no state yet at 1200
    assert!(!early.contains_key("switch.b"));
}

#[tokio::test]
async fn test_device_class_from_latest_attributes() {
    let mut fixture = RecorderFixture::new().await;
    fixture
        .add_state_with_attrs(
            "binary_sensor.front",
            "off",
            1000.0,
            r#"{"device_class": "door", "friendly_name": "Front"}"#,
        )
        .await;
    fixture.add_entity("light.plain").await;
    let storage = storage_for(&fixture).await;

    assert_eq!(
        storage
            .device_class("binary_sensor.front")
            .await
            .expect("device class")
            .as_deref(),
        Some("door")
    );
    assert_eq!(
        storage.device_class("light.plain").await.expect("device class"),
        None
    );
}

#[tokio::test]
async fn test_malformed_attributes_error() {
    let mut fixture = RecorderFixture::new().await;
    fixture
        .add_state_with_attrs("binary_sensor.broken", "off", 1000.0, "{not json")
        .await;
    let storage = storage_for(&fixture).await;

    assert!(matches!(
        storage.device_class("binary_sensor.broken").await,
        Err(autopilot_core::Error::Malformed(_))
    ));
}

#[tokio::test]
async fn test_schema_initialization_is_idempotent() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("first init");
    storage.initialize_schema().await.expect("second init");
}

#[tokio::test]
async fn test_upsert_inserts_then_accumulates() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    let first = validated(("person.alice", "home"), "light.hall", 0.8);
    let (id, outcome) = storage.upsert_pattern(&first).await.expect("insert");
    assert_eq!(outcome, UpsertOutcome::Inserted);

    let stored = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].pattern_id, id);
    assert_eq!(stored[0].occurrence_count, 5);
    let first_seen = stored[0].first_seen;

    // Second run of the same pattern with updated metrics
    let mut again = validated(("person.alice", "home"), "light.hall", 0.85);
    again.pattern.confidence = 0.95;
    let (same_id, outcome) = storage.upsert_pattern(&again).await.expect("update");
    assert_eq!(same_id, id);
    assert_eq!(outcome, UpsertOutcome::Updated);

    let stored = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].occurrence_count, 10);
    assert_eq!(stored[0].confidence, 0.95);
    assert_eq!(stored[0].first_seen, first_seen);
    assert!(stored[0].last_seen >= first_seen);
}

#[tokio::test]
async fn test_get_patterns_filters_and_order() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    storage
        .upsert_pattern(&validated(("person.a", "home"), "light.one", 0.6))
        .await
        .expect("upsert");
    storage
        .upsert_pattern(&validated(("person.b", "home"), "light.two", 0.9))
        .await
        .expect("upsert");
    storage
        .upsert_pattern(&validated(("person.c", "home"), "light.three", 0.75))
        .await
        .expect("upsert");

    let all = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    let scores: Vec<f64> = all.iter().map(|p| p.pattern_score).collect();
    assert_eq!(scores, vec![0.9, 0.75, 0.6]);

    let strong = storage
        .get_patterns(&PatternFilter {
            min_score: 0.7,
            ..Default::default()
        })
        .await
        .expect("get");
    assert_eq!(strong.len(), 2);

    let limited = storage
        .get_patterns(&PatternFilter {
            limit: Some(1),
            ..Default::default()
        })
        .await
        .expect("get");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].pattern_score, 0.9);

    let sequences = storage
        .get_patterns(&PatternFilter {
            kind: Some(PatternKind::Sequence),
            ..Default::default()
        })
        .await
        .expect("get");
    assert!(sequences.is_empty());
}

#[tokio::test]
async fn test_feedback_round_trip() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    let (id, _) = storage
        .upsert_pattern(&validated(("person.a", "home"), "light.one", 0.8))
        .await
        .expect("upsert");

    storage
        .update_feedback(id, Feedback::Approved)
        .await
        .expect("feedback");
    storage.mark_suggested(id).await.expect("mark");

    let approved = storage
        .get_patterns(&PatternFilter {
            feedback: Some(Feedback::Approved),
            ..Default::default()
        })
        .await
        .expect("get");
    assert_eq!(approved.len(), 1);
    assert!(approved[0].suggestion_shown);

    // Unknown id errors
    assert!(storage.update_feedback(9999, Feedback::Rejected).await.is_err());
}

#[tokio::test]
async fn test_sequence_steps_persisted() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    let pattern = Pattern {
        kind: PatternKind::Sequence,
        triggers: vec![Trigger::new("switch.coffee", "on")],
        action: ActionSpec::Steps {
            steps: vec![
                SequenceStep {
                    entity_id: "light.kitchen".to_string(),
                    state: "on".to_string(),
                    typical_delay_seconds: Some(60),
                },
                SequenceStep {
                    entity_id: "media_player.radio".to_string(),
                    state: "playing".to_string(),
                    typical_delay_seconds: Some(120),
                },
            ],
        },
        confidence: 0.8,
        support: 0.1,
        lift: None,
        conviction: None,
        pattern_score: 0.7,
        occurrence_count: 10,
        description: "routine".to_string(),
    };
    let hash = pattern.hash();
    let validated = ValidatedPattern {
        pattern,
        pattern_hash: hash,
        recommendation: Recommendation::Suggest,
        conflict_warning: false,
    };

    storage.upsert_pattern(&validated).await.expect("upsert");
    // Upsert again: steps replaced, not duplicated
    storage.upsert_pattern(&validated).await.expect("upsert");

    let stored = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert_eq!(stored.len(), 1);
    if let ActionSpec::Steps { steps } = &stored[0].action {
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].typical_delay_seconds, Some(60));
    } else {
        panic!("expected steps action");
    }
}

#[tokio::test]
async fn test_transactions_and_statistics() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    let window = TransactionWindow {
        window_start: 1000.0,
        window_end: 1900.0,
        items: ["light.a:on", "switch.b:on"]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        day_type: autopilot_core::events::DayType::Weekday,
        time_bucket: autopilot_core::TimeBucket::Evening,
        quality_score: 0.9,
        event_count: 2,
    };
    storage
        .store_transactions(&[window.clone(), window])
        .await
        .expect("transactions");

    storage
        .upsert_pattern(&validated(("person.a", "home"), "light.one", 0.8))
        .await
        .expect("upsert");

    let stats = storage.statistics().await.expect("stats");
    assert_eq!(stats.total_patterns, 1);
    assert_eq!(stats.total_transactions, 2);
    assert_eq!(stats.by_type_status["association_active"].count, 1);
}

#[tokio::test]
async fn test_clear_all_wipes_everything() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    storage
        .upsert_pattern(&validated(("person.a", "home"), "light.one", 0.8))
        .await
        .expect("upsert");
    storage.clear_all().await.expect("clear");

    let stats = storage.statistics().await.expect("stats");
    assert_eq!(stats.total_patterns, 0);
    assert_eq!(stats.total_transactions, 0);
}

#[tokio::test]
async fn test_metadata_round_trip() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    assert_eq!(storage.get_metadata("last_run_end").await.expect("get"), None);
    storage
        .set_metadata("last_run_end", "1234.5")
        .await
        .expect("set");
    storage
        .set_metadata("last_run_end", "2345.5")
        .await
        .expect("overwrite");
    assert_eq!(
        storage.get_metadata("last_run_end").await.expect("get").as_deref(),
        Some("2345.5")
    );
}

#[tokio::test]
async fn test_read_pool_is_query_only() {
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;

    // Writing through the read pool must fail
    let result = storage
        .with_timeout(
            sqlx::query("INSERT INTO states_meta (metadata_id, entity_id) VALUES (999, 'x.y')")
                .execute(storage.read_pool()),
        )
        .await;
    assert!(result.is_err());

    // The same write through the write pool succeeds
    let result = storage
        .with_timeout(
            sqlx::query("INSERT INTO states_meta (metadata_id, entity_id) VALUES (999, 'x.y')")
                .execute(storage.write_pool()),
        )
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_rechecking_hash_set_is_stable() {
    // Upserting the same logical patterns twice yields the same hash set
    let fixture = RecorderFixture::new().await;
    let storage = storage_for(&fixture).await;
    storage.initialize_schema().await.expect("init");

    let patterns = vec![
        validated(("person.a", "home"), "light.one", 0.8),
        validated(("person.b", "home"), "light.two", 0.7),
    ];
    for pattern in &patterns {
        storage.upsert_pattern(pattern).await.expect("upsert");
    }
    let first: HashSet<String> = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get")
        .into_iter()
        .map(|p| p.pattern_hash)
        .collect();

    for pattern in &patterns {
        storage.upsert_pattern(pattern).await.expect("upsert");
    }
    let second: HashSet<String> = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get")
        .into_iter()
        .map(|p| p.pattern_hash)
        .collect();

    assert_eq!(first, second);
}
