//! Cross-cutting invariants checked over full engine runs.

use std::collections::{HashMap, HashSet};

use autopilot_core::export::PatternExport;
use autopilot_core::pattern::{
    ActionSpec, Pattern, PatternKind, Recommendation, Trigger, ValidatedPattern,
};
use autopilot_core::storage::{PatternFilter, PatternStore};
use autopilot_core::{PatternValidator, RejectionReason, ValidatorConfig};
use e2e_tests::World;

/// Seed a fixture rich enough to exercise all three miners.
async fn seed_mixed_history(world: &mut World) {
    for day in 1..=15 {
        let day = i64::from(day);
        world
            .fixture
            .add_state("person.alice", "home", World::at(day, 64_800.0))
            .await;
        world
            .fixture
            .add_state("light.hall", "on", World::at(day, 65_100.0))
            .await;
        world
            .fixture
            .add_state("person.alice", "away", World::at(day, 82_800.0))
            .await;
        world
            .fixture
            .add_state("light.hall", "off", World::at(day, 83_400.0))
            .await;
    }
    for day in 16..=40 {
        let day = i64::from(day);
        world
            .fixture
            .add_state("switch.decoy", "on", World::at(day, 43_200.0))
            .await;
        world
            .fixture
            .add_state("media_player.tv", "playing", World::at(day, 43_500.0))
            .await;
        world
            .fixture
            .add_state("switch.decoy", "off", World::at(day, 72_000.0))
            .await;
        world
            .fixture
            .add_state("media_player.tv", "paused", World::at(day, 72_300.0))
            .await;
    }
}

#[tokio::test]
async fn test_stored_metrics_stay_in_range() {
    let mut world = World::new().await;
    seed_mixed_history(&mut world).await;

    let (engine, storage) = world.engine().await;
    engine.discover_patterns(45, false).await.expect("run");

    let stored = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert!(!stored.is_empty());

    for pattern in &stored {
        assert!((0.0..=1.0).contains(&pattern.support), "support out of range");
        assert!(
            (0.0..=1.0).contains(&pattern.confidence),
            "confidence out of range"
        );
        assert!(
            (0.0..=1.0).contains(&pattern.pattern_score),
            "score out of range"
        );
        if let Some(lift) = pattern.lift {
            assert!(lift >= 0.0);
        }
        if let Some(conviction) = pattern.conviction {
            assert!(conviction >= 0.0);
        }
        assert_eq!(pattern.pattern_hash.len(), 16);

        // Breadth bounds hold for everything persisted
        assert!(pattern.support <= 0.40);
        assert!(pattern.support >= 0.02 || pattern.occurrence_count >= 3);
    }
}

#[tokio::test]
async fn test_remining_is_idempotent_on_hashes() {
    let mut world = World::new().await;
    seed_mixed_history(&mut world).await;

    let (engine, storage) = world.engine().await;
    engine.discover_patterns(45, false).await.expect("first run");

    let first: HashMap<String, u64> = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get")
        .into_iter()
        .map(|p| (p.pattern_hash, p.occurrence_count))
        .collect();

    engine.discover_patterns(45, false).await.expect("second run");

    let second: HashMap<String, u64> = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get")
        .into_iter()
        .map(|p| (p.pattern_hash, p.occurrence_count))
        .collect();

    let first_hashes: HashSet<&String> = first.keys().collect();
    let second_hashes: HashSet<&String> = second.keys().collect();
    assert_eq!(first_hashes, second_hashes);

    // Upsert accumulates the reported delta
    for (hash, count) in &first {
        assert!(second[hash] > *count, "occurrence count did not grow");
    }
}

#[tokio::test]
async fn test_export_round_trip_preserves_order() {
    let mut world = World::new().await;
    seed_mixed_history(&mut world).await;

    let (engine, storage) = world.engine().await;
    engine.discover_patterns(45, false).await.expect("run");

    let (json_path, yaml_path) = engine.export_patterns(0.5).await.expect("export");

    let stored = storage
        .get_patterns(&PatternFilter {
            min_score: 0.5,
            ..Default::default()
        })
        .await
        .expect("get");

    let export = PatternExport::read_from(&json_path).expect("read back");
    assert_eq!(export.pattern_count, stored.len());

    let exported_ids: Vec<i64> = export.patterns.iter().map(|p| p.id).collect();
    let stored_ids: Vec<i64> = stored.iter().map(|p| p.pattern_id).collect();
    assert_eq!(exported_ids, stored_ids);

    let scores: Vec<f64> = export.patterns.iter().map(|p| p.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    // The YAML draft parses and ids carry the expected shape
    let raw = std::fs::read_to_string(&yaml_path).expect("read yaml");
    let drafts: serde_yaml::Value = serde_yaml::from_str(&raw).expect("parse yaml");
    if let serde_yaml::Value::Sequence(items) = &drafts {
        assert!(!items.is_empty());
        for item in items {
            let id = item["id"].as_str().expect("id");
            assert!(id.starts_with("autopilot_"));
        }
    } else {
        panic!("expected a YAML list");
    }
}

#[tokio::test]
async fn test_safety_floor_holds_in_store() {
    let world = World::new().await;
    let (_engine, storage) = world.engine().await;
    storage.initialize_schema().await.expect("init");

    let validator = PatternValidator::new(ValidatorConfig::default());

    let mut risky = Pattern {
        kind: PatternKind::Association,
        triggers: vec![Trigger::new("person.alice", "home")],
        action: ActionSpec::Single {
            entity_id: "lock.front_door".to_string(),
            state: "unlocked".to_string(),
            service: "unlock".to_string(),
        },
        confidence: 0.82,
        support: 0.2,
        lift: Some(2.0),
        conviction: Some(2.0),
        pattern_score: 0.8,
        occurrence_count: 20,
        description: "risky unlock".to_string(),
    };

    assert_eq!(
        validator.validate(risky.clone()).unwrap_err(),
        RejectionReason::SafetyCheck
    );

    risky.confidence = 0.91;
    let validated = validator.validate(risky).expect("accepted at 0.91");
    storage.upsert_pattern(&validated).await.expect("upsert");

    // Everything persisted with a safety action satisfies the floor
    let stored = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    for pattern in &stored {
        let safety = pattern
            .action
            .entity_ids()
            .iter()
            .any(|e| e.starts_with("lock.") || e.contains("garage") || e.contains("door"));
        if safety {
            assert!(pattern.confidence >= 0.90);
        }
    }
}

#[tokio::test]
async fn test_incremental_run_skips_processed_events() {
    let mut world = World::new().await;
    seed_mixed_history(&mut world).await;

    let (engine, storage) = world.engine().await;
    engine.discover_patterns(45, false).await.expect("full run");

    let counts_before: HashMap<String, u64> = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get")
        .into_iter()
        .map(|p| (p.pattern_hash, p.occurrence_count))
        .collect();

    // Nothing new since the last run: the incremental window is empty
    let metadata = engine.discover_patterns(45, true).await.expect("incremental");
    assert_eq!(metadata.events_loaded, 0);
    assert_eq!(metadata.patterns_stored, 0);

    let counts_after: HashMap<String, u64> = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get")
        .into_iter()
        .map(|p| (p.pattern_hash, p.occurrence_count))
        .collect();
    assert_eq!(counts_before, counts_after);
}

#[tokio::test]
async fn test_clear_requires_confirmation() {
    let mut world = World::new().await;
    seed_mixed_history(&mut world).await;

    let (engine, storage) = world.engine().await;
    engine.discover_patterns(45, false).await.expect("run");

    assert!(engine.clear_patterns(false).await.is_err());
    let remaining = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert!(!remaining.is_empty());

    engine.clear_patterns(true).await.expect("clear");
    let remaining = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_hash_ignores_metrics() {
    let pattern = Pattern {
        kind: PatternKind::Association,
        triggers: vec![
            Trigger::new("person.alice", "home"),
            Trigger::new("binary_sensor.hall_motion", "on"),
        ],
        action: ActionSpec::Single {
            entity_id: "light.hall".to_string(),
            state: "on".to_string(),
            service: "turn_on".to_string(),
        },
        confidence: 0.8,
        support: 0.2,
        lift: Some(2.0),
        conviction: Some(2.0),
        pattern_score: 0.7,
        occurrence_count: 10,
        description: "first".to_string(),
    };

    let mut tweaked = pattern.clone();
    tweaked.confidence = 0.99;
    tweaked.occurrence_count = 500;
    tweaked.pattern_score = 0.1;
    tweaked.description = "second".to_string();
    tweaked.triggers.reverse();

    assert_eq!(pattern.hash(), tweaked.hash());
}

#[tokio::test]
async fn test_conflicting_status_recorded_on_insert() {
    let world = World::new().await;
    let (_engine, storage) = world.engine().await;
    storage.initialize_schema().await.expect("init");

    let pattern = Pattern {
        kind: PatternKind::Association,
        triggers: vec![Trigger::new("person.alice", "home")],
        action: ActionSpec::Single {
            entity_id: "light.hall".to_string(),
            state: "on".to_string(),
            service: "turn_on".to_string(),
        },
        confidence: 0.9,
        support: 0.2,
        lift: Some(2.0),
        conviction: Some(2.0),
        pattern_score: 0.8,
        occurrence_count: 10,
        description: "conflicting".to_string(),
    };
    let hash = pattern.hash();
    let validated = ValidatedPattern {
        pattern,
        pattern_hash: hash,
        recommendation: Recommendation::Suggest,
        conflict_warning: true,
    };

    storage.upsert_pattern(&validated).await.expect("upsert");
    let stored = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert_eq!(
        stored[0].status,
        autopilot_core::pattern::PatternStatus::Conflicting
    );
}
