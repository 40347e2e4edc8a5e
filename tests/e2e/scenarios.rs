//! Boundary scenarios run end-to-end: seeded recorder, real storage
//! backend, full engine pipeline.

use autopilot_core::pattern::{ActionSpec, PatternKind};
use autopilot_core::storage::{PatternFilter, PatternStore};
use e2e_tests::World;

#[tokio::test]
async fn test_empty_corpus_stores_nothing() {
    let mut world = World::new().await;
    // An entity exists but has no history
    world.fixture.add_entity("light.lonely").await;

    let (engine, storage) = world.engine().await;
    let metadata = engine.discover_patterns(30, false).await.expect("run");

    assert_eq!(metadata.events_loaded, 0);
    assert_eq!(metadata.transactions_built, 0);
    assert_eq!(metadata.patterns_stored, 0);

    let stats = storage.statistics().await.expect("stats");
    assert_eq!(stats.total_patterns, 0);
}

#[tokio::test]
async fn test_flap_burst_marks_events_and_mines_nothing() {
    let mut world = World::new().await;
    // 12 alternating changes within 30 seconds, then silence
    let start = World::at(2, 36_000.0);
    for i in 0..12 {
        let state = if i % 2 == 0 { "on" } else { "off" };
        world
            .fixture
            .add_state("light.x", state, start + i as f64 * 30.0 / 11.0)
            .await;
    }

    let (engine, storage) = world.engine().await;

    let events = engine.extract_events(30).await.expect("extract");
    assert_eq!(events.len(), 12);
    assert!(events.iter().all(|e| e.during_flap));
    // First event of the burst has no rebound penalty
    assert_eq!(events[0].quality_score, 0.27);
    assert!(events[1..].iter().all(|e| e.quality_score == 0.19));

    // Far fewer than ten transactions: association mining never runs
    let metadata = engine.discover_patterns(30, false).await.expect("run");
    assert!(metadata.transactions_built < 10);
    assert_eq!(metadata.patterns_stored, 0);

    let stored = storage
        .get_patterns(&PatternFilter::default())
        .await
        .expect("get");
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_sunset_correlation_emits_solar_pattern() {
    let mut world = World::new().await;

    // Sun state precedes each evening; porch light times drift so no
    // fixed-clock cluster forms
    for day in 1..=20 {
        let sun_state = if day <= 18 {
            "below_horizon"
        } else {
            "above_horizon"
        };
        let tod = 58_000.0 + f64::from(day) * 400.0;
        world
            .fixture
            .add_state("sun.sun", sun_state, World::at(i64::from(21 - day), tod - 100.0))
            .await;
        world
            .fixture
            .add_state("light.porch", "on", World::at(i64::from(21 - day), tod))
            .await;
        world
            .fixture
            .add_state("light.porch", "off", World::at(i64::from(21 - day), tod + 20_000.0))
            .await;
    }

    let (engine, storage) = world.engine().await;
    let metadata = engine.discover_patterns(30, false).await.expect("run");
    assert!(metadata.patterns_stored > 0);

    let stored = storage
        .get_patterns(&PatternFilter {
            kind: Some(PatternKind::Temporal),
            ..Default::default()
        })
        .await
        .expect("get");

    let solar = stored
        .iter()
        .find(|p| {
            p.triggers.first().is_some_and(|t| t.entity_id == "sun.sun")
                && matches!(&p.action, ActionSpec::Single { state, .. } if state == "on")
        })
        .expect("solar pattern missing");

    assert_eq!(solar.triggers[0].state, "below_horizon");
    assert!((solar.confidence - 0.90).abs() < 1e-9);
    // Discovery scored 0.78; validation adds the short-trigger bonus
    assert!((solar.pattern_score - 0.83).abs() < 1e-9);
    assert_eq!(solar.recommendation.as_str(), "suggest");
    if let ActionSpec::Single { entity_id, service, .. } = &solar.action {
        assert_eq!(entity_id, "light.porch");
        assert_eq!(service, "turn_on");
    } else {
        panic!("expected single action");
    }
}

#[tokio::test]
async fn test_deterministic_schedule_scores_perfectly() {
    let mut world = World::new().await;

    // 30 days of coffee at exactly 07:00:00, off at 09:00
    for day in 1..=30 {
        world
            .fixture
            .add_state("switch.coffee", "on", World::at(day, 25_200.0))
            .await;
        world
            .fixture
            .add_state("switch.coffee", "off", World::at(day, 32_400.0))
            .await;
    }

    let (engine, storage) = world.engine().await;
    let metadata = engine.discover_patterns(45, false).await.expect("run");
    assert_eq!(metadata.events_loaded, 60);

    let stored = storage
        .get_patterns(&PatternFilter {
            kind: Some(PatternKind::Temporal),
            ..Default::default()
        })
        .await
        .expect("get");

    let morning = stored
        .iter()
        .find(|p| p.triggers.first().is_some_and(|t| t.state == "07:00"))
        .expect("schedule pattern missing");

    assert_eq!(morning.confidence, 1.0);
    assert_eq!(morning.pattern_score, 1.0);
    assert_eq!(morning.recommendation.as_str(), "auto_suggest");
    assert_eq!(morning.occurrence_count, 30);
    if let ActionSpec::Single { entity_id, state, service } = &morning.action {
        assert_eq!(entity_id, "switch.coffee");
        assert_eq!(state, "on");
        assert_eq!(service, "turn_on");
    } else {
        panic!("expected single action");
    }
}

#[tokio::test]
async fn test_association_discovered_from_cooccurring_events() {
    let mut world = World::new().await;

    // 15 evenings where the hall light follows the arrival; 25 decoy
    // days keep the pair's support under the breadth ceiling
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

    let (engine, storage) = world.engine().await;
    let metadata = engine.discover_patterns(45, false).await.expect("run");
    assert!(metadata.transactions_built >= 10);

    let associations = storage
        .get_patterns(&PatternFilter {
            kind: Some(PatternKind::Association),
            ..Default::default()
        })
        .await
        .expect("get");

    let arrival = associations
        .iter()
        .find(|p| {
            p.triggers
                .iter()
                .any(|t| t.entity_id == "person.alice" && t.state == "home")
                && matches!(&p.action, ActionSpec::Single { entity_id, .. } if entity_id == "light.hall")
        })
        .expect("arrival association missing");

    assert!(arrival.confidence >= 0.75);
    assert!(arrival.lift.is_some_and(|l| l >= 1.2));
    // Association actions never point back at a trigger entity
    for pattern in &associations {
        let trigger_entities: Vec<&str> =
            pattern.triggers.iter().map(|t| t.entity_id.as_str()).collect();
        for entity in pattern.action.entity_ids() {
            assert!(!trigger_entities.contains(&entity));
        }
    }
}

#[tokio::test]
async fn test_morning_routine_becomes_sequence_pattern() {
    let mut world = World::new().await;

    for day in 1..=12 {
        world
            .fixture
            .add_state("switch.coffee", "on", World::at(day, 25_200.0))
            .await;
        world
            .fixture
            .add_state("light.kitchen", "on", World::at(day, 25_260.0))
            .await;
        world
            .fixture
            .add_state("switch.coffee", "off", World::at(day, 40_000.0))
            .await;
        world
            .fixture
            .add_state("light.kitchen", "off", World::at(day, 41_900.0))
            .await;
    }

    let (engine, storage) = world.engine().await;
    engine.discover_patterns(30, false).await.expect("run");

    let sequences = storage
        .get_patterns(&PatternFilter {
            kind: Some(PatternKind::Sequence),
            ..Default::default()
        })
        .await
        .expect("get");

    let routine = sequences
        .iter()
        .find(|p| {
            p.triggers
                .first()
                .is_some_and(|t| t.entity_id == "switch.coffee" && t.state == "on")
        })
        .expect("morning routine missing");

    if let ActionSpec::Steps { steps } = &routine.action {
        assert_eq!(steps[0].entity_id, "light.kitchen");
        assert_eq!(steps[0].typical_delay_seconds, Some(60));
    } else {
        panic!("expected steps action");
    }
    assert_eq!(routine.occurrence_count, 12);
}
