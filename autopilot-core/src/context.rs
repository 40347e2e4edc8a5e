//! Context enrichment.
//!
//! Consumes the state-change stream once and attaches temporal fields,
//! a concurrent-state snapshot, and nearby changes to every event.
//! Events are buffered in groups of up to [`BUFFER_SIZE`] so the
//! concurrent-change scan never needs the whole corpus in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use tracing::debug;

use crate::events::{ConcurrentChange, EnrichedEvent, StateChange, TimeBucket};
use crate::storage::RecorderBackend;
use crate::{Error, Result};

/// Events held back for the concurrent-change scan.
pub const BUFFER_SIZE: usize = 100;

/// Seconds within which two changes count as concurrent.
pub const CONCURRENT_WINDOW: f64 = 60.0;

/// Entity carrying the sun elevation state.
pub const SUN_ENTITY: &str = "sun.sun";

/// Run-local cache for point-in-time state queries.
///
/// Keyed by the query timestamp; events sharing a timestamp (and repeat
/// lookups during export) hit the cache instead of the recorder. The
/// cache lives for one run and is dropped with the builder.
pub struct SnapshotCache {
    recorder: Arc<dyn RecorderBackend>,
    cache: HashMap<u64, HashMap<String, String>>,
    hits: u64,
    misses: u64,
}

impl SnapshotCache {
    #[must_use]
    pub fn new(recorder: Arc<dyn RecorderBackend>) -> Self {
        Self {
            recorder,
            cache: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Most recent state at or before `ts` for each entity.
    pub async fn state_at(
        &mut self,
        entities: &[String],
        ts: f64,
    ) -> Result<HashMap<String, String>> {
        let key = ts.to_bits();
        if let Some(snapshot) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(snapshot.clone());
        }

        let snapshot = self.recorder.state_at(entities, ts).await?;
        self.misses += 1;
        self.cache.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    /// (hits, misses) counters for run diagnostics.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// Builds [`EnrichedEvent`]s from raw state changes.
///
/// Output order is stable with respect to input order, including
/// timestamp ties.
pub struct ContextBuilder {
    snapshots: SnapshotCache,
    context_entities: Vec<String>,
    offset: FixedOffset,
    last_change: HashMap<String, f64>,
}

impl ContextBuilder {
    /// `context_entities` is the set whose states are snapshotted per
    /// event; it should include `sun.sun` when solar patterns are wanted.
    #[must_use]
    pub fn new(
        recorder: Arc<dyn RecorderBackend>,
        context_entities: Vec<String>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            snapshots: SnapshotCache::new(recorder),
            context_entities,
            offset,
            last_change: HashMap::new(),
        }
    }

    /// Enrich a stream of state changes, preserving order.
    pub async fn enrich(
        &mut self,
        events: impl IntoIterator<Item = StateChange>,
    ) -> Result<Vec<EnrichedEvent>> {
        let mut enriched = Vec::new();
        let mut buffer: Vec<EnrichedEvent> = Vec::with_capacity(BUFFER_SIZE);

        for change in events {
            let event = self.temporal_fields(change)?;
            buffer.push(event);

            if buffer.len() >= BUFFER_SIZE {
                self.process_buffer(&mut buffer, &mut enriched).await?;
            }
        }

        if !buffer.is_empty() {
            self.process_buffer(&mut buffer, &mut enriched).await?;
        }

        let (hits, misses) = self.snapshots.counters();
        debug!("Context enrichment done: {} events, snapshot cache {hits} hits / {misses} misses", enriched.len());
        Ok(enriched)
    }

    /// Attach temporal fields and the per-entity change gap.
    fn temporal_fields(&mut self, change: StateChange) -> Result<EnrichedEvent> {
        let secs = change.timestamp.floor() as i64;
        let nanos = ((change.timestamp - change.timestamp.floor()) * 1e9) as u32;
        let utc = DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
            Error::InvalidInput(format!("timestamp out of range: {}", change.timestamp))
        })?;
        let local = utc.with_timezone(&self.offset);

        let seconds_since_last_change = self
            .last_change
            .get(&change.entity_id)
            .map(|prev| change.timestamp - prev);
        self.last_change
            .insert(change.entity_id.clone(), change.timestamp);

        let weekday = local.weekday().num_days_from_monday();
        let hour = local.hour();

        Ok(EnrichedEvent {
            entity_id: change.entity_id,
            old_state: change.old_state,
            new_state: change.new_state,
            timestamp: change.timestamp,
            hour,
            minute: local.minute(),
            weekday,
            is_weekend: weekday >= 5,
            date: local.format("%Y-%m-%d").to_string(),
            seconds_since_last_change,
            time_bucket: TimeBucket::from_hour(hour),
            sun_position: None,
            concurrent_states: BTreeMap::new(),
            concurrent_changes: Vec::new(),
            people_home: 0,
            anyone_home: false,
            during_flap: false,
            quality_score: 1.0,
        })
    }

    /// Resolve concurrent states and nearby changes for a full buffer.
    async fn process_buffer(
        &mut self,
        buffer: &mut Vec<EnrichedEvent>,
        out: &mut Vec<EnrichedEvent>,
    ) -> Result<()> {
        // Nearby changes first, while the buffer is intact
        for i in 0..buffer.len() {
            let ts = buffer[i].timestamp;
            let entity = buffer[i].entity_id.clone();
            let nearby: Vec<ConcurrentChange> = buffer
                .iter()
                .filter(|other| {
                    other.entity_id != entity
                        && (other.timestamp - ts).abs() <= CONCURRENT_WINDOW
                })
                .map(|other| ConcurrentChange {
                    entity_id: other.entity_id.clone(),
                    new_state: other.new_state.clone(),
                    offset_seconds: other.timestamp - ts,
                })
                .collect();
            buffer[i].concurrent_changes = nearby;
        }

        for mut event in buffer.drain(..) {
            let mut snapshot = self
                .snapshots
                .state_at(&self.context_entities, event.timestamp)
                .await?;

            snapshot.remove(&event.entity_id);
            event.sun_position = snapshot.remove(SUN_ENTITY);
            event.concurrent_states = snapshot.into_iter().collect();

            out.push(event);
        }
        Ok(())
    }

    /// Local-time UTC offset in seconds, for time-of-day math downstream.
    #[must_use]
    pub fn offset_seconds(&self) -> i32 {
        self.offset.local_minus_utc()
    }
}

/// Apply derived features in place: time bucket and presence counts.
/// Called after the noise filter has stamped the surviving events.
pub fn apply_derived_features(event: &mut EnrichedEvent) {
    event.time_bucket = TimeBucket::from_hour(event.hour);

    let home_count = event
        .concurrent_states
        .iter()
        .filter(|(entity, state)| entity.starts_with("person.") && state.as_str() == "home")
        .count();
    event.people_home = home_count;
    event.anyone_home = home_count > 0;
}
