// SPDX-License-Identifier: MIT

//! Live activity engine.
//!
//! Coordinates one write for one user:
//! 1. Load the stored snapshot (or start an empty one for today)
//! 2. Roll it over if its day has ended
//! 3. Resolve the update against it
//! 4. Compare-and-set the result, re-reading and retrying on conflict
//! 5. Publish the committed snapshot
//!
//! Reads go through the same rollover gate, so no caller ever sees
//! yesterday's counters as today's.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{ConfigError, EngineConfig};
use crate::db::{ActivityStore, CasOutcome, RolloverCommit, StoreError};
use crate::models::{DailyArchiveEntry, LiveActivitySnapshot, PointsAward, ProducerReport, SourceUpdate};
use crate::services::normalizer::{normalize, NormalizeError};
use crate::services::publisher::LivePublisher;
use crate::services::resolver::{DropReason, Resolution, Resolver};
use crate::services::rollover::{RolloverDecision, RolloverManager};
use crate::time_utils::Clock;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("Write for user {user_id} lost {attempts} consecutive races")]
    ContentionExhausted { user_id: String, attempts: u32 },
}

/// Counters for everything the engine drops or retries.
#[derive(Debug, Default)]
pub struct EngineDiagnostics {
    applied: AtomicU64,
    stale: AtomicU64,
    suppressed: AtomicU64,
    not_greater: AtomicU64,
    duplicate: AtomicU64,
    previous_day: AtomicU64,
    rejected: AtomicU64,
    conflicts: AtomicU64,
    rollovers: AtomicU64,
    duplicate_archives: AtomicU64,
    publish_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub applied: u64,
    pub stale: u64,
    pub suppressed: u64,
    pub not_greater: u64,
    pub duplicate: u64,
    pub previous_day: u64,
    pub rejected: u64,
    pub conflicts: u64,
    pub rollovers: u64,
    pub duplicate_archives: u64,
    pub publish_failures: u64,
}

impl EngineDiagnostics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, resolution: &Resolution) {
        if !resolution.applied.is_empty() {
            Self::bump(&self.applied);
        }
        for dropped in &resolution.dropped {
            let counter = match dropped.reason {
                DropReason::Stale => &self.stale,
                DropReason::Suppressed => &self.suppressed,
                DropReason::NotGreater => &self.not_greater,
                DropReason::Duplicate => &self.duplicate,
                DropReason::PreviousDay => &self.previous_day,
                DropReason::WrongSource | DropReason::Invalid => &self.rejected,
            };
            Self::bump(counter);
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            applied: load(&self.applied),
            stale: load(&self.stale),
            suppressed: load(&self.suppressed),
            not_greater: load(&self.not_greater),
            duplicate: load(&self.duplicate),
            previous_day: load(&self.previous_day),
            rejected: load(&self.rejected),
            conflicts: load(&self.conflicts),
            rollovers: load(&self.rollovers),
            duplicate_archives: load(&self.duplicate_archives),
            publish_failures: load(&self.publish_failures),
        }
    }
}

/// Snapshot as read through the rollover gate, with the revision to CAS on.
struct Gated {
    snapshot: LiveActivitySnapshot,
    expected: Option<u64>,
}

/// Serializes all writes to a user's snapshot through compare-and-set.
pub struct LiveActivityEngine<S, P> {
    store: S,
    publisher: P,
    clock: Arc<dyn Clock>,
    resolver: Resolver,
    max_attempts: u32,
    diagnostics: EngineDiagnostics,
}

impl<S: ActivityStore, P: LivePublisher> LiveActivityEngine<S, P> {
    pub fn new(
        store: S,
        publisher: P,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            store,
            publisher,
            clock,
            resolver: Resolver::from_config(config)?,
            max_attempts: config.max_write_attempts.max(1),
            diagnostics: EngineDiagnostics::default(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Current snapshot for `user_id`, rolled over if its day has ended.
    pub async fn snapshot(&self, user_id: &str) -> Result<LiveActivitySnapshot, EngineError> {
        Ok(self.gate(user_id).await?.snapshot)
    }

    /// Normalize a raw producer report and apply it.
    pub async fn ingest(
        &self,
        user_id: &str,
        report: &ProducerReport,
    ) -> Result<Resolution, EngineError> {
        let update = normalize(report, self.clock.now())?;
        self.apply(user_id, &update).await
    }

    /// Apply one update. Returns the resolution that was committed (or that
    /// required no write).
    pub async fn apply(
        &self,
        user_id: &str,
        update: &SourceUpdate,
    ) -> Result<Resolution, EngineError> {
        let resolver = self.resolver;
        self.write(user_id, |current| resolver.resolve(current, update))
            .await
    }

    /// Add an explicit point award.
    pub async fn award_points(
        &self,
        user_id: &str,
        award: &PointsAward,
    ) -> Result<Resolution, EngineError> {
        let resolver = self.resolver;
        self.write(user_id, |current| resolver.award_points(current, award))
            .await
    }

    /// Archived days, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<DailyArchiveEntry>, EngineError> {
        // Touch the gate so a day that just ended shows up in the history.
        self.gate(user_id).await?;
        Ok(self.store.list_archive(user_id, limit).await?)
    }

    async fn write<F>(&self, user_id: &str, resolve: F) -> Result<Resolution, EngineError>
    where
        F: Fn(&LiveActivitySnapshot) -> Resolution,
    {
        for attempt in 1..=self.max_attempts {
            let Gated { snapshot: current, expected } = self.gate(user_id).await?;

            let mut resolution = resolve(&current);
            if !resolution.changed_from(&current) {
                self.log_drops(user_id, &resolution);
                self.diagnostics.record(&resolution);
                return Ok(resolution);
            }

            resolution.snapshot.revision = current.revision + 1;
            match self
                .store
                .compare_and_swap_snapshot(user_id, expected, &resolution.snapshot)
                .await?
            {
                CasOutcome::Committed => {
                    tracing::debug!(
                        user_id,
                        revision = resolution.snapshot.revision,
                        applied = ?resolution.applied,
                        "Committed snapshot"
                    );
                    self.log_drops(user_id, &resolution);
                    self.diagnostics.record(&resolution);
                    self.publish(user_id, &resolution.snapshot);
                    return Ok(resolution);
                }
                CasOutcome::Conflict => {
                    EngineDiagnostics::bump(&self.diagnostics.conflicts);
                    tracing::debug!(user_id, attempt, "Snapshot write conflict, retrying");
                }
            }
        }

        tracing::warn!(user_id, attempts = self.max_attempts, "Giving up on contended write");
        Err(EngineError::ContentionExhausted {
            user_id: user_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Load the snapshot, committing a rollover first if the day has ended.
    async fn gate(&self, user_id: &str) -> Result<Gated, EngineError> {
        for attempt in 1..=self.max_attempts {
            let today = self.clock.today();

            let Some(snapshot) = self.store.load_snapshot(user_id).await? else {
                return Ok(Gated {
                    snapshot: LiveActivitySnapshot::empty(today),
                    expected: None,
                });
            };

            // Weight is only needed for the archive entry.
            let weight_kg = if snapshot.date != today {
                self.store
                    .get_profile(user_id)
                    .await?
                    .and_then(|p| p.body_weight_kg)
            } else {
                None
            };

            let RolloverDecision::NewDay { archive, reset } =
                RolloverManager::check(user_id, &snapshot, today, weight_kg, self.clock.now())
            else {
                let expected = Some(snapshot.revision);
                return Ok(Gated { snapshot, expected });
            };

            match self
                .store
                .commit_rollover(user_id, Some(snapshot.revision), &archive, &reset)
                .await?
            {
                RolloverCommit::Applied { archive_created } => {
                    EngineDiagnostics::bump(&self.diagnostics.rollovers);
                    if archive_created {
                        tracing::info!(user_id, date = %archive.date, steps = archive.steps, "Archived day");
                    } else {
                        EngineDiagnostics::bump(&self.diagnostics.duplicate_archives);
                        tracing::warn!(user_id, date = %archive.date, "Archive entry already existed, kept original");
                    }
                    self.publish(user_id, &reset);
                    let expected = Some(reset.revision);
                    return Ok(Gated {
                        snapshot: reset,
                        expected,
                    });
                }
                RolloverCommit::Conflict => {
                    EngineDiagnostics::bump(&self.diagnostics.conflicts);
                    tracing::debug!(user_id, attempt, "Rollover raced another writer, re-reading");
                }
            }
        }

        Err(EngineError::ContentionExhausted {
            user_id: user_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    fn publish(&self, user_id: &str, snapshot: &LiveActivitySnapshot) {
        if let Err(e) = self.publisher.publish(user_id, snapshot) {
            EngineDiagnostics::bump(&self.diagnostics.publish_failures);
            tracing::warn!(user_id, error = %e, "Failed to publish snapshot");
        }
    }

    fn log_drops(&self, user_id: &str, resolution: &Resolution) {
        for dropped in &resolution.dropped {
            tracing::debug!(
                user_id,
                metric = ?dropped.metric,
                reason = ?dropped.reason,
                "Update field not applied"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{AwardReason, Source, UserProfile};
    use crate::services::publisher::{BroadcastHub, PublishError};
    use crate::time_utils::ManualClock;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    struct FailingPublisher;

    impl LivePublisher for FailingPublisher {
        fn publish(&self, _: &str, _: &LiveActivitySnapshot) -> Result<(), PublishError> {
            Err(PublishError::Unavailable("down".to_string()))
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn engine_at(
        now: DateTime<Utc>,
    ) -> (LiveActivityEngine<MemoryStore, BroadcastHub>, ManualClock, BroadcastHub) {
        let clock = ManualClock::new(now);
        let hub = BroadcastHub::default();
        let engine = LiveActivityEngine::new(
            MemoryStore::new(),
            hub.clone(),
            Arc::new(clock.clone()),
            &EngineConfig::default(),
        )
        .unwrap();
        (engine, clock, hub)
    }

    #[tokio::test]
    async fn test_read_of_unknown_user_is_empty_and_not_persisted() {
        let (engine, _, _) = engine_at(noon());

        let snapshot = engine.snapshot("u1").await.unwrap();
        assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(snapshot.steps, 0);
        assert!(engine.store().load_snapshot("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_commits_and_publishes() {
        let (engine, _, hub) = engine_at(noon());
        let mut rx = hub.subscribe("u1");

        let update = SourceUpdate::new(Source::Watch, noon()).with_steps(500);
        let resolution = engine.apply("u1", &update).await.unwrap();

        assert_eq!(resolution.snapshot.revision, 1);
        let published = rx.recv().await.unwrap();
        assert_eq!(published.steps, 500);
        assert_eq!(published.revision, 1);
    }

    #[tokio::test]
    async fn test_unchanged_resolution_does_not_write() {
        let (engine, _, hub) = engine_at(noon());
        let update = SourceUpdate::new(Source::Watch, noon()).with_steps(500);
        engine.apply("u1", &update).await.unwrap();

        let mut rx = hub.subscribe("u1");
        let suppressed = SourceUpdate::new(Source::Phone, noon() + Duration::seconds(30)).with_steps(520);
        let resolution = engine.apply("u1", &suppressed).await.unwrap();

        assert_eq!(resolution.snapshot.revision, 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.diagnostics().suppressed, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_write() {
        let engine = LiveActivityEngine::new(
            MemoryStore::new(),
            FailingPublisher,
            Arc::new(ManualClock::new(noon())),
            &EngineConfig::default(),
        )
        .unwrap();

        let update = SourceUpdate::new(Source::Watch, noon()).with_steps(500);
        engine.apply("u1", &update).await.unwrap();

        assert_eq!(engine.snapshot("u1").await.unwrap().steps, 500);
        assert_eq!(engine.diagnostics().publish_failures, 1);
    }

    #[tokio::test]
    async fn test_rollover_on_first_access_after_midnight() {
        let (engine, clock, _) = engine_at(noon());
        engine
            .store()
            .upsert_profile(&UserProfile {
                body_weight_kg: Some(68.0),
                ..UserProfile::new("u1")
            })
            .await
            .unwrap();
        let update = SourceUpdate::new(Source::Watch, noon()).with_steps(8000);
        engine.apply("u1", &update).await.unwrap();

        clock.set(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 5).unwrap());
        let today = engine.snapshot("u1").await.unwrap();

        assert_eq!(today.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(today.steps, 0);

        let history = engine.history("u1", 30).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].steps, 8000);
        assert_eq!(history[0].weight_kg, Some(68.0));
        assert_eq!(engine.diagnostics().rollovers, 1);
    }

    #[tokio::test]
    async fn test_concurrent_rollover_archives_once() {
        let (engine, clock, _) = engine_at(noon());
        let engine = Arc::new(engine);
        let update = SourceUpdate::new(Source::Watch, noon()).with_steps(8000);
        engine.apply("u1", &update).await.unwrap();

        clock.set(Utc.with_ymd_and_hms(2024, 1, 2, 7, 0, 0).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.snapshot("u1").await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine.store().archive_len("u1"), 1);
        assert_eq!(engine.diagnostics().rollovers, 1);
    }

    #[tokio::test]
    async fn test_points_award_is_idempotent() {
        let (engine, _, _) = engine_at(noon());
        let award = PointsAward {
            award_id: "challenge-7".to_string(),
            points: 25,
            reason: AwardReason::ChallengeCompleted,
            timestamp: noon(),
        };

        engine.award_points("u1", &award).await.unwrap();
        engine.award_points("u1", &award).await.unwrap();

        assert_eq!(engine.snapshot("u1").await.unwrap().points, 25);
        assert_eq!(engine.diagnostics().duplicate, 1);
    }

    #[tokio::test]
    async fn test_concurrent_meals_all_counted() {
        let (engine, _, _) = engine_at(noon());
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for i in 0..20u32 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let update = SourceUpdate::new(Source::Nutrition, noon())
                    .with_calories_consumed(10.0)
                    .with_entry_id(format!("meal-{}", i));
                engine.apply("u1", &update).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = engine.snapshot("u1").await.unwrap();
        assert_eq!(snapshot.calories_consumed, 200.0);
        assert_eq!(snapshot.revision, 20);
    }
}
