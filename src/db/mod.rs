// SPDX-License-Identifier: MIT

//! Database layer.
//!
//! The engine talks to an [`ActivityStore`]; two backends implement it:
//! Firestore for deployments and an in-process map for local runs and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use std::future::Future;

use chrono::NaiveDate;

use crate::models::{DailyArchiveEntry, LiveActivitySnapshot, UserProfile};

/// Collection names as constants.
pub mod collections {
    /// User profiles (keyed by user_id)
    pub const PROFILES: &str = "profiles";
    /// Current-day live snapshot (keyed by user_id)
    pub const LIVE_ACTIVITY: &str = "live_activity";
    /// Write-once daily archive (keyed by `{user_id}_{date}`)
    pub const DAILY_ARCHIVE: &str = "daily_archive";
}

/// Store failures. Contention is reported through return values, not here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database not connected (offline mode)")]
    Offline,

    #[error("Database error: {0}")]
    Backend(String),
}

/// Result of a compare-and-set snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Committed,
    /// The stored revision was not the expected one; nothing was written.
    Conflict,
}

/// Result of committing a rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverCommit {
    /// Snapshot reset. `archive_created` is false when an entry for the
    /// day already existed and was left untouched.
    Applied { archive_created: bool },
    /// Snapshot moved on since it was read; nothing was written.
    Conflict,
}

/// Persistent per-user document store used by the engine.
///
/// Snapshot writes are compare-and-set on `LiveActivitySnapshot::revision`.
/// `expected_revision` of `None` means "no snapshot document exists yet".
pub trait ActivityStore: Send + Sync {
    fn load_snapshot(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<LiveActivitySnapshot>, StoreError>> + Send;

    fn compare_and_swap_snapshot(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        next: &LiveActivitySnapshot,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send;

    /// Archive the ending day (unless already archived) and install the
    /// reset snapshot, as one operation guarded by `expected_revision`.
    fn commit_rollover(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        archive: &DailyArchiveEntry,
        reset: &LiveActivitySnapshot,
    ) -> impl Future<Output = Result<RolloverCommit, StoreError>> + Send;

    fn get_archive(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<DailyArchiveEntry>, StoreError>> + Send;

    /// Archive entries for a user, newest first.
    fn list_archive(
        &self,
        user_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<DailyArchiveEntry>, StoreError>> + Send;

    fn get_profile(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;

    fn upsert_profile(
        &self,
        profile: &UserProfile,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Backend chosen at startup.
#[derive(Clone)]
pub enum StoreBackend {
    Memory(MemoryStore),
    Firestore(FirestoreDb),
}

impl ActivityStore for StoreBackend {
    async fn load_snapshot(
        &self,
        user_id: &str,
    ) -> Result<Option<LiveActivitySnapshot>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.load_snapshot(user_id).await,
            StoreBackend::Firestore(s) => s.load_snapshot(user_id).await,
        }
    }

    async fn compare_and_swap_snapshot(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        next: &LiveActivitySnapshot,
    ) -> Result<CasOutcome, StoreError> {
        match self {
            StoreBackend::Memory(s) => {
                s.compare_and_swap_snapshot(user_id, expected_revision, next)
                    .await
            }
            StoreBackend::Firestore(s) => {
                s.compare_and_swap_snapshot(user_id, expected_revision, next)
                    .await
            }
        }
    }

    async fn commit_rollover(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        archive: &DailyArchiveEntry,
        reset: &LiveActivitySnapshot,
    ) -> Result<RolloverCommit, StoreError> {
        match self {
            StoreBackend::Memory(s) => {
                s.commit_rollover(user_id, expected_revision, archive, reset)
                    .await
            }
            StoreBackend::Firestore(s) => {
                s.commit_rollover(user_id, expected_revision, archive, reset)
                    .await
            }
        }
    }

    async fn get_archive(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyArchiveEntry>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.get_archive(user_id, date).await,
            StoreBackend::Firestore(s) => s.get_archive(user_id, date).await,
        }
    }

    async fn list_archive(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<DailyArchiveEntry>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.list_archive(user_id, limit).await,
            StoreBackend::Firestore(s) => s.list_archive(user_id, limit).await,
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.get_profile(user_id).await,
            StoreBackend::Firestore(s) => s.get_profile(user_id).await,
        }
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(s) => s.upsert_profile(profile).await,
            StoreBackend::Firestore(s) => s.upsert_profile(profile).await,
        }
    }
}
