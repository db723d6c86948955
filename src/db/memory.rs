// SPDX-License-Identifier: MIT

//! In-process store backed by concurrent maps.
//!
//! Each snapshot write holds the per-user map entry for its whole
//! check-and-write, which gives the same compare-and-set guarantees as a
//! Firestore transaction. Lock order is always snapshot entry, then archive
//! entry.

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::db::{ActivityStore, CasOutcome, RolloverCommit, StoreError};
use crate::models::{DailyArchiveEntry, LiveActivitySnapshot, UserProfile};

/// Concurrent in-memory store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    snapshots: Arc<DashMap<String, LiveActivitySnapshot>>,
    archive: Arc<DashMap<String, DailyArchiveEntry>>,
    profiles: Arc<DashMap<String, UserProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archive entries held for `user_id`.
    pub fn archive_len(&self, user_id: &str) -> usize {
        self.archive
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .count()
    }

    /// Insert an archive entry unless one exists. Returns true if inserted.
    ///
    /// Exposed so tests can reproduce a crash between archive and reset.
    pub fn insert_archive_if_absent(&self, entry: &DailyArchiveEntry) -> bool {
        let doc_id = DailyArchiveEntry::document_id(&entry.user_id, entry.date);
        match self.archive.entry(doc_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                true
            }
        }
    }
}

fn revision_of(entry: &Entry<'_, String, LiveActivitySnapshot>) -> Option<u64> {
    match entry {
        Entry::Occupied(occupied) => Some(occupied.get().revision),
        Entry::Vacant(_) => None,
    }
}

fn install(entry: Entry<'_, String, LiveActivitySnapshot>, next: &LiveActivitySnapshot) {
    match entry {
        Entry::Occupied(mut occupied) => {
            occupied.insert(next.clone());
        }
        Entry::Vacant(vacant) => {
            vacant.insert(next.clone());
        }
    }
}

impl ActivityStore for MemoryStore {
    async fn load_snapshot(
        &self,
        user_id: &str,
    ) -> Result<Option<LiveActivitySnapshot>, StoreError> {
        Ok(self.snapshots.get(user_id).map(|s| s.value().clone()))
    }

    async fn compare_and_swap_snapshot(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        next: &LiveActivitySnapshot,
    ) -> Result<CasOutcome, StoreError> {
        let entry = self.snapshots.entry(user_id.to_string());
        if revision_of(&entry) != expected_revision {
            return Ok(CasOutcome::Conflict);
        }
        install(entry, next);
        Ok(CasOutcome::Committed)
    }

    async fn commit_rollover(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        archive: &DailyArchiveEntry,
        reset: &LiveActivitySnapshot,
    ) -> Result<RolloverCommit, StoreError> {
        let entry = self.snapshots.entry(user_id.to_string());
        if revision_of(&entry) != expected_revision {
            return Ok(RolloverCommit::Conflict);
        }

        let archive_created = self.insert_archive_if_absent(archive);
        install(entry, reset);

        Ok(RolloverCommit::Applied { archive_created })
    }

    async fn get_archive(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyArchiveEntry>, StoreError> {
        let doc_id = DailyArchiveEntry::document_id(user_id, date);
        Ok(self.archive.get(&doc_id).map(|e| e.value().clone()))
    }

    async fn list_archive(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<DailyArchiveEntry>, StoreError> {
        let mut entries: Vec<DailyArchiveEntry> = self
            .archive
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect();

        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.profiles.get(user_id).map(|p| p.value().clone()))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_revision() {
        let store = MemoryStore::new();
        let mut first = LiveActivitySnapshot::empty(day(1));
        first.revision = 1;

        assert_eq!(
            store
                .compare_and_swap_snapshot("u1", None, &first)
                .await
                .unwrap(),
            CasOutcome::Committed
        );
        // A second writer that also thought the document was absent loses.
        assert_eq!(
            store
                .compare_and_swap_snapshot("u1", None, &first)
                .await
                .unwrap(),
            CasOutcome::Conflict
        );

        let mut second = first.clone();
        second.steps = 10;
        second.revision = 2;
        assert_eq!(
            store
                .compare_and_swap_snapshot("u1", Some(1), &second)
                .await
                .unwrap(),
            CasOutcome::Committed
        );
        assert_eq!(store.load_snapshot("u1").await.unwrap().unwrap().steps, 10);
    }

    #[tokio::test]
    async fn test_rollover_keeps_existing_archive() {
        let store = MemoryStore::new();
        let mut old = LiveActivitySnapshot::empty(day(1));
        old.steps = 8000;
        old.revision = 3;
        store
            .compare_and_swap_snapshot("u1", None, &old)
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        let entry = DailyArchiveEntry::from_snapshot("u1", &old, Some(70.0), now);
        assert!(store.insert_archive_if_absent(&entry));

        let mut altered = entry.clone();
        altered.steps = 1;
        let mut reset = LiveActivitySnapshot::empty(day(2));
        reset.revision = 4;

        let outcome = store
            .commit_rollover("u1", Some(3), &altered, &reset)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RolloverCommit::Applied {
                archive_created: false
            }
        );
        let archived = store.get_archive("u1", day(1)).await.unwrap().unwrap();
        assert_eq!(archived.steps, 8000);
        assert_eq!(store.load_snapshot("u1").await.unwrap().unwrap().date, day(2));
    }

    #[tokio::test]
    async fn test_list_archive_newest_first_and_per_user() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        for d in [3, 1, 2] {
            let snapshot = LiveActivitySnapshot::empty(day(d));
            store.insert_archive_if_absent(&DailyArchiveEntry::from_snapshot(
                "u1", &snapshot, None, now,
            ));
        }
        store.insert_archive_if_absent(&DailyArchiveEntry::from_snapshot(
            "u2",
            &LiveActivitySnapshot::empty(day(5)),
            None,
            now,
        ));

        let entries = store.list_archive("u1", 2).await.unwrap();
        let dates: Vec<_> = entries.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(3), day(2)]);
        assert_eq!(store.archive_len("u1"), 3);
    }
}
