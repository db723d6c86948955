// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Profiles (body weight, goals)
//! - Live activity (one mutable snapshot per user)
//! - Daily archive (write-once history)

use chrono::NaiveDate;
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreConsistencySelector, FirestoreResult, FirestoreTransaction,
    FirestoreWritePrecondition,
};

use crate::db::{collections, ActivityStore, CasOutcome, RolloverCommit, StoreError};
use crate::models::{DailyArchiveEntry, LiveActivitySnapshot, UserProfile};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Connect to the emulator without credentials.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        // The emulator accepts any bearer token; an unsigned JWT keeps the
        // SDK from probing for local credentials.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Backend(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client for testing.
    ///
    /// All database operations return [`StoreError::Offline`].
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client.as_ref().ok_or(StoreError::Offline)
    }

    /// Client whose reads join `transaction`. Documents read through it are
    /// locked until the transaction commits or rolls back.
    fn in_transaction(
        client: &firestore::FirestoreDb,
        transaction: &FirestoreTransaction<'_>,
    ) -> firestore::FirestoreDb {
        client.clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
            transaction.transaction_id().clone(),
        ))
    }

    async fn read_snapshot(
        client: &firestore::FirestoreDb,
        user_id: &str,
    ) -> FirestoreResult<Option<LiveActivitySnapshot>> {
        client
            .fluent()
            .select()
            .by_id_in(collections::LIVE_ACTIVITY)
            .obj()
            .one(user_id)
            .await
    }

    async fn read_archive(
        client: &firestore::FirestoreDb,
        doc_id: &str,
    ) -> FirestoreResult<Option<DailyArchiveEntry>> {
        client
            .fluent()
            .select()
            .by_id_in(collections::DAILY_ARCHIVE)
            .obj()
            .one(doc_id)
            .await
    }

    /// Commit `transaction`. `Ok(false)` means another writer won the race.
    async fn commit(transaction: FirestoreTransaction<'_>) -> Result<bool, StoreError> {
        match transaction.commit().await {
            Ok(_) => Ok(true),
            Err(e) if is_contention(&e) => {
                tracing::debug!(error = %e, "Transaction lost a write race");
                Ok(false)
            }
            Err(e) => Err(StoreError::Backend(format!(
                "Transaction commit failed: {}",
                e
            ))),
        }
    }
}

/// Aborted transactions and failed write preconditions are lost races, not
/// backend faults.
fn is_contention(e: &FirestoreError) -> bool {
    match e {
        FirestoreError::DataConflictError(_) => true,
        FirestoreError::DatabaseError(db) => {
            matches!(db.public.code.as_str(), "Aborted" | "FailedPrecondition")
        }
        _ => false,
    }
}

fn backend(e: FirestoreError) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl ActivityStore for FirestoreDb {
    // ─── Live Snapshot ───────────────────────────────────────────

    async fn load_snapshot(
        &self,
        user_id: &str,
    ) -> Result<Option<LiveActivitySnapshot>, StoreError> {
        Self::read_snapshot(self.get_client()?, user_id)
            .await
            .map_err(backend)
    }

    /// Write `next` if the stored revision still matches.
    ///
    /// The revision is read inside the transaction, which locks the document
    /// until commit. A first write also requires the document to be absent.
    async fn compare_and_swap_snapshot(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        next: &LiveActivitySnapshot,
    ) -> Result<CasOutcome, StoreError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to begin transaction: {}", e)))?;
        let tx_client = Self::in_transaction(client, &transaction);

        let current = match Self::read_snapshot(&tx_client, user_id).await {
            Ok(current) => current,
            Err(e) => {
                let _ = transaction.rollback().await;
                return if is_contention(&e) {
                    Ok(CasOutcome::Conflict)
                } else {
                    Err(backend(e))
                };
            }
        };
        if current.map(|s| s.revision) != expected_revision {
            let _ = transaction.rollback().await;
            return Ok(CasOutcome::Conflict);
        }

        client
            .fluent()
            .update()
            .in_col(collections::LIVE_ACTIVITY)
            .precondition(FirestoreWritePrecondition::Exists(
                expected_revision.is_some(),
            ))
            .document_id(user_id)
            .object(next)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add snapshot to transaction: {}", e))
            })?;

        if Self::commit(transaction).await? {
            Ok(CasOutcome::Committed)
        } else {
            Ok(CasOutcome::Conflict)
        }
    }

    /// Archive-then-reset in a single transaction.
    ///
    /// The archive document is created with an absent-document precondition,
    /// so history is written once even when two rollovers race.
    async fn commit_rollover(
        &self,
        user_id: &str,
        expected_revision: Option<u64>,
        archive: &DailyArchiveEntry,
        reset: &LiveActivitySnapshot,
    ) -> Result<RolloverCommit, StoreError> {
        let client = self.get_client()?;
        let archive_id = DailyArchiveEntry::document_id(user_id, archive.date);

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to begin transaction: {}", e)))?;
        let tx_client = Self::in_transaction(client, &transaction);

        let reads = async {
            let current = Self::read_snapshot(&tx_client, user_id).await?;
            let archived = Self::read_archive(&tx_client, &archive_id).await?;
            Ok::<_, FirestoreError>((current, archived))
        };
        let (current, archived) = match reads.await {
            Ok(read) => read,
            Err(e) => {
                let _ = transaction.rollback().await;
                return if is_contention(&e) {
                    Ok(RolloverCommit::Conflict)
                } else {
                    Err(backend(e))
                };
            }
        };

        // 1. The snapshot must still be the one being archived
        if current.map(|s| s.revision) != expected_revision {
            let _ = transaction.rollback().await;
            return Ok(RolloverCommit::Conflict);
        }

        // 2. Write-once archive
        let archive_created = archived.is_none();
        if archive_created {
            client
                .fluent()
                .update()
                .in_col(collections::DAILY_ARCHIVE)
                .precondition(FirestoreWritePrecondition::Exists(false))
                .document_id(&archive_id)
                .object(archive)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    StoreError::Backend(format!("Failed to add archive to transaction: {}", e))
                })?;
        } else {
            tracing::debug!(user_id, date = %archive.date, "Archive entry already present");
        }

        // 3. Reset
        client
            .fluent()
            .update()
            .in_col(collections::LIVE_ACTIVITY)
            .document_id(user_id)
            .object(reset)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add reset to transaction: {}", e))
            })?;

        if Self::commit(transaction).await? {
            Ok(RolloverCommit::Applied { archive_created })
        } else {
            Ok(RolloverCommit::Conflict)
        }
    }

    // ─── Archive ─────────────────────────────────────────────────

    async fn get_archive(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyArchiveEntry>, StoreError> {
        let doc_id = DailyArchiveEntry::document_id(user_id, date);
        Self::read_archive(self.get_client()?, &doc_id)
            .await
            .map_err(backend)
    }

    async fn list_archive(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<DailyArchiveEntry>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DAILY_ARCHIVE)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            // ISO dates sort chronologically as strings
            .order_by([("date", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    // ─── Profiles ────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(&profile.user_id)
            .object(profile)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
