// SPDX-License-Identifier: MIT

use chrono::{DateTime, TimeZone, Utc};
use live_activity::config::Config;
use live_activity::db::{FirestoreDb, MemoryStore, StoreBackend};
use live_activity::routes::create_router;
use live_activity::time_utils::ManualClock;
use live_activity::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// 2024-01-01T12:00:00Z, the instant every test app starts at.
#[allow(dead_code)]
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Epoch millis of `noon() + secs`.
#[allow(dead_code)]
pub fn millis_after_noon(secs: i64) -> i64 {
    (noon() + chrono::Duration::seconds(secs)).timestamp_millis()
}

/// Create a test app over the in-memory store and a settable clock.
/// Returns the router, the shared state and the clock.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, ManualClock) {
    create_test_app_with(StoreBackend::Memory(MemoryStore::new()))
}

/// Same as [`create_test_app`] over the given backend.
#[allow(dead_code)]
pub fn create_test_app_with(store: StoreBackend) -> (axum::Router, Arc<AppState>, ManualClock) {
    let clock = ManualClock::new(noon());
    let state = Arc::new(
        AppState::new(Config::default(), store, Arc::new(clock.clone()))
            .expect("default config is valid"),
    );

    (create_router(state.clone()), state, clock)
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
