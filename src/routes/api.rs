// SPDX-License-Identifier: MIT

//! Read-side API: live snapshot, history, profile, diagnostics.

use crate::db::ActivityStore;
use crate::error::{AppError, Result};
use crate::models::{DailyArchiveEntry, LiveActivitySnapshot, UserProfile};
use crate::routes::validate_user_id;
use crate::services::DiagnosticsSnapshot;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_HISTORY_LIMIT: u32 = 30;
const MAX_HISTORY_LIMIT: u32 = 366;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/{user_id}/live", get(get_live))
        .route("/api/users/{user_id}/history", get(get_history))
        .route(
            "/api/users/{user_id}/profile",
            get(get_profile).put(put_profile),
        )
        .route("/api/diagnostics", get(get_diagnostics))
}

// ─── Live Snapshot ───────────────────────────────────────────

/// Today's snapshot. The first read after midnight performs the rollover.
async fn get_live(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<LiveActivitySnapshot>> {
    validate_user_id(&user_id)?;
    Ok(Json(state.engine.snapshot(&user_id).await?))
}

// ─── History ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HistoryResponse {
    pub days: Vec<DailyArchiveEntry>,
}

/// Archived days, newest first.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    validate_user_id(&user_id)?;

    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_HISTORY_LIMIT
        )));
    }

    let days = state.engine.history(&user_id, limit).await?;
    Ok(Json(HistoryResponse { days }))
}

// ─── Profile ─────────────────────────────────────────────────

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>> {
    validate_user_id(&user_id)?;

    let profile = state
        .engine
        .store()
        .get_profile(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))?;

    Ok(Json(profile))
}

/// Partial profile update. Absent fields keep their stored value.
#[derive(Debug, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileUpdate {
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
    #[validate(range(min = 20.0, max = 500.0))]
    pub body_weight_kg: Option<f64>,
    #[validate(range(min = 1, max = 100_000))]
    pub step_goal: Option<u32>,
}

async fn put_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    validate_user_id(&user_id)?;
    update
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let store = state.engine.store();
    let mut profile = match store.get_profile(&user_id).await? {
        Some(existing) => existing,
        None => UserProfile {
            created_at: format_utc_rfc3339(state.engine.clock().now()),
            ..UserProfile::new(user_id.as_str())
        },
    };

    if let Some(name) = update.display_name {
        profile.display_name = name;
    }
    if let Some(weight) = update.body_weight_kg {
        profile.body_weight_kg = Some(weight);
    }
    if let Some(goal) = update.step_goal {
        profile.step_goal = goal;
    }

    store.upsert_profile(&profile).await?;
    tracing::info!(user_id = %user_id, "Profile updated");

    Ok(Json(profile))
}

// ─── Diagnostics ─────────────────────────────────────────────

/// Process-wide counters of dropped updates, retries and rollovers.
async fn get_diagnostics(State(state): State<Arc<AppState>>) -> Json<DiagnosticsSnapshot> {
    Json(state.engine.diagnostics())
}
