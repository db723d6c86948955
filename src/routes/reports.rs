// SPDX-License-Identifier: MIT

//! Ingest routes: one per producer, plus explicit point awards.

use crate::error::{AppError, Result};
use crate::models::{
    AwardReason, ManualEntry, NutritionEntry, PhoneReport, PointsAward, ProducerReport,
    WatchReport,
};
use crate::routes::validate_user_id;
use crate::services::Resolution;
use crate::time_utils::from_epoch_millis;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/{user_id}/reports", post(post_report))
        .route("/api/users/{user_id}/reports/watch", post(post_watch))
        .route("/api/users/{user_id}/reports/phone", post(post_phone))
        .route("/api/users/{user_id}/reports/manual", post(post_manual))
        .route("/api/users/{user_id}/reports/nutrition", post(post_nutrition))
        .route("/api/users/{user_id}/points", post(post_points))
}

async fn ingest(state: &AppState, user_id: &str, report: ProducerReport) -> Result<Json<Resolution>> {
    validate_user_id(user_id)?;
    let resolution = state.engine.ingest(user_id, &report).await?;
    Ok(Json(resolution))
}

/// Any producer, tagged with `kind`.
async fn post_report(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(report): Json<ProducerReport>,
) -> Result<Json<Resolution>> {
    ingest(&state, &user_id, report).await
}

async fn post_watch(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(report): Json<WatchReport>,
) -> Result<Json<Resolution>> {
    ingest(&state, &user_id, ProducerReport::Watch(report)).await
}

async fn post_phone(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(report): Json<PhoneReport>,
) -> Result<Json<Resolution>> {
    ingest(&state, &user_id, ProducerReport::Phone(report)).await
}

async fn post_manual(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(entry): Json<ManualEntry>,
) -> Result<Json<Resolution>> {
    ingest(&state, &user_id, ProducerReport::Manual(entry)).await
}

async fn post_nutrition(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(entry): Json<NutritionEntry>,
) -> Result<Json<Resolution>> {
    ingest(&state, &user_id, ProducerReport::Nutrition(entry)).await
}

// ─── Points ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
struct PointsRequest {
    #[validate(length(min = 1, max = 128))]
    award_id: String,
    #[validate(range(min = 1, max = 10_000))]
    points: u64,
    reason: AwardReason,
    /// Epoch millis; defaults to now.
    timestamp: Option<i64>,
}

async fn post_points(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<PointsRequest>,
) -> Result<Json<Resolution>> {
    validate_user_id(&user_id)?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let timestamp = match request.timestamp {
        Some(millis) => from_epoch_millis(millis)
            .ok_or_else(|| AppError::Validation(format!("Timestamp out of range: {}", millis)))?,
        None => state.engine.clock().now(),
    };

    let award = PointsAward {
        award_id: request.award_id,
        points: request.points,
        reason: request.reason,
        timestamp,
    };

    tracing::info!(user_id = %user_id, award_id = %award.award_id, points = award.points, "Awarding points");
    let resolution = state.engine.award_points(&user_id, &award).await?;
    Ok(Json(resolution))
}
