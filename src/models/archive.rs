// SPDX-License-Identifier: MIT

//! Historical record of a completed day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::{LiveActivitySnapshot, Macros};

/// Frozen totals of one day.
///
/// Stored at: `daily_archive/{user_id}_{date}`. Write-once: the store never
/// replaces an existing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DailyArchiveEntry {
    pub user_id: String,
    pub date: NaiveDate,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub steps: u64,
    pub calories_burned: f64,
    #[serde(default)]
    pub distance_meters: f64,
    pub calories_consumed: f64,
    pub water_liters: f64,
    #[serde(default)]
    pub macros: Macros,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub points: u64,
    /// Body weight when the day was archived, if the profile had one.
    pub weight_kg: Option<f64>,
    pub archived_at: DateTime<Utc>,
}

impl DailyArchiveEntry {
    /// Freeze `snapshot` under its own date.
    pub fn from_snapshot(
        user_id: &str,
        snapshot: &LiveActivitySnapshot,
        weight_kg: Option<f64>,
        archived_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            date: snapshot.date,
            steps: snapshot.steps,
            calories_burned: snapshot.calories_burned,
            distance_meters: snapshot.distance_meters,
            calories_consumed: snapshot.calories_consumed,
            water_liters: snapshot.water_liters,
            macros: snapshot.macros,
            points: snapshot.points,
            weight_kg,
            archived_at,
        }
    }

    /// Document id, unique per user and day.
    pub fn document_id(user_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", user_id, date.format("%Y-%m-%d"))
    }
}
