// SPDX-License-Identifier: MIT

//! Metric producers and the uniform update they emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Macros;

/// Producer of a metric update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Source {
    /// Wearable with continuous on-body sensing (authoritative for movement).
    Watch,
    /// Phone-local motion step counter.
    Phone,
    /// Values typed in by the user.
    Manual,
    /// Meal entries.
    Nutrition,
    #[default]
    Unknown,
}

impl Source {
    /// Sources allowed to write `steps` / `calories_burned` / `distance_meters`.
    pub fn reports_movement(self) -> bool {
        matches!(self, Source::Watch | Source::Phone | Source::Manual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Watch => "watch",
            Source::Phone => "phone",
            Source::Manual => "manual",
            Source::Nutrition => "nutrition",
            Source::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound report, normalized.
///
/// Every producer (watch, phone pedometer, manual entry, nutrition log) is
/// reduced to this shape before it reaches the resolver. Which fields are
/// honoured depends on `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SourceUpdate {
    pub source: Source,
    /// Capture instant on the producing device.
    pub timestamp: DateTime<Utc>,

    // ─── Movement (watch / phone / manual) ───────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_burned: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,

    // ─── Additive (nutrition / manual) ───────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_consumed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macros: Option<Macros>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_delta_liters: Option<f64>,
    /// Producer-assigned id of an additive entry, for duplicate detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl SourceUpdate {
    pub fn new(source: Source, timestamp: DateTime<Utc>) -> Self {
        Self {
            source,
            timestamp,
            steps: None,
            calories_burned: None,
            distance_meters: None,
            heart_rate: None,
            calories_consumed: None,
            macros: None,
            water_delta_liters: None,
            entry_id: None,
        }
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_calories_burned(mut self, calories: f64) -> Self {
        self.calories_burned = Some(calories);
        self
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.distance_meters = Some(meters);
        self
    }

    pub fn with_heart_rate(mut self, bpm: u32) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    pub fn with_calories_consumed(mut self, calories: f64) -> Self {
        self.calories_consumed = Some(calories);
        self
    }

    pub fn with_macros(mut self, macros: Macros) -> Self {
        self.macros = Some(macros);
        self
    }

    pub fn with_water_delta(mut self, liters: f64) -> Self {
        self.water_delta_liters = Some(liters);
        self
    }

    pub fn with_entry_id(mut self, id: impl Into<String>) -> Self {
        self.entry_id = Some(id.into());
        self
    }

    /// True if the update carries any of the movement fields.
    pub fn has_movement(&self) -> bool {
        self.steps.is_some() || self.calories_burned.is_some() || self.distance_meters.is_some()
    }

    /// True if the update carries any additive field.
    pub fn has_additive(&self) -> bool {
        self.calories_consumed.is_some()
            || self.macros.is_some()
            || self.water_delta_liters.is_some()
    }
}

/// Why points were granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum AwardReason {
    MealLogged,
    WorkoutCompleted,
    ChallengeCompleted,
    Other,
}

/// Explicit point award. Points only move through these, never through
/// a `SourceUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PointsAward {
    /// Unique per award; a replayed award with the same id is ignored.
    pub award_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub points: u64,
    pub reason: AwardReason,
    pub timestamp: DateTime<Utc>,
}
