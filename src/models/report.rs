// SPDX-License-Identifier: MIT

//! Raw producer payloads, as they arrive over the wire.
//!
//! Timestamps are epoch milliseconds, the unit devices report natively.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Macros;

/// Passive health update pushed by the wearable.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WatchReport {
    /// Steps since local day start, as counted by the watch.
    pub steps: Option<u64>,
    #[validate(range(min = 0.0, max = 50_000.0))]
    pub calories: Option<f64>,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    pub distance: Option<f64>,
    #[validate(range(min = 1, max = 300))]
    pub heart_rate: Option<u32>,
    pub timestamp: i64,
}

/// Batched count from the phone pedometer.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PhoneReport {
    pub steps: u64,
    #[validate(range(min = 0.0, max = 50_000.0))]
    pub calories_burned: f64,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    pub distance_meters: Option<f64>,
    pub timestamp: i64,
}

/// Values typed in by the user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManualEntry {
    /// Client-generated id so a retried submission is applied once.
    #[validate(length(min = 1, max = 128))]
    pub entry_id: Option<String>,
    /// Step total the user asserts for today.
    pub steps: Option<u64>,
    /// Signed change in liters; negative undoes an earlier glass.
    #[validate(range(min = -10.0, max = 10.0))]
    pub water_delta_liters: Option<f64>,
    pub timestamp: i64,
}

/// One logged meal.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NutritionEntry {
    #[validate(length(min = 1, max = 128))]
    pub entry_id: String,
    #[validate(range(min = 0.0, max = 20_000.0))]
    pub calories: f64,
    #[serde(default)]
    pub macros: Option<Macros>,
    pub timestamp: i64,
}

/// Report from any producer, tagged with its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProducerReport {
    Watch(WatchReport),
    Phone(PhoneReport),
    Manual(ManualEntry),
    Nutrition(NutritionEntry),
}
