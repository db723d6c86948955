//! User profile model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Default daily step goal when the profile has none.
pub const DEFAULT_STEP_GOAL: u32 = 10_000;

/// User profile stored in Firestore.
///
/// The engine only reads it: body weight feeds the archive entry and the
/// phone's calorie estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfile {
    /// User ID (also used as document ID)
    pub user_id: String,
    /// Display name
    #[serde(default)]
    pub display_name: String,
    /// Current body weight in kilograms
    pub body_weight_kg: Option<f64>,
    /// Daily step goal
    #[serde(default = "default_step_goal")]
    pub step_goal: u32,
    /// When the profile was created (ISO 8601)
    #[serde(default)]
    pub created_at: String,
}

fn default_step_goal() -> u32 {
    DEFAULT_STEP_GOAL
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: String::new(),
            body_weight_kg: None,
            step_goal: DEFAULT_STEP_GOAL,
            created_at: String::new(),
        }
    }
}
