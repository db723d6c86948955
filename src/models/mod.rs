// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod archive;
pub mod report;
pub mod snapshot;
pub mod source;
pub mod user;

pub use archive::DailyArchiveEntry;
pub use report::{ManualEntry, NutritionEntry, PhoneReport, ProducerReport, WatchReport};
pub use snapshot::{LiveActivitySnapshot, Macros, SourceClock};
pub use source::{AwardReason, PointsAward, Source, SourceUpdate};
pub use user::UserProfile;
