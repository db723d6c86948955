// SPDX-License-Identifier: MIT

//! Producer payload normalization.
//!
//! Every raw report is validated and mapped onto a [`SourceUpdate`] before
//! it reaches the resolver. Producers report in their own units and field
//! names; after this point only the common shape exists.

use chrono::{DateTime, Duration, Utc};
use validator::Validate;

use crate::models::{
    ManualEntry, NutritionEntry, PhoneReport, ProducerReport, Source, SourceUpdate, WatchReport,
};
use crate::time_utils::{format_utc_rfc3339, from_epoch_millis};

/// Device clocks may run this far ahead of the server.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Invalid {producer} report: {message}")]
    Invalid { producer: Source, message: String },

    #[error("Timestamp out of range: {0}")]
    Timestamp(i64),

    #[error("Timestamp {0} is in the future")]
    FutureTimestamp(String),

    #[error("{0} report carries no metrics")]
    Empty(Source),
}

/// Validate and convert one producer report captured no later than `now`.
pub fn normalize(report: &ProducerReport, now: DateTime<Utc>) -> Result<SourceUpdate, NormalizeError> {
    let update = match report {
        ProducerReport::Watch(r) => from_watch(r)?,
        ProducerReport::Phone(r) => from_phone(r)?,
        ProducerReport::Manual(r) => from_manual(r)?,
        ProducerReport::Nutrition(r) => from_nutrition(r)?,
    };

    if update.timestamp > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
        return Err(NormalizeError::FutureTimestamp(format_utc_rfc3339(
            update.timestamp,
        )));
    }

    Ok(update)
}

fn validate(producer: Source, report: &impl Validate) -> Result<(), NormalizeError> {
    report.validate().map_err(|e| NormalizeError::Invalid {
        producer,
        message: e.to_string(),
    })
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, NormalizeError> {
    from_epoch_millis(millis).ok_or(NormalizeError::Timestamp(millis))
}

fn from_watch(report: &WatchReport) -> Result<SourceUpdate, NormalizeError> {
    validate(Source::Watch, report)?;

    let update = SourceUpdate {
        steps: report.steps,
        calories_burned: report.calories,
        distance_meters: report.distance,
        heart_rate: report.heart_rate,
        ..SourceUpdate::new(Source::Watch, timestamp(report.timestamp)?)
    };

    if !update.has_movement() && update.heart_rate.is_none() {
        return Err(NormalizeError::Empty(Source::Watch));
    }
    Ok(update)
}

fn from_phone(report: &PhoneReport) -> Result<SourceUpdate, NormalizeError> {
    validate(Source::Phone, report)?;

    Ok(SourceUpdate {
        distance_meters: report.distance_meters,
        ..SourceUpdate::new(Source::Phone, timestamp(report.timestamp)?)
            .with_steps(report.steps)
            .with_calories_burned(report.calories_burned)
    })
}

fn from_manual(entry: &ManualEntry) -> Result<SourceUpdate, NormalizeError> {
    validate(Source::Manual, entry)?;

    let update = SourceUpdate {
        steps: entry.steps,
        water_delta_liters: entry.water_delta_liters,
        entry_id: entry.entry_id.clone(),
        ..SourceUpdate::new(Source::Manual, timestamp(entry.timestamp)?)
    };

    if !update.has_movement() && !update.has_additive() {
        return Err(NormalizeError::Empty(Source::Manual));
    }
    Ok(update)
}

fn from_nutrition(entry: &NutritionEntry) -> Result<SourceUpdate, NormalizeError> {
    validate(Source::Nutrition, entry)?;

    if let Some(macros) = entry.macros.as_ref() {
        if !macros.is_non_negative() {
            return Err(NormalizeError::Invalid {
                producer: Source::Nutrition,
                message: "macros must be non-negative".to_string(),
            });
        }
    }

    Ok(SourceUpdate {
        macros: entry.macros,
        ..SourceUpdate::new(Source::Nutrition, timestamp(entry.timestamp)?)
            .with_calories_consumed(entry.calories)
            .with_entry_id(entry.entry_id.clone())
    })
}
