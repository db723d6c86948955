// SPDX-License-Identifier: MIT

//! Reconciliation resolver.
//!
//! `resolve(current, update) -> next` is a pure function of its inputs:
//! no clock, no store, no hidden state. Everything it needs to decide
//! (last watch time, last applied time per source, applied entry ids) is
//! carried by the snapshot itself.
//!
//! Per-field rules:
//! - movement (`steps`, `calories_burned`, `distance_meters`): the watch
//!   replaces; phone and manual only raise a value, and only while no watch
//!   reading is inside the suppression window
//! - `heart_rate`: latest reading wins, whatever the source
//! - `calories_consumed`, `macros`: nutrition adds
//! - `water_liters`: manual adds a signed delta, clamped at zero
//! - `points`: only through [`Resolver::award_points`]

use chrono::{Duration, FixedOffset};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::config::{ConfigError, EngineConfig};
use crate::models::{LiveActivitySnapshot, PointsAward, Source, SourceUpdate};
use crate::time_utils::local_date;

/// Metric touched by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Metric {
    Steps,
    CaloriesBurned,
    Distance,
    HeartRate,
    CaloriesConsumed,
    Macros,
    Water,
    Points,
}

/// Why part of an update was not applied. None of these are faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum DropReason {
    /// Older than the last reading applied from the same source.
    Stale,
    /// A watch reading is inside the suppression window.
    Suppressed,
    /// Would lower a cumulative counter.
    NotGreater,
    /// Entry or award id already folded into the day.
    Duplicate,
    /// Captured on a day that has already been archived.
    PreviousDay,
    /// The source may not write this metric.
    WrongSource,
    /// Negative or non-finite value.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Dropped {
    pub metric: Metric,
    pub reason: DropReason,
}

/// Next snapshot plus what happened to each field of the update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Resolution {
    pub snapshot: LiveActivitySnapshot,
    pub applied: Vec<Metric>,
    pub dropped: Vec<Dropped>,
}

impl Resolution {
    fn start(current: &LiveActivitySnapshot) -> Self {
        Self {
            snapshot: current.clone(),
            applied: Vec::new(),
            dropped: Vec::new(),
        }
    }

    fn reject(&mut self, metric: Metric, reason: DropReason) {
        self.dropped.push(Dropped { metric, reason });
    }

    /// True if the next snapshot differs from `current` in any metric.
    pub fn changed_from(&self, current: &LiveActivitySnapshot) -> bool {
        !self.snapshot.same_metrics(current)
    }
}

/// Pure resolution rules, parameterised by the suppression window and the
/// users' local day offset.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    suppression_window: Duration,
    utc_offset: FixedOffset,
}

impl Resolver {
    pub fn new(suppression_window: Duration, utc_offset: FixedOffset) -> Self {
        Self {
            suppression_window,
            utc_offset,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.suppression_window(), config.utc_offset()?))
    }

    /// Fold `update` into `current`.
    pub fn resolve(&self, current: &LiveActivitySnapshot, update: &SourceUpdate) -> Resolution {
        let mut res = Resolution::start(current);

        if local_date(update.timestamp, self.utc_offset) < current.date {
            for metric in present_metrics(update) {
                res.reject(metric, DropReason::PreviousDay);
            }
            return res;
        }

        self.resolve_movement(current, update, &mut res);
        resolve_heart_rate(current, update, &mut res);
        resolve_additive(current, update, &mut res);

        res
    }

    /// Add an explicit point award. Replays of the same award id are ignored.
    pub fn award_points(&self, current: &LiveActivitySnapshot, award: &PointsAward) -> Resolution {
        let mut res = Resolution::start(current);

        if local_date(award.timestamp, self.utc_offset) < current.date {
            res.reject(Metric::Points, DropReason::PreviousDay);
            return res;
        }

        let key = entry_key("points", &award.award_id);
        if current.applied_entries.contains(&key) {
            res.reject(Metric::Points, DropReason::Duplicate);
            return res;
        }

        res.snapshot.points = current.points.saturating_add(award.points);
        res.snapshot.applied_entries.insert(key);
        res.applied.push(Metric::Points);
        res
    }

    fn resolve_movement(
        &self,
        current: &LiveActivitySnapshot,
        update: &SourceUpdate,
        res: &mut Resolution,
    ) {
        let fields = movement_fields(update);
        if fields.is_empty() {
            return;
        }

        if !update.source.reports_movement() {
            for (metric, _) in fields {
                res.reject(metric, DropReason::WrongSource);
            }
            return;
        }

        if current
            .source_clock
            .get(update.source)
            .is_some_and(|last| update.timestamp < last)
        {
            for (metric, _) in fields {
                res.reject(metric, DropReason::Stale);
            }
            return;
        }

        let suppressed = update.source != Source::Watch
            && current.watch_active_at(update.timestamp, self.suppression_window);

        let mut wrote = false;
        for (metric, value) in fields {
            if !value.is_finite() || value < 0.0 {
                res.reject(metric, DropReason::Invalid);
                continue;
            }
            if suppressed {
                res.reject(metric, DropReason::Suppressed);
                continue;
            }

            let snapshot = &mut res.snapshot;
            let raises = match metric {
                Metric::Steps => update.steps.is_some_and(|s| s > current.steps),
                _ => value > movement_value(current, metric),
            };

            if update.source == Source::Watch || raises {
                match metric {
                    Metric::Steps => snapshot.steps = update.steps.unwrap_or(current.steps),
                    Metric::CaloriesBurned => snapshot.calories_burned = value,
                    Metric::Distance => snapshot.distance_meters = value,
                    _ => {}
                }
                res.applied.push(metric);
                wrote = true;
            } else {
                res.reject(metric, DropReason::NotGreater);
            }
        }

        if wrote {
            let snapshot = &mut res.snapshot;
            snapshot.last_source = update.source;
            snapshot.last_source_timestamp = Some(update.timestamp);
            snapshot.source_clock.record(update.source, update.timestamp);
        }
    }
}

fn resolve_heart_rate(current: &LiveActivitySnapshot, update: &SourceUpdate, res: &mut Resolution) {
    let Some(bpm) = update.heart_rate else {
        return;
    };

    if current
        .heart_rate_at
        .is_some_and(|last| update.timestamp < last)
    {
        res.reject(Metric::HeartRate, DropReason::Stale);
        return;
    }

    res.snapshot.heart_rate = bpm;
    res.snapshot.heart_rate_at = Some(update.timestamp);
    res.applied.push(Metric::HeartRate);
}

fn resolve_additive(current: &LiveActivitySnapshot, update: &SourceUpdate, res: &mut Resolution) {
    if !update.has_additive() {
        return;
    }

    let key = update
        .entry_id
        .as_deref()
        .map(|id| entry_key(update.source.as_str(), id));

    if key
        .as_ref()
        .is_some_and(|k| current.applied_entries.contains(k))
    {
        for metric in additive_metrics(update) {
            res.reject(metric, DropReason::Duplicate);
        }
        return;
    }

    let mut wrote = false;

    if let Some(calories) = update.calories_consumed {
        if update.source != Source::Nutrition {
            res.reject(Metric::CaloriesConsumed, DropReason::WrongSource);
        } else if !calories.is_finite() || calories < 0.0 {
            res.reject(Metric::CaloriesConsumed, DropReason::Invalid);
        } else {
            res.snapshot.calories_consumed += calories;
            res.applied.push(Metric::CaloriesConsumed);
            wrote = true;
        }
    }

    if let Some(macros) = update.macros.as_ref() {
        if update.source != Source::Nutrition {
            res.reject(Metric::Macros, DropReason::WrongSource);
        } else if !macros.is_non_negative() {
            res.reject(Metric::Macros, DropReason::Invalid);
        } else {
            res.snapshot.macros.accumulate(macros);
            res.applied.push(Metric::Macros);
            wrote = true;
        }
    }

    if let Some(delta) = update.water_delta_liters {
        if update.source != Source::Manual {
            res.reject(Metric::Water, DropReason::WrongSource);
        } else if !delta.is_finite() {
            res.reject(Metric::Water, DropReason::Invalid);
        } else {
            res.snapshot.water_liters = (res.snapshot.water_liters + delta).max(0.0);
            res.applied.push(Metric::Water);
            wrote = true;
        }
    }

    if let (true, Some(key)) = (wrote, key) {
        res.snapshot.applied_entries.insert(key);
    }
}

/// Ids are namespaced per producer so a meal and a point award may share one.
fn entry_key(namespace: &str, id: &str) -> String {
    format!("{}:{}", namespace, id)
}

fn movement_fields(update: &SourceUpdate) -> Vec<(Metric, f64)> {
    let mut fields = Vec::with_capacity(3);
    if let Some(steps) = update.steps {
        fields.push((Metric::Steps, steps as f64));
    }
    if let Some(calories) = update.calories_burned {
        fields.push((Metric::CaloriesBurned, calories));
    }
    if let Some(distance) = update.distance_meters {
        fields.push((Metric::Distance, distance));
    }
    fields
}

fn movement_value(snapshot: &LiveActivitySnapshot, metric: Metric) -> f64 {
    match metric {
        Metric::Steps => snapshot.steps as f64,
        Metric::CaloriesBurned => snapshot.calories_burned,
        Metric::Distance => snapshot.distance_meters,
        _ => 0.0,
    }
}

fn additive_metrics(update: &SourceUpdate) -> Vec<Metric> {
    let mut metrics = Vec::new();
    if update.calories_consumed.is_some() {
        metrics.push(Metric::CaloriesConsumed);
    }
    if update.macros.is_some() {
        metrics.push(Metric::Macros);
    }
    if update.water_delta_liters.is_some() {
        metrics.push(Metric::Water);
    }
    metrics
}

fn present_metrics(update: &SourceUpdate) -> Vec<Metric> {
    let mut metrics: Vec<Metric> = movement_fields(update).into_iter().map(|(m, _)| m).collect();
    if update.heart_rate.is_some() {
        metrics.push(Metric::HeartRate);
    }
    metrics.extend(additive_metrics(update));
    metrics
}
