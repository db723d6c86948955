// SPDX-License-Identifier: MIT

//! Current-day live activity aggregate.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Source;

/// Additive nutrition totals, in grams.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Macros {
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fats: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sugar: f64,
}

impl Macros {
    /// Add another set of totals component-wise.
    pub fn accumulate(&mut self, other: &Macros) {
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fats += other.fats;
        self.fiber += other.fiber;
        self.sugar += other.sugar;
    }

    pub fn is_non_negative(&self) -> bool {
        [self.protein, self.carbs, self.fats, self.fiber, self.sugar]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Last applied capture time per movement source.
///
/// Persisted with the snapshot so any device can evaluate the suppression
/// window and the replay check without shared in-memory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SourceClock {
    #[serde(default)]
    pub watch: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phone: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manual: Option<DateTime<Utc>>,
}

impl SourceClock {
    pub fn get(&self, source: Source) -> Option<DateTime<Utc>> {
        match source {
            Source::Watch => self.watch,
            Source::Phone => self.phone,
            Source::Manual => self.manual,
            Source::Nutrition | Source::Unknown => None,
        }
    }

    /// Record `at` for `source`, keeping the later of the two instants.
    pub fn record(&mut self, source: Source, at: DateTime<Utc>) {
        let slot = match source {
            Source::Watch => &mut self.watch,
            Source::Phone => &mut self.phone,
            Source::Manual => &mut self.manual,
            Source::Nutrition | Source::Unknown => return,
        };
        match *slot {
            Some(prev) if prev >= at => {}
            _ => *slot = Some(at),
        }
    }
}

/// The single mutable aggregate of a user's live metrics for one day.
///
/// Stored at: `live_activity/{user_id}`
///
/// Only the engine writes it, and only with a snapshot produced by the
/// resolver or the rollover manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LiveActivitySnapshot {
    /// Local calendar day this snapshot belongs to.
    pub date: NaiveDate,

    // ─── Movement ────────────────────────────────────────────────
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub steps: u64,
    #[serde(default)]
    pub calories_burned: f64,
    #[serde(default)]
    pub distance_meters: f64,
    /// Instantaneous bpm, 0 when unknown.
    #[serde(default)]
    pub heart_rate: u32,
    #[serde(default)]
    pub heart_rate_at: Option<DateTime<Utc>>,

    // ─── Intake ──────────────────────────────────────────────────
    #[serde(default)]
    pub calories_consumed: f64,
    #[serde(default)]
    pub water_liters: f64,
    #[serde(default)]
    pub macros: Macros,

    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub points: u64,

    // ─── Provenance ──────────────────────────────────────────────
    /// Producer that last wrote a movement field.
    #[serde(default)]
    pub last_source: Source,
    #[serde(default)]
    pub last_source_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_clock: SourceClock,

    // ─── Idempotency ─────────────────────────────────────────────
    /// Ids of additive entries and point awards already folded in today.
    #[serde(default)]
    pub applied_entries: BTreeSet<String>,

    /// Bumped on every committed write (compare-and-set token).
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub revision: u64,
}

impl LiveActivitySnapshot {
    /// Fresh snapshot for `date`: all counters zero, source unknown.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            steps: 0,
            calories_burned: 0.0,
            distance_meters: 0.0,
            heart_rate: 0,
            heart_rate_at: None,
            calories_consumed: 0.0,
            water_liters: 0.0,
            macros: Macros::default(),
            points: 0,
            last_source: Source::Unknown,
            last_source_timestamp: None,
            source_clock: SourceClock::default(),
            applied_entries: BTreeSet::new(),
            revision: 0,
        }
    }

    /// Whether a watch reading was applied less than `window` before `at`.
    ///
    /// A watch reading captured after `at` also counts: the lower priority
    /// source is then older than the authoritative value.
    pub fn watch_active_at(&self, at: DateTime<Utc>, window: Duration) -> bool {
        self.source_clock
            .watch
            .is_some_and(|watch_at| at - watch_at < window)
    }

    /// Compare the metric content of two snapshots, ignoring `revision`.
    pub fn same_metrics(&self, other: &LiveActivitySnapshot) -> bool {
        let mut a = self.clone();
        a.revision = other.revision;
        a == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let snapshot = LiveActivitySnapshot::empty(date);

        assert_eq!(snapshot.date, date);
        assert_eq!(snapshot.steps, 0);
        assert_eq!(snapshot.points, 0);
        assert_eq!(snapshot.last_source, Source::Unknown);
        assert!(snapshot.last_source_timestamp.is_none());
        assert!(snapshot.applied_entries.is_empty());
    }

    #[test]
    fn test_source_clock_keeps_latest() {
        let mut clock = SourceClock::default();
        clock.record(Source::Watch, at(12, 0, 30));
        clock.record(Source::Watch, at(12, 0, 0));

        assert_eq!(clock.get(Source::Watch), Some(at(12, 0, 30)));
        assert_eq!(clock.get(Source::Phone), None);
    }

    #[test]
    fn test_source_clock_ignores_non_movement_sources() {
        let mut clock = SourceClock::default();
        clock.record(Source::Nutrition, at(12, 0, 0));
        assert_eq!(clock, SourceClock::default());
    }

    #[test]
    fn test_watch_window_boundaries() {
        let mut snapshot =
            LiveActivitySnapshot::empty(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let window = Duration::seconds(60);
        assert!(!snapshot.watch_active_at(at(12, 0, 0), window));

        snapshot.source_clock.record(Source::Watch, at(12, 0, 0));
        assert!(snapshot.watch_active_at(at(12, 0, 59), window));
        assert!(!snapshot.watch_active_at(at(12, 1, 0), window));
        assert!(snapshot.watch_active_at(at(11, 59, 0), window));
    }

    #[test]
    fn test_macros_accumulate() {
        let mut total = Macros {
            protein: 10.0,
            ..Default::default()
        };
        total.accumulate(&Macros {
            protein: 5.0,
            carbs: 20.0,
            fats: 1.0,
            fiber: 2.0,
            sugar: 3.0,
        });

        assert_eq!(total.protein, 15.0);
        assert_eq!(total.carbs, 20.0);
        assert!(total.is_non_negative());
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let snapshot: LiveActivitySnapshot =
            serde_json::from_str(r#"{"date":"2024-01-01","steps":42}"#).unwrap();
        assert_eq!(snapshot.steps, 42);
        assert_eq!(snapshot.last_source, Source::Unknown);
        assert_eq!(snapshot.revision, 0);
    }
}
