// SPDX-License-Identifier: MIT

//! Day boundary handling.
//!
//! The stored snapshot is the previous day's until the first read or write
//! after local midnight. That access freezes it into the archive and starts
//! the new day from zero. Deciding is pure; committing is the store's job.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{DailyArchiveEntry, LiveActivitySnapshot};

/// What to do with a snapshot read on `today`.
#[derive(Debug, Clone, PartialEq)]
pub enum RolloverDecision {
    /// Snapshot belongs to today.
    Current,
    /// Snapshot is from another day: archive it under its own date and
    /// install `reset`.
    NewDay {
        archive: DailyArchiveEntry,
        reset: LiveActivitySnapshot,
    },
}

pub struct RolloverManager;

impl RolloverManager {
    /// Decide whether `snapshot` must be rolled over.
    ///
    /// Any date other than `today` rolls over, including one ahead of it
    /// after the clock stepped back. Archives are write-once, so a day that
    /// is archived twice keeps its first entry.
    ///
    /// The reset snapshot carries `revision + 1` so it can be installed with
    /// a compare-and-set against the revision that was read.
    pub fn check(
        user_id: &str,
        snapshot: &LiveActivitySnapshot,
        today: NaiveDate,
        weight_kg: Option<f64>,
        now: DateTime<Utc>,
    ) -> RolloverDecision {
        if snapshot.date == today {
            return RolloverDecision::Current;
        }

        if snapshot.date > today {
            tracing::warn!(
                user_id,
                snapshot_date = %snapshot.date,
                %today,
                "Snapshot dated after today, clock moved backwards"
            );
        }

        let archive = DailyArchiveEntry::from_snapshot(user_id, snapshot, weight_kg, now);
        let mut reset = LiveActivitySnapshot::empty(today);
        reset.revision = snapshot.revision + 1;

        RolloverDecision::NewDay { archive, reset }
    }
}
