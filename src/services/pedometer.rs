// SPDX-License-Identifier: MIT

//! Phone-local step counting.
//!
//! Two inputs feed the same accumulator:
//! - raw accelerometer samples, thresholded on the summed axis delta
//! - a hardware step counter, which reports a running total since boot
//!
//! Counted steps are reported as a phone [`SourceUpdate`] every
//! `batch_size` steps. While a watch reading is inside the suppression
//! window, detected steps are discarded so they are never reported twice.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

use crate::config::{ConfigError, EngineConfig};
use crate::models::{LiveActivitySnapshot, Source, SourceUpdate};
use crate::time_utils::local_date;

/// kcal burned per step per kg of body weight.
pub const KCAL_PER_STEP_PER_KG: f64 = 0.00075;

/// Body weight assumed when the profile has none.
pub const DEFAULT_BODY_WEIGHT_KG: f64 = 70.0;

/// Estimates energy per detected step.
pub trait CalorieEstimator: Send + Sync {
    fn calories_per_step(&self) -> f64;
}

/// `weight × 0.00075` kcal per step.
#[derive(Debug, Clone, Copy)]
pub struct WeightBasedEstimator {
    body_weight_kg: f64,
}

impl WeightBasedEstimator {
    pub fn new(body_weight_kg: Option<f64>) -> Self {
        let body_weight_kg = body_weight_kg
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(DEFAULT_BODY_WEIGHT_KG);
        Self { body_weight_kg }
    }
}

impl Default for WeightBasedEstimator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CalorieEstimator for WeightBasedEstimator {
    fn calories_per_step(&self) -> f64 {
        self.body_weight_kg * KCAL_PER_STEP_PER_KG
    }
}

/// One accelerometer reading (m/s² per axis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Utc>,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: DateTime<Utc>) -> Self {
        Self { x, y, z, timestamp }
    }

    fn delta(&self, previous: &[f64; 3]) -> f64 {
        (self.x - previous[0]).abs() + (self.y - previous[1]).abs() + (self.z - previous[2]).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PedometerPhase {
    /// No baseline sample yet.
    Idle,
    Sampling,
}

/// Accumulated counts for the current local day.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PedometerState {
    pub day: Option<NaiveDate>,
    pub accumulated_steps: u64,
    pub accumulated_calories: f64,
    /// Steps included in the last emitted update.
    pub reported_steps: u64,
    /// Whether the last detected step was discarded because of the watch.
    pub suppressed: bool,
}

/// Tunables shared with the resolver.
#[derive(Debug, Clone, Copy)]
pub struct PedometerConfig {
    pub delta_threshold: f64,
    pub batch_size: u64,
    pub suppression_window: Duration,
    pub stride_meters: f64,
    pub utc_offset: FixedOffset,
}

impl PedometerConfig {
    pub fn from_engine(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            delta_threshold: config.step_delta_threshold,
            batch_size: config.phone_batch_size.max(1),
            suppression_window: config.suppression_window(),
            stride_meters: config.stride_meters,
            utc_offset: config.utc_offset()?,
        })
    }
}

/// Converts a since-boot hardware total into a daily count.
///
/// The first reading of a day becomes the baseline. A total lower than the
/// baseline means the device rebooted; counting re-bases there and carries
/// what was already counted today.
#[derive(Debug, Clone, Default)]
pub struct DailyStepCounter {
    day: Option<NaiveDate>,
    baseline: u64,
    carried: u64,
    last_daily: u64,
}

impl DailyStepCounter {
    pub fn daily_steps(&mut self, raw_total: u64, today: NaiveDate) -> u64 {
        if self.day != Some(today) {
            self.day = Some(today);
            self.baseline = raw_total;
            self.carried = 0;
            self.last_daily = 0;
            return 0;
        }

        if raw_total < self.baseline {
            tracing::debug!(raw_total, baseline = self.baseline, "Step counter re-based");
            self.carried = self.last_daily;
            self.baseline = raw_total;
        }

        self.last_daily = self.carried + (raw_total - self.baseline);
        self.last_daily
    }
}

/// Step detector plus batch reporter for one phone.
pub struct Pedometer<E: CalorieEstimator = WeightBasedEstimator> {
    config: PedometerConfig,
    estimator: E,
    phase: PedometerPhase,
    last_motion: Option<[f64; 3]>,
    watch_seen_at: Option<DateTime<Utc>>,
    counter: DailyStepCounter,
    counter_seen: u64,
    state: PedometerState,
}

impl<E: CalorieEstimator> Pedometer<E> {
    pub fn new(config: PedometerConfig, estimator: E) -> Self {
        Self {
            config,
            estimator,
            phase: PedometerPhase::Idle,
            last_motion: None,
            watch_seen_at: None,
            counter: DailyStepCounter::default(),
            counter_seen: 0,
            state: PedometerState::default(),
        }
    }

    pub fn phase(&self) -> PedometerPhase {
        self.phase
    }

    pub fn state(&self) -> &PedometerState {
        &self.state
    }

    /// Note the latest watch reading seen on a published snapshot.
    pub fn observe_snapshot(&mut self, snapshot: &LiveActivitySnapshot) {
        if let Some(at) = snapshot.source_clock.watch {
            self.observe_watch(at);
        }
    }

    pub fn observe_watch(&mut self, at: DateTime<Utc>) {
        match self.watch_seen_at {
            Some(seen) if seen >= at => {}
            _ => self.watch_seen_at = Some(at),
        }
    }

    /// Feed one accelerometer sample. Returns an update when a batch fills.
    pub fn on_sample(&mut self, sample: &MotionSample) -> Option<SourceUpdate> {
        self.roll_day(sample.timestamp);

        let current = [sample.x, sample.y, sample.z];
        let Some(previous) = self.last_motion.replace(current) else {
            self.phase = PedometerPhase::Sampling;
            return None;
        };

        if sample.delta(&previous) <= self.config.delta_threshold {
            return None;
        }

        self.count(1, sample.timestamp)
    }

    /// Feed a hardware step-counter total (steps since device boot).
    pub fn on_step_count(&mut self, raw_total: u64, at: DateTime<Utc>) -> Option<SourceUpdate> {
        self.roll_day(at);

        let today = local_date(at, self.config.utc_offset);
        let daily = self.counter.daily_steps(raw_total, today);
        let fresh = daily.saturating_sub(self.counter_seen);
        self.counter_seen = daily;

        if fresh == 0 {
            return None;
        }
        self.count(fresh, at)
    }

    /// Report whatever has been counted since the last update, if anything.
    pub fn flush(&mut self, at: DateTime<Utc>) -> Option<SourceUpdate> {
        if self.state.accumulated_steps > self.state.reported_steps && !self.suppressed_at(at) {
            Some(self.emit(at))
        } else {
            None
        }
    }

    fn count(&mut self, steps: u64, at: DateTime<Utc>) -> Option<SourceUpdate> {
        if self.suppressed_at(at) {
            if !self.state.suppressed {
                tracing::debug!("Watch active, discarding phone steps");
            }
            self.state.suppressed = true;
            return None;
        }
        self.state.suppressed = false;

        let before = self.state.accumulated_steps;
        self.state.accumulated_steps += steps;
        self.state.accumulated_calories += steps as f64 * self.estimator.calories_per_step();

        let batch = self.config.batch_size;
        if self.state.accumulated_steps / batch > before / batch {
            Some(self.emit(at))
        } else {
            None
        }
    }

    fn emit(&mut self, at: DateTime<Utc>) -> SourceUpdate {
        let steps = self.state.accumulated_steps;
        self.state.reported_steps = steps;

        SourceUpdate::new(Source::Phone, at)
            .with_steps(steps)
            .with_calories_burned(self.state.accumulated_calories)
            .with_distance(steps as f64 * self.config.stride_meters)
    }

    fn suppressed_at(&self, at: DateTime<Utc>) -> bool {
        self.watch_seen_at
            .is_some_and(|watch_at| at - watch_at < self.config.suppression_window)
    }

    fn roll_day(&mut self, at: DateTime<Utc>) {
        let today = local_date(at, self.config.utc_offset);
        if self.state.day == Some(today) {
            return;
        }
        if self.state.day.is_some() {
            tracing::debug!(%today, "Pedometer day reset");
        }
        self.state = PedometerState {
            day: Some(today),
            ..PedometerState::default()
        };
        self.counter_seen = 0;
    }
}
