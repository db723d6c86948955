// SPDX-License-Identifier: MIT

//! Services module - reconciliation logic layer.

pub mod engine;
pub mod normalizer;
pub mod pedometer;
pub mod publisher;
pub mod resolver;
pub mod rollover;

pub use engine::{DiagnosticsSnapshot, EngineDiagnostics, EngineError, LiveActivityEngine};
pub use normalizer::{normalize, NormalizeError};
pub use pedometer::{
    CalorieEstimator, DailyStepCounter, MotionSample, Pedometer, PedometerConfig, PedometerPhase,
    PedometerState, WeightBasedEstimator,
};
pub use publisher::{BroadcastHub, DeviceSession, LivePublisher, PublishError};
pub use resolver::{DropReason, Dropped, Metric, Resolution, Resolver};
pub use rollover::{RolloverDecision, RolloverManager};
