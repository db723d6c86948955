// SPDX-License-Identifier: MIT

//! Live activity reconciliation engine.
//!
//! Merges step, calorie, distance, heart-rate and intake readings from a
//! wearable, a phone pedometer, manual entry and a nutrition log into one
//! current-day snapshot per user, archives each finished day, and streams
//! committed snapshots to every connected device.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::{Config, ConfigError};
use db::StoreBackend;
use services::{BroadcastHub, LiveActivityEngine};
use time_utils::Clock;

/// Engine as wired into the HTTP server.
pub type Engine = LiveActivityEngine<StoreBackend, BroadcastHub>;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub engine: Engine,
    pub hub: BroadcastHub,
}

impl AppState {
    pub fn new(
        config: Config,
        store: StoreBackend,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let hub = BroadcastHub::default();
        let engine = LiveActivityEngine::new(store, hub.clone(), clock, &config.engine)?;
        Ok(Self {
            config,
            engine,
            hub,
        })
    }
}
