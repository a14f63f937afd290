//! Survivor Arena match server library
//!
//! Authoritative runtime for small co-op "survivors" matches: fixed-step
//! simulation, enemy waves, combat and level-ups, driven by a 20 Hz scheduler
//! that publishes per-tick deltas through a message sink.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod server;
pub mod metrics;
