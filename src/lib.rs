//! Bird Catch Arena
//!
//! Simulation and session coordination core for a timed "catch the bird"
//! arcade game, played solo or in a synchronized multiplayer room.
//!
//! # Features
//!
//! - `metrics_extended` - per-species hit counters and ledger failure counts (enabled by default)
//! - `http_ledger` - JSON/HTTP hit ledger and round store

pub mod client;
pub mod config;
pub mod game;
pub mod ledger;
pub mod lobby;
pub mod metrics;
pub mod util;
