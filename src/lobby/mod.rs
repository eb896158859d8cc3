//! Room coordination
//!
//! Replicated session lifecycle, host election, room locking and per-participant
//! scores.

pub mod player;
pub mod replication;
pub mod room;
pub mod session;
