//! Frequency capping — per-user exposure counters inside sliding time
//! windows, with an atomic check-and-increment primitive for the auction
//! hot path.

pub mod tracker;

pub use tracker::{CapStatus, CapSubject, FrequencyCapTracker};
