//! Auction core — eligibility filtering, bid computation, ranking with a
//! generalized second-price clearing rule, and exactly-once outcome commit.

pub mod bidding;
pub mod engine;
pub mod store;

pub use bidding::{BidCalculator, BidComputation};
pub use engine::AuctionEngine;
pub use store::{new_pending_request, AdCandidate, AdRepository, AdStore, MemoryStore, OutcomeWriter};
