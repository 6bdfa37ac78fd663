//! Optimization advisor — offline analysis of historical serving outcomes
//! producing ranked tuning recommendations. Not part of the auction hot
//! path.

pub mod advisor;

pub use advisor::{
    OptimizationAdvisor, PerformanceSnapshot, Recommendation, RecommendationKind,
};
