//! Rule-table analysis of aggregate serving history. Recommendations are
//! deterministic for identical input: fixed thresholds, fixed impact
//! formulas, and a stable sort order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One period of aggregate serving history for a campaign or site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub auctions: u64,
    /// Auctions that produced a served winner.
    pub fills: u64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    /// Winner candidates rejected by the frequency cap.
    pub cap_rejections: u64,
    pub spend: f64,
    pub target_cpa: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    BroadenTargeting,
    RefreshCreatives,
    ReviewFrequencyCaps,
    LowerBids,
    RaiseBids,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub description: String,
    /// Relative expected improvement in [0, 1]; used for ranking only.
    pub estimated_impact: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizationAdvisor;

impl OptimizationAdvisor {
    pub fn new() -> Self {
        Self
    }

    /// Analyze aggregate history and return recommendations ranked by
    /// estimated impact (ties broken by kind for stable output).
    pub fn analyze(&self, history: &[PerformanceSnapshot]) -> Vec<Recommendation> {
        let totals = Totals::from(history);
        if totals.auctions == 0 {
            return Vec::new();
        }

        let mut recommendations = Vec::new();

        let fill_rate = totals.fills as f64 / totals.auctions as f64;
        if fill_rate < 0.5 {
            recommendations.push(Recommendation {
                kind: RecommendationKind::BroadenTargeting,
                description: format!(
                    "Fill rate is {:.0}%; loosening geo/device targeting or adding \
                     formats would let more auctions serve",
                    fill_rate * 100.0
                ),
                estimated_impact: (0.5 - fill_rate).min(0.5) * 2.0,
                confidence: 0.7,
            });
        }

        if totals.impressions >= 1_000 {
            let ctr = totals.clicks as f64 / totals.impressions as f64;
            if ctr < 0.01 {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::RefreshCreatives,
                    description: format!(
                        "CTR is {:.2}% across {} impressions; stale creatives also \
                         lose their freshness bonus in bidding",
                        ctr * 100.0,
                        totals.impressions
                    ),
                    estimated_impact: ((0.01 - ctr) / 0.01).clamp(0.0, 1.0) * 0.6,
                    confidence: 0.6,
                });
            }
        }

        let cap_rate = totals.cap_rejections as f64 / totals.auctions as f64;
        if cap_rate > 0.2 {
            recommendations.push(Recommendation {
                kind: RecommendationKind::ReviewFrequencyCaps,
                description: format!(
                    "{:.0}% of auctions lost their top-ranked candidate to the \
                     frequency cap; widen the audience or revisit per-campaign caps",
                    cap_rate * 100.0
                ),
                estimated_impact: cap_rate.min(1.0) * 0.8,
                confidence: 0.65,
            });
        }

        if let Some(target_cpa) = totals.target_cpa {
            if totals.conversions > 0 && target_cpa > 0.0 {
                let effective_cpa = totals.spend / totals.conversions as f64;
                if effective_cpa > target_cpa * 1.1 {
                    recommendations.push(Recommendation {
                        kind: RecommendationKind::LowerBids,
                        description: format!(
                            "Effective CPA {:.2} exceeds target {:.2}; lower bids \
                             or tighten targeting",
                            effective_cpa, target_cpa
                        ),
                        estimated_impact: ((effective_cpa / target_cpa) - 1.0).min(1.0) * 0.7,
                        confidence: 0.8,
                    });
                } else if effective_cpa < target_cpa * 0.5 {
                    recommendations.push(Recommendation {
                        kind: RecommendationKind::RaiseBids,
                        description: format!(
                            "Effective CPA {:.2} is well under target {:.2}; there \
                             is headroom to win more auctions",
                            effective_cpa, target_cpa
                        ),
                        estimated_impact: (1.0 - effective_cpa / target_cpa) * 0.5,
                        confidence: 0.5,
                    });
                }
            }
        }

        recommendations.sort_by(|a, b| {
            b.estimated_impact
                .partial_cmp(&a.estimated_impact)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.kind.cmp(&b.kind))
        });
        recommendations
    }
}

struct Totals {
    auctions: u64,
    fills: u64,
    impressions: u64,
    clicks: u64,
    conversions: u64,
    cap_rejections: u64,
    spend: f64,
    target_cpa: Option<f64>,
}

impl Totals {
    fn from(history: &[PerformanceSnapshot]) -> Self {
        let mut totals = Totals {
            auctions: 0,
            fills: 0,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            cap_rejections: 0,
            spend: 0.0,
            target_cpa: None,
        };
        for snapshot in history {
            totals.auctions += snapshot.auctions;
            totals.fills += snapshot.fills;
            totals.impressions += snapshot.impressions;
            totals.clicks += snapshot.clicks;
            totals.conversions += snapshot.conversions;
            totals.cap_rejections += snapshot.cap_rejections;
            totals.spend += snapshot.spend;
            // Latest declared target wins.
            if snapshot.target_cpa.is_some() {
                totals.target_cpa = snapshot.target_cpa;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PerformanceSnapshot {
        PerformanceSnapshot {
            period_start: Utc::now(),
            period_end: Utc::now(),
            auctions: 1_000,
            fills: 900,
            impressions: 10_000,
            clicks: 300,
            conversions: 30,
            cap_rejections: 10,
            spend: 100.0,
            target_cpa: None,
        }
    }

    #[test]
    fn test_empty_history_yields_nothing() {
        assert!(OptimizationAdvisor::new().analyze(&[]).is_empty());
    }

    #[test]
    fn test_healthy_history_yields_nothing() {
        let recs = OptimizationAdvisor::new().analyze(&[snapshot()]);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_low_fill_rate_recommends_broader_targeting() {
        let mut s = snapshot();
        s.fills = 200;
        let recs = OptimizationAdvisor::new().analyze(&[s]);
        assert_eq!(recs[0].kind, RecommendationKind::BroadenTargeting);
        assert!(recs[0].estimated_impact > 0.0);
    }

    #[test]
    fn test_low_ctr_recommends_creative_refresh() {
        let mut s = snapshot();
        s.clicks = 20;
        let recs = OptimizationAdvisor::new().analyze(&[s]);
        assert!(recs
            .iter()
            .any(|r| r.kind == RecommendationKind::RefreshCreatives));
    }

    #[test]
    fn test_cpa_over_target_recommends_lower_bids() {
        let mut s = snapshot();
        s.target_cpa = Some(2.0);
        // Effective CPA = 100 / 30 ≈ 3.33.
        let recs = OptimizationAdvisor::new().analyze(&[s]);
        assert!(recs.iter().any(|r| r.kind == RecommendationKind::LowerBids));
    }

    #[test]
    fn test_output_is_deterministic_and_ranked() {
        let mut s = snapshot();
        s.fills = 100;
        s.clicks = 10;
        s.cap_rejections = 400;
        let advisor = OptimizationAdvisor::new();
        let first = advisor.analyze(&[s.clone()]);
        let second = advisor.analyze(&[s]);
        assert_eq!(first.len(), second.len());
        assert!(first.len() >= 2);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.estimated_impact, b.estimated_impact);
        }
        for pair in first.windows(2) {
            assert!(pair[0].estimated_impact >= pair[1].estimated_impact);
        }
    }
}
