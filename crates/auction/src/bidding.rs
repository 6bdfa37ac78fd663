//! Bid computation — maps a campaign's bid strategy and an ad's historical
//! performance to a monetary bid and a combined rank score.

use adserve_core::config::AuctionConfig;
use adserve_core::types::{AdPerformance, BidStrategy, Campaign};
use chrono::{DateTime, Utc};

/// One candidate's scoring output inside a single auction. Ephemeral; only
/// the winner's numbers are ever persisted.
#[derive(Debug, Clone, Copy)]
pub struct BidComputation {
    /// Monetary bid in USD, always finite and >= the configured floor.
    pub bid: f64,
    /// Quality weight in [0.5, 1.0] derived from lifetime performance.
    pub quality_score: f64,
    /// What the auction ranks on: bid plus a weighted quality bonus.
    pub rank_score: f64,
}

#[derive(Debug, Clone)]
pub struct BidCalculator {
    config: AuctionConfig,
}

impl BidCalculator {
    pub fn new(config: AuctionConfig) -> Self {
        Self { config }
    }

    /// Deterministic and pure: same inputs and `now` produce the same
    /// output. Unusable campaign pricing falls back to the floor bid so a
    /// malformed candidate competes at the minimum instead of aborting
    /// the auction.
    pub fn compute(
        &self,
        campaign: &Campaign,
        performance: &AdPerformance,
        targeting_score: f64,
        now: DateTime<Utc>,
    ) -> BidComputation {
        let base = self.base_bid(&campaign.bid_strategy);
        let quality = self.quality_weight(performance, now);
        let targeting_multiplier = self.config.targeting_multiplier_min
            + (self.config.targeting_multiplier_max - self.config.targeting_multiplier_min)
                * targeting_score.clamp(0.0, 1.0);

        let bid = (base * quality * targeting_multiplier).max(self.config.floor_bid);
        BidComputation {
            bid,
            quality_score: quality,
            rank_score: bid + quality * self.config.quality_rank_weight,
        }
    }

    /// Exhaustive strategy dispatch. CPM-derived strategies bid per
    /// impression (CPM / 1000); predictive tiers pay a premium on top.
    fn base_bid(&self, strategy: &BidStrategy) -> f64 {
        let cpm_base =
            |target: Option<f64>| target.and_then(sanitize).unwrap_or(self.config.default_cpm) / 1000.0;

        let base = match *strategy {
            BidStrategy::Manual { bid } => sanitize(bid).unwrap_or(self.config.floor_bid),
            BidStrategy::AutoCpc { target_cpc } => target_cpc
                .and_then(sanitize)
                .unwrap_or(self.config.default_cpc),
            BidStrategy::AutoCpm { target_cpm } => cpm_base(target_cpm),
            BidStrategy::TargetCpa { target_cpa } => {
                sanitize(target_cpa).unwrap_or(0.0) * self.config.cpa_conversion_rate
            }
            BidStrategy::Predictive { target_cpm } => {
                cpm_base(target_cpm) * self.config.predictive_premium
            }
            BidStrategy::AiOptimized { target_cpm } => cpm_base(target_cpm) * self.config.ai_premium,
        };
        base.max(self.config.floor_bid)
    }

    /// Quality weight: 0.5 baseline, up to +0.3 for historical CTR, up to
    /// +0.2 for historical CVR, up to +0.1 for creative freshness with
    /// linear decay over the configured age window. Capped at 1.0.
    fn quality_weight(&self, performance: &AdPerformance, now: DateTime<Utc>) -> f64 {
        let ctr_bonus = 0.3 * (performance.ctr() / self.config.ctr_full_credit).clamp(0.0, 1.0);
        let cvr_bonus = 0.2 * (performance.cvr() / self.config.cvr_full_credit).clamp(0.0, 1.0);

        let age_days = (now - performance.created_at).num_days().max(0) as f64;
        let freshness_bonus =
            0.1 * (1.0 - age_days / self.config.freshness_window_days as f64).clamp(0.0, 1.0);

        (0.5 + ctr_bonus + cvr_bonus + freshness_bonus).min(1.0)
    }
}

/// Reject non-finite or negative monetary inputs.
fn sanitize(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::types::{Campaign, CampaignStatus};
    use chrono::Duration;
    use uuid::Uuid;

    fn calculator() -> BidCalculator {
        BidCalculator::new(AuctionConfig::default())
    }

    fn campaign(strategy: BidStrategy) -> Campaign {
        Campaign {
            id: Uuid::from_u128(10),
            organization_id: Uuid::from_u128(1),
            status: CampaignStatus::Active,
            bid_strategy: strategy,
            daily_budget: Some(100.0),
            total_budget: None,
            frequency_caps: Vec::new(),
        }
    }

    fn fresh_performance(now: DateTime<Utc>) -> AdPerformance {
        AdPerformance {
            impressions: 0,
            clicks: 0,
            conversions: 0,
            created_at: now,
        }
    }

    /// Fresh creative, no history: quality = 0.5 + 0.1 freshness.
    const FRESH_QUALITY: f64 = 0.6;

    #[test]
    fn test_manual_strategy_uses_fixed_bid() {
        let now = Utc::now();
        let comp = calculator().compute(
            &campaign(BidStrategy::Manual { bid: 2.50 }),
            &fresh_performance(now),
            0.5,
            now,
        );
        // targeting 0.5 -> multiplier 1.0; quality multiplier 0.6.
        assert!((comp.bid - 2.50 * FRESH_QUALITY).abs() < 1e-9);
        assert!((comp.rank_score - (comp.bid + FRESH_QUALITY * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_auto_cpc_defaults_when_unset() {
        let now = Utc::now();
        let set = calculator().compute(
            &campaign(BidStrategy::AutoCpc {
                target_cpc: Some(2.0),
            }),
            &fresh_performance(now),
            0.5,
            now,
        );
        let unset = calculator().compute(
            &campaign(BidStrategy::AutoCpc { target_cpc: None }),
            &fresh_performance(now),
            0.5,
            now,
        );
        assert!((set.bid - 2.0 * FRESH_QUALITY).abs() < 1e-9);
        assert!((unset.bid - 1.50 * FRESH_QUALITY).abs() < 1e-9);
    }

    #[test]
    fn test_cpm_strategies_bid_per_impression() {
        let now = Utc::now();
        let cpm = calculator().compute(
            &campaign(BidStrategy::AutoCpm {
                target_cpm: Some(4000.0),
            }),
            &fresh_performance(now),
            0.5,
            now,
        );
        let predictive = calculator().compute(
            &campaign(BidStrategy::Predictive {
                target_cpm: Some(4000.0),
            }),
            &fresh_performance(now),
            0.5,
            now,
        );
        let ai = calculator().compute(
            &campaign(BidStrategy::AiOptimized {
                target_cpm: Some(4000.0),
            }),
            &fresh_performance(now),
            0.5,
            now,
        );
        assert!((cpm.bid - 4.0 * FRESH_QUALITY).abs() < 1e-9);
        assert!((predictive.bid - 4.0 * 1.2 * FRESH_QUALITY).abs() < 1e-9);
        assert!((ai.bid - 4.0 * 1.5 * FRESH_QUALITY).abs() < 1e-9);
    }

    #[test]
    fn test_target_cpa_derives_from_conversion_rate() {
        let now = Utc::now();
        let comp = calculator().compute(
            &campaign(BidStrategy::TargetCpa { target_cpa: 20.0 }),
            &fresh_performance(now),
            0.5,
            now,
        );
        assert!((comp.bid - 20.0 * 0.1 * FRESH_QUALITY).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_bid_falls_back_to_floor() {
        let now = Utc::now();
        for bad in [f64::NAN, f64::INFINITY, -5.0] {
            let comp = calculator().compute(
                &campaign(BidStrategy::Manual { bid: bad }),
                &fresh_performance(now),
                0.5,
                now,
            );
            // Quality and targeting multipliers cannot push a bid below
            // the floor.
            assert!((comp.bid - 0.01).abs() < 1e-9);
        }
    }

    #[test]
    fn test_quality_rewards_history_and_caps_at_one() {
        let now = Utc::now();
        let strong = AdPerformance {
            impressions: 10_000,
            clicks: 1_000,
            conversions: 500,
            created_at: now,
        };
        let comp = calculator().compute(
            &campaign(BidStrategy::Manual { bid: 1.0 }),
            &strong,
            0.5,
            now,
        );
        // CTR and CVR far past full credit, fresh creative: capped at 1.0.
        assert!((comp.quality_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_freshness_decays_linearly() {
        let now = Utc::now();
        let stale = AdPerformance {
            impressions: 0,
            clicks: 0,
            conversions: 0,
            created_at: now - Duration::days(45),
        };
        let comp = calculator().compute(
            &campaign(BidStrategy::Manual { bid: 1.0 }),
            &stale,
            0.5,
            now,
        );
        // Past the 30-day window the freshness bonus is fully decayed.
        assert!((comp.quality_score - 0.5).abs() < 1e-9);

        let half = AdPerformance {
            created_at: now - Duration::days(15),
            ..stale
        };
        let comp = calculator().compute(
            &campaign(BidStrategy::Manual { bid: 1.0 }),
            &half,
            0.5,
            now,
        );
        assert!((comp.quality_score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_targeting_multiplier_range() {
        let now = Utc::now();
        let perf = fresh_performance(now);
        let c = campaign(BidStrategy::Manual { bid: 1.0 });
        let calc = calculator();
        let low = calc.compute(&c, &perf, 0.0, now);
        let high = calc.compute(&c, &perf, 1.0, now);
        assert!((low.bid - 1.0 * FRESH_QUALITY * 0.7).abs() < 1e-9);
        assert!((high.bid - 1.0 * FRESH_QUALITY * 1.3).abs() < 1e-9);
    }
}
