//! Auction execution: idempotency gate, eligibility filter, candidate
//! scoring, deterministic ranking, frequency-capped winner selection,
//! generalized second-price clearing, and exactly-once commit.

use crate::bidding::BidCalculator;
use crate::store::{AdCandidate, AdStore};
use adserve_core::config::AppConfig;
use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::types::{
    AdRequest, AdUnit, AuctionData, AuctionRecord, AuctionResult, BidRange, CampaignCapRule,
    EventType, QualityScoreEntry, RequestContext,
};
use adserve_frequency::{CapSubject, FrequencyCapTracker};
use adserve_targeting::TargetingEvaluator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One ranked candidate inside an auction execution.
#[derive(Debug, Clone)]
struct ScoredBid {
    ad_id: Uuid,
    bid: f64,
    quality_score: f64,
    targeting_score: f64,
    rank_score: f64,
    cap_overrides: Vec<CampaignCapRule>,
}

pub struct AuctionEngine {
    store: Arc<dyn AdStore>,
    frequency: Arc<FrequencyCapTracker>,
    evaluator: TargetingEvaluator,
    calculator: BidCalculator,
}

impl AuctionEngine {
    pub fn new(
        store: Arc<dyn AdStore>,
        frequency: Arc<FrequencyCapTracker>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            frequency,
            evaluator: TargetingEvaluator::new(config.targeting.clone()),
            calculator: BidCalculator::new(config.auction.clone()),
        }
    }

    /// Run the auction for one pending ad request. The request id is the
    /// idempotency key: a call against an already-terminal request
    /// returns the stored outcome and performs no writes. Business
    /// conditions (no eligible ads, capped winner) produce an empty
    /// result, never an error.
    pub fn run_auction(&self, request_id: Uuid) -> AdServeResult<AuctionResult> {
        let request = self
            .store
            .ad_request(request_id)?
            .ok_or_else(|| AdServeError::NotFound(format!("ad request {request_id}")))?;

        if request.is_terminal() {
            debug!(request_id = %request_id, "Replaying stored outcome for terminal request");
            metrics::counter!("auction.replays").increment(1);
            return self.stored_outcome(&request);
        }

        let ad_unit = self
            .store
            .ad_unit(request.ad_unit_id)?
            .ok_or_else(|| AdServeError::NotFound(format!("ad unit {}", request.ad_unit_id)))?;

        let now = Utc::now();
        let candidates = self.store.active_candidates()?;
        let eligible = self.filter_eligible(candidates, &ad_unit, &request.context);
        let ranked = self.score_and_rank(&eligible, &request.context, now);

        let participants = ranked.len() as u32;
        metrics::histogram!("auction.participants").record(participants as f64);

        let auction_data = build_auction_data(&ranked);
        let selection = self.select_winner(&request, &ranked);

        let result = match selection {
            Some((winner_index, winner)) => {
                // Generalized second price: the next-ranked surviving
                // candidate's own bid, or the winner's bid when alone.
                // Quality can rank a lower bid first, so the price is
                // capped at the winner's own bid.
                let clearing_price = ranked
                    .get(winner_index + 1)
                    .map(|runner_up| runner_up.bid.min(winner.bid))
                    .unwrap_or(winner.bid);
                AuctionResult {
                    winner: Some(winner.ad_id),
                    winning_bid: winner.bid,
                    clearing_price,
                    participants,
                    auction_data,
                }
            }
            None => AuctionResult {
                winner: None,
                winning_bid: 0.0,
                clearing_price: 0.0,
                participants,
                auction_data,
            },
        };

        self.commit(&request, &result, now)?;

        info!(
            request_id = %request_id,
            winner = ?result.winner,
            participants = result.participants,
            clearing_price = result.clearing_price,
            "Auction decided"
        );
        metrics::counter!("auction.executions").increment(1);
        if result.winner.is_none() {
            metrics::counter!("auction.no_fill").increment(1);
        }

        Ok(result)
    }

    /// Hard filters only: status joins (already applied by the
    /// repository), declared format/size constraints, and required
    /// geo/device targeting. Soft mismatches stay in and lower the
    /// targeting score instead.
    fn filter_eligible(
        &self,
        candidates: Vec<AdCandidate>,
        ad_unit: &AdUnit,
        context: &RequestContext,
    ) -> Vec<AdCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| {
                let ad = &candidate.ad;
                if !ad.allowed_formats.is_empty() && !ad.allowed_formats.contains(&ad_unit.format) {
                    return false;
                }
                if !ad.allowed_sizes.is_empty()
                    && !ad
                        .allowed_sizes
                        .iter()
                        .any(|s| s.w == ad_unit.width && s.h == ad_unit.height)
                {
                    return false;
                }
                if let Some(reason) = self.evaluator.hard_conflict(&ad.targeting, context) {
                    debug!(ad_id = %ad.id, reason = %reason, "Candidate excluded by hard constraint");
                    return false;
                }
                true
            })
            .collect()
    }

    /// Score every eligible candidate and sort descending by combined
    /// rank score, ties broken by ascending ad id for a reproducible
    /// result. A candidate whose scoring produces unusable numbers is
    /// dropped, not fatal.
    fn score_and_rank(
        &self,
        eligible: &[AdCandidate],
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> Vec<ScoredBid> {
        let mut scored: Vec<ScoredBid> = Vec::with_capacity(eligible.len());
        for candidate in eligible {
            let evaluation = self.evaluator.score(&candidate.ad.targeting, context);
            let computation = self.calculator.compute(
                &candidate.campaign,
                &candidate.ad.performance,
                evaluation.score,
                now,
            );
            if !computation.rank_score.is_finite() {
                warn!(
                    ad_id = %candidate.ad.id,
                    "Dropping candidate with unusable score"
                );
                metrics::counter!("auction.dropped_candidates").increment(1);
                continue;
            }
            scored.push(ScoredBid {
                ad_id: candidate.ad.id,
                bid: computation.bid,
                quality_score: computation.quality_score,
                targeting_score: evaluation.score,
                rank_score: computation.rank_score,
                cap_overrides: candidate.campaign.frequency_caps.clone(),
            });
        }

        scored.sort_by(|a, b| {
            b.rank_score
                .partial_cmp(&a.rank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ad_id.cmp(&b.ad_id))
        });
        scored
    }

    /// Walk the ranking until a candidate passes the frequency cap. The
    /// reservation is atomic, so concurrent auctions for the same user
    /// cannot over-serve; a capped candidate falls through to the next.
    fn select_winner<'a>(
        &self,
        request: &AdRequest,
        ranked: &'a [ScoredBid],
    ) -> Option<(usize, &'a ScoredBid)> {
        let Some(user_id) = request.context.user_id.as_deref() else {
            // Anonymous request: per-user caps do not apply.
            return ranked.first().map(|bid| (0, bid));
        };

        for (index, bid) in ranked.iter().enumerate() {
            let status = self.frequency.try_reserve(
                user_id,
                CapSubject::Ad(bid.ad_id),
                EventType::Impression,
                &bid.cap_overrides,
            );
            if status.allowed {
                return Some((index, bid));
            }
            debug!(
                ad_id = %bid.ad_id,
                user_id,
                count = status.current_count,
                limit = status.limit,
                "Winner capped, falling back to next candidate"
            );
            metrics::counter!("auction.capped_winners").increment(1);
        }
        None
    }

    /// Exactly-once transition to Served or Failed. On a store failure
    /// the request stays Pending and the call is safe to retry.
    fn commit(
        &self,
        request: &AdRequest,
        result: &AuctionResult,
        now: DateTime<Utc>,
    ) -> AdServeResult<()> {
        let record = AuctionRecord {
            request_id: request.id,
            result: result.clone(),
            decided_at: now,
        };
        if result.winner.is_some() {
            self.store.mark_served(&record)
        } else {
            self.store.mark_failed(&record)
        }
    }

    /// Outcome for a terminal request: the stored record, or a result
    /// synthesized from the request fields when the record was written
    /// by an external collaborator.
    fn stored_outcome(&self, request: &AdRequest) -> AdServeResult<AuctionResult> {
        if let Some(record) = self.store.outcome(request.id)? {
            return Ok(record.result);
        }
        Ok(AuctionResult {
            winner: request.winning_ad_id,
            winning_bid: request.winning_bid.unwrap_or(0.0),
            clearing_price: request.clearing_price.unwrap_or(0.0),
            participants: 0,
            auction_data: AuctionData::default(),
        })
    }
}

fn build_auction_data(ranked: &[ScoredBid]) -> AuctionData {
    let mut bid_range = BidRange::default();
    if let Some(first) = ranked.first() {
        bid_range = BidRange {
            min: first.bid,
            max: first.bid,
        };
        for bid in ranked {
            bid_range.min = bid_range.min.min(bid.bid);
            bid_range.max = bid_range.max.max(bid.bid);
        }
    }
    AuctionData {
        bid_range,
        quality_scores: ranked
            .iter()
            .map(|bid| QualityScoreEntry {
                ad_id: bid.ad_id,
                quality_score: bid.quality_score,
                targeting_score: bid.targeting_score,
            })
            .collect(),
    }
}
