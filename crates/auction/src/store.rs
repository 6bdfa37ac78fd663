//! Repository seam between the engine and the excluded collaborator
//! modules. Reads are snapshots (ads joined with campaign and
//! organization status); writes are the auction's side effects, grouped
//! so the outcome record and the counters cannot drift apart.

use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::types::{
    Ad, AdRequest, AdStatus, AdUnit, AuctionRecord, Campaign, CampaignStatus, DailyEarnings,
    Organization, OrganizationStatus, RequestStatus,
};
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// An ad snapshot joined with its campaign, as produced by the
/// eligibility join.
#[derive(Debug, Clone)]
pub struct AdCandidate {
    pub ad: Ad,
    pub campaign: Campaign,
}

/// Read-only collaborator data.
pub trait AdRepository: Send + Sync {
    fn ad_request(&self, id: Uuid) -> AdServeResult<Option<AdRequest>>;
    fn ad_unit(&self, id: Uuid) -> AdServeResult<Option<AdUnit>>;
    /// Active ads of active campaigns of active organizations.
    fn active_candidates(&self) -> AdServeResult<Vec<AdCandidate>>;
    /// Stored outcome for idempotent replay of terminal requests.
    fn outcome(&self, request_id: Uuid) -> AdServeResult<Option<AuctionRecord>>;
}

/// Auction side effects. Each method is one store call so the request
/// transition, the outcome record, and the counters land together.
pub trait OutcomeWriter: Send + Sync {
    /// Commit a served auction exactly once: set winner/bid/clearing price
    /// on the request, append the outcome record, increment the ad's
    /// lifetime impression counter, update the daily earnings aggregate.
    /// A no-op if the request is already terminal.
    fn mark_served(&self, record: &AuctionRecord) -> AdServeResult<()>;
    /// Transition a winnerless request to Failed and append the record.
    fn mark_failed(&self, record: &AuctionRecord) -> AdServeResult<()>;
}

/// Everything the engine needs from a store backend.
pub trait AdStore: AdRepository + OutcomeWriter {}
impl<T: AdRepository + OutcomeWriter> AdStore for T {}

// ─── In-memory reference store ──────────────────────────────────────────

/// Single-process store used by the bundled server and the test suites.
/// A durable backend implements the same traits against its own storage.
#[derive(Default)]
pub struct MemoryStore {
    requests: DashMap<Uuid, AdRequest>,
    ad_units: DashMap<Uuid, AdUnit>,
    ads: DashMap<Uuid, Ad>,
    campaigns: DashMap<Uuid, Campaign>,
    organizations: DashMap<Uuid, Organization>,
    outcomes: DashMap<Uuid, AuctionRecord>,
    earnings: DashMap<(Uuid, NaiveDate), DailyEarnings>,
    /// Test hook: simulate a write-side outage.
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_request(&self, request: AdRequest) {
        self.requests.insert(request.id, request);
    }

    pub fn insert_ad_unit(&self, unit: AdUnit) {
        self.ad_units.insert(unit.id, unit);
    }

    pub fn insert_ad(&self, ad: Ad) {
        self.ads.insert(ad.id, ad);
    }

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id, campaign);
    }

    pub fn insert_organization(&self, organization: Organization) {
        self.organizations.insert(organization.id, organization);
    }

    /// Toggle simulated write failures (`Unavailable` from every writer
    /// method while set).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn ad(&self, id: Uuid) -> Option<Ad> {
        self.ads.get(&id).map(|a| a.clone())
    }

    pub fn request(&self, id: Uuid) -> Option<AdRequest> {
        self.requests.get(&id).map(|r| r.clone())
    }

    pub fn daily_earnings(&self, site_id: Uuid, date: NaiveDate) -> Option<DailyEarnings> {
        self.earnings.get(&(site_id, date)).map(|e| e.clone())
    }

    fn check_writes(&self) -> AdServeResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AdServeError::Unavailable(
                "store writes unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Flip the request to a terminal state; false if it already was.
    fn finalize_request(&self, record: &AuctionRecord, status: RequestStatus) -> bool {
        let Some(mut request) = self.requests.get_mut(&record.request_id) else {
            return false;
        };
        if request.is_terminal() {
            return false;
        }
        request.status = status;
        request.winning_ad_id = record.result.winner;
        request.winning_bid = record.result.winner.map(|_| record.result.winning_bid);
        request.clearing_price = record.result.winner.map(|_| record.result.clearing_price);
        request.decided_at = Some(record.decided_at);
        true
    }
}

impl AdRepository for MemoryStore {
    fn ad_request(&self, id: Uuid) -> AdServeResult<Option<AdRequest>> {
        Ok(self.requests.get(&id).map(|r| r.clone()))
    }

    fn ad_unit(&self, id: Uuid) -> AdServeResult<Option<AdUnit>> {
        Ok(self.ad_units.get(&id).map(|u| u.clone()))
    }

    fn active_candidates(&self) -> AdServeResult<Vec<AdCandidate>> {
        let mut candidates = Vec::new();
        for ad in self.ads.iter() {
            if ad.status != AdStatus::Active {
                continue;
            }
            let Some(campaign) = self.campaigns.get(&ad.campaign_id) else {
                continue;
            };
            if campaign.status != CampaignStatus::Active {
                continue;
            }
            let org_active = self
                .organizations
                .get(&campaign.organization_id)
                .map(|o| o.status == OrganizationStatus::Active)
                .unwrap_or(false);
            if !org_active {
                continue;
            }
            candidates.push(AdCandidate {
                ad: ad.clone(),
                campaign: campaign.clone(),
            });
        }
        Ok(candidates)
    }

    fn outcome(&self, request_id: Uuid) -> AdServeResult<Option<AuctionRecord>> {
        Ok(self.outcomes.get(&request_id).map(|r| r.clone()))
    }
}

impl OutcomeWriter for MemoryStore {
    fn mark_served(&self, record: &AuctionRecord) -> AdServeResult<()> {
        self.check_writes()?;
        if !self.finalize_request(record, RequestStatus::Served) {
            return Ok(());
        }

        let winner = record.result.winner;
        if let Some(ad_id) = winner {
            if let Some(mut ad) = self.ads.get_mut(&ad_id) {
                ad.performance.impressions += 1;
            }
        }

        if let Some(request) = self.requests.get(&record.request_id) {
            let date = record.decided_at.date_naive();
            let site_id = request.site_id;
            let revenue = record.result.clearing_price;
            self.earnings
                .entry((site_id, date))
                .and_modify(|e| {
                    e.impressions += 1;
                    e.revenue += revenue;
                })
                .or_insert(DailyEarnings {
                    site_id,
                    date,
                    impressions: 1,
                    revenue,
                });
        }

        self.outcomes.insert(record.request_id, record.clone());
        Ok(())
    }

    fn mark_failed(&self, record: &AuctionRecord) -> AdServeResult<()> {
        self.check_writes()?;
        if self.finalize_request(record, RequestStatus::Failed) {
            self.outcomes.insert(record.request_id, record.clone());
        }
        Ok(())
    }
}

/// Convenience used by the server and tests to seed a pending request.
pub fn new_pending_request(
    organization_id: Uuid,
    site_id: Uuid,
    ad_unit_id: Uuid,
    context: adserve_core::types::RequestContext,
) -> AdRequest {
    AdRequest {
        id: Uuid::new_v4(),
        organization_id,
        site_id,
        ad_unit_id,
        context,
        status: RequestStatus::Pending,
        winning_ad_id: None,
        winning_bid: None,
        clearing_price: None,
        created_at: Utc::now(),
        decided_at: None,
    }
}
