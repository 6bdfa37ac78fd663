use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ─── Ad Request ─────────────────────────────────────────────────────────

/// One placement opportunity, created when an ad unit requests a fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdRequest {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub site_id: Uuid,
    pub ad_unit_id: Uuid,
    pub context: RequestContext,
    pub status: RequestStatus,
    pub winning_ad_id: Option<Uuid>,
    pub winning_bid: Option<f64>,
    pub clearing_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Served,
    Failed,
    Blocked,
}

impl AdRequest {
    /// Served, Failed, and Blocked requests are never re-auctioned.
    pub fn is_terminal(&self) -> bool {
        self.status != RequestStatus::Pending
    }
}

/// Request-side context the Targeting Evaluator scores against.
/// Every dimension is optional; absent dimensions are skipped, not penalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub geo: Option<GeoContext>,
    pub device: Option<DeviceType>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub demographics: Option<Demographics>,
    #[serde(default)]
    pub behaviors: Vec<String>,
    /// Free-form attributes forwarded by the serving layer.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoContext {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Ctv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demographics {
    pub age: Option<u8>,
    pub gender: Option<String>,
}

// ─── Placement ──────────────────────────────────────────────────────────

/// An ad slot on a site: the placement an auction fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdUnit {
    pub id: Uuid,
    pub site_id: Uuid,
    pub format: AdFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdFormat {
    Banner,
    Video,
    Native,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdSize {
    pub w: u32,
    pub h: u32,
}

// ─── Ads ────────────────────────────────────────────────────────────────

/// A creative eligible to compete in auctions. Owned by the campaign
/// management collaborator; read-only to the engine apart from lifetime
/// counter increments on serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub organization_id: Uuid,
    pub status: AdStatus,
    pub creative_type: CreativeType,
    pub creative_url: String,
    pub targeting: TargetingCriteria,
    /// Hard filter: formats this creative can render in.
    #[serde(default)]
    pub allowed_formats: Vec<AdFormat>,
    /// Hard filter: placement sizes this creative fits. Empty = any size.
    #[serde(default)]
    pub allowed_sizes: Vec<AdSize>,
    pub weight: f64,
    pub performance: AdPerformance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    Draft,
    Active,
    Paused,
    Rejected,
    Approved,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreativeType {
    Image,
    Video,
    Html,
}

/// Lifetime delivery counters for one creative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdPerformance {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub created_at: DateTime<Utc>,
}

impl AdPerformance {
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64
        }
    }

    pub fn cvr(&self) -> f64 {
        if self.clicks == 0 {
            0.0
        } else {
            self.conversions as f64 / self.clicks as f64
        }
    }
}

// ─── Targeting Criteria ─────────────────────────────────────────────────

/// Declared targeting for one ad. Each dimension is an explicit optional
/// field with its own comparison rule; a `required` flag turns the geo or
/// device dimension into a hard eligibility constraint instead of a soft
/// score input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetingCriteria {
    pub geo: Option<GeoTargeting>,
    pub device: Option<DeviceTargeting>,
    pub interests: Option<Vec<String>>,
    pub demographics: Option<DemographicTargeting>,
    pub behaviors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoTargeting {
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    /// When true, a known non-matching country excludes the ad outright.
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTargeting {
    #[serde(default)]
    pub device_types: Vec<DeviceType>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemographicTargeting {
    pub age_min: Option<u8>,
    pub age_max: Option<u8>,
    #[serde(default)]
    pub genders: Vec<String>,
}

// ─── Organizations ──────────────────────────────────────────────────────

/// Advertiser organization, read for its status in the eligibility join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub status: OrganizationStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    Active,
    Suspended,
}

// ─── Campaigns ──────────────────────────────────────────────────────────

/// Economic and scheduling envelope for a set of ads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub status: CampaignStatus,
    pub bid_strategy: BidStrategy,
    pub daily_budget: Option<f64>,
    pub total_budget: Option<f64>,
    /// Per-campaign overrides of the default frequency-cap rules.
    #[serde(default)]
    pub frequency_caps: Vec<CampaignCapRule>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

/// Closed set of bid strategies with strategy-specific pricing inputs, so
/// the Bid Calculator's dispatch is exhaustive and compiler-checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BidStrategy {
    Manual { bid: f64 },
    AutoCpc { target_cpc: Option<f64> },
    AutoCpm { target_cpm: Option<f64> },
    TargetCpa { target_cpa: f64 },
    Predictive { target_cpm: Option<f64> },
    AiOptimized { target_cpm: Option<f64> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CampaignCapRule {
    pub event_type: EventType,
    pub limit: u32,
    pub window_secs: u64,
}

// ─── Events ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    Conversion,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Impression => "impression",
            EventType::Click => "click",
            EventType::Conversion => "conversion",
        }
    }
}

// ─── Auction Outcome ────────────────────────────────────────────────────

/// Result of one auction execution, returned to the serving layer and
/// persisted for idempotent replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionResult {
    pub winner: Option<Uuid>,
    pub winning_bid: f64,
    pub clearing_price: f64,
    pub participants: u32,
    pub auction_data: AuctionData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionData {
    pub bid_range: BidRange,
    pub quality_scores: Vec<QualityScoreEntry>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BidRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScoreEntry {
    pub ad_id: Uuid,
    pub quality_score: f64,
    pub targeting_score: f64,
}

impl AuctionResult {
    /// The explicit empty result for auctions with no serveable winner.
    pub fn empty(participants: u32) -> Self {
        Self {
            winner: None,
            winning_bid: 0.0,
            clearing_price: 0.0,
            participants,
            auction_data: AuctionData::default(),
        }
    }
}

/// Outcome record appended to the reporting collaborator after each auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionRecord {
    pub request_id: Uuid,
    pub result: AuctionResult,
    pub decided_at: DateTime<Utc>,
}

/// Daily earnings aggregate keyed by site and day, updated on serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEarnings {
    pub site_id: Uuid,
    pub date: NaiveDate,
    pub impressions: u64,
    pub revenue: f64,
}
