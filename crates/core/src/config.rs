use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ADSERVE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub auction: AuctionConfig,
    #[serde(default)]
    pub targeting: TargetingConfig,
    #[serde(default)]
    pub frequency: FrequencyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Bid-calculation and ranking knobs. The reference values reproduce the
/// behavior the engine shipped with; they are deployment tunables, not
/// semantics.
#[derive(Debug, Clone, Deserialize)]
pub struct AuctionConfig {
    /// Floor returned for candidates with unusable campaign pricing data.
    #[serde(default = "default_floor_bid")]
    pub floor_bid: f64,
    /// Default CPC when an auto-CPC campaign declares no target.
    #[serde(default = "default_cpc")]
    pub default_cpc: f64,
    /// Default CPM when a CPM-derived strategy declares no target.
    #[serde(default = "default_cpm")]
    pub default_cpm: f64,
    /// Assumed conversion rate when deriving a per-impression bid from CPA.
    #[serde(default = "default_cpa_conversion_rate")]
    pub cpa_conversion_rate: f64,
    #[serde(default = "default_predictive_premium")]
    pub predictive_premium: f64,
    #[serde(default = "default_ai_premium")]
    pub ai_premium: f64,
    /// CTR at which the historical-CTR quality bonus is fully earned.
    #[serde(default = "default_ctr_full_credit")]
    pub ctr_full_credit: f64,
    /// CVR at which the historical-CVR quality bonus is fully earned.
    #[serde(default = "default_cvr_full_credit")]
    pub cvr_full_credit: f64,
    /// Creative age window for the freshness bonus, in days.
    #[serde(default = "default_freshness_window_days")]
    pub freshness_window_days: i64,
    #[serde(default = "default_targeting_multiplier_min")]
    pub targeting_multiplier_min: f64,
    #[serde(default = "default_targeting_multiplier_max")]
    pub targeting_multiplier_max: f64,
    /// Weight of the quality score in the combined rank score. Sized so
    /// quality can break close bid ties without dominating monetary value.
    #[serde(default = "default_quality_rank_weight")]
    pub quality_rank_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetingConfig {
    /// Sub-score for a broader-category match (country without region,
    /// adjacent handheld device class).
    #[serde(default = "default_partial_match_score")]
    pub partial_match_score: f64,
    /// Sub-score floor for a soft mismatch. Non-zero so imprecise context
    /// data never fully excludes a candidate.
    #[serde(default = "default_mismatch_floor")]
    pub mismatch_floor: f64,
    /// Score when no targeting dimension is evaluable on either side.
    #[serde(default = "default_neutral_score")]
    pub neutral_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrequencyConfig {
    #[serde(default = "default_impression_limit")]
    pub impression_limit: u32,
    #[serde(default = "default_impression_window_secs")]
    pub impression_window_secs: u64,
    #[serde(default = "default_click_limit")]
    pub click_limit: u32,
    #[serde(default = "default_click_window_secs")]
    pub click_window_secs: u64,
    /// Interval for the expired-bucket eviction sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_floor_bid() -> f64 {
    0.01
}
fn default_cpc() -> f64 {
    1.50
}
fn default_cpm() -> f64 {
    2.00
}
fn default_cpa_conversion_rate() -> f64 {
    0.1
}
fn default_predictive_premium() -> f64 {
    1.2
}
fn default_ai_premium() -> f64 {
    1.5
}
fn default_ctr_full_credit() -> f64 {
    0.05
}
fn default_cvr_full_credit() -> f64 {
    0.02
}
fn default_freshness_window_days() -> i64 {
    30
}
fn default_targeting_multiplier_min() -> f64 {
    0.7
}
fn default_targeting_multiplier_max() -> f64 {
    1.3
}
fn default_quality_rank_weight() -> f64 {
    0.5
}
fn default_partial_match_score() -> f64 {
    0.8
}
fn default_mismatch_floor() -> f64 {
    0.3
}
fn default_neutral_score() -> f64 {
    0.5
}
fn default_impression_limit() -> u32 {
    3
}
fn default_impression_window_secs() -> u64 {
    86_400
}
fn default_click_limit() -> u32 {
    1
}
fn default_click_window_secs() -> u64 {
    86_400
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            floor_bid: default_floor_bid(),
            default_cpc: default_cpc(),
            default_cpm: default_cpm(),
            cpa_conversion_rate: default_cpa_conversion_rate(),
            predictive_premium: default_predictive_premium(),
            ai_premium: default_ai_premium(),
            ctr_full_credit: default_ctr_full_credit(),
            cvr_full_credit: default_cvr_full_credit(),
            freshness_window_days: default_freshness_window_days(),
            targeting_multiplier_min: default_targeting_multiplier_min(),
            targeting_multiplier_max: default_targeting_multiplier_max(),
            quality_rank_weight: default_quality_rank_weight(),
        }
    }
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            partial_match_score: default_partial_match_score(),
            mismatch_floor: default_mismatch_floor(),
            neutral_score: default_neutral_score(),
        }
    }
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            impression_limit: default_impression_limit(),
            impression_window_secs: default_impression_window_secs(),
            click_limit: default_click_limit(),
            click_window_secs: default_click_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            auction: AuctionConfig::default(),
            targeting: TargetingConfig::default(),
            frequency: FrequencyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ADSERVE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
