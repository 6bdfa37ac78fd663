//! AdServe — real-time ad decision engine.
//!
//! Main entry point: initializes logging, configuration, the in-memory
//! store, the frequency tracker, and the HTTP/metrics servers.

use adserve_api::ApiServer;
use adserve_auction::{AuctionEngine, MemoryStore};
use adserve_core::config::AppConfig;
use adserve_core::types::{
    Ad, AdFormat, AdPerformance, AdStatus, AdUnit, BidStrategy, Campaign, CampaignStatus,
    CreativeType, Organization, OrganizationStatus, TargetingCriteria,
};
use adserve_frequency::FrequencyCapTracker;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "adserve")]
#[command(about = "Real-time ad decision engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ADSERVE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ADSERVE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Seed a small demo catalog into the in-memory store
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adserve=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("AdServe starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    if cli.seed_demo {
        seed_demo_catalog(&store);
        info!("Demo catalog seeded");
    }

    let tracker = Arc::new(FrequencyCapTracker::new(config.frequency.clone()));
    let engine = Arc::new(AuctionEngine::new(
        store.clone(),
        tracker.clone(),
        &config,
    ));

    let api_server = ApiServer::new(config.clone(), engine, tracker.clone());

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        warn!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn frequency-bucket eviction task
    let sweep_interval = std::time::Duration::from_secs(config.frequency.sweep_interval_secs);
    let tracker_for_sweep = tracker.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            tracker_for_sweep.evict_expired();
        }
    });

    info!("AdServe is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}

/// Minimal fixture catalog so a fresh node can serve auctions out of the
/// box: one organization, one ad unit, two competing campaigns.
fn seed_demo_catalog(store: &MemoryStore) {
    let org_id = Uuid::new_v4();
    store.insert_organization(Organization {
        id: org_id,
        name: "Demo Advertiser".to_string(),
        status: OrganizationStatus::Active,
    });

    store.insert_ad_unit(AdUnit {
        id: Uuid::new_v4(),
        site_id: Uuid::new_v4(),
        format: AdFormat::Banner,
        width: 300,
        height: 250,
    });

    let strategies = [
        BidStrategy::Manual { bid: 2.50 },
        BidStrategy::AutoCpc { target_cpc: None },
    ];
    for (index, strategy) in strategies.into_iter().enumerate() {
        let campaign_id = Uuid::new_v4();
        store.insert_campaign(Campaign {
            id: campaign_id,
            organization_id: org_id,
            status: CampaignStatus::Active,
            bid_strategy: strategy,
            daily_budget: Some(100.0),
            total_budget: None,
            frequency_caps: Vec::new(),
        });
        store.insert_ad(Ad {
            id: Uuid::new_v4(),
            campaign_id,
            organization_id: org_id,
            status: AdStatus::Active,
            creative_type: CreativeType::Image,
            creative_url: format!("https://cdn.example.com/demo/creative-{index}.png"),
            targeting: TargetingCriteria::default(),
            allowed_formats: vec![AdFormat::Banner],
            allowed_sizes: Vec::new(),
            weight: 1.0,
            performance: AdPerformance {
                impressions: 0,
                clicks: 0,
                conversions: 0,
                created_at: chrono::Utc::now(),
            },
        });
    }
}
