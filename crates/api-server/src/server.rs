//! API server — assembles the axum router and the metrics exporter.

use crate::rest::{self, AppState};
use adserve_auction::AuctionEngine;
use adserve_core::config::AppConfig;
use adserve_frequency::FrequencyCapTracker;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    engine: Arc<AuctionEngine>,
    tracker: Arc<FrequencyCapTracker>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        engine: Arc<AuctionEngine>,
        tracker: Arc<FrequencyCapTracker>,
    ) -> Self {
        Self {
            config,
            engine,
            tracker,
        }
    }

    /// Start the HTTP server. Blocks until shutdown.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            engine: self.engine.clone(),
            tracker: self.tracker.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        let app = Router::new()
            // Decision endpoints
            .route("/v1/auctions/:request_id/run", post(rest::run_auction))
            .route("/v1/frequency/check", get(rest::check_frequency))
            .route("/v1/frequency/record", post(rest::record_frequency_event))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus exporter on the metrics port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
