//! Wagerhall backend: the match registry behind an HTTP and WebSocket API.
//!
//! [`Server`] owns every long-lived piece: the registry of live matches, the
//! in-memory ledger, the payout dispatcher and the WebSocket connection
//! limits. [`Api`] turns it into an axum router.

use std::sync::Arc;
use tokio::task::JoinHandle;
use wagerhall_execution::{ChessEngine, MemoryLedger, PaymentProvider};

mod api;
pub use api::Api;

pub mod config;
pub use config::{Config, ConfigError, ValidatedConfig};

mod connections;
pub use connections::{ConnectionGuard, ConnectionRegistry, ConnectionRejection};

mod metrics;
pub use metrics::{LatencySnapshot, ServerMetrics, ServerMetricsSnapshot};

mod payouts;
pub use payouts::TracingProvider;

pub mod registry;
pub use registry::{
    CreateMatch, JoinRequest, MatchRegistry, RegistryError, RegistrySettings, StateChange,
};

mod timeouts;

pub struct Server {
    config: ValidatedConfig,
    registry: Arc<MatchRegistry<MemoryLedger>>,
    connections: ConnectionRegistry,
    metrics: Arc<ServerMetrics>,
    payouts: JoinHandle<()>,
}

impl Server {
    /// Start a server that reports payouts through the log.
    pub fn new(config: ValidatedConfig, chess_engine: Option<Arc<dyn ChessEngine>>) -> Arc<Self> {
        Self::with_provider(config, chess_engine, Arc::new(TracingProvider::new()))
    }

    pub fn with_provider<P: PaymentProvider>(
        config: ValidatedConfig,
        chess_engine: Option<Arc<dyn ChessEngine>>,
        provider: Arc<P>,
    ) -> Arc<Self> {
        let metrics = Arc::new(ServerMetrics::default());
        let (registry, instructions) = MatchRegistry::start(
            RegistrySettings::from(&config),
            Arc::new(MemoryLedger::new()),
            chess_engine,
            Arc::clone(&metrics),
        );
        let payouts = payouts::spawn_dispatcher(provider, instructions, Arc::clone(&metrics));
        let connections = ConnectionRegistry::new(
            config.ws_max_connections,
            config.ws_max_connections_per_ip,
            Arc::clone(&metrics),
        );
        tracing::info!(
            turn_timeout_ms = config.turn_timeout.as_millis() as u64,
            fill_timeout_ms = config.fill_timeout.as_millis() as u64,
            retention_ms = config.retention.as_millis() as u64,
            default_platform_fee_bps = config.default_platform_fee_bps,
            deterministic_dice = config.dice_seed.is_some(),
            "server initialized"
        );
        Arc::new(Self {
            config,
            registry,
            connections,
            metrics,
            payouts,
        })
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MatchRegistry<MemoryLedger>> {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Close WebSocket streams, stop timers and the payout dispatcher.
    /// Ledger contents are unaffected.
    pub fn shutdown(&self) {
        self.connections.close_all();
        self.registry.shutdown();
        self.payouts.abort();
        tracing::info!("server stopped");
    }
}
