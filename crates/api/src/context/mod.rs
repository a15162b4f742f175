//! Application context - dependency injection container
//!
//! [`AppContext`] is built once at startup and handed to whatever drives the
//! clients. It owns the only [`Transport`] and every per-method breaker and
//! bucket; nothing in the runtime reaches for globals.

mod endpoints;

use std::sync::Arc;

use rpcshield_common::resilience::CircuitState;
use rpcshield_core::{CallChannel, Transport};
use rpcshield_domain::{AppConfig, Result};
use rpcshield_infra::{config, storage, InProcessTransport};
use tracing::info;

pub use endpoints::EndpointFactory;

use crate::clients::{BlogClient, GreetClient};

/// Application context - holds the configured clients and their shared state
pub struct AppContext {
    /// Validated configuration the context was built from
    pub config: AppConfig,
    /// Greet service client
    pub greet: GreetClient,
    /// Blog service client
    pub blog: BlogClient,
    endpoints: EndpointFactory,
}

impl AppContext {
    /// Load configuration from the environment or a config file and serve
    /// calls from the in-process peer.
    pub fn new() -> Result<Self> {
        let config = config::load()?;
        Self::new_with_config(config)
    }

    /// Serve calls from the in-process peer backed by the configured storage.
    pub fn new_with_config(config: AppConfig) -> Result<Self> {
        let store = storage::connect(&config.storage)?;
        let transport = Arc::new(InProcessTransport::new(store));
        Self::with_transport(config, transport)
    }

    /// Wire the clients over an existing transport.
    pub fn with_transport(config: AppConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let endpoints = EndpointFactory::new(&config.client, transport)?;
        let greet = GreetClient::new(&endpoints)?;
        let blog = BlogClient::new(&endpoints)?;

        info!(
            server_addr = %config.client.server_addr,
            tls = config.client.tls.enabled,
            storage = %config.storage.uri,
            "application context ready"
        );
        Ok(Self { config, greet, blog, endpoints })
    }

    /// The channel every client sends through.
    pub fn channel(&self) -> &CallChannel {
        self.endpoints.channel()
    }

    /// Breaker state per method path.
    pub fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        self.endpoints.circuit_states()
    }

    /// Log the final breaker states and counters. In-flight calls end with
    /// their contexts; nothing else needs releasing.
    pub fn shutdown(&self) {
        for (method, metrics) in self.endpoints.circuit_metrics() {
            info!(
                method,
                state = %metrics.state,
                total_calls = metrics.total_calls,
                rejected_calls = metrics.rejected_calls,
                "circuit state at shutdown"
            );
        }
        info!("application context shut down");
    }
}
