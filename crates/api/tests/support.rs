use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rpcshield_app::AppContext;
use rpcshield_domain::{AppConfig, ClientConfig};
use rpcshield_infra::InProcessTransport;

/// Context wired to `peer`; the peer keeps its fault plan and counters.
pub fn app_with(peer: &InProcessTransport, client: ClientConfig) -> AppContext {
    let config = AppConfig { client, ..AppConfig::default() };
    AppContext::with_transport(config, Arc::new(peer.clone()))
        .expect("default-derived config must be valid")
}

/// Context over a fresh in-process peer with default settings.
pub fn app() -> (AppContext, InProcessTransport) {
    let peer = InProcessTransport::default();
    (app_with(&peer, ClientConfig::default()), peer)
}

/// No retries at all, so every failure surfaces on the first call.
#[allow(dead_code)]
pub fn without_retries() -> ClientConfig {
    let mut client = ClientConfig::default();
    client.retry.retryable_kinds = BTreeSet::new();
    client.retry.max_attempts = 1;
    client
}

/// Fixed one second between attempts.
#[allow(dead_code)]
pub fn without_jitter() -> ClientConfig {
    let mut client = ClientConfig::default();
    client.retry.base_delay = Duration::from_secs(1);
    client.retry.jitter_fraction = 0.0;
    client
}
