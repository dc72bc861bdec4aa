pub mod clock;
pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod session;
pub mod startup;
pub mod store;
pub mod utils;

use clock::Clock;
use config::HandoffConfig;
use services::{ArtifactResolver, HandoffManager, ProofSigner, TokenIssuer};
use std::sync::Arc;
use store::EphemeralStore;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HandoffConfig>,
    pub handoffs: HandoffManager,
    pub tokens: TokenIssuer,
    pub resolver: Arc<dyn ArtifactResolver>,
    pub store: Arc<dyn EphemeralStore>,
}

impl AppState {
    pub fn new(
        config: HandoffConfig,
        store: Arc<dyn EphemeralStore>,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn ArtifactResolver>,
    ) -> Self {
        let handoffs = HandoffManager::new(
            store.clone(),
            clock.clone(),
            ProofSigner::new(config.security.proof_secret.clone()),
            config.public_base_url.clone(),
            config.handoff.request_ttl_seconds,
        );
        let tokens = TokenIssuer::new(store.clone(), clock, config.handoff.token_ttl_seconds);

        Self {
            config: Arc::new(config),
            handoffs,
            tokens,
            resolver,
            store,
        }
    }
}
