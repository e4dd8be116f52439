//! Shared application state for Axum routers.

use std::sync::Arc;

use opsflow_cache::{CachedValue, TtlCache};

use crate::auth::IdentityProvider;
use crate::cached_store::CachedStore;
use crate::config::ApiConfig;
use crate::sms::SmsGateway;
use crate::store::CustomerStore;
use crate::ws::WsState;

/// Everything the router builder hands out to per-route states.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    /// Backing store behind the memoizing cache. Routes read and write
    /// through this so invalidation happens on every mutation.
    pub cached: CachedStore,
    pub ws: Arc<WsState>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sms: Arc<dyn SmsGateway>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn CustomerStore>,
        identity: Arc<dyn IdentityProvider>,
        sms: Arc<dyn SmsGateway>,
    ) -> Self {
        let cache: Arc<TtlCache<CachedValue>> = Arc::new(TtlCache::new());
        let cached = CachedStore::new(store, cache, config.cache_ttls);
        let ws = Arc::new(WsState::new(config.ws_capacity));
        Self {
            config,
            cached,
            ws,
            identity,
            sms,
        }
    }

    /// The process-wide cache, for the cleanup task.
    pub fn cache(&self) -> Arc<TtlCache<CachedValue>> {
        Arc::clone(self.cached.cache())
    }
}
