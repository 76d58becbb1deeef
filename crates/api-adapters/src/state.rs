use std::net::IpAddr;
use std::sync::Arc;

use domains::{IdentityProvider, RateLimiter};
use services::LedgerServices;

use crate::metrics::Metrics;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: LedgerServices,
    pub identity: Arc<dyn IdentityProvider>,
    pub limiter: Arc<dyn RateLimiter>,
    pub metrics: Arc<Metrics>,
    /// Peers whose `x-forwarded-for` header is believed.
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    pub fn new(
        services: LedgerServices,
        identity: Arc<dyn IdentityProvider>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            services,
            identity,
            limiter,
            metrics: Arc::new(Metrics::new()),
            trusted_proxies: Arc::from([]),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies.into();
        self
    }
}
