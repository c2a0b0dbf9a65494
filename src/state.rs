use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::config::Config;
use crate::db::DatabaseProxy;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::billing::BillingClient;
use crate::services::llm_provider::LLMProvider;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    config: Arc<Config>,
    db: DatabaseProxy,
    llm: Arc<LLMProvider>,
    billing: Arc<BillingClient>,
    auth_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DatabaseProxy, llm: LLMProvider) -> Self {
        let billing = BillingClient::new(config.billing.clone());
        let auth_limiter = RateLimiter::new(config.auth_rate_limit);
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            config: Arc::new(config),
            db,
            llm: Arc::new(llm),
            billing: Arc::new(billing),
            auth_limiter: Arc::new(auth_limiter),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &DatabaseProxy {
        &self.db
    }

    pub fn llm(&self) -> &LLMProvider {
        &self.llm
    }

    pub fn billing(&self) -> &BillingClient {
        &self.billing
    }

    pub fn auth_limiter(&self) -> &RateLimiter {
        &self.auth_limiter
    }
}
