use std::sync::Arc;

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::store::{KvStore, RedisKvStore};
use crate::waitlist::Waitlist;

pub struct AppState {
    pub config: Config,
    pub waitlist: Waitlist,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let store: Arc<dyn KvStore> = Arc::new(
            RedisKvStore::connect(&config.redis_url)
                .await
                .expect("Redis misconfigured!"),
        );

        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn KvStore>) -> Arc<Self> {
        let rate_limiter = RateLimiter::new(
            store.clone(),
            config.rate_limit_max_requests,
            config.rate_limit_window_secs,
        );
        let waitlist = Waitlist::new(store, rate_limiter, config.admin_token.clone());

        Arc::new(Self { config, waitlist })
    }
}
