//! Fixed-window rate limiting keyed by source address.
//!
//! One counter per address under `ponsiv:ratelimit:<address>`. A request is
//! rejected once the counter has reached the threshold; admitted requests
//! increment the counter and reset its expiry, so the window renews on every
//! admitted hit rather than anchoring to the first one.

use std::sync::Arc;

use crate::error::AppError;
use crate::store::KvStore;

pub const RATE_LIMIT_PREFIX: &str = "ponsiv:ratelimit:";

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    max_requests: i64,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, max_requests: i64, window_secs: u64) -> Self {
        RateLimiter {
            store,
            max_requests,
            window_secs,
        }
    }

    pub async fn check(&self, source: &str) -> Result<(), AppError> {
        let key = format!("{RATE_LIMIT_PREFIX}{source}");

        let seen = self
            .store
            .get(&key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);

        if seen >= self.max_requests {
            return Err(AppError::RateLimited);
        }

        self.store.incr(&key).await?;
        self.store.expire(&key, self.window_secs).await?;

        Ok(())
    }
}
