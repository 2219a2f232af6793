use crate::url::domain_key;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// Rate limiter registration errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Crawl delay for domain [{domain}] must be at least 1ms")]
    DelayTooSmall { domain: String },

    #[error("URL [{0}] has no host to rate limit")]
    MissingHost(String),
}

/// Per-domain request pacing
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Overrides the delay used for the authority of `uri`
    fn register_domain_delay(&self, uri: &Url, delay: Duration) -> Result<(), RateLimitError>;

    /// Waits until a request to `uri` may be sent
    async fn throttle(&self, uri: &Url);
}

/// Slot-reserving rate limiter
///
/// Each call to `throttle` reserves the next free slot for its domain,
/// `max(now, previous slot + delay)`, and sleeps until it. Concurrent callers
/// for the same domain therefore queue up one delay apart; callers for
/// different domains never wait on each other.
#[derive(Debug)]
pub struct DomainRateLimiter {
    /// Delay for domains without a registered delay
    default_delay: Duration,

    /// Registered per-domain delays
    delays: DashMap<String, Duration>,

    /// Earliest instant the next request to each domain may start
    next_slot: DashMap<String, Instant>,
}

impl DomainRateLimiter {
    /// Creates a rate limiter
    ///
    /// # Arguments
    ///
    /// * `default_delay` - Delay between requests to a domain with no registered delay
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            delays: DashMap::new(),
            next_slot: DashMap::new(),
        }
    }

    /// Returns the delay applied to `domain`
    pub fn delay_for(&self, domain: &str) -> Duration {
        self.delays
            .get(domain)
            .map(|d| *d)
            .unwrap_or(self.default_delay)
    }

    /// Reserves the next slot for `domain` and returns when it starts
    fn reserve(&self, domain: String, delay: Duration) -> Instant {
        let now = Instant::now();
        let mut slot = self.next_slot.entry(domain).or_insert(now);
        let start = (*slot).max(now);
        *slot = start + delay;
        start
    }
}

#[async_trait]
impl RateLimiter for DomainRateLimiter {
    fn register_domain_delay(&self, uri: &Url, delay: Duration) -> Result<(), RateLimitError> {
        let domain = domain_key(uri).ok_or_else(|| RateLimitError::MissingHost(uri.to_string()))?;
        if delay < Duration::from_millis(1) {
            return Err(RateLimitError::DelayTooSmall { domain });
        }

        tracing::debug!("Registered crawl delay of {:?} for domain [{}]", delay, domain);
        self.delays.insert(domain, delay);
        Ok(())
    }

    async fn throttle(&self, uri: &Url) {
        let Some(domain) = domain_key(uri) else {
            return;
        };

        let delay = self.delay_for(&domain);
        if delay.is_zero() {
            return;
        }

        let start = self.reserve(domain, delay);
        if start > Instant::now() {
            tracing::trace!("Throttling [{}] for {:?}", uri, start - Instant::now());
            tokio::time::sleep_until(start).await;
        }
    }
}
