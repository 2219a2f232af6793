use crate::politeness::{RateLimitError, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Per-domain delay chosen after reconciling robots.txt with the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveDelay {
    /// Delay between requests, in milliseconds
    pub millis: u64,

    /// The robots.txt crawl delay raised the configured minimum
    pub from_robots: bool,

    /// The robots.txt crawl delay was clamped to the configured maximum
    pub capped: bool,
}

impl EffectiveDelay {
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

/// Merges the configured per-domain delay with robots.txt and paces fetches
#[derive(Clone)]
pub struct PolitenessCoordinator {
    rate_limiter: Arc<dyn RateLimiter>,
}

impl PolitenessCoordinator {
    pub fn new(rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self { rate_limiter }
    }

    /// Computes the per-domain delay to use
    ///
    /// The robots.txt delay only counts when it is positive and, in
    /// milliseconds, above `min_per_domain_ms`. It is then clamped to
    /// `max_robots_delay_seconds`. The result never drops below the configured
    /// minimum.
    ///
    /// When the cap is below the minimum, a robots.txt delay above both
    /// resolves to the minimum rather than the cap.
    ///
    /// # Arguments
    ///
    /// * `robots_delay_seconds` - Crawl-delay from robots.txt, if any
    /// * `min_per_domain_ms` - Configured minimum delay per domain
    /// * `max_robots_delay_seconds` - Upper bound for the robots.txt delay
    pub fn reconcile(
        robots_delay_seconds: Option<f64>,
        min_per_domain_ms: u64,
        max_robots_delay_seconds: u64,
    ) -> EffectiveDelay {
        let floor = EffectiveDelay {
            millis: min_per_domain_ms,
            from_robots: false,
            capped: false,
        };

        let Some(mut seconds) = robots_delay_seconds.filter(|s| s.is_finite() && *s > 0.0) else {
            return floor;
        };

        if seconds * 1000.0 <= min_per_domain_ms as f64 {
            return floor;
        }

        let mut capped = false;
        if seconds > max_robots_delay_seconds as f64 {
            tracing::warn!(
                "[{}] robots.txt crawl delay exceeds the configured max of [{}] seconds, using the max instead",
                seconds,
                max_robots_delay_seconds
            );
            seconds = max_robots_delay_seconds as f64;
            capped = true;
        }

        let millis = (seconds * 1000.0).round() as u64;
        EffectiveDelay {
            millis: millis.max(min_per_domain_ms),
            from_robots: true,
            capped,
        }
    }

    /// Registers a robots.txt derived delay for the root's domain
    ///
    /// Nothing is registered when the configured minimum already applies.
    pub fn apply_robots_delay(&self, root: &Url, delay: EffectiveDelay) -> Result<(), RateLimitError> {
        if !delay.from_robots || delay.millis == 0 {
            return Ok(());
        }

        tracing::info!(
            "Using robots.txt crawl delay of [{}] ms for site [{}]",
            delay.millis,
            root
        );
        self.rate_limiter
            .register_domain_delay(root, delay.as_duration())
    }

    /// Waits for the rate limiter before fetching `uri`
    ///
    /// Called for every dispatched fetch, including when no delay applies.
    pub async fn before_fetch(&self, uri: &Url) {
        self.rate_limiter.throttle(uri).await;
    }
}
