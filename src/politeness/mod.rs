//! Politeness module
//!
//! Per-domain request pacing and the reconciliation of configured delays with
//! robots.txt crawl delays.

mod coordinator;
mod rate_limiter;

pub use coordinator::{EffectiveDelay, PolitenessCoordinator};
pub use rate_limiter::{DomainRateLimiter, RateLimitError, RateLimiter};
