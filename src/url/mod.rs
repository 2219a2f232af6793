//! URL handling module for Sumi-Engine
//!
//! This module provides authority extraction, internal/external
//! classification, and the link normalization applied before scheduling.

mod domain;

pub use domain::{domain_key, same_authority};

use url::Url;

/// Returns true if the URL uses a scheme the engine can fetch
pub fn is_http_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Default internal-link classification
///
/// A URI is internal when it shares its authority with either the current
/// root (which may have moved after a root redirect) or the original root.
///
/// # Arguments
///
/// * `uri` - The candidate URI
/// * `root` - The current crawl root
/// * `original_root` - The root the crawl was started with
pub fn is_internal(uri: &Url, root: &Url, original_root: &Url) -> bool {
    same_authority(uri, root) || same_authority(uri, original_root)
}

/// Normalizes a discovered link before it is compared against the frontier
///
/// Fragments are dropped unless `keep_fragment` is set, so `page#a` and
/// `page#b` collapse onto the same frontier entry.
pub fn normalize_link(mut url: Url, keep_fragment: bool) -> Url {
    if !keep_fragment {
        url.set_fragment(None);
    }
    url
}
