use url::Url;

/// Returns the authority key used for per-domain bookkeeping
///
/// The key is the lowercase host, followed by `:port` when the URL carries an
/// explicit non-default port. Two URLs with the same key share politeness
/// slots and per-domain page counts.
///
/// # Arguments
///
/// * `url` - The URL to extract the key from
///
/// # Returns
///
/// * `Some(String)` - The authority key
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_engine::url::domain_key;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(domain_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://localhost:8080/").unwrap();
/// assert_eq!(domain_key(&url), Some("localhost:8080".to_string()));
/// ```
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns true if both URLs share the same authority key
pub fn same_authority(a: &Url, b: &Url) -> bool {
    match (domain_key(a), domain_key(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(domain_key(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_subdomain_is_distinct() {
        let a = Url::parse("https://blog.example.com/post").unwrap();
        let b = Url::parse("https://example.com/post").unwrap();
        assert_eq!(domain_key(&a), Some("blog.example.com".to_string()));
        assert!(!same_authority(&a, &b));
    }

    #[test]
    fn test_explicit_port_kept() {
        let url = Url::parse("http://127.0.0.1:4321/a.html").unwrap();
        assert_eq!(domain_key(&url), Some("127.0.0.1:4321".to_string()));
    }

    #[test]
    fn test_default_port_dropped() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(domain_key(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(domain_key(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_no_host() {
        let url = Url::parse("data:text/plain,hello").unwrap();
        assert_eq!(domain_key(&url), None);
    }

    #[test]
    fn test_same_authority_ignores_path_and_scheme_case() {
        let a = Url::parse("http://a.com/x?q=1").unwrap();
        let b = Url::parse("HTTP://A.COM/y").unwrap();
        assert!(same_authority(&a, &b));
    }

    #[test]
    fn test_different_ports() {
        let a = Url::parse("http://a.com:8080/").unwrap();
        let b = Url::parse("http://a.com:8081/").unwrap();
        assert!(!same_authority(&a, &b));
    }
}
