//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate; crawl delays
//! are read from the agent groups parsed here.

use robotstxt::DefaultMatcher;
use url::Url;

/// One `User-agent` group and the crawl delay it declares
#[derive(Debug, Clone, Default)]
struct AgentGroup {
    agents: Vec<String>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt directives for one site
#[derive(Debug, Clone)]
pub struct RobotsTxt {
    /// Raw robots.txt content
    content: String,

    /// Agent groups in file order
    groups: Vec<AgentGroup>,
}

impl RobotsTxt {
    /// Parses raw robots.txt content
    ///
    /// Consecutive `User-agent` lines form one group; a `User-agent` line that
    /// follows any other directive starts a new group.
    pub fn from_content(content: &str) -> Self {
        let mut groups: Vec<AgentGroup> = Vec::new();
        let mut current = AgentGroup::default();
        let mut in_agent_lines = false;

        for line in content.lines() {
            // Strip trailing comments
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_lines && !current.agents.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_lowercase());
                    in_agent_lines = true;
                }
                "crawl-delay" => {
                    in_agent_lines = false;
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay.is_finite() && delay >= 0.0 {
                            current.crawl_delay = Some(delay);
                        }
                    }
                }
                _ => in_agent_lines = false,
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self {
            content: content.to_string(),
            groups,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to check
    /// * `user_agent` - The robots user agent token
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_url_allowed(&self, url: &Url, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url.as_str())
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent is preferred over the `*` group.
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no applicable crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let agent = user_agent.to_lowercase();

        let specific = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())))
            .find_map(|g| g.crawl_delay);

        specific.or_else(|| {
            self.groups
                .iter()
                .filter(|g| g.agents.iter().any(|ua| ua == "*"))
                .find_map(|g| g.crawl_delay)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("http://a.com/").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_parse_disallow_all() {
        let robots = RobotsTxt::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_url_allowed(&url("/"), "TestBot"));
        assert!(!robots.is_url_allowed(&url("/page"), "TestBot"));
    }

    #[test]
    fn test_parse_disallow_specific() {
        let robots = RobotsTxt::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_url_allowed(&url("/"), "TestBot"));
        assert!(robots.is_url_allowed(&url("/page"), "TestBot"));
        assert!(!robots.is_url_allowed(&url("/admin"), "TestBot"));
        assert!(!robots.is_url_allowed(&url("/admin/users"), "TestBot"));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let robots =
            RobotsTxt::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_url_allowed(&url("/private"), "TestBot"));
        assert!(robots.is_url_allowed(&url("/private/public"), "TestBot"));
    }

    #[test]
    fn test_parse_specific_user_agent() {
        let robots =
            RobotsTxt::from_content("User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(robots.is_url_allowed(&url("/page"), "GoodBot"));
        assert!(!robots.is_url_allowed(&url("/page"), "BadBot"));
    }

    #[test]
    fn test_empty_and_invalid_allow_everything() {
        assert!(RobotsTxt::from_content("").is_url_allowed(&url("/x"), "TestBot"));
        assert!(RobotsTxt::from_content("not robots {{{").is_url_allowed(&url("/x"), "TestBot"));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let robots = RobotsTxt::from_content("User-agent: *\nCrawl-delay: 10\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("TestBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_specific_agent_preferred() {
        let robots = RobotsTxt::from_content(
            "User-agent: *\nCrawl-delay: 10\n\nUser-agent: TestBot\nCrawl-delay: 5",
        );
        assert_eq!(robots.crawl_delay("TestBot"), Some(5.0));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_after_disallow_in_group() {
        let robots = RobotsTxt::from_content(
            "User-agent: TestBot\nDisallow: /x\nCrawl-delay: 4\nUser-agent: *\nDisallow: /",
        );
        assert_eq!(robots.crawl_delay("testbot"), Some(4.0));
        assert_eq!(robots.crawl_delay("OtherBot"), None);
    }

    #[test]
    fn test_crawl_delay_multiple_user_agents() {
        let robots = RobotsTxt::from_content("User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 3");
        assert_eq!(robots.crawl_delay("BotA"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotB"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_crawl_delay_decimal_and_invalid() {
        assert_eq!(
            RobotsTxt::from_content("User-agent: *\nCrawl-delay: 2.5").crawl_delay("x"),
            Some(2.5)
        );
        assert_eq!(
            RobotsTxt::from_content("User-agent: *\nCrawl-delay: soon").crawl_delay("x"),
            None
        );
    }

    #[test]
    fn test_comments_ignored() {
        let robots =
            RobotsTxt::from_content("# site rules\nUser-agent: * # everyone\nCrawl-delay: 1 # slow");
        assert_eq!(robots.crawl_delay("x"), Some(1.0));
    }
}
