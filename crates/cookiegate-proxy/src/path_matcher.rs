//! Decides which request paths belong to the proxied API surface.

use regex::Regex;

use crate::error::Result;

/// One API path rule.
#[derive(Debug, Clone)]
pub enum PathRule {
    /// Segment-aware prefix: `/api` matches `/api` and `/api/x`, not `/apikey`.
    Prefix(String),
    /// Regular expression searched in the path.
    Pattern(Regex),
}

impl PathRule {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        PathRule::Prefix(prefix.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(PathRule::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathRule::Prefix(prefix) => {
                let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                    return false;
                };
                rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')
            }
            PathRule::Pattern(regex) => regex.is_match(path),
        }
    }
}

impl std::fmt::Display for PathRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathRule::Prefix(prefix) => write!(f, "{}", prefix),
            PathRule::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// A set of rules; a path is proxied iff any rule matches.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    rules: Vec<PathRule>,
}

impl PathMatcher {
    pub fn new(rules: Vec<PathRule>) -> Self {
        Self { rules }
    }

    pub fn matches(&self, path: &str) -> bool {
        matches(path, &self.rules)
    }

    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(vec![PathRule::prefix("/api")])
    }
}

pub fn matches(path: &str, rules: &[PathRule]) -> bool {
    rules.iter().any(|rule| rule.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_respects_segments() {
        let rule = PathRule::prefix("/api");
        assert!(rule.matches("/api"));
        assert!(rule.matches("/api/users"));
        assert!(!rule.matches("/apikey"));
        assert!(!rule.matches("/v1/api"));
    }

    #[test]
    fn test_prefix_with_trailing_slash() {
        let rule = PathRule::prefix("/api/");
        assert!(rule.matches("/api/users"));
        assert!(!rule.matches("/api"));
    }

    #[test]
    fn test_pattern_rule() {
        let rule = PathRule::pattern(r"^/graphql").unwrap();
        assert!(rule.matches("/graphql/anything"));
        assert!(rule.matches("/graphql"));
        assert!(!rule.matches("/api/graphql"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(PathRule::pattern("(unclosed").is_err());
    }

    #[test]
    fn test_any_rule_matches() {
        let matcher = PathMatcher::new(vec![
            PathRule::prefix("/api"),
            PathRule::pattern(r"^/graphql").unwrap(),
        ]);
        assert!(matcher.matches("/api/x"));
        assert!(matcher.matches("/graphql"));
        assert!(!matcher.matches("/index.html"));
    }

    #[test]
    fn test_default_matcher_is_api() {
        let matcher = PathMatcher::default();
        assert!(matcher.matches("/api/data"));
        assert!(!matcher.matches("/"));
    }

    #[test]
    fn test_no_rules_matches_nothing() {
        assert!(!matches("/api", &[]));
    }
}
