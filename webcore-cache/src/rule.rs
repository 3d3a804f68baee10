//! Cache rules: which requests/responses a rule applies to, and which of a
//! list of rules matches first.

use regex::Regex;

/// A single cacheability rule's match condition against the request path.
///
/// Grounded on `Rule.match` in the original, which accepts a literal path,
/// a compiled pattern, or a sequence of either; represented here as an
/// explicit tagged variant rather than the original's duck-typed union.
#[derive(Debug, Clone)]
pub enum Match {
    /// Matches the literal path exactly.
    Literal(String),
    /// Matches every path.
    Any,
    /// Matches a path against a compiled regular expression.
    Regex(Regex),
    /// Matches if any of the nested matchers match.
    AnyOf(Vec<Match>),
}

impl Match {
    fn matches(&self, path: &str) -> bool {
        match self {
            Match::Literal(lit) => lit == path,
            Match::Any => true,
            Match::Regex(re) => re.is_match(path),
            Match::AnyOf(items) => items.iter().any(|m| m.matches(path)),
        }
    }
}

/// An inclusive/exclusive status-code constraint on a [`Rule`].
#[derive(Debug, Clone)]
pub enum StatusConstraint {
    /// Matches a single status code.
    One(u16),
    /// Matches any of the listed status codes.
    AnyOf(Vec<u16>),
}

impl StatusConstraint {
    fn matches(&self, status: u16) -> bool {
        match self {
            StatusConstraint::One(s) => *s == status,
            StatusConstraint::AnyOf(list) => list.contains(&status),
        }
    }
}

/// A cacheability rule: a path match, an optional status constraint, and
/// an optional per-rule TTL override.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Which request paths this rule applies to.
    pub matches: Match,
    /// If set, the rule only matches responses with one of these statuses.
    pub status: Option<StatusConstraint>,
    /// Per-rule TTL override, in seconds. `None` defers to the store
    /// default; `Some(0)` means "not cachable".
    pub ttl: Option<u64>,
}

impl Rule {
    /// A rule that matches every GET/HEAD request, deferring to the store
    /// default TTL.
    pub fn catch_all() -> Self {
        Self { matches: Match::Any, status: None, ttl: None }
    }
}

/// Does this rule's path match apply to `path`, independent of status?
pub fn request_matches_rule(rule: &Rule, path: &str) -> bool {
    rule.matches.matches(path)
}

/// Does this rule apply to a concrete (path, status) response pair?
pub fn response_matches_rule(rule: &Rule, path: &str, status: u16) -> bool {
    if !request_matches_rule(rule, path) {
        return false;
    }
    match &rule.status {
        Some(constraint) => constraint.matches(status),
        None => true,
    }
}

/// The first rule (in list order) whose path match applies to `path`.
pub fn rule_matching_request<'a>(
    rules: &'a [Rule],
    path: &str,
) -> Option<&'a Rule> {
    rules.iter().find(|rule| request_matches_rule(rule, path))
}

/// The first rule (in list order) that applies to this response.
pub fn rule_matching_response<'a>(
    rules: &'a [Rule],
    path: &str,
    status: u16,
) -> Option<&'a Rule> {
    rules.iter().find(|rule| response_matches_rule(rule, path, status))
}
