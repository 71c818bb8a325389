//! Assigning rules to scopes.
//!
//! A non-root scope claims a rule when one of its id patterns matches. A
//! scope without patterns claims rules whose `nested_location` lies under
//! the scope path. The first claiming scope wins; unclaimed rules belong to
//! the root scope.

use crate::types::{Rule, Scope};

/// Does `pattern` match `id`? Supports exact ids, `*`, and `prefix/*`.
pub fn pattern_matches(pattern: &str, id: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => id.starts_with(prefix),
        None => pattern == id,
    }
}

/// Normalize a project-relative path.
///
/// Backslashes become `/`; empty and `.` segments are dropped. Fails on
/// `..` segments and drive prefixes, which would leave the project root.
pub fn relative_path(raw: &str) -> Result<String, String> {
    let cleaned = raw.replace('\\', "/");
    let parts: Vec<&str> = cleaned
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.iter().any(|p| *p == "..") {
        return Err("escapes the project root".to_string());
    }
    if parts.first().is_some_and(|p| p.contains(':')) {
        return Err("is not relative to the project root".to_string());
    }
    Ok(parts.join("/"))
}

/// Is `location` equal to or below `scope_path` (segment-aware)?
pub fn path_within(location: &str, scope_path: &str) -> bool {
    location == scope_path
        || location
            .strip_prefix(scope_path)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl Scope {
    /// Does this (non-root) scope claim `rule`?
    pub fn claims(&self, rule: &Rule) -> bool {
        if self.is_root() {
            return false;
        }
        match &self.patterns {
            Some(patterns) => patterns.iter().any(|p| pattern_matches(p, &rule.id.0)),
            None => rule
                .location()
                .is_some_and(|loc| path_within(loc, &self.path)),
        }
    }
}

/// Split enabled `rules` across `scopes`, preserving rule order inside each.
///
/// `scopes` is expected to start with the root scope (see
/// [`crate::config::Config::resolved_scopes`]); scopes that end up empty are
/// still returned so exporters can tell how many scopes are configured.
pub fn partition<'a>(rules: impl IntoIterator<Item = &'a Rule>, scopes: &[Scope]) -> Vec<(Scope, Vec<Rule>)> {
    let mut buckets: Vec<(Scope, Vec<Rule>)> =
        scopes.iter().cloned().map(|s| (s, Vec::new())).collect();
    if !buckets.iter().any(|(s, _)| s.is_root()) {
        buckets.insert(0, (Scope::root(), Vec::new()));
    }

    for rule in rules.into_iter().filter(|r| r.enabled) {
        let idx = buckets
            .iter()
            .position(|(scope, _)| scope.claims(rule))
            .or_else(|| buckets.iter().position(|(scope, _)| scope.is_root()))
            .unwrap_or(0);
        buckets[idx].1.push(rule.clone());
    }
    buckets
}
