//! Pure routing-table matching.
//!
//! The table is an ordered sequence; the first entry whose hostname equals
//! the request host and whose path prefix covers the request path wins.
//! There are no wildcards, so matching is a linear scan over the snapshot.

use crate::models::route::Route;

/// Resolves `(host, path)` against the table; returns the first match.
///
/// `host` is compared case-insensitively and must already be stripped of
/// its port (see [`normalize_host`]).
pub fn match_route<'a>(host: &str, path: &str, table: &'a [Route]) -> Option<&'a Route> {
    table
        .iter()
        .find(|route| route.hostname.eq_ignore_ascii_case(host) && path_matches(&route.path, path))
}

/// Segment-aware prefix test.
///
/// An empty prefix matches every path. `/api` matches `/api`, `/api/` and
/// `/api/v1` but not `/apix`.
pub fn path_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    if !path.starts_with(prefix) {
        return false;
    }
    path.len() == prefix.len()
        || prefix.ends_with('/')
        || path.as_bytes()[prefix.len()] == b'/'
}

/// Lowercases a request host and strips the port, handling bracketed IPv6
/// literals.
pub fn normalize_host(raw: &str) -> String {
    let host = if let Some(rest) = raw.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        raw.split(':').next().unwrap_or(raw)
    };
    host.to_ascii_lowercase()
}
