//! Path manipulation for upstream URL rewriting and static-file resolution.

use std::path::{Path, PathBuf};

/// Removes the matched route prefix from a request path.
///
/// The remainder keeps its leading slash when present; stripping `/api`
/// from `/api/v1` yields `/v1`, stripping it from `/api` yields ``.
pub fn strip_route_prefix<'a>(prefix: &str, path: &'a str) -> &'a str {
    if prefix.is_empty() {
        return path;
    }
    path.strip_prefix(prefix).unwrap_or(path)
}

/// Builds the outgoing URL for a forward target.
///
/// Concatenates the target base (trailing slash trimmed), the stripped
/// request path and the original query string.
pub fn build_upstream_url(base: &str, stripped_path: &str, query: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut url = String::with_capacity(base.len() + stripped_path.len() + query.len() + 2);
    url.push_str(base);
    if !stripped_path.is_empty() && !stripped_path.starts_with('/') {
        url.push('/');
    }
    url.push_str(stripped_path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Resolves the filesystem candidate for a static target.
///
/// Joins the directory with the full request path and appends the index
/// file for directory-style requests (trailing slash or empty path).
pub fn static_candidate(directory: &Path, request_path: &str, index: &str) -> PathBuf {
    let relative = request_path.trim_start_matches('/');
    let mut candidate = directory.join(relative);
    if relative.is_empty() || request_path.ends_with('/') {
        candidate.push(index);
    }
    candidate
}
