//! Routing-table validation with structured, per-entry error reporting.
//!
//! The schema is closed-world: unknown keys and unknown variant tags are
//! rejected, not ignored. Validation happens on the raw JSON value so that
//! a single pass can report every problem in a candidate table instead of
//! stopping at the first serde failure.

use crate::models::route::RoutingTable;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Lowercase DNS hostname: dot-separated labels of `[a-z0-9-]`, no leading
/// or trailing hyphen per label.
static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$")
        .expect("hostname pattern is valid")
});

const ROUTE_KEYS: &[&str] = &[
    "hostname",
    "path",
    "timeout_ms",
    "middlewares",
    "load_balancing",
    "authentication",
    "cache",
    "targets",
];

/// One structural or semantic problem found in a candidate routing table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableIssue {
    /// Index of the offending route, absent for table-level problems.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<usize>,
    /// Dotted path of the offending field (e.g. `targets[0].url`).
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl TableIssue {
    fn table(message: impl Into<String>) -> Self {
        Self {
            entry: None,
            field: String::new(),
            message: message.into(),
        }
    }

    fn entry(index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entry: Some(index),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates a candidate routing table in raw JSON form.
///
/// Returns the full list of issues; an empty list means the candidate is
/// valid and will deserialize into a [`RoutingTable`] without surprises.
pub fn validate_json(candidate: &Value) -> Vec<TableIssue> {
    let mut issues = Vec::new();

    let entries = match candidate.as_array() {
        Some(entries) => entries,
        None => {
            issues.push(TableIssue::table("routing table must be a JSON array"));
            return issues;
        }
    };

    for (index, entry) in entries.iter().enumerate() {
        validate_entry(index, entry, &mut issues);
    }

    issues
}

/// Parses a candidate value into a [`RoutingTable`], running the full
/// closed-world validation first.
pub fn parse_table(candidate: Value) -> Result<RoutingTable, Vec<TableIssue>> {
    let issues = validate_json(&candidate);
    if !issues.is_empty() {
        return Err(issues);
    }
    serde_json::from_value(candidate)
        .map_err(|e| vec![TableIssue::table(format!("routing table decode failed: {e}"))])
}

fn validate_entry(index: usize, entry: &Value, issues: &mut Vec<TableIssue>) {
    let obj = match entry.as_object() {
        Some(obj) => obj,
        None => {
            issues.push(TableIssue::entry(index, "", "route must be a JSON object"));
            return;
        }
    };

    for key in obj.keys() {
        if !ROUTE_KEYS.contains(&key.as_str()) {
            issues.push(TableIssue::entry(index, key.clone(), "unknown key"));
        }
    }

    match obj.get("hostname").and_then(Value::as_str) {
        None => issues.push(TableIssue::entry(
            index,
            "hostname",
            "required and must be a string",
        )),
        Some("") => issues.push(TableIssue::entry(index, "hostname", "must not be empty")),
        Some(hostname) if !HOSTNAME_RE.is_match(hostname) => issues.push(TableIssue::entry(
            index,
            "hostname",
            "must be a lowercase DNS-valid hostname",
        )),
        Some(_) => {}
    }

    if let Some(path) = obj.get("path") {
        match path.as_str() {
            None => issues.push(TableIssue::entry(index, "path", "must be a string")),
            Some(p) if !p.is_empty() && !p.starts_with('/') => issues.push(TableIssue::entry(
                index,
                "path",
                "must be empty or start with '/'",
            )),
            Some(_) => {}
        }
    }

    if let Some(timeout) = obj.get("timeout_ms") {
        match timeout.as_u64() {
            None | Some(0) => issues.push(TableIssue::entry(
                index,
                "timeout_ms",
                "must be a positive integer",
            )),
            Some(_) => {}
        }
    }

    if let Some(middlewares) = obj.get("middlewares") {
        validate_middlewares(index, middlewares, issues);
    }

    if let Some(lb) = obj.get("load_balancing") {
        validate_variant(index, "load_balancing", lb, &[("random", &[])], issues);
    }

    if let Some(auth) = obj.get("authentication") {
        validate_authentication(index, auth, issues);
    }

    if let Some(cache) = obj.get("cache") {
        validate_variant(
            index,
            "cache",
            cache,
            &[("no-cache", &[]), ("basic", &["ttl_ms"])],
            issues,
        );
        if cache.get("type").and_then(Value::as_str) == Some("basic")
            && cache.get("ttl_ms").and_then(Value::as_u64).is_none()
        {
            issues.push(TableIssue::entry(
                index,
                "cache.ttl_ms",
                "required and must be a non-negative integer",
            ));
        }
    }

    match obj.get("targets").and_then(Value::as_array) {
        None => issues.push(TableIssue::entry(
            index,
            "targets",
            "required and must be an array",
        )),
        Some(targets) if targets.is_empty() => {
            issues.push(TableIssue::entry(index, "targets", "must not be empty"))
        }
        Some(targets) => {
            for (t_index, target) in targets.iter().enumerate() {
                validate_target(index, t_index, target, issues);
            }
        }
    }
}

fn validate_middlewares(index: usize, middlewares: &Value, issues: &mut Vec<TableIssue>) {
    let obj = match middlewares.as_object() {
        Some(obj) => obj,
        None => {
            issues.push(TableIssue::entry(
                index,
                "middlewares",
                "must be a JSON object",
            ));
            return;
        }
    };

    for (key, value) in obj {
        if key != "pre" && key != "post" {
            issues.push(TableIssue::entry(
                index,
                format!("middlewares.{key}"),
                "unknown key",
            ));
            continue;
        }
        let all_strings = value
            .as_array()
            .map(|keys| keys.iter().all(Value::is_string))
            .unwrap_or(false);
        if !all_strings {
            issues.push(TableIssue::entry(
                index,
                format!("middlewares.{key}"),
                "must be an array of middleware keys",
            ));
        }
    }
}

fn validate_authentication(index: usize, auth: &Value, issues: &mut Vec<TableIssue>) {
    validate_variant(
        index,
        "authentication",
        auth,
        &[
            ("anonymous", &[]),
            ("basic", &["username", "password", "realm"]),
        ],
        issues,
    );

    if auth.get("type").and_then(Value::as_str) == Some("basic") {
        for field in ["username", "password"] {
            if auth.get(field).and_then(Value::as_str).is_none() {
                issues.push(TableIssue::entry(
                    index,
                    format!("authentication.{field}"),
                    "required and must be a string",
                ));
            }
        }
    }
}

fn validate_target(index: usize, t_index: usize, target: &Value, issues: &mut Vec<TableIssue>) {
    let field = |name: &str| format!("targets[{t_index}].{name}");

    let obj = match target.as_object() {
        Some(obj) => obj,
        None => {
            issues.push(TableIssue::entry(
                index,
                format!("targets[{t_index}]"),
                "target must be a JSON object",
            ));
            return;
        }
    };

    let kind = match obj.get("type").and_then(Value::as_str) {
        Some(kind) => kind,
        None => {
            issues.push(TableIssue::entry(
                index,
                field("type"),
                "required and must be a string",
            ));
            return;
        }
    };

    let allowed: &[&str] = match kind {
        "forward" | "redirect" => &["type", "url"],
        "static" => &["type", "directory", "index"],
        other => {
            issues.push(TableIssue::entry(
                index,
                field("type"),
                format!("unknown target type '{other}'"),
            ));
            return;
        }
    };

    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            issues.push(TableIssue::entry(index, field(key), "unknown key"));
        }
    }

    match kind {
        "forward" | "redirect" => match obj.get("url").and_then(Value::as_str) {
            None => issues.push(TableIssue::entry(
                index,
                field("url"),
                "required and must be a string",
            )),
            Some(url) => {
                let parsed = reqwest::Url::parse(url);
                let http = parsed
                    .as_ref()
                    .map(|u| u.scheme() == "http" || u.scheme() == "https")
                    .unwrap_or(false);
                if !http {
                    issues.push(TableIssue::entry(
                        index,
                        field("url"),
                        "must be an absolute http(s) URL",
                    ));
                }
            }
        },
        "static" => {
            match obj.get("directory").and_then(Value::as_str) {
                None => issues.push(TableIssue::entry(
                    index,
                    field("directory"),
                    "required and must be a string",
                )),
                Some("") => {
                    issues.push(TableIssue::entry(index, field("directory"), "must not be empty"))
                }
                Some(_) => {}
            }
            if let Some(idx) = obj.get("index") {
                if idx.as_str().map(|s| s.is_empty()).unwrap_or(true) {
                    issues.push(TableIssue::entry(
                        index,
                        field("index"),
                        "must be a non-empty string",
                    ));
                }
            }
        }
        _ => {}
    }
}

/// Checks a tagged-union value against the closed set of variants, flagging
/// unknown tags and keys outside the variant's field list.
fn validate_variant(
    index: usize,
    field: &str,
    value: &Value,
    variants: &[(&str, &[&str])],
    issues: &mut Vec<TableIssue>,
) {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            issues.push(TableIssue::entry(index, field, "must be a JSON object"));
            return;
        }
    };

    let tag = match obj.get("type").and_then(Value::as_str) {
        Some(tag) => tag,
        None => {
            issues.push(TableIssue::entry(
                index,
                format!("{field}.type"),
                "required and must be a string",
            ));
            return;
        }
    };

    match variants.iter().find(|(name, _)| *name == tag) {
        None => issues.push(TableIssue::entry(
            index,
            format!("{field}.type"),
            format!("unknown variant '{tag}'"),
        )),
        Some((_, fields)) => {
            for key in obj.keys() {
                if key != "type" && !fields.contains(&key.as_str()) {
                    issues.push(TableIssue::entry(
                        index,
                        format!("{field}.{key}"),
                        "unknown key",
                    ));
                }
            }
        }
    }
}
