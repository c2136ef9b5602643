use serde::{Deserialize, Serialize};

/// Load-balancing strategy for picking a target among several.
///
/// Only `random` is defined today; the tag space is closed and unknown
/// strategies are rejected by routing-table validation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadBalancing {
    /// Uniform random selection across all targets.
    Random,
}

/// Authentication gate applied to a matched route before dispatch.
///
/// Authentication runs after pre-processing so that a middleware may inject
/// or rewrite credentials before the gate is evaluated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Authentication {
    /// Every request passes.
    Anonymous,
    /// HTTP Basic credentials checked against the configured pair.
    ///
    /// `realm` defaults to the request hostname when absent.
    Basic {
        username: String,
        password: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        realm: Option<String>,
    },
}

/// Response-cache policy attached to a route.
///
/// The dispatcher honors `no-cache` only; `basic` is reserved and currently
/// behaves like `no-cache`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CachePolicy {
    NoCache,
    Basic { ttl_ms: u64 },
}

/// Endpoint a matched route dispatches to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    /// Remote HTTP origin; the matched path prefix is stripped and the rest
    /// of the request path and query are appended to `url`.
    Forward { url: String },

    /// Local filesystem subtree. `index` is served for directory-style
    /// requests and defaults to `index.html`.
    Static {
        directory: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<String>,
    },

    /// Reserved, not yet implemented. Validation accepts it so tables can
    /// be staged ahead of time; dispatch refuses it.
    Redirect { url: String },
}

impl Target {
    /// Tag recorded in the transaction's `target_type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Forward { .. } => "forward",
            Target::Static { .. } => "static",
            Target::Redirect { .. } => "redirect",
        }
    }
}

/// Ordered middleware keys a route opts into, split by phase.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MiddlewareSpec {
    /// Keys executed before authentication and dispatch, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<String>,
    /// Keys executed over the response after dispatch, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<String>,
}

/// One entry of the routing table.
///
/// A request matches when its host equals `hostname` (case-insensitive) and
/// its path begins with `path` on a segment boundary. The first matching
/// entry in table order wins.
///
/// # Examples
///
/// ```json
/// {
///   "hostname": "localhost",
///   "path": "/api",
///   "timeout_ms": 2500,
///   "targets": [{"type": "forward", "url": "http://127.0.0.1:3000"}]
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Route {
    /// Exact host to match, lowercase, DNS-valid.
    pub hostname: String,

    /// Path prefix to match; the empty string matches every path.
    #[serde(default)]
    pub path: String,

    /// Upstream deadline in milliseconds; the process-wide default applies
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Middleware keys for the pre/post phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middlewares: Option<MiddlewareSpec>,

    /// Target selection strategy; `random` is assumed for multi-target
    /// routes that leave this unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<LoadBalancing>,

    /// Authentication gate; `anonymous` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,

    /// Cache policy; reserved, `no-cache` is the only honored variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,

    /// Non-empty ordered sequence of targets.
    pub targets: Vec<Target>,
}

impl Route {
    /// Middleware keys for the pre-processing phase, empty when none.
    pub fn pre_middlewares(&self) -> &[String] {
        match &self.middlewares {
            Some(spec) => &spec.pre,
            None => &[],
        }
    }

    /// Middleware keys for the post-processing phase, empty when none.
    pub fn post_middlewares(&self) -> &[String] {
        match &self.middlewares {
            Some(spec) => &spec.post,
            None => &[],
        }
    }

    /// Effective upstream deadline for this route.
    pub fn timeout_ms(&self, default_ms: u64) -> u64 {
        self.timeout_ms.unwrap_or(default_ms)
    }
}

/// The routing table is an ordered sequence of routes; ordering is
/// significant for matching.
pub type RoutingTable = Vec<Route>;
