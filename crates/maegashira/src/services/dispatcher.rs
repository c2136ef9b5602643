//! Target dispatch: forwarding to a remote origin or serving a local
//! static subtree.

use crate::models::error::ProxyError;
use crate::models::route::{Route, Target};
use crate::utils::content_type;
use crate::utils::path::{build_upstream_url, static_candidate, strip_route_prefix};
use crate::{PRODUCT, VERSION};
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::http::{Method, StatusCode};
use actix_web::web::Bytes;
use log::{debug, warn};
use std::path::Path;
use std::time::Duration;

/// Request-side headers that must not be copied upstream. `host` and
/// `user-agent` are rewritten; the rest are hop-by-hop or managed by the
/// client library.
const SKIP_REQUEST_HEADERS: &[&str] = &[
    "host",
    "user-agent",
    "content-length",
    "accept-encoding",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "upgrade",
    "proxy-authorization",
    "proxy-authenticate",
];

/// Response-side headers dropped before the response is surfaced; the body
/// is already decoded and re-framed by the proxy.
const SKIP_RESPONSE_HEADERS: &[&str] = &[
    "content-length",
    "content-encoding",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-authenticate",
];

/// What the client sent, as seen after pre-processing.
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub path: String,
    pub query: String,
}

/// A dispatched response before post-processing.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Executes `forward` and `static` targets.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    default_timeout_ms: u64,
}

impl Dispatcher {
    /// Builds the upstream client; redirects are followed up to depth 20.
    pub fn new(default_timeout_ms: u64) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(20))
            .build()
            .map_err(|e| ProxyError::internal(format!("failed to build upstream client: {e}")))?;
        Ok(Self {
            client,
            default_timeout_ms,
        })
    }

    /// Dispatches the request against the selected target.
    pub async fn dispatch(
        &self,
        route: &Route,
        target: &Target,
        request: &InboundRequest,
    ) -> Result<DispatchOutcome, ProxyError> {
        match target {
            Target::Forward { url } => self.forward(route, url, request).await,
            Target::Static { directory, index } => {
                self.serve_static(directory, index.as_deref().unwrap_or("index.html"), request)
                    .await
            }
            Target::Redirect { .. } => {
                Err(ProxyError::internal("redirect targets are not implemented"))
            }
        }
    }

    async fn forward(
        &self,
        route: &Route,
        target_url: &str,
        request: &InboundRequest,
    ) -> Result<DispatchOutcome, ProxyError> {
        let stripped = strip_route_prefix(&route.path, &request.path);
        let upstream_url = build_upstream_url(target_url, stripped, &request.query);
        debug!("forwarding {} {} -> {}", request.method, request.path, upstream_url);

        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| ProxyError::internal("unsupported request method"))?;

        let outgoing = self
            .client
            .request(method, &upstream_url)
            .headers(upstream_headers(&request.headers))
            .header(reqwest::header::USER_AGENT, format!("{PRODUCT}/{VERSION}"))
            .body(request.body.to_vec());

        let deadline = Duration::from_millis(route.timeout_ms(self.default_timeout_ms));
        let exchange = async {
            let response = outgoing.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let (status, headers, body) = match tokio::time::timeout(deadline, exchange).await {
            Err(_) => return Err(ProxyError::UpstreamTimeout),
            Ok(Err(source)) => return Err(ProxyError::UpstreamFetchFailed { source }),
            Ok(Ok(parts)) => parts,
        };

        let status = StatusCode::from_u16(status.as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response_headers = downstream_headers(&headers);
        response_headers.insert(
            HeaderName::from_static("access-control-allow-origin"),
            HeaderValue::from_static("*"),
        );
        response_headers.insert(
            HeaderName::from_static("access-control-allow-methods"),
            HeaderValue::from_static("*"),
        );
        response_headers.insert(
            HeaderName::from_static("content-encoding"),
            HeaderValue::from_static("identity"),
        );

        Ok(DispatchOutcome {
            status,
            headers: response_headers,
            body,
        })
    }

    /// Serves a file from the target directory, refusing any resolved path
    /// that escapes it.
    async fn serve_static(
        &self,
        directory: &str,
        index: &str,
        request: &InboundRequest,
    ) -> Result<DispatchOutcome, ProxyError> {
        let not_found = || ProxyError::StaticNotFound {
            path: request.path.clone(),
        };

        let root = tokio::fs::canonicalize(Path::new(directory))
            .await
            .map_err(|_| not_found())?;

        let candidate = static_candidate(Path::new(directory), &request.path, index);
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| not_found())?;

        if !resolved.starts_with(&root) {
            warn!(
                "rejected static path escaping {}: {}",
                directory,
                candidate.display()
            );
            return Err(not_found());
        }

        let contents = tokio::fs::read(&resolved).await.map_err(|_| not_found())?;

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type::from_path(&resolved)) {
            headers.insert(HeaderName::from_static("content-type"), value);
        }

        Ok(DispatchOutcome {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(contents),
        })
    }
}

/// Converts the effective request headers for the upstream call, dropping
/// the rewritten and hop-by-hop set.
fn upstream_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut upstream = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        if SKIP_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            upstream.append(name, value);
        }
    }
    upstream
}

/// Converts upstream response headers back to the client-facing map.
fn downstream_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut downstream = HeaderMap::new();
    for (name, value) in headers.iter() {
        if SKIP_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            downstream.append(name, value);
        }
    }
    downstream
}
