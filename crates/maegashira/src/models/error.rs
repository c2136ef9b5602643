use crate::config::validation::TableIssue;
use actix_web::http::header::{self, HeaderMap, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{HttpResponse, HttpResponseBuilder};
use serde_json::json;

/// Error kinds surfaced by the proxy, one variant per failure class.
///
/// Every variant carries a short human message; variants wrapping an I/O or
/// client failure keep the inner cause so logs at the top of the stack show
/// the full chain.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid routing table ({} issue(s))", .issues.len())]
    InvalidRoutingTable { issues: Vec<TableIssue> },

    #[error("Route not found")]
    RouteMatchMiss,

    #[error("Request cancelled: {reason}")]
    MiddlewareCancelled { reason: String },

    #[error("Authentication failed")]
    AuthFailed { realm: String },

    #[error("Request timed out")]
    UpstreamTimeout,

    #[error("Failed to fetch the target URL")]
    UpstreamFetchFailed {
        #[source]
        source: reqwest::Error,
    },

    #[error("Not found: {path}")]
    StaticNotFound { path: String },

    #[error("{message}")]
    ApiUnauthorized { message: String },

    #[error("Internal server error: {message}")]
    ServerInternal { message: String },
}

impl ProxyError {
    pub fn internal(message: impl Into<String>) -> Self {
        ProxyError::ServerInternal {
            message: message.into(),
        }
    }

    /// The HTTP rendition of this error, decomposed so callers that stamp
    /// telemetry before responding can assemble the response themselves.
    pub fn response_parts(&self) -> (StatusCode, HeaderMap, Bytes) {
        let mut headers = HeaderMap::new();
        let body = match self {
            ProxyError::InvalidRoutingTable { issues } => {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                Bytes::from(json!({ "errors": issues }).to_string())
            }
            ProxyError::RouteMatchMiss => Bytes::from_static(b"Route not found"),
            ProxyError::MiddlewareCancelled { .. } => Bytes::from_static(b"Request cancelled"),
            ProxyError::AuthFailed { realm } => {
                if let Ok(challenge) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
                    headers.insert(header::WWW_AUTHENTICATE, challenge);
                }
                Bytes::from_static(b"Not authorized")
            }
            ProxyError::UpstreamTimeout => Bytes::from_static(b"Request timed out"),
            ProxyError::UpstreamFetchFailed { .. } => {
                Bytes::from_static(b"Failed to fetch the target URL")
            }
            ProxyError::StaticNotFound { .. } => Bytes::from_static(b"Not found"),
            ProxyError::ApiUnauthorized { message } => Bytes::from(message.clone()),
            ProxyError::ServerInternal { .. } => Bytes::from_static(b"Internal server error"),
        };
        (self.status_code(), headers, body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRoutingTable { .. } => StatusCode::BAD_REQUEST,
            ProxyError::RouteMatchMiss => StatusCode::NOT_FOUND,
            ProxyError::MiddlewareCancelled { .. } => StatusCode::BAD_REQUEST,
            ProxyError::AuthFailed { .. } => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamFetchFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::StaticNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::ApiUnauthorized { .. } => StatusCode::UNAUTHORIZED,
            ProxyError::ServerInternal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl actix_web::error::ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        ProxyError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let (status, headers, body) = self.response_parts();
        let mut builder = HttpResponseBuilder::new(status);
        for (name, value) in headers.iter() {
            builder.append_header((name.clone(), value.clone()));
        }
        builder.body(body)
    }
}
