//! Routing-table management endpoints.
//!
//! The side-channel's mutating surface: `GET /routes` returns the current
//! table, `POST /routes` validates and atomically replaces it. Both are
//! gated by a bearer token.

use crate::config::validation::{validate_json, TableIssue};
use crate::models::error::ProxyError;
use crate::models::route::RoutingTable;
use crate::services::routing_table::RoutingTableStore;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the management listener.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<RoutingTableStore>,
    pub key: String,
}

/// Checks the `Authorization: Bearer <key>` header against the configured
/// key, with the distinct failure messages the surface documents.
fn require_bearer(req: &HttpRequest, key: &str) -> Result<(), ProxyError> {
    let header_value = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => value,
        None => {
            return Err(ProxyError::ApiUnauthorized {
                message: "Not authorized. Missing \"Authorization\" header".to_string(),
            })
        }
    };

    let token = header_value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    match token {
        None => Err(ProxyError::ApiUnauthorized {
            message: "Missing API key".to_string(),
        }),
        Some(token) if token != key => Err(ProxyError::ApiUnauthorized {
            message: "API key invalid".to_string(),
        }),
        Some(_) => Ok(()),
    }
}

/// `GET /routes` returns the current routing table as JSON.
pub async fn get_routes(req: HttpRequest, state: web::Data<ApiState>) -> impl Responder {
    if let Err(err) = require_bearer(&req, &state.key) {
        return err.error_response();
    }

    let table = state.store.get();
    HttpResponse::Ok()
        .insert_header(("x-maegashira-table-version", state.store.version().to_string()))
        .json(&*table)
}

/// `POST /routes` validates the candidate table and replaces the current
/// one, broadcasting the new snapshot to every worker.
pub async fn post_routes(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<ApiState>,
) -> impl Responder {
    if let Err(err) = require_bearer(&req, &state.key) {
        return err.error_response();
    }

    let candidate: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(candidate) => candidate,
        Err(e) => {
            return HttpResponse::BadRequest().json(json!({
                "errors": [TableIssue { entry: None, field: String::new(), message: format!("body is not valid JSON: {e}") }]
            }));
        }
    };

    let issues = validate_json(&candidate);
    if !issues.is_empty() {
        warn!("rejected routing table candidate with {} issue(s)", issues.len());
        return HttpResponse::BadRequest().json(json!({ "errors": issues }));
    }

    let table: RoutingTable = match serde_json::from_value(candidate) {
        Ok(table) => table,
        Err(e) => {
            return HttpResponse::BadRequest().json(json!({
                "errors": [TableIssue { entry: None, field: String::new(), message: format!("routing table decode failed: {e}") }]
            }));
        }
    };

    match state.store.set(table) {
        Ok(version) => {
            info!("routing table updated via management api (version {version})");
            HttpResponse::Ok().body("OK")
        }
        Err(err) => err.error_response(),
    }
}

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/routes", web::get().to(get_routes))
        .route("/routes", web::post().to(post_routes));
}
