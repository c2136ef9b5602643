//! Health endpoint for liveness probes.

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

/// `GET /health` returns `200 {"status":"ok"}` while the process serves.
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

pub fn configure_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
