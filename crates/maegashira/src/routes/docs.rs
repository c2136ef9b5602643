//! Self-description endpoints: the OpenAPI document at `/` and a small
//! HTML explorer at `/explorer`.

use crate::VERSION;
use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

/// `GET /` serves the OpenAPI 3 description of the management surface.
pub async fn openapi() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Maegashira Management API",
            "description": "Side-channel for health, metrics and live routing-table updates.",
            "version": VERSION,
        },
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" }
            }
        },
        "paths": {
            "/health": {
                "get": {
                    "summary": "Liveness probe",
                    "responses": { "200": { "description": "Process is serving" } }
                }
            },
            "/metrics": {
                "get": {
                    "summary": "Prometheus metrics",
                    "responses": { "200": { "description": "Exposition text" } }
                }
            },
            "/routes": {
                "get": {
                    "summary": "Current routing table",
                    "security": [ { "bearerAuth": [] } ],
                    "responses": {
                        "200": { "description": "Routing table as JSON" },
                        "401": { "description": "Missing or invalid API key" }
                    }
                },
                "post": {
                    "summary": "Replace the routing table",
                    "security": [ { "bearerAuth": [] } ],
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": { "type": "array" } } }
                    },
                    "responses": {
                        "200": { "description": "Table replaced and broadcast" },
                        "400": { "description": "Validation failed; body carries the error list" },
                        "401": { "description": "Missing or invalid API key" }
                    }
                }
            }
        }
    }))
}

/// `GET /explorer` serves a minimal HTML page for poking the API by hand.
pub async fn explorer() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(EXPLORER_HTML)
}

const EXPLORER_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Maegashira API explorer</title>
  <style>
    body { font-family: monospace; margin: 2rem; }
    button { margin-right: .5rem; }
    pre { background: #f4f4f4; padding: 1rem; overflow: auto; }
  </style>
</head>
<body>
  <h1>Maegashira API explorer</h1>
  <p>
    <button onclick="call('GET', '/health')">GET /health</button>
    <button onclick="call('GET', '/metrics')">GET /metrics</button>
    <button onclick="call('GET', '/routes')">GET /routes</button>
  </p>
  <p><label>API key: <input id="key" type="password" size="32"></label></p>
  <pre id="out">Pick an endpoint.</pre>
  <script>
    async function call(method, path) {
      const headers = {};
      const key = document.getElementById('key').value;
      if (key) headers['Authorization'] = 'Bearer ' + key;
      const response = await fetch(path, { method, headers });
      const text = await response.text();
      document.getElementById('out').textContent =
        response.status + ' ' + response.statusText + '\n\n' + text;
    }
  </script>
</body>
</html>
"#;

pub fn configure_docs(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(openapi))
        .route("/explorer", web::get().to(explorer));
}
