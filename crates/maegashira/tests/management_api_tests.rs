use actix_web::http::header;
use actix_web::{test, web, App};
use maegashira::routes::api::{self, ApiState};
use maegashira::routes::metrics::{self, MetricsCollector};
use maegashira::routes::{docs, health};
use maegashira::services::routing_table::RoutingTableStore;
use serde_json::json;
use std::sync::Arc;

macro_rules! management_app {
    ($store:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(ApiState {
                    store: Arc::clone(&$store),
                    key: "secret".to_string(),
                }))
                .app_data(web::Data::new(MetricsCollector::default()))
                .configure(health::configure_health)
                .configure(metrics::configure_metrics)
                .configure(api::configure_api)
                .configure(docs::configure_docs),
        )
        .await
    };
}

fn store() -> Arc<RoutingTableStore> {
    Arc::new(RoutingTableStore::new())
}

#[actix_web::test]
async fn health_reports_ok() {
    let store = store();
    let app = management_app!(store);

    let response = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(response.status().as_u16(), 200);
    let body = test::read_body(response).await;
    assert_eq!(&body[..], br#"{"status":"ok"}"#);
}

#[actix_web::test]
async fn routes_without_authorization_header_is_rejected() {
    let store = store();
    let app = management_app!(store);

    let response = test::call_service(&app, test::TestRequest::get().uri("/routes").to_request()).await;
    assert_eq!(response.status().as_u16(), 401);
    let body = test::read_body(response).await;
    assert_eq!(&body[..], br#"Not authorized. Missing "Authorization" header"#);
}

#[actix_web::test]
async fn routes_with_empty_or_non_bearer_token_reports_missing_key() {
    let store = store();
    let app = management_app!(store);

    for value in ["Bearer ", "Basic c2VjcmV0"] {
        let request = test::TestRequest::get()
            .uri("/routes")
            .insert_header((header::AUTHORIZATION, value))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status().as_u16(), 401);
        let body = test::read_body(response).await;
        assert_eq!(&body[..], b"Missing API key", "for header {value:?}");
    }
}

#[actix_web::test]
async fn routes_with_wrong_key_reports_invalid_key() {
    let store = store();
    let app = management_app!(store);

    let request = test::TestRequest::get()
        .uri("/routes")
        .insert_header((header::AUTHORIZATION, "Bearer wrong"))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status().as_u16(), 401);
    let body = test::read_body(response).await;
    assert_eq!(&body[..], b"API key invalid");
}

#[actix_web::test]
async fn routes_returns_the_current_table_as_json() {
    let store = store();
    let app = management_app!(store);

    let request = test::TestRequest::get()
        .uri("/routes")
        .insert_header((header::AUTHORIZATION, "Bearer secret"))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body, json!([]));
}

#[actix_web::test]
async fn replacing_the_table_broadcasts_and_is_visible_on_get() {
    let store = store();
    let app = management_app!(store);

    let candidate = json!([{
        "hostname": "localhost",
        "path": "",
        "targets": [{"type": "static", "directory": "./fixtures"}]
    }]);
    let request = test::TestRequest::post()
        .uri("/routes")
        .insert_header((header::AUTHORIZATION, "Bearer secret"))
        .set_json(&candidate)
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status().as_u16(), 200);
    let body = test::read_body(response).await;
    assert_eq!(&body[..], b"OK");

    assert_eq!(store.version(), 1);
    assert_eq!(store.get()[0].hostname, "localhost");

    let request = test::TestRequest::get()
        .uri("/routes")
        .insert_header((header::AUTHORIZATION, "Bearer secret"))
        .to_request();
    let response = test::call_service(&app, request).await;
    let version = response
        .headers()
        .get("x-maegashira-table-version")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    assert_eq!(version.as_deref(), Some("1"));
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body, candidate);
}

#[actix_web::test]
async fn invalid_candidate_returns_the_structured_error_list() {
    let store = store();
    let app = management_app!(store);

    let request = test::TestRequest::post()
        .uri("/routes")
        .insert_header((header::AUTHORIZATION, "Bearer secret"))
        .set_json(json!([{"hostname": "", "targets": []}]))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status().as_u16(), 400);

    let body: serde_json::Value = test::read_body_json(response).await;
    let errors = body["errors"].as_array().expect("error list");
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e["field"] == "hostname"));

    // The table must be untouched after a rejected candidate.
    assert_eq!(store.version(), 0);
    assert!(store.get().is_empty());
}

#[actix_web::test]
async fn non_json_body_is_a_bad_request() {
    let store = store();
    let app = management_app!(store);

    let request = test::TestRequest::post()
        .uri("/routes")
        .insert_header((header::AUTHORIZATION, "Bearer secret"))
        .set_payload("not json")
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[actix_web::test]
async fn openapi_document_is_served_at_the_root() {
    let store = store();
    let app = management_app!(store);

    let response = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["openapi"], "3.0.3");
    assert!(body["paths"]["/routes"].is_object());
}

#[actix_web::test]
async fn explorer_serves_html() {
    let store = store();
    let app = management_app!(store);

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/explorer").to_request()).await;
    assert_eq!(response.status().as_u16(), 200);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
}

#[actix_web::test]
async fn metrics_expose_the_responses_codes_counter() {
    let store = store();
    let app = management_app!(store);

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(response.status().as_u16(), 200);
    let body = String::from_utf8(test::read_body(response).await.to_vec()).expect("utf8");
    assert!(body.contains("# TYPE responses_codes counter"));
    assert!(body.contains("maegashira_transaction_queue_depth 0"));
    assert!(body.contains("maegashira_uptime_seconds"));
}
