use actix_web::http::header::HeaderMap;
use actix_web::http::Method;
use actix_web::web::Bytes;
use maegashira::models::error::ProxyError;
use maegashira::models::route::{Route, Target};
use maegashira::services::dispatcher::{Dispatcher, InboundRequest};
use maegashira::utils::path::{build_upstream_url, static_candidate, strip_route_prefix};
use std::path::Path;

fn static_route(directory: &str, index: Option<&str>) -> (Route, Target) {
    let target = Target::Static {
        directory: directory.to_string(),
        index: index.map(str::to_string),
    };
    let route = Route {
        hostname: "localhost".to_string(),
        path: String::new(),
        timeout_ms: None,
        middlewares: None,
        load_balancing: None,
        authentication: None,
        cache: None,
        targets: vec![target.clone()],
    };
    (route, target)
}

fn get_request(path: &str) -> InboundRequest {
    InboundRequest {
        method: Method::GET,
        headers: HeaderMap::new(),
        body: Bytes::new(),
        path: path.to_string(),
        query: String::new(),
    }
}

#[test]
fn prefix_stripping_keeps_the_remainder() {
    assert_eq!(strip_route_prefix("/api", "/api/v1"), "/v1");
    assert_eq!(strip_route_prefix("/api", "/api"), "");
    assert_eq!(strip_route_prefix("", "/anything"), "/anything");
}

#[test]
fn upstream_url_concatenates_base_path_and_query() {
    assert_eq!(
        build_upstream_url("https://origin.example", "/rest", "q=1"),
        "https://origin.example/rest?q=1"
    );
    assert_eq!(
        build_upstream_url("https://origin.example/", "/rest", ""),
        "https://origin.example/rest"
    );
    assert_eq!(
        build_upstream_url("https://origin.example", "", ""),
        "https://origin.example"
    );
}

#[test]
fn static_candidate_appends_index_for_directory_requests() {
    let dir = Path::new("/srv/www");
    assert_eq!(
        static_candidate(dir, "/", "index.html"),
        Path::new("/srv/www/index.html")
    );
    assert_eq!(
        static_candidate(dir, "/docs/", "index.html"),
        Path::new("/srv/www/docs/index.html")
    );
    assert_eq!(
        static_candidate(dir, "/docs/readme.txt", "index.html"),
        Path::new("/srv/www/docs/readme.txt")
    );
}

#[tokio::test]
async fn serves_an_existing_file_with_its_content_type() {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::write(root.path().join("readme.txt"), "hello from disk").expect("fixture");

    let dispatcher = Dispatcher::new(5000).expect("dispatcher");
    let (route, target) = static_route(root.path().to_str().unwrap(), None);

    let outcome = dispatcher
        .dispatch(&route, &target, &get_request("/readme.txt"))
        .await
        .expect("file should be served");

    assert_eq!(outcome.status.as_u16(), 200);
    assert_eq!(&outcome.body[..], b"hello from disk");
    let content_type = outcome
        .headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .expect("content type");
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn directory_requests_fall_back_to_the_index_file() {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::write(root.path().join("index.html"), "<h1>home</h1>").expect("fixture");

    let dispatcher = Dispatcher::new(5000).expect("dispatcher");
    let (route, target) = static_route(root.path().to_str().unwrap(), None);

    let outcome = dispatcher
        .dispatch(&route, &target, &get_request("/"))
        .await
        .expect("index should be served");

    assert_eq!(&outcome.body[..], b"<h1>home</h1>");
}

#[tokio::test]
async fn custom_index_name_is_honored() {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::write(root.path().join("home.html"), "custom index").expect("fixture");

    let dispatcher = Dispatcher::new(5000).expect("dispatcher");
    let (route, target) = static_route(root.path().to_str().unwrap(), Some("home.html"));

    let outcome = dispatcher
        .dispatch(&route, &target, &get_request("/"))
        .await
        .expect("custom index should be served");

    assert_eq!(&outcome.body[..], b"custom index");
}

#[tokio::test]
async fn missing_files_produce_static_not_found() {
    let root = tempfile::tempdir().expect("tempdir");
    let dispatcher = Dispatcher::new(5000).expect("dispatcher");
    let (route, target) = static_route(root.path().to_str().unwrap(), None);

    let err = dispatcher
        .dispatch(&route, &target, &get_request("/missing.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::StaticNotFound { .. }));
}

#[tokio::test]
async fn path_traversal_outside_the_directory_is_rejected() {
    let root = tempfile::tempdir().expect("tempdir");
    let public = root.path().join("public");
    std::fs::create_dir(&public).expect("subdir");
    std::fs::write(root.path().join("secret.txt"), "do not serve").expect("fixture");

    let dispatcher = Dispatcher::new(5000).expect("dispatcher");
    let (route, target) = static_route(public.to_str().unwrap(), None);

    let err = dispatcher
        .dispatch(&route, &target, &get_request("/../secret.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::StaticNotFound { .. }));
}

#[tokio::test]
async fn redirect_targets_are_refused() {
    let dispatcher = Dispatcher::new(5000).expect("dispatcher");
    let target = Target::Redirect {
        url: "https://elsewhere.example".to_string(),
    };
    let route = Route {
        hostname: "localhost".to_string(),
        path: String::new(),
        timeout_ms: None,
        middlewares: None,
        load_balancing: None,
        authentication: None,
        cache: None,
        targets: vec![target.clone()],
    };

    let err = dispatcher
        .dispatch(&route, &target, &get_request("/"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::ServerInternal { .. }));
}

#[tokio::test]
async fn unreachable_upstream_maps_to_fetch_failed() {
    let dispatcher = Dispatcher::new(5000).expect("dispatcher");
    // Reserved TEST-NET-1 address; nothing listens there.
    let target = Target::Forward {
        url: "http://192.0.2.1:9".to_string(),
    };
    let route = Route {
        hostname: "localhost".to_string(),
        path: String::new(),
        timeout_ms: Some(1500),
        middlewares: None,
        load_balancing: None,
        authentication: None,
        cache: None,
        targets: vec![target.clone()],
    };

    let err = dispatcher
        .dispatch(&route, &target, &get_request("/"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::UpstreamFetchFailed { .. } | ProxyError::UpstreamTimeout
    ));
}
