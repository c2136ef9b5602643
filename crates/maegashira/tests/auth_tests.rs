use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use maegashira::middleware::auth::authenticate;
use maegashira::models::error::ProxyError;
use maegashira::models::route::Authentication;

fn basic(realm: Option<&str>) -> Authentication {
    Authentication::Basic {
        username: "operator".to_string(),
        password: "hunter2".to_string(),
        realm: realm.map(str::to_string),
    }
}

fn headers_with_authorization(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(value).expect("header value"),
    );
    headers
}

fn basic_header(user: &str, pass: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))
}

#[test]
fn anonymous_always_passes() {
    let result = authenticate(&Authentication::Anonymous, &HeaderMap::new(), "localhost");
    assert!(result.is_ok());
}

#[test]
fn missing_header_fails_with_request_host_realm() {
    let err = authenticate(&basic(None), &HeaderMap::new(), "localhost").unwrap_err();
    match err {
        ProxyError::AuthFailed { realm } => assert_eq!(realm, "localhost"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn configured_realm_wins_over_request_host() {
    let err = authenticate(&basic(Some("ops")), &HeaderMap::new(), "localhost").unwrap_err();
    match err {
        ProxyError::AuthFailed { realm } => assert_eq!(realm, "ops"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_credentials_fail() {
    let no_separator = format!("Basic {}", BASE64.encode("no-separator"));
    for value in [
        "Bearer something",
        "Basic not-base64!!!",
        "Basic",
        no_separator.as_str(),
    ] {
        let headers = headers_with_authorization(value);
        assert!(
            authenticate(&basic(None), &headers, "localhost").is_err(),
            "{value:?} should fail"
        );
    }
}

#[test]
fn wrong_credentials_fail() {
    let headers = headers_with_authorization(&basic_header("operator", "wrong"));
    assert!(authenticate(&basic(None), &headers, "localhost").is_err());

    let headers = headers_with_authorization(&basic_header("intruder", "hunter2"));
    assert!(authenticate(&basic(None), &headers, "localhost").is_err());
}

#[test]
fn correct_credentials_pass() {
    let headers = headers_with_authorization(&basic_header("operator", "hunter2"));
    assert!(authenticate(&basic(None), &headers, "localhost").is_ok());
}

#[test]
fn password_may_contain_colons() {
    let auth = Authentication::Basic {
        username: "operator".to_string(),
        password: "a:b:c".to_string(),
        realm: None,
    };
    let headers = headers_with_authorization(&basic_header("operator", "a:b:c"));
    assert!(authenticate(&auth, &headers, "localhost").is_ok());
}

#[test]
fn auth_failure_response_carries_the_challenge() {
    let err = authenticate(&basic(None), &HeaderMap::new(), "localhost").unwrap_err();
    let (status, headers, _body) = err.response_parts();
    assert_eq!(status.as_u16(), 401);
    let challenge = headers
        .get("www-authenticate")
        .and_then(|value| value.to_str().ok())
        .expect("challenge header");
    assert_eq!(challenge, "Basic realm=\"localhost\"");
}
