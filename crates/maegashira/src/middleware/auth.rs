//! Route authentication strategies.
//!
//! Runs after pre-processing so middlewares may inject or rewrite
//! credentials before the gate is evaluated.

use crate::models::error::ProxyError;
use crate::models::route::Authentication;
use actix_web::http::header::{self, HeaderMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Evaluates a route's authentication gate against the effective request
/// headers.
///
/// `anonymous` always passes. `basic` expects `Authorization: Basic
/// base64(user:pass)`; a missing header, malformed credentials or a
/// mismatch all fail with a challenge whose realm defaults to the request
/// hostname.
pub fn authenticate(
    auth: &Authentication,
    headers: &HeaderMap,
    request_host: &str,
) -> Result<(), ProxyError> {
    match auth {
        Authentication::Anonymous => Ok(()),
        Authentication::Basic {
            username,
            password,
            realm,
        } => {
            let effective_realm = realm.clone().unwrap_or_else(|| request_host.to_string());

            let credentials = headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Basic "))
                .and_then(|encoded| BASE64.decode(encoded.trim()).ok())
                .and_then(|decoded| String::from_utf8(decoded).ok());

            let matches = credentials
                .as_deref()
                .and_then(|pair| pair.split_once(':'))
                .map(|(user, pass)| user == username && pass == password)
                .unwrap_or(false);

            if matches {
                Ok(())
            } else {
                Err(ProxyError::AuthFailed {
                    realm: effective_realm,
                })
            }
        }
    }
}
