//! Double-submit CSRF protection.
//!
//! A signed token is kept in a cookie and echoed back by every form in the
//! hidden `csrf_token` field (or the `X-CSRF-Token` header). Unsafe requests
//! whose echoed token does not match the cookie are refused.

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, Multipart, Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::sync::Arc;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};
use tracing::warn;

use crate::core::error::EservicesError;
use crate::core::shared::state::AppState;

pub const CSRF_COOKIE: &str = "eservices_csrf";
pub const CSRF_FIELD: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

const TOKEN_LENGTH: usize = 32;
const DEFAULT_TOKEN_EXPIRY_MINUTES: i64 = 24 * 60;
const EXEMPT_PATHS: &[&str] = &["/health"];
const MULTIPART_PROBE_BYTES: usize = 64 * 1024;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfValidationResult {
    Valid,
    Missing,
    Invalid,
    Expired,
}

impl CsrfValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Missing => "The CSRF token is missing",
            Self::Invalid => "The CSRF tokens do not match",
            Self::Expired => "The CSRF token has expired",
        }
    }
}

pub struct CsrfManager {
    secret: Vec<u8>,
    token_expiry_minutes: i64,
}

impl CsrfManager {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
            token_expiry_minutes: DEFAULT_TOKEN_EXPIRY_MINUTES,
        }
    }

    pub fn with_expiry_minutes(mut self, minutes: i64) -> Self {
        self.token_expiry_minutes = minutes;
        self
    }

    pub fn generate_signed_token(&self) -> String {
        let token = generate_token();
        let timestamp = Utc::now().timestamp().to_string();
        let data = format!("{token}.{timestamp}");

        let signature = self.sign_data(&data);
        format!("{data}.{signature}")
    }

    pub fn check_signed_token(&self, signed_token: &str) -> CsrfValidationResult {
        let parts: Vec<&str> = signed_token.split('.').collect();
        if parts.len() != 3 {
            return CsrfValidationResult::Invalid;
        }

        let data = format!("{}.{}", parts[0], parts[1]);
        let expected_signature = self.sign_data(&data);
        if expected_signature.is_empty() || !constant_time_compare(&expected_signature, parts[2]) {
            return CsrfValidationResult::Invalid;
        }

        let created = parts[1]
            .parse::<i64>()
            .ok()
            .and_then(|ts| DateTime::from_timestamp(ts, 0));
        match created {
            Some(created) if Utc::now() <= created + Duration::minutes(self.token_expiry_minutes) => {
                CsrfValidationResult::Valid
            }
            Some(_) => CsrfValidationResult::Expired,
            None => CsrfValidationResult::Invalid,
        }
    }

    pub fn verify_signed_token(&self, signed_token: &str) -> bool {
        self.check_signed_token(signed_token).is_valid()
    }

    pub fn validate_double_submit(
        &self,
        cookie_token: &str,
        submitted_token: &str,
    ) -> CsrfValidationResult {
        if cookie_token.is_empty() || submitted_token.is_empty() {
            return CsrfValidationResult::Missing;
        }

        if !constant_time_compare(cookie_token, submitted_token) {
            return CsrfValidationResult::Invalid;
        }

        self.check_signed_token(cookie_token)
    }

    fn sign_data(&self, data: &str) -> String {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return String::new();
        };
        mac.update(data.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    pub fn token_expiry_minutes(&self) -> i64 {
        self.token_expiry_minutes
    }
}

impl std::fmt::Debug for CsrfManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfManager")
            .field("token_expiry_minutes", &self.token_expiry_minutes)
            .finish_non_exhaustive()
    }
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..TOKEN_LENGTH).map(|_| rng.random()).collect();
    BASE64.encode(&bytes)
}

/// Random key for deployments that did not configure one.
pub fn generate_secret_key() -> String {
    generate_token()
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

pub fn extract_cookie_value(cookie_header: &str, cookie_name: &str) -> Option<String> {
    for cookie in cookie_header.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=') {
            if name.trim() == cookie_name {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

pub fn extract_csrf_from_form(body: &str, field_name: &str) -> Option<String> {
    for pair in body.split('&') {
        if let Some((name, value)) = pair.split_once('=') {
            if name == field_name {
                let value = value.replace('+', " ");
                return Some(urlencoding::decode(&value).ok()?.to_string());
            }
        }
    }
    None
}

/// Returns the token the current page should embed, issuing a new cookie
/// when the visitor has none or it no longer verifies.
pub fn ensure_token(cookies: &Cookies, manager: &CsrfManager, secure: bool) -> String {
    if let Some(existing) = cookies.get(CSRF_COOKIE) {
        if manager.verify_signed_token(existing.value()) {
            return existing.value().to_string();
        }
    }

    let token = manager.generate_signed_token();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(tower_cookies::cookie::time::Duration::minutes(
            manager.token_expiry_minutes(),
        ))
        .build();
    cookies.add(cookie);
    token
}

fn is_exempt(method: &Method, path: &str) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) || EXEMPT_PATHS.contains(&path)
}

async fn submitted_token(content_type: &str, body: &axum::body::Bytes) -> Option<String> {
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let text = std::str::from_utf8(body).ok()?;
        return extract_csrf_from_form(text, CSRF_FIELD);
    }

    // Multipart forms render the token as their first part, so a prefix of
    // the body is enough and keeps the probe under the extractor's limit.
    if content_type.starts_with("multipart/form-data") {
        let prefix = body.slice(..body.len().min(MULTIPART_PROBE_BYTES));
        let probe = Request::builder()
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(prefix))
            .ok()?;
        let mut multipart = Multipart::from_request(probe, &()).await.ok()?;
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some(CSRF_FIELD) {
                return field.text().await.ok();
            }
        }
    }

    None
}

pub async fn csrf_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if is_exempt(&method, &path) {
        return next.run(request).await;
    }

    let cookie_token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|c| extract_cookie_value(c, CSRF_COOKIE))
        .unwrap_or_default();

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.config.uploads.max_request_bytes()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Rejected oversized or unreadable body for {method} {path}: {e}");
            return EservicesError::Validation("Request body too large".into()).into_response();
        }
    };

    let submitted = match header_token {
        Some(token) => token,
        None => submitted_token(&content_type, &bytes)
            .await
            .unwrap_or_default(),
    };

    let result = state.csrf.validate_double_submit(&cookie_token, &submitted);
    if !result.is_valid() {
        warn!(
            "CSRF validation failed for {} {}: {}",
            method,
            path,
            result.error_message()
        );
        return EservicesError::Forbidden(result.error_message().to_string()).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> CsrfManager {
        CsrfManager::new(b"test-secret-key-for-csrf")
    }

    #[test]
    fn test_signed_token() {
        let manager = manager();
        let token = manager.generate_signed_token();
        assert!(manager.verify_signed_token(&token));
        assert!(!manager.verify_signed_token("invalid.token.here"));
        assert!(!manager.verify_signed_token("nodots"));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = CsrfManager::new(b"other").generate_signed_token();
        assert_eq!(
            manager().check_signed_token(&token),
            CsrfValidationResult::Invalid
        );
    }

    #[test]
    fn test_expired_token() {
        let manager = manager().with_expiry_minutes(-1);
        let token = manager.generate_signed_token();
        assert_eq!(
            manager.check_signed_token(&token),
            CsrfValidationResult::Expired
        );
    }

    #[test]
    fn test_double_submit_validation() {
        let manager = manager();
        let token = manager.generate_signed_token();
        assert!(manager.validate_double_submit(&token, &token).is_valid());
        assert_eq!(
            manager.validate_double_submit(&token, "different"),
            CsrfValidationResult::Invalid
        );
        assert_eq!(
            manager.validate_double_submit("", &token),
            CsrfValidationResult::Missing
        );
    }

    #[test]
    fn test_extract_cookie_value() {
        let header = "session=abc; eservices_csrf=tok.123.sig; other=x";
        assert_eq!(
            extract_cookie_value(header, CSRF_COOKIE),
            Some("tok.123.sig".to_string())
        );
        assert_eq!(extract_cookie_value("a=b", CSRF_COOKIE), None);
    }

    #[test]
    fn test_extract_csrf_from_form() {
        let body = "email=a%40b.ph&csrf_token=abc%2Bdef.1.sig&remember=y";
        assert_eq!(
            extract_csrf_from_form(body, CSRF_FIELD),
            Some("abc+def.1.sig".to_string())
        );
        assert_eq!(extract_csrf_from_form("email=x", CSRF_FIELD), None);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }

    #[test]
    fn test_exempt_methods_and_paths() {
        assert!(is_exempt(&Method::GET, "/tickets"));
        assert!(is_exempt(&Method::POST, "/health"));
        assert!(!is_exempt(&Method::POST, "/auth/login"));
    }

    #[tokio::test]
    async fn test_token_read_from_multipart_body() {
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"body\"\r\n\r\nhello\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"csrf_token\"\r\n\r\ntok.1.sig\r\n\
             --{boundary}--\r\n"
        );
        let token = submitted_token(
            &format!("multipart/form-data; boundary={boundary}"),
            &axum::body::Bytes::from(body),
        )
        .await;
        assert_eq!(token, Some("tok.1.sig".to_string()));
    }
}
