//! Rate Limiting Module
//!
//! Request quotas built on the governor library. Every quota is a set of
//! windows ("500 per 5 minutes and 2000 per hour"); a request must fit in
//! all of them. Keys are `user-<id>` for signed-in visitors and the client IP
//! otherwise.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    collections::HashMap, convert::Infallible, net::SocketAddr, num::NonZeroU32, sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::warn;

use crate::core::error::EservicesError;
use crate::core::shared::state::AppState;
use crate::security::session::{SessionKeys, SESSION_COOKIE};

/// Rate limiter type alias
type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-key rate limiter for one window
pub struct KeyedRateLimiter {
    limiters: RwLock<HashMap<String, Arc<Limiter>>>,
    quota: Quota,
    replenish: Duration,
    cleanup_threshold: usize,
}

impl KeyedRateLimiter {
    /// Allows `count` requests per `window`, replenished evenly.
    pub fn new(count: u32, window: Duration) -> Self {
        let count = NonZeroU32::new(count).unwrap_or(NonZeroU32::MIN);
        let replenish = window / count.get();
        let quota = Quota::with_period(replenish)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(count);

        Self {
            limiters: RwLock::new(HashMap::new()),
            quota,
            replenish,
            cleanup_threshold: 10000,
        }
    }

    /// Check if a key is within its quota, consuming one cell when it is
    pub async fn check(&self, key: &str) -> bool {
        let limiter = {
            let limiters = self.limiters.read().await;
            limiters.get(key).cloned()
        };

        let limiter = match limiter {
            Some(l) => l,
            None => {
                let mut limiters = self.limiters.write().await;

                if limiters.len() > self.cleanup_threshold {
                    limiters.clear();
                }

                Arc::clone(
                    limiters
                        .entry(key.to_string())
                        .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota))),
                )
            }
        };

        limiter.check().is_ok()
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.replenish.as_secs().max(1)
    }
}

impl std::fmt::Debug for KeyedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedRateLimiter")
            .field("replenish", &self.replenish)
            .field("cleanup_threshold", &self.cleanup_threshold)
            .finish()
    }
}

/// A quota made of several windows that must all admit the request.
#[derive(Debug)]
pub struct MultiWindowLimiter {
    windows: Vec<KeyedRateLimiter>,
}

impl MultiWindowLimiter {
    pub fn new(windows: &[(u32, Duration)]) -> Self {
        Self {
            windows: windows
                .iter()
                .map(|(count, window)| KeyedRateLimiter::new(*count, *window))
                .collect(),
        }
    }

    /// `Err(retry_after_secs)` from the first window that refuses.
    pub async fn check(&self, key: &str) -> Result<(), u64> {
        for window in &self.windows {
            if !window.check(key).await {
                return Err(window.retry_after_secs());
            }
        }
        Ok(())
    }
}

/// Rate limit state shared across requests
#[derive(Debug)]
pub struct RateLimitState {
    pub enabled: bool,
    pub global: MultiWindowLimiter,
    pub login: MultiWindowLimiter,
    pub register: MultiWindowLimiter,
    pub reset_request: MultiWindowLimiter,
    pub reset_token: MultiWindowLimiter,
}

impl RateLimitState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            global: MultiWindowLimiter::new(&[(500, 5 * MINUTE), (2000, HOUR)]),
            login: MultiWindowLimiter::new(&[(10, MINUTE), (30, 2 * HOUR)]),
            register: MultiWindowLimiter::new(&[(10, HOUR)]),
            reset_request: MultiWindowLimiter::new(&[(5, DAY), (2, HOUR)]),
            reset_token: MultiWindowLimiter::new(&[(10, MINUTE)]),
        }
    }

    pub async fn check(&self, limiter: &MultiWindowLimiter, key: &str) -> Result<(), EservicesError> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check(key).await.map_err(|retry_after_secs| {
            warn!("Rate limit hit for {}", key);
            EservicesError::RateLimited { retry_after_secs }
        })
    }
}

/// Extract client IP from request headers, falling back to the peer address
fn get_client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip) = value.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return value.trim().to_string();
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `user-<id>` for a valid session cookie, else the client IP.
pub fn client_key(headers: &HeaderMap, extensions: &Extensions, keys: &SessionKeys) -> String {
    let session_user = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|c| crate::security::csrf::extract_cookie_value(c, SESSION_COOKIE))
        .and_then(|token| keys.decode_session(&token));

    match session_user {
        Some(claims) => format!("user-{}", claims.sub),
        None => get_client_ip(headers, extensions),
    }
}

/// Handler-side access to the rate limit key of the current request.
#[derive(Debug, Clone)]
pub struct RateLimitKey(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RateLimitKey {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(client_key(&parts.headers, &parts.extensions, &state.keys)))
    }
}

/// Applies the default quota to every request except static files.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !state.rate_limits.enabled || req.uri().path().starts_with("/static/") {
        return next.run(req).await;
    }

    let key = client_key(req.headers(), req.extensions(), &state.keys);
    match state.rate_limits.check(&state.rate_limits.global, &key).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_exhausts_then_refuses() {
        let limiter = KeyedRateLimiter::new(2, HOUR);
        assert!(limiter.check("1.2.3.4").await);
        assert!(limiter.check("1.2.3.4").await);
        assert!(!limiter.check("1.2.3.4").await);
        assert!(limiter.check("5.6.7.8").await);
    }

    #[tokio::test]
    async fn test_tightest_window_wins() {
        let limiter = MultiWindowLimiter::new(&[(5, DAY), (2, HOUR)]);
        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_ok());
        assert_eq!(limiter.check("k").await, Err(30 * 60));
    }

    #[tokio::test]
    async fn test_disabled_state_never_refuses() {
        let state = RateLimitState::new(false);
        for _ in 0..20 {
            assert!(state.check(&state.reset_token, "k").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_enabled_state_reports_retry_after() {
        let state = RateLimitState::new(true);
        for _ in 0..10 {
            assert!(state.check(&state.reset_token, "k").await.is_ok());
        }
        match state.check(&state.reset_token, "k").await {
            Err(EservicesError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 6)
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().expect("header"));
        assert_eq!(get_client_ip(&headers, &Extensions::new()), "10.0.0.1");

        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(get_client_ip(&HeaderMap::new(), &extensions), "127.0.0.1");
        assert_eq!(get_client_ip(&HeaderMap::new(), &Extensions::new()), "unknown");
    }

    #[test]
    fn test_client_key_uses_session_user() {
        let keys = SessionKeys::new("secret", 1, false);
        let user_id = uuid::Uuid::new_v4();
        let token = keys
            .encode_session(user_id, "staff@deped.gov.ph", crate::core::shared::Role::Staff)
            .expect("token");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("{SESSION_COOKIE}={token}").parse().expect("header"),
        );
        assert_eq!(
            client_key(&headers, &Extensions::new(), &keys),
            format!("user-{user_id}")
        );
    }
}
