//! Signed session cookies, password reset tokens and the role guards.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
    RequestPartsExt,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};
use tracing::warn;
use uuid::Uuid;

use crate::core::error::EservicesError;
use crate::core::shared::models::User;
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::Role;
use crate::web::flash::{self, FlashLevel};

pub const SESSION_COOKIE: &str = "eservices_session";
pub const RESET_PURPOSE: &str = "password-reset";
pub const RESET_TOKEN_MINUTES: i64 = 30;
pub const PERMISSION_DENIED: &str = "You do not have permission to access this page.";

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResetClaims {
    pub sub: Uuid,
    pub email: String,
    pub purpose: String,
    pub exp: i64,
}

pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub session_hours: i64,
    pub secure_cookies: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, session_hours: i64, secure_cookies: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            session_hours,
            secure_cookies,
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation
    }

    pub fn encode_session(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, EservicesError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id,
            email: email.to_string(),
            role,
            exp: (now + Duration::hours(self.session_hours)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| EservicesError::Internal(format!("Failed to sign session: {e}")))
    }

    pub fn decode_session(&self, token: &str) -> Option<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding, &Self::validation())
            .ok()
            .map(|data| data.claims)
    }

    pub fn issue_reset_token(&self, user: &User) -> Result<String, EservicesError> {
        self.issue_reset_token_for(user, Duration::minutes(RESET_TOKEN_MINUTES))
    }

    fn issue_reset_token_for(&self, user: &User, ttl: Duration) -> Result<String, EservicesError> {
        let claims = ResetClaims {
            sub: user.id,
            email: user.email.clone(),
            purpose: RESET_PURPOSE.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| EservicesError::Internal(format!("Failed to sign reset token: {e}")))
    }

    /// The user id of a valid, unexpired reset token.
    pub fn verify_reset_token(&self, token: &str) -> Option<Uuid> {
        let claims = decode::<ResetClaims>(token, &self.decoding, &Self::validation())
            .ok()?
            .claims;
        (claims.purpose == RESET_PURPOSE).then_some(claims.sub)
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(tower_cookies::cookie::time::Duration::hours(self.session_hours))
            .build()
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("session_hours", &self.session_hours)
            .field("secure_cookies", &self.secure_cookies)
            .finish_non_exhaustive()
    }
}

pub fn start_session(cookies: &Cookies, keys: &SessionKeys, user: &User) -> Result<(), EservicesError> {
    let token = keys.encode_session(user.id, &user.email, user.role)?;
    cookies.add(keys.session_cookie(token));
    Ok(())
}

pub fn end_session(cookies: &Cookies) {
    cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
}

/// Resolved once per request and shared between extractors.
#[derive(Clone)]
struct SessionUser(Option<User>);

async fn load_session_user(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<Option<User>, EservicesError> {
    if let Some(SessionUser(user)) = parts.extensions.get::<SessionUser>() {
        return Ok(user.clone());
    }

    let cookies = parts
        .extract::<Cookies>()
        .await
        .map_err(|(_, msg)| EservicesError::Internal(msg.to_string()))?;

    let claims = cookies
        .get(SESSION_COOKIE)
        .and_then(|c| state.keys.decode_session(c.value()));

    let user = match claims {
        Some(claims) => {
            let user_id = claims.sub;
            let user = state
                .db(move |conn| {
                    users::table
                        .find(user_id)
                        .select(User::as_select())
                        .first(conn)
                        .optional()
                        .map_err(EservicesError::from)
                })
                .await?;
            if user.is_none() {
                end_session(&cookies);
            }
            user
        }
        None => None,
    };

    parts.extensions.insert(SessionUser(user.clone()));
    Ok(user)
}

fn login_redirect(parts: &Parts) -> Response {
    let next = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&format!(
        "/auth/login?next={}",
        urlencoding::encode(next)
    ))
    .into_response()
}

async fn deny(parts: &mut Parts, user: &User) -> Response {
    warn!(
        "Access denied for {} ({}) to {}",
        user.email,
        user.role,
        parts.uri.path()
    );
    if let Ok(cookies) = parts.extract::<Cookies>().await {
        flash::push(&cookies, FlashLevel::Danger, PERMISSION_DENIED);
    }
    Redirect::to("/").into_response()
}

async fn require_user(parts: &mut Parts, state: &Arc<AppState>) -> Result<User, Response> {
    match load_session_user(parts, state).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            if let Ok(cookies) = parts.extract::<Cookies>().await {
                flash::push(&cookies, FlashLevel::Info, "Please log in to access this page.");
            }
            Err(login_redirect(parts))
        }
        Err(e) => Err(e.into_response()),
    }
}

/// Any signed-in account.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        require_user(parts, state).await.map(Self)
    }
}

#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        load_session_user(parts, state)
            .await
            .map(Self)
            .map_err(IntoResponse::into_response)
    }
}

/// Staff or Admin.
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for StaffUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = require_user(parts, state).await?;
        if user.role.is_staff_or_admin() {
            Ok(Self(user))
        } else {
            Err(deny(parts, &user).await)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = require_user(parts, state).await?;
        if user.role.is_admin() {
            Ok(Self(user))
        } else {
            Err(deny(parts, &user).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new("unit-test-secret", 12, false)
    }

    fn user() -> User {
        User::new("Teacher@DepEd.gov.ph", "Juan Dela Cruz", Role::User, None)
    }

    #[test]
    fn test_session_round_trip() {
        let keys = keys();
        let user = user();
        let token = keys
            .encode_session(user.id, &user.email, user.role)
            .expect("token");
        let claims = keys.decode_session(&token).expect("claims");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "teacher@deped.gov.ph");
        assert_eq!(claims.role, Role::User);
    }

    #[test]
    fn test_session_rejects_foreign_signature() {
        let token = SessionKeys::new("other-secret", 12, false)
            .encode_session(Uuid::new_v4(), "a@b.ph", Role::Admin)
            .expect("token");
        assert!(keys().decode_session(&token).is_none());
        assert!(keys().decode_session("garbage").is_none());
    }

    #[test]
    fn test_reset_token_round_trip() {
        let keys = keys();
        let user = user();
        let token = keys.issue_reset_token(&user).expect("token");
        assert_eq!(keys.verify_reset_token(&token), Some(user.id));
    }

    #[test]
    fn test_expired_reset_token_is_rejected() {
        let keys = keys();
        let token = keys
            .issue_reset_token_for(&user(), Duration::minutes(-5))
            .expect("token");
        assert_eq!(keys.verify_reset_token(&token), None);
    }

    #[test]
    fn test_session_token_is_not_a_reset_token() {
        let keys = keys();
        let user = user();
        let session = keys
            .encode_session(user.id, &user.email, user.role)
            .expect("token");
        assert_eq!(keys.verify_reset_token(&session), None);
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = keys().session_cookie("tok".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
