//! Login, logout, self-registration against the email allowlist and the
//! password reset flow.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::core::error::EservicesError;
use crate::core::rate_limit::RateLimitKey;
use crate::core::shared::models::User;
use crate::core::shared::schema::{authorized_emails, users};
use crate::core::shared::state::AppState;
use crate::core::shared::{html_escape, Role};
use crate::dashboards::STAFF_DASHBOARD_PATH;
use crate::email::password_reset_email;
use crate::security::password::{hash_password, verify_password};
use crate::security::session::{end_session, start_session, CurrentUser};
use crate::tickets::MY_TICKETS_PATH;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

pub const LOGIN_PATH: &str = "/auth/login";
pub const RESET_REQUEST_PATH: &str = "/auth/reset_password";

pub const NOT_AUTHORIZED_EMAIL: &str =
    "This email address is not authorized to register. Please contact the administrator.";
pub const EMAIL_TAKEN: &str = "That email is already registered. Please choose a different one.";

/// Where a user lands after signing in when no `next` was given.
pub fn home_for(user: &User) -> &'static str {
    if user.role.is_staff_or_admin() {
        STAFF_DASHBOARD_PATH
    } else {
        MY_TICKETS_PATH
    }
}

/// Only same-site absolute paths are followed.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.map(str::trim)
        .filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegistrationForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters long."))]
    pub password: String,
    #[serde(default)]
    #[validate(must_match(other = "password", message = "Passwords must match."))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ResetRequestForm {
    #[serde(default)]
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ResetPasswordForm {
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters long."))]
    pub password: String,
    #[serde(default)]
    #[validate(must_match(other = "password", message = "Passwords must match."))]
    pub confirm_password: String,
}

fn find_user_by_email(conn: &mut PgConnection, email: &str) -> Result<Option<User>, EservicesError> {
    users::table
        .filter(users::email.eq(email))
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(EservicesError::from)
}

// ============================================================================
// LOGIN / LOGOUT
// ============================================================================

fn render_login(ctx: &PageContext, next: Option<&str>, form: &LoginForm, errors: &FormErrors) -> Response {
    let action = match safe_next(next) {
        Some(next) => format!("{LOGIN_PATH}?next={}", urlencoding::encode(next)),
        None => LOGIN_PATH.to_string(),
    };
    let body = format!(
        "<div class=\"card narrow\"><h1>Login</h1>\
            <form method=\"post\" action=\"{action}\">{csrf}{email}{password}\
                <button type=\"submit\" class=\"btn\">Login</button>\
            </form>\
            <p><a href=\"{RESET_REQUEST_PATH}\">Forgot Password?</a></p>\
            <p>Need an account? <a href=\"/auth/register\">Register</a></p>\
         </div>",
        action = html_escape(&action),
        csrf = ctx.csrf_input(),
        email = ui::input_field("email", "email", "Email", &form.email, true, errors.get("email")),
        password = ui::input_field("password", "password", "Password", "", true, errors.get("password")),
    );
    ctx.render("Login", &body).into_response()
}

pub async fn login_page(ctx: PageContext, Query(query): Query<NextQuery>) -> Response {
    if let Some(user) = &ctx.user {
        return Redirect::to(home_for(user)).into_response();
    }
    render_login(&ctx, query.next.as_deref(), &LoginForm::default(), &FormErrors::new())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    RateLimitKey(key): RateLimitKey,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, EservicesError> {
    if let Some(user) = &ctx.user {
        return Ok(Redirect::to(home_for(user)).into_response());
    }
    state.rate_limits.check(&state.rate_limits.login, &key).await?;

    if let Err(e) = form.validate() {
        return Ok(render_login(&ctx, query.next.as_deref(), &form, &FormErrors::from(e)));
    }

    let email = normalize_email(&form.email);
    let password = form.password.clone();
    let lookup = email.clone();
    let user = state
        .db(move |conn| {
            let user = find_user_by_email(conn, &lookup)?;
            Ok(user.filter(|u| verify_password(&password, u.password_hash.as_deref())))
        })
        .await?;

    let Some(user) = user else {
        warn!("Failed login attempt for email: {}", email);
        ctx.flash(
            FlashLevel::Danger,
            "Login Unsuccessful. Please check email and password",
        );
        return Ok(render_login(&ctx, query.next.as_deref(), &form, &FormErrors::new()));
    };

    start_session(&ctx.cookies, &state.keys, &user)?;
    info!("User {} logged in successfully.", user.email);
    let target = safe_next(query.next.as_deref()).unwrap_or(home_for(&user));
    Ok(Redirect::to(target).into_response())
}

pub async fn logout(CurrentUser(user): CurrentUser, ctx: PageContext) -> Response {
    end_session(&ctx.cookies);
    info!("User {} logged out.", user.email);
    ctx.redirect_with(FlashLevel::Success, "You have been logged out.", LOGIN_PATH)
}

// ============================================================================
// REGISTRATION
// ============================================================================

fn render_register(ctx: &PageContext, form: &RegistrationForm, errors: &FormErrors) -> Response {
    let body = format!(
        "<div class=\"card narrow\"><h1>Register</h1>\
            <form method=\"post\" action=\"/auth/register\">{csrf}{name}{email}{password}{confirm}\
                <button type=\"submit\" class=\"btn\">Sign Up</button>\
            </form>\
            <p>Already have an account? <a href=\"{LOGIN_PATH}\">Login</a></p>\
         </div>",
        csrf = ctx.csrf_input(),
        name = ui::input_field("text", "name", "Full Name", &form.name, true, errors.get("name")),
        email = ui::input_field("email", "email", "DepEd Email", &form.email, true, errors.get("email")),
        password = ui::input_field("password", "password", "Password", "", true, errors.get("password")),
        confirm = ui::input_field(
            "password",
            "confirm_password",
            "Confirm Password",
            "",
            true,
            errors.get("confirm_password")
        ),
    );
    ctx.render("Register", &body).into_response()
}

pub async fn register_page(ctx: PageContext) -> Response {
    if ctx.user.is_some() {
        return Redirect::to("/").into_response();
    }
    render_register(&ctx, &RegistrationForm::default(), &FormErrors::new())
}

enum Registration {
    Created(User),
    NotAuthorized,
    Taken,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    RateLimitKey(key): RateLimitKey,
    Form(form): Form<RegistrationForm>,
) -> Result<Response, EservicesError> {
    if ctx.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    state.rate_limits.check(&state.rate_limits.register, &key).await?;

    if let Err(e) = form.validate() {
        return Ok(render_register(&ctx, &form, &FormErrors::from(e)));
    }

    let email = normalize_email(&form.email);
    let name = form.name.trim().to_string();
    let password = form.password.clone();
    let outcome = state
        .db(move |conn| {
            let authorized: i64 = authorized_emails::table
                .filter(authorized_emails::email.eq(&email))
                .count()
                .get_result(conn)?;
            if authorized == 0 {
                return Ok(Registration::NotAuthorized);
            }
            if find_user_by_email(conn, &email)?.is_some() {
                return Ok(Registration::Taken);
            }
            let user = User::new(&email, &name, Role::User, Some(hash_password(&password)?));
            match diesel::insert_into(users::table).values(&user).execute(conn) {
                Ok(_) => Ok(Registration::Created(user)),
                Err(e) => {
                    let e = EservicesError::from(e);
                    if e.is_unique_violation() {
                        Ok(Registration::Taken)
                    } else {
                        Err(e)
                    }
                }
            }
        })
        .await?;

    let mut errors = FormErrors::new();
    match outcome {
        Registration::Created(user) => {
            info!("New user registered: {}", user.email);
            return Ok(ctx.redirect_with(
                FlashLevel::Success,
                "Your account has been created! You are now able to log in.",
                LOGIN_PATH,
            ));
        }
        Registration::NotAuthorized => {
            warn!("Registration attempt with unauthorized email: {}", form.email.trim());
            errors.insert("email", NOT_AUTHORIZED_EMAIL);
        }
        Registration::Taken => errors.insert("email", EMAIL_TAKEN),
    }
    Ok(render_register(&ctx, &form, &errors))
}

// ============================================================================
// PASSWORD RESET
// ============================================================================

fn render_reset_request(ctx: &PageContext, form: &ResetRequestForm, errors: &FormErrors) -> Response {
    let body = format!(
        "<div class=\"card narrow\"><h1>Reset Password</h1>\
            <form method=\"post\" action=\"{RESET_REQUEST_PATH}\">{csrf}{email}\
                <button type=\"submit\" class=\"btn\">Request Password Reset</button>\
            </form>\
         </div>",
        csrf = ctx.csrf_input(),
        email = ui::input_field("email", "email", "Email", &form.email, true, errors.get("email")),
    );
    ctx.render("Reset Password", &body).into_response()
}

pub async fn reset_request_page(ctx: PageContext) -> Response {
    if ctx.user.is_some() {
        return Redirect::to("/").into_response();
    }
    render_reset_request(&ctx, &ResetRequestForm::default(), &FormErrors::new())
}

pub async fn reset_request(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    RateLimitKey(key): RateLimitKey,
    Form(form): Form<ResetRequestForm>,
) -> Result<Response, EservicesError> {
    if ctx.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    state
        .rate_limits
        .check(&state.rate_limits.reset_request, &key)
        .await?;

    if let Err(e) = form.validate() {
        return Ok(render_reset_request(&ctx, &form, &FormErrors::from(e)));
    }

    let email = normalize_email(&form.email);
    let lookup = email.clone();
    let user = state
        .db(move |conn| find_user_by_email(conn, &lookup))
        .await?;

    match user {
        Some(user) => {
            let token = state.keys.issue_reset_token(&user)?;
            let url = format!(
                "{}{RESET_REQUEST_PATH}/{token}",
                state.config.server.base_url.trim_end_matches('/')
            );
            state.mailer.send(password_reset_email(&user.email, &url));
            info!("Password reset requested for user: {}", email);
        }
        None => warn!("Password reset requested for non-existent email: {}", email),
    }

    Ok(ctx.redirect_with(
        FlashLevel::Info,
        "An email has been sent with instructions to reset your password (if the email exists in our system).",
        LOGIN_PATH,
    ))
}

async fn user_for_token(state: &AppState, token: &str) -> Result<Option<User>, EservicesError> {
    let Some(user_id) = state.keys.verify_reset_token(token) else {
        return Ok(None);
    };
    state
        .db(move |conn| {
            users::table
                .find(user_id)
                .select(User::as_select())
                .first(conn)
                .optional()
                .map_err(EservicesError::from)
        })
        .await
}

fn invalid_token(ctx: &PageContext) -> Response {
    warn!("Invalid or expired password reset token used.");
    ctx.redirect_with(
        FlashLevel::Warning,
        "That is an invalid or expired token",
        RESET_REQUEST_PATH,
    )
}

fn render_reset_token(ctx: &PageContext, token: &str, errors: &FormErrors) -> Response {
    let body = format!(
        "<div class=\"card narrow\"><h1>Reset Password</h1>\
            <form method=\"post\" action=\"{RESET_REQUEST_PATH}/{token}\">{csrf}{password}{confirm}\
                <button type=\"submit\" class=\"btn\">Reset Password</button>\
            </form>\
         </div>",
        token = urlencoding::encode(token),
        csrf = ctx.csrf_input(),
        password = ui::input_field("password", "password", "New Password", "", true, errors.get("password")),
        confirm = ui::input_field(
            "password",
            "confirm_password",
            "Confirm Password",
            "",
            true,
            errors.get("confirm_password")
        ),
    );
    ctx.render("Reset Password", &body).into_response()
}

pub async fn reset_token_page(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Path(token): Path<String>,
) -> Result<Response, EservicesError> {
    if ctx.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    if user_for_token(&state, &token).await?.is_none() {
        return Ok(invalid_token(&ctx));
    }
    Ok(render_reset_token(&ctx, &token, &FormErrors::new()))
}

pub async fn reset_token(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    RateLimitKey(key): RateLimitKey,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response, EservicesError> {
    if ctx.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    state
        .rate_limits
        .check(&state.rate_limits.reset_token, &key)
        .await?;

    let Some(user) = user_for_token(&state, &token).await? else {
        return Ok(invalid_token(&ctx));
    };
    if let Err(e) = form.validate() {
        return Ok(render_reset_token(&ctx, &token, &FormErrors::from(e)));
    }

    let password = form.password.clone();
    let user_id = user.id;
    state
        .db(move |conn| {
            let hash = hash_password(&password)?;
            diesel::update(users::table.find(user_id))
                .set(users::password_hash.eq(Some(hash)))
                .execute(conn)?;
            Ok(())
        })
        .await?;

    info!("Password reset successfully for user: {}", user.email);
    Ok(ctx.redirect_with(
        FlashLevel::Success,
        "Your password has been updated! You are now able to log in",
        LOGIN_PATH,
    ))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(LOGIN_PATH, get(login_page).post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/register", get(register_page).post(register))
        .route(RESET_REQUEST_PATH, get(reset_request_page).post(reset_request))
        .route(
            "/auth/reset_password/:token",
            get(reset_token_page).post(reset_token),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/ticket/abc")), Some("/ticket/abc"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(Some("/\\evil")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn test_home_for_roles() {
        let staff = User::new("s@deped.gov.ph", "Staff", Role::Staff, None);
        let requester = User::new("u@deped.gov.ph", "User", Role::User, None);
        assert_eq!(home_for(&staff), STAFF_DASHBOARD_PATH);
        assert_eq!(home_for(&requester), MY_TICKETS_PATH);
    }

    #[test]
    fn test_registration_validation() {
        let form = RegistrationForm {
            name: "Ana Reyes".into(),
            email: "ana@deped.gov.ph".into(),
            password: "longenough".into(),
            confirm_password: "different1".into(),
        };
        let errors = FormErrors::from(form.validate().expect_err("mismatch"));
        assert_eq!(errors.get("confirm_password"), Some("Passwords must match."));

        let ok = RegistrationForm {
            confirm_password: "longenough".into(),
            ..form
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_reset_password_requires_length() {
        let form = ResetPasswordForm {
            password: "short".into(),
            confirm_password: "short".into(),
        };
        let errors = FormErrors::from(form.validate().expect_err("too short"));
        assert!(errors.get("password").is_some());
    }
}
