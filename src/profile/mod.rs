//! The landing redirect and the signed-in user's profile page.

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::auth::home_for;
use crate::core::error::EservicesError;
use crate::core::shared::models::User;
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::security::password::{hash_password, verify_password};
use crate::security::session::CurrentUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

pub const PROFILE_PATH: &str = "/profile";

pub async fn home(CurrentUser(user): CurrentUser) -> Redirect {
    Redirect::to(home_for(&user))
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 100))]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ChangePasswordForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub current_password: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters long."))]
    pub new_password: String,
    #[serde(default)]
    #[validate(must_match(other = "new_password", message = "Passwords must match."))]
    pub confirm_new_password: String,
}

/// Both forms post to the same URL; the submit button's name says which.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileSubmission {
    pub submit_profile: Option<String>,
    pub submit_password: Option<String>,
    #[serde(flatten)]
    pub profile: UpdateProfileForm,
    #[serde(flatten)]
    pub password: ChangePasswordForm,
}

fn render_profile(
    ctx: &PageContext,
    user: &User,
    name: &str,
    profile_errors: &FormErrors,
    password_errors: &FormErrors,
) -> Response {
    let body = format!(
        "<div class=\"card narrow\"><h1>My Profile</h1>\
            <form method=\"post\" action=\"{PROFILE_PATH}\">{csrf}{name}{email}\
                <button type=\"submit\" name=\"submit_profile\" value=\"1\" class=\"btn\">Update Profile</button>\
            </form>\
         </div>\
         <div class=\"card narrow\"><h2>Change Password</h2>\
            <form method=\"post\" action=\"{PROFILE_PATH}\">{csrf}{current}{new}{confirm}\
                <button type=\"submit\" name=\"submit_password\" value=\"1\" class=\"btn\">Change Password</button>\
            </form>\
         </div>",
        csrf = ctx.csrf_input(),
        name = ui::input_field("text", "name", "Name", name, true, profile_errors.get("name")),
        email = format!(
            "<div class=\"form-group\"><label>Email</label><input type=\"email\" value=\"{}\" readonly></div>",
            crate::core::shared::html_escape(&user.email)
        ),
        current = ui::input_field(
            "password",
            "current_password",
            "Current Password",
            "",
            true,
            password_errors.get("current_password")
        ),
        new = ui::input_field(
            "password",
            "new_password",
            "New Password",
            "",
            true,
            password_errors.get("new_password")
        ),
        confirm = ui::input_field(
            "password",
            "confirm_new_password",
            "Confirm New Password",
            "",
            true,
            password_errors.get("confirm_new_password")
        ),
    );
    ctx.render("My Profile", &body).into_response()
}

pub async fn profile_page(CurrentUser(user): CurrentUser, ctx: PageContext) -> Response {
    render_profile(&ctx, &user, &user.name, &FormErrors::new(), &FormErrors::new())
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ctx: PageContext,
    Form(submission): Form<ProfileSubmission>,
) -> Result<Response, EservicesError> {
    let user_id = user.id;

    if submission.submit_profile.is_some() {
        let form = submission.profile;
        if let Err(e) = form.validate() {
            return Ok(render_profile(&ctx, &user, &form.name, &FormErrors::from(e), &FormErrors::new()));
        }
        let name = form.name.trim().to_string();
        state
            .db(move |conn| {
                diesel::update(users::table.find(user_id))
                    .set(users::name.eq(name))
                    .execute(conn)
                    .map_err(EservicesError::from)
            })
            .await?;
        info!("User {} updated their profile", user.email);
        return Ok(ctx.redirect_with(
            FlashLevel::Success,
            "Your profile has been updated.",
            PROFILE_PATH,
        ));
    }

    if submission.submit_password.is_some() {
        let form = submission.password;
        if let Err(e) = form.validate() {
            return Ok(render_profile(&ctx, &user, &user.name, &FormErrors::new(), &FormErrors::from(e)));
        }
        let current = form.current_password.clone();
        let new_password = form.new_password.clone();
        let stored_hash = user.password_hash.clone();
        let changed = state
            .db(move |conn| {
                if !verify_password(&current, stored_hash.as_deref()) {
                    return Ok(false);
                }
                let hash = hash_password(&new_password)?;
                diesel::update(users::table.find(user_id))
                    .set(users::password_hash.eq(Some(hash)))
                    .execute(conn)?;
                Ok(true)
            })
            .await?;

        if !changed {
            let mut errors = FormErrors::new();
            errors.insert("current_password", "Current password is incorrect.");
            return Ok(render_profile(&ctx, &user, &user.name, &FormErrors::new(), &errors));
        }
        info!("User {} changed their password", user.email);
        return Ok(ctx.redirect_with(
            FlashLevel::Success,
            "Your password has been changed successfully.",
            PROFILE_PATH,
        ));
    }

    Ok(Redirect::to(PROFILE_PATH).into_response())
}

pub fn configure_profile_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(home))
        .route(PROFILE_PATH, get(profile_page).post(update_profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};

    #[tokio::test]
    async fn test_submission_picks_form_by_button() {
        let request = Request::post(PROFILE_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("csrf_token=t&name=Ana+Reyes&submit_profile=1"))
            .expect("request");
        let Form(submission) = Form::<ProfileSubmission>::from_request(request, &())
            .await
            .expect("parse");
        assert!(submission.submit_profile.is_some());
        assert!(submission.submit_password.is_none());
        assert_eq!(submission.profile.name, "Ana Reyes");
        assert!(submission.profile.validate().is_ok());
    }

    #[test]
    fn test_password_change_validation() {
        let form = ChangePasswordForm {
            current_password: "old-password".into(),
            new_password: "new-password".into(),
            confirm_new_password: "other-password".into(),
        };
        let errors = FormErrors::from(form.validate().expect_err("mismatch"));
        assert_eq!(errors.get("confirm_new_password"), Some("Passwords must match."));
    }
}
