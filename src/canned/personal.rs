use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Form,
};
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{personal_for_user, ticket_back_query, NOT_FOUND_OR_DENIED};
use crate::core::error::EservicesError;
use crate::core::shared::html_escape;
use crate::core::shared::models::PersonalCannedResponse;
use crate::core::shared::schema::personal_canned_responses;
use crate::core::shared::state::AppState;
use crate::security::session::StaffUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

const LIST_PATH: &str = "/admin/my-responses";

#[derive(Debug, Default, Deserialize)]
pub struct BackLink {
    pub ticket_id: Option<String>,
}

impl BackLink {
    fn query(&self) -> String {
        ticket_back_query(self.ticket_id.as_deref())
    }

    fn list_url(&self) -> String {
        format!("{LIST_PATH}{}", self.query())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PersonalResponseForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 100))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub body: String,
}

fn form_fields(form: &PersonalResponseForm, errors: &FormErrors) -> String {
    format!(
        "{}{}",
        ui::input_field("text", "title", "Title", &form.title, true, errors.get("title")),
        ui::textarea_field("body", "Response Body", &form.body, true, errors.get("body")),
    )
}

fn render_list(
    ctx: &PageContext,
    back: &BackLink,
    responses: &[PersonalCannedResponse],
    form: &PersonalResponseForm,
    errors: &FormErrors,
) -> Response {
    let query = back.query();
    let rows: String = responses
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{title}</td><td><pre>{body}</pre></td>\
                 <td><a class=\"btn\" href=\"{LIST_PATH}/{id}/edit{query}\">Edit</a> {delete}</td></tr>",
                title = html_escape(&r.title),
                body = html_escape(&r.body),
                id = r.id,
                delete = ui::post_button(
                    &format!("{LIST_PATH}/{}/delete{query}", r.id),
                    &ctx.csrf_token,
                    "Delete",
                    "Delete this personal response?",
                ),
            )
        })
        .collect();
    let table = if responses.is_empty() {
        ui::empty_state("You have no personal responses yet.")
    } else {
        format!("<table><thead><tr><th>Title</th><th>Body</th><th></th></tr></thead><tbody>{rows}</tbody></table>")
    };
    let back_link = back
        .ticket_id
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(|t| {
            format!(
                "<p><a class=\"btn btn-secondary\" href=\"/ticket/{}\">&laquo; Back to Ticket</a></p>",
                html_escape(t.trim())
            )
        })
        .unwrap_or_default();

    let body = format!(
        "<div class=\"card\"><h1>My Personal Responses</h1>{back_link}{table}</div>\
         <div class=\"card\"><h2>Add New Response</h2>\
            <form method=\"post\" action=\"{LIST_PATH}{query}\">{csrf}{fields}\
                <button type=\"submit\" class=\"btn\">Save Response</button>\
            </form>\
         </div>",
        csrf = ctx.csrf_input(),
        fields = form_fields(form, errors),
    );
    ctx.render("My Personal Responses", &body).into_response()
}

pub async fn list_my_responses(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    ctx: PageContext,
    Query(back): Query<BackLink>,
) -> Result<Response, EservicesError> {
    let user_id = user.id;
    let responses = state.db(move |conn| personal_for_user(conn, user_id)).await?;
    Ok(render_list(
        &ctx,
        &back,
        &responses,
        &PersonalResponseForm::default(),
        &FormErrors::new(),
    ))
}

fn title_taken(
    conn: &mut PgConnection,
    user_id: Uuid,
    title: &str,
    exclude: Option<Uuid>,
) -> Result<bool, EservicesError> {
    let mut query = personal_canned_responses::table
        .filter(personal_canned_responses::user_id.eq(user_id))
        .filter(personal_canned_responses::title.eq(title))
        .into_boxed();
    if let Some(exclude) = exclude {
        query = query.filter(personal_canned_responses::id.ne(exclude));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

pub async fn add_my_response(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    ctx: PageContext,
    Query(back): Query<BackLink>,
    Form(form): Form<PersonalResponseForm>,
) -> Result<Response, EservicesError> {
    let user_id = user.id;
    if let Err(e) = form.validate() {
        let responses = state.db(move |conn| personal_for_user(conn, user_id)).await?;
        return Ok(render_list(&ctx, &back, &responses, &form, &FormErrors::from(e)));
    }

    let title = form.title.trim().to_string();
    let body = form.body.clone();
    let created = state
        .db(move |conn| {
            if title_taken(conn, user_id, &title, None)? {
                return Ok(None);
            }
            let response = PersonalCannedResponse {
                id: Uuid::new_v4(),
                title,
                body,
                user_id,
            };
            diesel::insert_into(personal_canned_responses::table)
                .values(&response)
                .execute(conn)?;
            Ok(Some(response))
        })
        .await?;

    let response = match created {
        Some(response) => {
            info!("User {} added personal response: '{}'", user.email, response.title);
            ctx.redirect_with(FlashLevel::Success, "Personal response saved!", &back.list_url())
        }
        None => ctx.redirect_with(
            FlashLevel::Warning,
            "You already have a personal response with this title.",
            &back.list_url(),
        ),
    };
    Ok(response)
}

async fn find_owned(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<PersonalCannedResponse>, EservicesError> {
    let found = state
        .db(move |conn| {
            personal_canned_responses::table
                .find(id)
                .select(PersonalCannedResponse::as_select())
                .first(conn)
                .optional()
                .map_err(EservicesError::from)
        })
        .await?;
    Ok(found.filter(|r| r.user_id == user_id))
}

fn render_edit(
    ctx: &PageContext,
    back: &BackLink,
    id: Uuid,
    form: &PersonalResponseForm,
    errors: &FormErrors,
) -> Response {
    let query = back.query();
    let body = format!(
        "<div class=\"card\"><h1>Edit Personal Response</h1>\
            <form method=\"post\" action=\"{LIST_PATH}/{id}/edit{query}\">{csrf}{fields}\
                <button type=\"submit\" class=\"btn\">Update</button> \
                <a class=\"btn btn-secondary\" href=\"{back_url}\">Cancel</a>\
            </form>\
         </div>",
        csrf = ctx.csrf_input(),
        fields = form_fields(form, errors),
        back_url = html_escape(&back.list_url()),
    );
    ctx.render("Edit Personal Response", &body).into_response()
}

pub async fn edit_my_response_page(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Query(back): Query<BackLink>,
) -> Result<Response, EservicesError> {
    match find_owned(&state, id, user.id).await? {
        Some(existing) => {
            let form = PersonalResponseForm {
                title: existing.title,
                body: existing.body,
            };
            Ok(render_edit(&ctx, &back, id, &form, &FormErrors::new()))
        }
        None => {
            warn!(
                "User {} tried editing unauthorized personal response ID: {}",
                user.email, id
            );
            Ok(ctx.redirect_with(FlashLevel::Danger, NOT_FOUND_OR_DENIED, &back.list_url()))
        }
    }
}

pub async fn edit_my_response(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Query(back): Query<BackLink>,
    Form(form): Form<PersonalResponseForm>,
) -> Result<Response, EservicesError> {
    let Some(existing) = find_owned(&state, id, user.id).await? else {
        warn!(
            "User {} tried editing unauthorized personal response ID: {}",
            user.email, id
        );
        return Ok(ctx.redirect_with(FlashLevel::Danger, NOT_FOUND_OR_DENIED, &back.list_url()));
    };

    if let Err(e) = form.validate() {
        return Ok(render_edit(&ctx, &back, id, &form, &FormErrors::from(e)));
    }

    let title = form.title.trim().to_string();
    let body = form.body.clone();
    let user_id = user.id;
    let title_changed = existing.title != title;
    let saved = state
        .db(move |conn| {
            if title_changed && title_taken(conn, user_id, &title, Some(id))? {
                return Ok(false);
            }
            diesel::update(personal_canned_responses::table.find(id))
                .set((
                    personal_canned_responses::title.eq(&title),
                    personal_canned_responses::body.eq(&body),
                ))
                .execute(conn)?;
            Ok(true)
        })
        .await?;

    if !saved {
        ctx.flash(
            FlashLevel::Warning,
            "You already have another personal response with this title.",
        );
        return Ok(render_edit(&ctx, &back, id, &form, &FormErrors::new()));
    }

    info!("User {} updated personal response ID {}", user.email, id);
    Ok(ctx.redirect_with(
        FlashLevel::Success,
        "Personal response updated.",
        &back.list_url(),
    ))
}

pub async fn delete_my_response(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Query(back): Query<BackLink>,
) -> Result<Response, EservicesError> {
    let Some(existing) = find_owned(&state, id, user.id).await? else {
        warn!(
            "User {} tried deleting unauthorized personal response ID: {}",
            user.email, id
        );
        return Ok(ctx.redirect_with(FlashLevel::Danger, NOT_FOUND_OR_DENIED, &back.list_url()));
    };

    state
        .db(move |conn| {
            diesel::delete(personal_canned_responses::table.find(id))
                .execute(conn)
                .map_err(EservicesError::from)
        })
        .await?;

    info!("User {} deleted personal response: '{}'", user.email, existing.title);
    Ok(ctx.redirect_with(
        FlashLevel::Success,
        "Personal response deleted.",
        &back.list_url(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_link_urls() {
        let none = BackLink::default();
        assert_eq!(none.list_url(), "/admin/my-responses");
        let back = BackLink {
            ticket_id: Some("7c9e6679-7425-40de-944b-e07fc1f90ae7".into()),
        };
        assert_eq!(
            back.list_url(),
            "/admin/my-responses?ticket_id=7c9e6679-7425-40de-944b-e07fc1f90ae7"
        );
    }

    #[test]
    fn test_form_validation() {
        let ok = PersonalResponseForm {
            title: "Follow-up".into(),
            body: "We are checking your request.".into(),
        };
        assert!(ok.validate().is_ok());
        let bad = PersonalResponseForm::default();
        assert!(bad.validate().is_err());
    }
}
