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

use crate::core::error::EservicesError;
use crate::core::shared::models::School;
use crate::core::shared::schema::{schools, tickets};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ilike_pattern, page_window, parse_page};
use crate::core::shared::{html_escape, Page};
use crate::security::session::AdminUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

pub const LIST_PATH: &str = "/admin/schools";

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SchoolForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub school_id_code: String,
}

impl SchoolForm {
    fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.school_id_code = self.school_id_code.trim().to_string();
        self
    }

    /// A blank code is stored as NULL so it never collides.
    pub fn code(&self) -> Option<String> {
        Some(self.school_id_code.clone()).filter(|c| !c.is_empty())
    }

    fn from_school(school: &School) -> Self {
        Self {
            name: school.name.clone(),
            school_id_code: school.school_id_code.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SchoolListQuery {
    pub search: Option<String>,
    pub page: Option<String>,
}

/// Which unique column an add or edit collides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conflict {
    Name,
    Code,
}

fn conflict(
    conn: &mut PgConnection,
    name: &str,
    code: Option<&str>,
    exclude: Option<Uuid>,
) -> Result<Option<Conflict>, EservicesError> {
    let mut by_name = schools::table.filter(schools::name.eq(name)).into_boxed();
    if let Some(id) = exclude {
        by_name = by_name.filter(schools::id.ne(id));
    }
    if by_name.count().get_result::<i64>(conn)? > 0 {
        return Ok(Some(Conflict::Name));
    }
    if let Some(code) = code {
        let mut by_code = schools::table
            .filter(schools::school_id_code.eq(code))
            .into_boxed();
        if let Some(id) = exclude {
            by_code = by_code.filter(schools::id.ne(id));
        }
        if by_code.count().get_result::<i64>(conn)? > 0 {
            return Ok(Some(Conflict::Code));
        }
    }
    Ok(None)
}

fn conflict_errors(conflict: Conflict) -> FormErrors {
    let mut errors = FormErrors::new();
    match conflict {
        Conflict::Name => errors.insert("name", "That school name already exists."),
        Conflict::Code => errors.insert("school_id_code", "That school ID is already in use."),
    }
    errors
}

fn render_form(ctx: &PageContext, title: &str, action: &str, form: &SchoolForm, errors: &FormErrors) -> Response {
    let body = format!(
        "<div class=\"card narrow\"><h1>{heading}</h1>\
            <form method=\"post\" action=\"{action}\">{csrf}{name}{code}\
                <button type=\"submit\" class=\"btn\">Save</button> \
                <a class=\"btn btn-secondary\" href=\"{LIST_PATH}\">Cancel</a>\
            </form>\
         </div>",
        heading = html_escape(title),
        csrf = ctx.csrf_input(),
        name = ui::input_field("text", "name", "School/Office Name", &form.name, true, errors.get("name")),
        code = ui::input_field(
            "text",
            "school_id_code",
            "School ID (optional)",
            &form.school_id_code,
            false,
            errors.get("school_id_code"),
        ),
    );
    ctx.render(title, &body).into_response()
}

pub async fn list_schools(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
    Query(query): Query<SchoolListQuery>,
) -> Result<Response, EservicesError> {
    let search = query.search.unwrap_or_default().trim().to_string();
    let requested = parse_page(query.page.as_deref());
    let per_page = state.config.pagination.schools_per_page;

    let pattern = ilike_pattern(&search);
    let searching = !search.is_empty();
    let page = state
        .db(move |conn| {
            let filtered = || {
                let mut q = schools::table.into_boxed();
                if searching {
                    q = q.filter(
                        schools::name
                            .ilike(pattern.clone())
                            .or(schools::school_id_code.ilike(pattern.clone())),
                    );
                }
                q
            };
            let total: i64 = filtered().count().get_result(conn)?;
            let (page, offset) = page_window(requested, per_page);
            let items = filtered()
                .order(schools::name.asc())
                .limit(per_page)
                .offset(offset)
                .select(School::as_select())
                .load(conn)?;
            Ok(Page {
                items,
                page,
                per_page,
                total,
            })
        })
        .await?;

    let table = if page.items.is_empty() {
        ui::empty_state("No schools found.")
    } else {
        let rows: String = page
            .items
            .iter()
            .map(|school| {
                format!(
                    "<tr><td>{name}</td><td>{code}</td>\
                     <td><a class=\"btn\" href=\"/admin/school/{id}/edit\">Edit</a> {delete}</td></tr>",
                    name = html_escape(&school.name),
                    code = html_escape(school.school_id_code.as_deref().unwrap_or("")),
                    id = school.id,
                    delete = ui::post_button(
                        &format!("/admin/school/{}/delete", school.id),
                        &ctx.csrf_token,
                        "Delete",
                        "Delete this school?",
                    ),
                )
            })
            .collect();
        format!(
            "<table><thead><tr><th>Name</th><th>School ID</th><th></th></tr></thead><tbody>{rows}</tbody></table>"
        )
    };
    let keep = [("search", search.clone())];
    let body = format!(
        "<div class=\"card\"><h1>Manage Schools</h1>\
         <p><a class=\"btn\" href=\"/admin/school/add\">Add School</a></p>\
         <form method=\"get\" action=\"{LIST_PATH}\" class=\"inline-form\">\
            <input type=\"text\" name=\"search\" value=\"{search}\" placeholder=\"Search name or school ID\">\
            <button type=\"submit\" class=\"btn\">Search</button>\
         </form>{table}{pager}</div>",
        search = html_escape(&search),
        pager = ui::pagination(&page, LIST_PATH, "page", &keep),
    );
    Ok(ctx.render("Manage Schools", &body).into_response())
}

pub async fn add_school_page(AdminUser(_admin): AdminUser, ctx: PageContext) -> Response {
    render_form(&ctx, "Add School", "/admin/school/add", &SchoolForm::default(), &FormErrors::new())
}

pub async fn add_school(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Form(form): Form<SchoolForm>,
) -> Result<Response, EservicesError> {
    let form = form.normalized();
    if let Err(e) = form.validate() {
        return Ok(render_form(&ctx, "Add School", "/admin/school/add", &form, &FormErrors::from(e)));
    }

    let school = School {
        id: Uuid::new_v4(),
        name: form.name.clone(),
        school_id_code: form.code(),
    };
    let outcome = state
        .db(move |conn| {
            if let Some(hit) = conflict(conn, &school.name, school.school_id_code.as_deref(), None)? {
                return Ok(Some(hit));
            }
            diesel::insert_into(schools::table).values(&school).execute(conn)?;
            Ok(None)
        })
        .await?;

    if let Some(hit) = outcome {
        return Ok(render_form(&ctx, "Add School", "/admin/school/add", &form, &conflict_errors(hit)));
    }
    info!("Admin {} added school: {}", admin.email, form.name);
    Ok(ctx.redirect_with(
        FlashLevel::Success,
        format!("School \"{}\" created.", form.name),
        LIST_PATH,
    ))
}

async fn find_school(state: &AppState, id: Uuid) -> Result<Option<School>, EservicesError> {
    state
        .db(move |conn| {
            schools::table
                .find(id)
                .select(School::as_select())
                .first(conn)
                .optional()
                .map_err(EservicesError::from)
        })
        .await
}

pub async fn edit_school_page(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let Some(school) = find_school(&state, id).await? else {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "School not found.", LIST_PATH));
    };
    Ok(render_form(
        &ctx,
        "Edit School",
        &format!("/admin/school/{id}/edit"),
        &SchoolForm::from_school(&school),
        &FormErrors::new(),
    ))
}

pub async fn edit_school(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Form(form): Form<SchoolForm>,
) -> Result<Response, EservicesError> {
    let action = format!("/admin/school/{id}/edit");
    if find_school(&state, id).await?.is_none() {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "School not found.", LIST_PATH));
    }
    let form = form.normalized();
    if let Err(e) = form.validate() {
        return Ok(render_form(&ctx, "Edit School", &action, &form, &FormErrors::from(e)));
    }

    let school = School {
        id,
        name: form.name.clone(),
        school_id_code: form.code(),
    };
    let outcome = state
        .db(move |conn| {
            if let Some(hit) = conflict(conn, &school.name, school.school_id_code.as_deref(), Some(id))? {
                return Ok(Some(hit));
            }
            diesel::update(schools::table.find(id)).set(&school).execute(conn)?;
            Ok(None)
        })
        .await?;

    if let Some(hit) = outcome {
        return Ok(render_form(&ctx, "Edit School", &action, &form, &conflict_errors(hit)));
    }
    info!("Admin {} updated school ID {}", admin.email, id);
    Ok(ctx.redirect_with(
        FlashLevel::Success,
        format!("School \"{}\" updated.", form.name),
        LIST_PATH,
    ))
}

pub async fn delete_school(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let outcome = state
        .db(move |conn| {
            let name: Option<String> = schools::table
                .find(id)
                .select(schools::name)
                .first(conn)
                .optional()?;
            let Some(name) = name else {
                return Ok(None);
            };
            let in_use: i64 = tickets::table
                .filter(tickets::school_id.eq(id))
                .count()
                .get_result(conn)?;
            if in_use == 0 {
                diesel::delete(schools::table.find(id)).execute(conn)?;
            }
            Ok(Some((name, in_use > 0)))
        })
        .await?;

    match outcome {
        None => Ok(ctx.redirect_with(FlashLevel::Danger, "School not found.", LIST_PATH)),
        Some((name, true)) => {
            warn!("Admin {} failed delete school '{}': has tickets.", admin.email, name);
            Ok(ctx.redirect_with(
                FlashLevel::Danger,
                format!("Cannot delete \"{name}\": has tickets."),
                LIST_PATH,
            ))
        }
        Some((name, false)) => {
            info!("Admin {} deleted school: {}", admin.email, name);
            Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("School \"{name}\" deleted."),
                LIST_PATH,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_code_is_null() {
        let form = SchoolForm {
            name: "  Alpha Elementary School ".into(),
            school_id_code: "   ".into(),
        }
        .normalized();
        assert_eq!(form.name, "Alpha Elementary School");
        assert_eq!(form.code(), None);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_code_length_limit() {
        let form = SchoolForm {
            name: "Alpha Elementary School".into(),
            school_id_code: "1".repeat(21),
        };
        let errors = FormErrors::from(form.validate().expect_err("too long"));
        assert!(errors.get("school_id_code").is_some());
    }

    #[test]
    fn test_conflict_messages_target_field() {
        assert!(conflict_errors(Conflict::Name).get("name").is_some());
        assert!(conflict_errors(Conflict::Code).get("school_id_code").is_some());
    }
}
