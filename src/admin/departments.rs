use axum::{
    extract::{Path, State},
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
use crate::core::shared::html_escape;
use crate::core::shared::models::Department;
use crate::core::shared::schema::{canned_responses, departments, services, tickets};
use crate::core::shared::state::AppState;
use crate::security::session::AdminUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

pub const LIST_PATH: &str = "/admin/departments";

pub const NAME_TAKEN: &str = "That department name already exists.";

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DepartmentForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 100))]
    pub name: String,
}

/// What still points at a department, checked in this order before delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepartmentUsage {
    pub services: i64,
    pub tickets: i64,
    pub canned_responses: i64,
}

impl DepartmentUsage {
    pub fn blocker(&self) -> Option<&'static str> {
        if self.services > 0 {
            Some("services")
        } else if self.tickets > 0 {
            Some("tickets")
        } else if self.canned_responses > 0 {
            Some("canned responses")
        } else {
            None
        }
    }
}

fn render_form(ctx: &PageContext, title: &str, action: &str, form: &DepartmentForm, errors: &FormErrors) -> Response {
    let body = format!(
        "<div class=\"card narrow\"><h1>{heading}</h1>\
            <form method=\"post\" action=\"{action}\">{csrf}{name}\
                <button type=\"submit\" class=\"btn\">Save</button> \
                <a class=\"btn btn-secondary\" href=\"{LIST_PATH}\">Cancel</a>\
            </form>\
         </div>",
        heading = html_escape(title),
        csrf = ctx.csrf_input(),
        name = ui::input_field("text", "name", "Department Name", &form.name, true, errors.get("name")),
    );
    ctx.render(title, &body).into_response()
}

fn name_taken(conn: &mut PgConnection, name: &str, exclude: Option<Uuid>) -> Result<bool, EservicesError> {
    let mut query = departments::table
        .filter(departments::name.eq(name))
        .into_boxed();
    if let Some(id) = exclude {
        query = query.filter(departments::id.ne(id));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

pub async fn list_departments(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
) -> Result<Response, EservicesError> {
    let departments = state
        .db(|conn| {
            departments::table
                .order(departments::name.asc())
                .select(Department::as_select())
                .load(conn)
                .map_err(EservicesError::from)
        })
        .await?;

    let table = if departments.is_empty() {
        ui::empty_state("No departments yet.")
    } else {
        let rows: String = departments
            .iter()
            .map(|d| {
                format!(
                    "<tr><td>{name}</td><td><a class=\"btn\" href=\"/admin/department/{id}/edit\">Edit</a> {delete}</td></tr>",
                    name = html_escape(&d.name),
                    id = d.id,
                    delete = ui::post_button(
                        &format!("/admin/department/{}/delete", d.id),
                        &ctx.csrf_token,
                        "Delete",
                        "Delete this department?",
                    ),
                )
            })
            .collect();
        format!("<table><thead><tr><th>Name</th><th></th></tr></thead><tbody>{rows}</tbody></table>")
    };
    let body = format!(
        "<div class=\"card\"><h1>Manage Departments</h1>\
         <p><a class=\"btn\" href=\"/admin/department/add\">Add Department</a></p>{table}</div>"
    );
    Ok(ctx.render("Manage Departments", &body).into_response())
}

pub async fn add_department_page(AdminUser(_admin): AdminUser, ctx: PageContext) -> Response {
    render_form(
        &ctx,
        "Add Department",
        "/admin/department/add",
        &DepartmentForm::default(),
        &FormErrors::new(),
    )
}

pub async fn add_department(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Form(mut form): Form<DepartmentForm>,
) -> Result<Response, EservicesError> {
    form.name = form.name.trim().to_string();
    if let Err(e) = form.validate() {
        return Ok(render_form(&ctx, "Add Department", "/admin/department/add", &form, &FormErrors::from(e)));
    }

    let name = form.name.clone();
    let created = state
        .db(move |conn| {
            if name_taken(conn, &name, None)? {
                return Ok(false);
            }
            diesel::insert_into(departments::table)
                .values(&Department {
                    id: Uuid::new_v4(),
                    name,
                })
                .execute(conn)?;
            Ok(true)
        })
        .await?;

    if !created {
        let mut errors = FormErrors::new();
        errors.insert("name", NAME_TAKEN);
        return Ok(render_form(&ctx, "Add Department", "/admin/department/add", &form, &errors));
    }
    info!("Admin {} added department: {}", admin.email, form.name);
    Ok(ctx.redirect_with(
        FlashLevel::Success,
        format!("Department \"{}\" created.", form.name),
        LIST_PATH,
    ))
}

async fn find_department(state: &AppState, id: Uuid) -> Result<Option<Department>, EservicesError> {
    state
        .db(move |conn| {
            departments::table
                .find(id)
                .select(Department::as_select())
                .first(conn)
                .optional()
                .map_err(EservicesError::from)
        })
        .await
}

pub async fn edit_department_page(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let Some(department) = find_department(&state, id).await? else {
        warn!("Admin {} tried editing non-existent dept ID: {}", admin.email, id);
        return Ok(ctx.redirect_with(FlashLevel::Danger, "Department not found.", LIST_PATH));
    };
    let form = DepartmentForm {
        name: department.name,
    };
    Ok(render_form(
        &ctx,
        "Edit Department",
        &format!("/admin/department/{id}/edit"),
        &form,
        &FormErrors::new(),
    ))
}

pub async fn edit_department(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Form(mut form): Form<DepartmentForm>,
) -> Result<Response, EservicesError> {
    let action = format!("/admin/department/{id}/edit");
    let Some(department) = find_department(&state, id).await? else {
        warn!("Admin {} tried editing non-existent dept ID: {}", admin.email, id);
        return Ok(ctx.redirect_with(FlashLevel::Danger, "Department not found.", LIST_PATH));
    };

    form.name = form.name.trim().to_string();
    if let Err(e) = form.validate() {
        return Ok(render_form(&ctx, "Edit Department", &action, &form, &FormErrors::from(e)));
    }

    let name = form.name.clone();
    let renamed = name != department.name;
    let saved = state
        .db(move |conn| {
            if renamed && name_taken(conn, &name, Some(id))? {
                return Ok(false);
            }
            diesel::update(departments::table.find(id))
                .set(departments::name.eq(&name))
                .execute(conn)?;
            Ok(true)
        })
        .await?;

    if !saved {
        ctx.flash(FlashLevel::Danger, NAME_TAKEN);
        return Ok(render_form(&ctx, "Edit Department", &action, &form, &FormErrors::new()));
    }
    info!("Admin {} updated dept {} name to '{}'", admin.email, id, form.name);
    Ok(ctx.redirect_with(
        FlashLevel::Success,
        format!("Department updated to \"{}\".", form.name),
        LIST_PATH,
    ))
}

pub async fn delete_department(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let outcome = state
        .db(move |conn| {
            let name: Option<String> = departments::table
                .find(id)
                .select(departments::name)
                .first(conn)
                .optional()?;
            let Some(name) = name else {
                return Ok(None);
            };
            let usage = DepartmentUsage {
                services: services::table
                    .filter(services::department_id.eq(id))
                    .count()
                    .get_result(conn)?,
                tickets: tickets::table
                    .filter(tickets::department_id.eq(id))
                    .count()
                    .get_result(conn)?,
                canned_responses: canned_responses::table
                    .filter(canned_responses::department_id.eq(id))
                    .count()
                    .get_result(conn)?,
            };
            if usage.blocker().is_none() {
                diesel::delete(departments::table.find(id)).execute(conn)?;
            }
            Ok(Some((name, usage)))
        })
        .await?;

    match outcome {
        None => {
            warn!("Admin {} tried deleting non-existent dept ID: {}", admin.email, id);
            Ok(ctx.redirect_with(FlashLevel::Danger, "Department not found.", LIST_PATH))
        }
        Some((name, usage)) => match usage.blocker() {
            Some(what) => {
                warn!("Admin {} failed delete dept '{}': has {}.", admin.email, name, what);
                Ok(ctx.redirect_with(
                    FlashLevel::Danger,
                    format!("Cannot delete \"{name}\": has {what}."),
                    LIST_PATH,
                ))
            }
            None => {
                info!("Admin {} deleted department: {}", admin.email, name);
                Ok(ctx.redirect_with(
                    FlashLevel::Success,
                    format!("Department \"{name}\" deleted."),
                    LIST_PATH,
                ))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_blockers_in_order() {
        let usage = DepartmentUsage {
            services: 2,
            tickets: 5,
            canned_responses: 1,
        };
        assert_eq!(usage.blocker(), Some("services"));

        let usage = DepartmentUsage {
            services: 0,
            tickets: 0,
            canned_responses: 1,
        };
        assert_eq!(usage.blocker(), Some("canned responses"));
        assert_eq!(DepartmentUsage::default().blocker(), None);
    }

    #[test]
    fn test_department_name_length() {
        let form = DepartmentForm { name: "X".into() };
        assert!(form.validate().is_err());
        let form = DepartmentForm { name: "ICT".into() };
        assert!(form.validate().is_ok());
    }
}
