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
use crate::core::shared::models::{Department, Service};
use crate::core::shared::schema::{canned_responses, departments, services, tickets};
use crate::core::shared::state::AppState;
use crate::security::session::AdminUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

pub const LIST_PATH: &str = "/admin/services";

const INVALID_DEPARTMENT: &str = "Please select a valid department.";

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ServiceForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 200))]
    pub name: String,
    #[serde(default)]
    pub department_id: String,
}

impl ServiceForm {
    /// `0` is the "-- Select Department --" placeholder.
    pub fn department(&self) -> Option<Uuid> {
        Uuid::parse_str(self.department_id.trim()).ok()
    }

    fn from_service(service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            department_id: service.department_id.to_string(),
        }
    }
}

fn render_form(
    ctx: &PageContext,
    title: &str,
    action: &str,
    form: &ServiceForm,
    departments: &[Department],
    errors: &FormErrors,
) -> Response {
    let mut options = vec![("0".to_string(), "-- Select Department --".to_string())];
    options.extend(departments.iter().map(|d| (d.id.to_string(), d.name.clone())));
    let body = format!(
        "<div class=\"card narrow\"><h1>{heading}</h1>\
            <form method=\"post\" action=\"{action}\">{csrf}{name}{department}\
                <button type=\"submit\" class=\"btn\">Save</button> \
                <a class=\"btn btn-secondary\" href=\"{LIST_PATH}\">Cancel</a>\
            </form>\
         </div>",
        heading = html_escape(title),
        csrf = ctx.csrf_input(),
        name = ui::input_field("text", "name", "Service Name", &form.name, true, errors.get("name")),
        department = ui::select_field(
            "department_id",
            "Department",
            &options,
            form.department_id.trim(),
            errors.get("department_id"),
        ),
    );
    ctx.render(title, &body).into_response()
}

fn all_departments(conn: &mut PgConnection) -> Result<Vec<Department>, EservicesError> {
    departments::table
        .order(departments::name.asc())
        .select(Department::as_select())
        .load(conn)
        .map_err(EservicesError::from)
}

fn department_exists(conn: &mut PgConnection, id: Uuid) -> Result<bool, EservicesError> {
    let count: i64 = departments::table.find(id).count().get_result(conn)?;
    Ok(count > 0)
}

fn duplicate_exists(
    conn: &mut PgConnection,
    name: &str,
    department_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<bool, EservicesError> {
    let mut query = services::table
        .filter(services::name.eq(name))
        .filter(services::department_id.eq(department_id))
        .into_boxed();
    if let Some(id) = exclude {
        query = query.filter(services::id.ne(id));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

enum SaveOutcome {
    InvalidDepartment,
    Duplicate,
    Saved,
}

pub async fn list_services(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
) -> Result<Response, EservicesError> {
    let rows: Vec<(Service, String)> = state
        .db(|conn| {
            services::table
                .inner_join(departments::table)
                .order((departments::name.asc(), services::name.asc()))
                .select((Service::as_select(), departments::name))
                .load(conn)
                .map_err(EservicesError::from)
        })
        .await?;

    let table = if rows.is_empty() {
        ui::empty_state("No services yet.")
    } else {
        let body: String = rows
            .iter()
            .map(|(service, department)| {
                format!(
                    "<tr><td>{department}</td><td>{name}</td>\
                     <td><a class=\"btn\" href=\"/admin/service/{id}/edit\">Edit</a> {delete}</td></tr>",
                    department = html_escape(department),
                    name = html_escape(&service.name),
                    id = service.id,
                    delete = ui::post_button(
                        &format!("/admin/service/{}/delete", service.id),
                        &ctx.csrf_token,
                        "Delete",
                        "Delete this service?",
                    ),
                )
            })
            .collect();
        format!(
            "<table><thead><tr><th>Department</th><th>Service</th><th></th></tr></thead><tbody>{body}</tbody></table>"
        )
    };
    let page = format!(
        "<div class=\"card\"><h1>Manage Services</h1>\
         <p><a class=\"btn\" href=\"/admin/service/add\">Add Service</a></p>{table}</div>"
    );
    Ok(ctx.render("Manage Services", &page).into_response())
}

pub async fn add_service_page(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
) -> Result<Response, EservicesError> {
    let departments = state.db(all_departments).await?;
    Ok(render_form(
        &ctx,
        "Add Service",
        "/admin/service/add",
        &ServiceForm::default(),
        &departments,
        &FormErrors::new(),
    ))
}

pub async fn add_service(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Form(mut form): Form<ServiceForm>,
) -> Result<Response, EservicesError> {
    form.name = form.name.trim().to_string();
    let errors = form.validate().map(|_| FormErrors::new()).unwrap_or_else(FormErrors::from);

    if errors.is_empty() {
        let name = form.name.clone();
        let department_id = form.department();
        let outcome = state
            .db(move |conn| {
                let Some(department_id) = department_id else {
                    return Ok(SaveOutcome::InvalidDepartment);
                };
                if !department_exists(conn, department_id)? {
                    return Ok(SaveOutcome::InvalidDepartment);
                }
                if duplicate_exists(conn, &name, department_id, None)? {
                    return Ok(SaveOutcome::Duplicate);
                }
                diesel::insert_into(services::table)
                    .values(&Service {
                        id: Uuid::new_v4(),
                        name,
                        department_id,
                    })
                    .execute(conn)?;
                Ok(SaveOutcome::Saved)
            })
            .await?;

        match outcome {
            SaveOutcome::Saved => {
                info!("Admin {} added service '{}'", admin.email, form.name);
                return Ok(ctx.redirect_with(
                    FlashLevel::Success,
                    format!("Service \"{}\" created.", form.name),
                    LIST_PATH,
                ));
            }
            SaveOutcome::InvalidDepartment => ctx.flash(FlashLevel::Danger, INVALID_DEPARTMENT),
            SaveOutcome::Duplicate => ctx.flash(
                FlashLevel::Danger,
                format!("Service \"{}\" already exists in this department.", form.name),
            ),
        }
    }

    let departments = state.db(all_departments).await?;
    Ok(render_form(&ctx, "Add Service", "/admin/service/add", &form, &departments, &errors))
}

async fn find_service(state: &AppState, id: Uuid) -> Result<Option<Service>, EservicesError> {
    state
        .db(move |conn| {
            services::table
                .find(id)
                .select(Service::as_select())
                .first(conn)
                .optional()
                .map_err(EservicesError::from)
        })
        .await
}

pub async fn edit_service_page(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let Some(service) = find_service(&state, id).await? else {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "Service not found.", LIST_PATH));
    };
    let departments = state.db(all_departments).await?;
    Ok(render_form(
        &ctx,
        "Edit Service",
        &format!("/admin/service/{id}/edit"),
        &ServiceForm::from_service(&service),
        &departments,
        &FormErrors::new(),
    ))
}

pub async fn edit_service(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Form(mut form): Form<ServiceForm>,
) -> Result<Response, EservicesError> {
    let Some(service) = find_service(&state, id).await? else {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "Service not found.", LIST_PATH));
    };
    let action = format!("/admin/service/{id}/edit");
    form.name = form.name.trim().to_string();
    let errors = form.validate().map(|_| FormErrors::new()).unwrap_or_else(FormErrors::from);

    if errors.is_empty() {
        match form.department() {
            None => ctx.flash(FlashLevel::Danger, INVALID_DEPARTMENT),
            Some(department_id) if department_id == service.department_id && form.name == service.name => {
                return Ok(ctx.redirect_with(
                    FlashLevel::Info,
                    "No changes detected for the service.",
                    LIST_PATH,
                ));
            }
            Some(department_id) => {
                let name = form.name.clone();
                let outcome = state
                    .db(move |conn| {
                        if !department_exists(conn, department_id)? {
                            return Ok(SaveOutcome::InvalidDepartment);
                        }
                        if duplicate_exists(conn, &name, department_id, Some(id))? {
                            return Ok(SaveOutcome::Duplicate);
                        }
                        diesel::update(services::table.find(id))
                            .set((
                                services::name.eq(&name),
                                services::department_id.eq(department_id),
                            ))
                            .execute(conn)?;
                        Ok(SaveOutcome::Saved)
                    })
                    .await?;

                match outcome {
                    SaveOutcome::Saved => {
                        info!("Admin {} updated service ID {}", admin.email, id);
                        return Ok(ctx.redirect_with(
                            FlashLevel::Success,
                            format!("Service \"{}\" updated.", form.name),
                            LIST_PATH,
                        ));
                    }
                    SaveOutcome::InvalidDepartment => ctx.flash(FlashLevel::Danger, INVALID_DEPARTMENT),
                    SaveOutcome::Duplicate => ctx.flash(
                        FlashLevel::Danger,
                        format!("Service \"{}\" already exists in this department.", form.name),
                    ),
                }
            }
        }
    }

    let departments = state.db(all_departments).await?;
    Ok(render_form(&ctx, "Edit Service", &action, &form, &departments, &errors))
}

pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let outcome = state
        .db(move |conn| {
            let name: Option<String> = services::table
                .find(id)
                .select(services::name)
                .first(conn)
                .optional()?;
            let Some(name) = name else {
                return Ok(None);
            };
            let ticket_count: i64 = tickets::table
                .filter(tickets::service_id.eq(id))
                .count()
                .get_result(conn)?;
            let canned_count: i64 = canned_responses::table
                .filter(canned_responses::service_id.eq(id))
                .count()
                .get_result(conn)?;
            let blocker = if ticket_count > 0 {
                Some("tickets")
            } else if canned_count > 0 {
                Some("system canned responses")
            } else {
                None
            };
            if blocker.is_none() {
                diesel::delete(services::table.find(id)).execute(conn)?;
            }
            Ok(Some((name, blocker)))
        })
        .await?;

    match outcome {
        None => {
            warn!("Admin {} tried deleting non-existent service ID: {}", admin.email, id);
            Ok(ctx.redirect_with(FlashLevel::Danger, "Service not found.", LIST_PATH))
        }
        Some((name, Some(what))) => {
            warn!("Admin {} failed delete service '{}': has {}.", admin.email, name, what);
            Ok(ctx.redirect_with(
                FlashLevel::Danger,
                format!("Cannot delete \"{name}\": has {what}."),
                LIST_PATH,
            ))
        }
        Some((name, None)) => {
            info!("Admin {} deleted service: {}", admin.email, name);
            Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("Service \"{name}\" deleted."),
                LIST_PATH,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_placeholder_is_not_a_choice() {
        let form = ServiceForm {
            name: "Service Record".into(),
            department_id: "0".into(),
        };
        assert_eq!(form.department(), None);

        let id = Uuid::new_v4();
        let form = ServiceForm {
            name: "Service Record".into(),
            department_id: format!(" {id} "),
        };
        assert_eq!(form.department(), Some(id));
    }
}
