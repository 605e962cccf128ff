use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Form, Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{parse_service_choice, GENERAL_SERVICE_LABEL};
use crate::core::error::EservicesError;
use crate::core::shared::models::{CannedResponse, Department, Service};
use crate::core::shared::schema::{canned_responses, departments, services};
use crate::core::shared::html_escape;
use crate::core::shared::state::AppState;
use crate::security::session::AdminUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

const LIST_PATH: &str = "/admin/canned-responses";

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CannedResponseForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 100))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub body: String,
    #[serde(default)]
    pub department_id: String,
    #[serde(default)]
    pub service_id: String,
}

impl CannedResponseForm {
    fn from_existing(response: &CannedResponse) -> Self {
        Self {
            title: response.title.clone(),
            body: response.body.clone(),
            department_id: response.department_id.to_string(),
            service_id: response
                .service_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "0".to_string()),
        }
    }

    fn department(&self) -> Option<Uuid> {
        Uuid::parse_str(self.department_id.trim()).ok()
    }
}

struct FormChoices {
    departments: Vec<Department>,
    services: Vec<Service>,
}

fn load_choices(conn: &mut PgConnection, department_id: Option<Uuid>) -> Result<FormChoices, EservicesError> {
    let departments = departments::table
        .order(departments::name.asc())
        .select(Department::as_select())
        .load(conn)?;
    let services = match department_id {
        Some(id) => services::table
            .filter(services::department_id.eq(id))
            .order(services::name.asc())
            .select(Service::as_select())
            .load(conn)?,
        None => Vec::new(),
    };
    Ok(FormChoices {
        departments,
        services,
    })
}

fn render_form(
    ctx: &PageContext,
    title: &str,
    action: &str,
    form: &CannedResponseForm,
    choices: &FormChoices,
    errors: &FormErrors,
) -> Response {
    let mut department_options = vec![("0".to_string(), "-- Select Department --".to_string())];
    department_options.extend(
        choices
            .departments
            .iter()
            .map(|d| (d.id.to_string(), d.name.clone())),
    );
    let mut service_options = vec![("0".to_string(), GENERAL_SERVICE_LABEL.to_string())];
    service_options.extend(
        choices
            .services
            .iter()
            .map(|s| (s.id.to_string(), s.name.clone())),
    );

    let body = format!(
        "<div class=\"card\">\
            <h1>{heading}</h1>\
            <form method=\"post\" action=\"{action}\">\
                {csrf}{title}{department}{service}{body}\
                <button type=\"submit\" class=\"btn\">Save</button> \
                <a class=\"btn btn-secondary\" href=\"{LIST_PATH}\">Cancel</a>\
            </form>\
        </div>\
        <script>\
        document.getElementById('department_id').addEventListener('change', function () {{\
            var target = document.getElementById('service_id');\
            fetch('/admin/_get_services_for_department/' + this.value)\
                .then(function (r) {{ return r.json(); }})\
                .then(function (items) {{\
                    target.innerHTML = '';\
                    items.forEach(function (s) {{\
                        var o = document.createElement('option');\
                        o.value = s.id; o.textContent = s.name; target.appendChild(o);\
                    }});\
                }});\
        }});\
        </script>",
        heading = html_escape(title),
        csrf = ctx.csrf_input(),
        title = ui::input_field("text", "title", "Title", &form.title, true, errors.get("title")),
        department = ui::select_field(
            "department_id",
            "Department",
            &department_options,
            form.department_id.trim(),
            errors.get("department_id"),
        ),
        service = ui::select_field(
            "service_id",
            "Service (optional)",
            &service_options,
            form.service_id.trim(),
            None,
        ),
        body = ui::textarea_field("body", "Response Body", &form.body, true, errors.get("body")),
    );
    ctx.render(title, &body).into_response()
}

pub async fn list_canned_responses(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
) -> Result<Response, EservicesError> {
    let (responses, department_names, service_names) = state
        .db(|conn| {
            let responses = canned_responses::table
                .select(CannedResponse::as_select())
                .load(conn)?;
            let department_names: HashMap<Uuid, String> = departments::table
                .select((departments::id, departments::name))
                .load::<(Uuid, String)>(conn)?
                .into_iter()
                .collect();
            let service_names: HashMap<Uuid, String> = services::table
                .select((services::id, services::name))
                .load::<(Uuid, String)>(conn)?
                .into_iter()
                .collect();
            Ok((responses, department_names, service_names))
        })
        .await?;

    let department_of = |r: &CannedResponse| {
        department_names
            .get(&r.department_id)
            .cloned()
            .unwrap_or_default()
    };
    let mut rows: Vec<(String, &CannedResponse)> =
        responses.iter().map(|r| (department_of(r), r)).collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.title.cmp(&b.1.title)));

    let table = if rows.is_empty() {
        ui::empty_state("No canned responses yet.")
    } else {
        let body: String = rows
            .iter()
            .map(|(department, r)| {
                let service = r
                    .service_id
                    .and_then(|id| service_names.get(&id))
                    .map(|s| html_escape(s))
                    .unwrap_or_else(|| "<em>General</em>".to_string());
                format!(
                    "<tr><td>{department}</td><td>{service}</td><td>{title}</td>\
                     <td><a class=\"btn\" href=\"/admin/canned-response/{id}/edit\">Edit</a> {delete}</td></tr>",
                    department = html_escape(department),
                    title = html_escape(&r.title),
                    id = r.id,
                    delete = ui::post_button(
                        &format!("/admin/canned-response/{}/delete", r.id),
                        &ctx.csrf_token,
                        "Delete",
                        "Delete this canned response?",
                    ),
                )
            })
            .collect();
        format!(
            "<table><thead><tr><th>Department</th><th>Service</th><th>Title</th><th></th></tr></thead>\
             <tbody>{body}</tbody></table>"
        )
    };

    let page = format!(
        "<div class=\"card\"><h1>Manage Canned Responses</h1>\
         <p><a class=\"btn\" href=\"/admin/canned-response/add\">Add Canned Response</a></p>{table}</div>"
    );
    Ok(ctx.render("Manage Canned Responses", &page).into_response())
}

pub async fn add_canned_response_page(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
) -> Result<Response, EservicesError> {
    let choices = state.db(|conn| load_choices(conn, None)).await?;
    Ok(render_form(
        &ctx,
        "Add Canned Response",
        "/admin/canned-response/add",
        &CannedResponseForm::default(),
        &choices,
        &FormErrors::new(),
    ))
}

pub async fn add_canned_response(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Form(form): Form<CannedResponseForm>,
) -> Result<Response, EservicesError> {
    let department_id = form.department();
    let mut errors = form.validate().map(|_| FormErrors::new()).unwrap_or_else(FormErrors::from);

    if errors.is_empty() {
        match department_id {
            None => ctx.flash(FlashLevel::Danger, "Please select a valid department."),
            Some(department_id) => {
                let service_id = parse_service_choice(&form.service_id);
                let title = form.title.trim().to_string();
                let body = form.body.clone();
                let created = state
                    .db(move |conn| {
                        let duplicate = duplicate_exists(conn, &title, department_id, service_id, None)?;
                        if duplicate {
                            return Ok(None);
                        }
                        let response = CannedResponse {
                            id: Uuid::new_v4(),
                            title,
                            body,
                            department_id,
                            service_id,
                        };
                        diesel::insert_into(canned_responses::table)
                            .values(&response)
                            .execute(conn)?;
                        Ok(Some(response))
                    })
                    .await?;

                match created {
                    Some(response) => {
                        info!("Admin {} added canned response: '{}'", admin.email, response.title);
                        return Ok(ctx.redirect_with(
                            FlashLevel::Success,
                            format!("Canned response \"{}\" created.", response.title),
                            LIST_PATH,
                        ));
                    }
                    None => ctx.flash(
                        FlashLevel::Warning,
                        "A canned response with this title already exists for this department/service.",
                    ),
                }
            }
        }
    } else if department_id.is_none() {
        errors.insert("department_id", "Please select a department.");
    }

    let choices = state.db(move |conn| load_choices(conn, department_id)).await?;
    Ok(render_form(
        &ctx,
        "Add Canned Response",
        "/admin/canned-response/add",
        &form,
        &choices,
        &errors,
    ))
}

fn duplicate_exists(
    conn: &mut PgConnection,
    title: &str,
    department_id: Uuid,
    service_id: Option<Uuid>,
    exclude: Option<Uuid>,
) -> Result<bool, EservicesError> {
    let mut query = canned_responses::table
        .filter(canned_responses::title.eq(title))
        .filter(canned_responses::department_id.eq(department_id))
        .into_boxed();
    query = match service_id {
        Some(id) => query.filter(canned_responses::service_id.eq(id)),
        None => query.filter(canned_responses::service_id.is_null()),
    };
    if let Some(exclude) = exclude {
        query = query.filter(canned_responses::id.ne(exclude));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

async fn find_response(state: &AppState, id: Uuid) -> Result<Option<CannedResponse>, EservicesError> {
    state
        .db(move |conn| {
            canned_responses::table
                .find(id)
                .select(CannedResponse::as_select())
                .first(conn)
                .optional()
                .map_err(EservicesError::from)
        })
        .await
}

pub async fn edit_canned_response_page(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let Some(response) = find_response(&state, id).await? else {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "Canned response not found.", LIST_PATH));
    };
    let department_id = response.department_id;
    let choices = state
        .db(move |conn| load_choices(conn, Some(department_id)))
        .await?;
    Ok(render_form(
        &ctx,
        "Edit Canned Response",
        &format!("/admin/canned-response/{id}/edit"),
        &CannedResponseForm::from_existing(&response),
        &choices,
        &FormErrors::new(),
    ))
}

pub async fn edit_canned_response(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Form(form): Form<CannedResponseForm>,
) -> Result<Response, EservicesError> {
    let Some(existing) = find_response(&state, id).await? else {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "Canned response not found.", LIST_PATH));
    };
    let action = format!("/admin/canned-response/{id}/edit");
    let department_id = form.department();
    let errors = form.validate().map(|_| FormErrors::new()).unwrap_or_else(FormErrors::from);

    if errors.is_empty() {
        match department_id {
            None => ctx.flash(FlashLevel::Danger, "Please select a valid department."),
            Some(department_id) => {
                let updated = CannedResponse {
                    id,
                    title: form.title.trim().to_string(),
                    body: form.body.clone(),
                    department_id,
                    service_id: parse_service_choice(&form.service_id),
                };

                let key_changed = existing.title != updated.title
                    || existing.department_id != updated.department_id
                    || existing.service_id != updated.service_id;
                if !key_changed && existing.body == updated.body {
                    return Ok(ctx.redirect_with(
                        FlashLevel::Info,
                        "No changes detected for the canned response.",
                        LIST_PATH,
                    ));
                }

                let title = updated.title.clone();
                let saved = state
                    .db(move |conn| {
                        if key_changed
                            && duplicate_exists(
                                conn,
                                &updated.title,
                                updated.department_id,
                                updated.service_id,
                                Some(updated.id),
                            )?
                        {
                            return Ok(false);
                        }
                        diesel::update(canned_responses::table.find(updated.id))
                            .set(&updated)
                            .execute(conn)?;
                        Ok(true)
                    })
                    .await?;

                if saved {
                    info!("Admin {} updated canned response ID {}", admin.email, id);
                    return Ok(ctx.redirect_with(
                        FlashLevel::Success,
                        format!("Canned response \"{title}\" updated."),
                        LIST_PATH,
                    ));
                }
                ctx.flash(
                    FlashLevel::Warning,
                    "Another canned response with this title already exists for this department/service.",
                );
            }
        }
    }

    let choices = state
        .db(move |conn| load_choices(conn, department_id))
        .await?;
    Ok(render_form(&ctx, "Edit Canned Response", &action, &form, &choices, &errors))
}

pub async fn delete_canned_response(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let deleted = state
        .db(move |conn| {
            let title: Option<String> = canned_responses::table
                .find(id)
                .select(canned_responses::title)
                .first(conn)
                .optional()?;
            if title.is_some() {
                diesel::delete(canned_responses::table.find(id)).execute(conn)?;
            }
            Ok(title)
        })
        .await?;

    match deleted {
        Some(title) => {
            info!("Admin {} deleted canned response: '{}'", admin.email, title);
            Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("Canned response \"{title}\" deleted."),
                LIST_PATH,
            ))
        }
        None => {
            warn!(
                "Admin {} tried deleting non-existent canned response ID: {}",
                admin.email, id
            );
            Ok(ctx.redirect_with(FlashLevel::Danger, "Canned response not found.", LIST_PATH))
        }
    }
}

/// Options for the service dropdown, led by the department-wide choice.
pub fn service_options_json(services: &[Service]) -> Value {
    let mut items = vec![json!({ "id": "0", "name": GENERAL_SERVICE_LABEL })];
    items.extend(
        services
            .iter()
            .map(|s| json!({ "id": s.id.to_string(), "name": s.name })),
    );
    Value::Array(items)
}

pub async fn services_for_department(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, EservicesError> {
    let Ok(department_id) = Uuid::parse_str(raw_id.trim()) else {
        return Ok(Json(Value::Array(Vec::new())));
    };
    let services = state
        .db(move |conn| {
            services::table
                .filter(services::department_id.eq(department_id))
                .order(services::name.asc())
                .select(Service::as_select())
                .load(conn)
                .map_err(EservicesError::from)
        })
        .await?;
    Ok(Json(service_options_json(&services)))
}

pub async fn services_for_no_department(AdminUser(_admin): AdminUser) -> Json<Value> {
    Json(Value::Array(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_options_lead_with_general() {
        let dept = Uuid::new_v4();
        let services = vec![Service {
            id: Uuid::new_v4(),
            name: "Service Record".into(),
            department_id: dept,
        }];
        let json = service_options_json(&services);
        assert_eq!(json[0]["id"], "0");
        assert_eq!(json[0]["name"], GENERAL_SERVICE_LABEL);
        assert_eq!(json[1]["name"], "Service Record");
        assert_eq!(json.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_form_validation() {
        let form = CannedResponseForm {
            title: "A".into(),
            body: String::new(),
            ..Default::default()
        };
        let errors = FormErrors::from(form.validate().expect_err("invalid"));
        assert!(errors.get("title").is_some());
        assert_eq!(errors.get("body"), Some("This field is required."));
    }
}
