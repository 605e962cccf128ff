use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Form,
};
use diesel::prelude::*;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::core::error::EservicesError;
use crate::core::shared::models::{Department, Service, User, UserService};
use crate::core::shared::schema::{departments, services, user_services, users};
use crate::core::shared::state::AppState;
use crate::core::shared::{html_escape, Role};
use crate::security::session::AdminUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::PageContext;
use crate::web::ui;

const LIST_PATH: &str = "/admin/users";

fn validate_role(role: &str) -> Result<(), ValidationError> {
    Role::from_str(role)
        .map(|_| ())
        .map_err(|_| ValidationError::new("role").with_message("Not a valid choice.".into()))
}

#[derive(Debug, Clone, Default, Validate)]
pub struct EditUserForm {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[validate(custom(function = "validate_role"))]
    pub role: String,
    pub managed_services: Vec<Uuid>,
}

impl EditUserForm {
    /// Checkbox lists repeat `managed_services`, so the body arrives as pairs.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "name" => form.name = value.trim().to_string(),
                "email" => form.email = value.trim().to_lowercase(),
                "role" => form.role = value.trim().to_string(),
                "managed_services" => {
                    if let Ok(id) = Uuid::parse_str(value.trim()) {
                        if !form.managed_services.contains(&id) {
                            form.managed_services.push(id);
                        }
                    }
                }
                _ => {}
            }
        }
        form
    }

    fn from_user(user: &User, managed: Vec<Uuid>) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            managed_services: managed,
        }
    }
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
) -> Result<Response, EservicesError> {
    let users = state
        .db(|conn| {
            users::table
                .order(users::name.asc())
                .select(User::as_select())
                .load(conn)
                .map_err(EservicesError::from)
        })
        .await?;

    let rows: String = users
        .iter()
        .map(|user| {
            let delete = if user.id == admin.id {
                String::new()
            } else {
                ui::post_button(
                    &format!("/admin/user/{}/delete", user.id),
                    &ctx.csrf_token,
                    "Delete",
                    "Delete this user?",
                )
            };
            format!(
                "<tr><td>{name}</td><td>{email}</td><td>{role}</td>\
                 <td><a class=\"btn\" href=\"/admin/user/{id}/edit\">Edit</a> {delete}</td></tr>",
                name = html_escape(&user.name),
                email = html_escape(&user.email),
                role = user.role,
                id = user.id,
            )
        })
        .collect();
    let body = format!(
        "<div class=\"card\"><h1>Manage Users</h1>\
         <table><thead><tr><th>Name</th><th>Email</th><th>Role</th><th></th></tr></thead>\
         <tbody>{rows}</tbody></table></div>"
    );
    Ok(ctx.render("Manage Users", &body).into_response())
}

fn load_user(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>, EservicesError> {
    users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(EservicesError::from)
}

fn service_catalog(conn: &mut PgConnection) -> Result<Vec<(Department, Vec<Service>)>, EservicesError> {
    let departments = departments::table
        .order(departments::name.asc())
        .select(Department::as_select())
        .load(conn)?;
    let services = services::table
        .order(services::name.asc())
        .select(Service::as_select())
        .load(conn)?;
    Ok(departments
        .into_iter()
        .map(|d| {
            let owned = services
                .iter()
                .filter(|s| s.department_id == d.id)
                .cloned()
                .collect();
            (d, owned)
        })
        .collect())
}

fn render_form(
    ctx: &PageContext,
    user: &User,
    form: &EditUserForm,
    catalog: &[(Department, Vec<Service>)],
    errors: &FormErrors,
) -> Response {
    let selected: HashSet<&Uuid> = form.managed_services.iter().collect();
    let role_options: Vec<(String, String)> = Role::ALL
        .iter()
        .map(|r| (r.as_str().to_string(), r.as_str().to_string()))
        .collect();
    let services: String = catalog
        .iter()
        .filter(|(_, services)| !services.is_empty())
        .map(|(department, services)| {
            let boxes: String = services
                .iter()
                .map(|s| {
                    ui::checkbox_field(
                        "managed_services",
                        &s.name,
                        &s.id.to_string(),
                        selected.contains(&s.id),
                    )
                })
                .collect();
            format!(
                "<fieldset><legend>{}</legend>{boxes}</fieldset>",
                html_escape(&department.name)
            )
        })
        .collect();

    let body = format!(
        "<div class=\"card\"><h1>Edit User</h1>\
            <form method=\"post\" action=\"/admin/user/{id}/edit\">{csrf}{name}{email}{role}\
                <h2>Managed Services</h2>{services}\
                <button type=\"submit\" class=\"btn\">Save</button> \
                <a class=\"btn btn-secondary\" href=\"{LIST_PATH}\">Cancel</a>\
            </form>\
         </div>",
        id = user.id,
        csrf = ctx.csrf_input(),
        name = ui::input_field("text", "name", "Name", &form.name, true, errors.get("name")),
        email = ui::input_field("email", "email", "Email", &form.email, true, errors.get("email")),
        role = ui::select_field("role", "Role", &role_options, &form.role, errors.get("role")),
    );
    ctx.render("Edit User", &body).into_response()
}

pub async fn edit_user_page(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let loaded = state
        .db(move |conn| {
            let Some(user) = load_user(conn, id)? else {
                return Ok(None);
            };
            let managed = user_services::table
                .filter(user_services::user_id.eq(id))
                .select(user_services::service_id)
                .load::<Uuid>(conn)?;
            Ok(Some((user, managed, service_catalog(conn)?)))
        })
        .await?;

    let Some((user, managed, catalog)) = loaded else {
        warn!("Admin {} tried editing non-existent user ID: {}", admin.email, id);
        return Ok(ctx.redirect_with(FlashLevel::Danger, "User not found.", LIST_PATH));
    };
    let form = EditUserForm::from_user(&user, managed);
    Ok(render_form(&ctx, &user, &form, &catalog, &FormErrors::new()))
}

enum EditOutcome {
    Missing,
    EmailTaken(User),
    Saved(String),
}

pub async fn edit_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, EservicesError> {
    let form = EditUserForm::from_pairs(&pairs);

    if let Err(e) = form.validate() {
        let loaded = state
            .db(move |conn| match load_user(conn, id)? {
                Some(user) => Ok(Some((user, service_catalog(conn)?))),
                None => Ok(None),
            })
            .await?;
        return match loaded {
            Some((user, catalog)) => Ok(render_form(&ctx, &user, &form, &catalog, &FormErrors::from(e))),
            None => Ok(ctx.redirect_with(FlashLevel::Danger, "User not found.", LIST_PATH)),
        };
    }

    let update = form.clone();
    let outcome = state
        .db(move |conn| {
            conn.transaction(|conn| {
                let Some(user) = load_user(conn, id)? else {
                    return Ok(EditOutcome::Missing);
                };
                if user.email != update.email {
                    let taken: i64 = users::table
                        .filter(users::email.eq(&update.email))
                        .filter(users::id.ne(id))
                        .count()
                        .get_result(conn)?;
                    if taken > 0 {
                        return Ok(EditOutcome::EmailTaken(user));
                    }
                }

                let role = Role::from_str(&update.role).unwrap_or(user.role);
                diesel::update(users::table.find(id))
                    .set((
                        users::name.eq(&update.name),
                        users::email.eq(&update.email),
                        users::role.eq(role),
                    ))
                    .execute(conn)?;

                diesel::delete(user_services::table.filter(user_services::user_id.eq(id)))
                    .execute(conn)?;
                let valid: Vec<Uuid> = if update.managed_services.is_empty() {
                    Vec::new()
                } else {
                    services::table
                        .filter(services::id.eq_any(update.managed_services.clone()))
                        .select(services::id)
                        .load(conn)?
                };
                let links: Vec<UserService> = valid
                    .into_iter()
                    .map(|service_id| UserService {
                        user_id: id,
                        service_id,
                    })
                    .collect();
                if !links.is_empty() {
                    diesel::insert_into(user_services::table)
                        .values(&links)
                        .execute(conn)?;
                }
                Ok(EditOutcome::Saved(update.name.clone()))
            })
        })
        .await?;

    match outcome {
        EditOutcome::Missing => {
            warn!("Admin {} tried editing non-existent user ID: {}", admin.email, id);
            Ok(ctx.redirect_with(FlashLevel::Danger, "User not found.", LIST_PATH))
        }
        EditOutcome::EmailTaken(user) => {
            ctx.flash(FlashLevel::Danger, "That email address is already registered.");
            let catalog = state.db(service_catalog).await?;
            Ok(render_form(&ctx, &user, &form, &catalog, &FormErrors::new()))
        }
        EditOutcome::Saved(name) => {
            info!("Admin {} updated user profile for {}", admin.email, form.email);
            Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("User {name} updated successfully!"),
                LIST_PATH,
            ))
        }
    }
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    if id == admin.id {
        warn!("Admin {} tried deleting own account.", admin.email);
        return Ok(ctx.redirect_with(
            FlashLevel::Danger,
            "You cannot delete your own account.",
            LIST_PATH,
        ));
    }

    let deleted = state
        .db(move |conn| {
            let Some(user) = load_user(conn, id)? else {
                return Ok(None);
            };
            diesel::delete(users::table.find(id)).execute(conn)?;
            Ok(Some(user))
        })
        .await?;

    match deleted {
        Some(user) => {
            info!("Admin {} deleted user {}", admin.email, user.email);
            Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("User {} deleted.", user.name),
                LIST_PATH,
            ))
        }
        None => {
            warn!("Admin {} tried deleting non-existent user ID: {}", admin.email, id);
            Ok(ctx.redirect_with(FlashLevel::Danger, "User not found.", LIST_PATH))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_form_collects_repeated_services() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let form = EditUserForm::from_pairs(&pairs(&[
            ("csrf_token", "t"),
            ("name", " Maria Santos "),
            ("email", "Maria.Santos@DepEd.gov.ph"),
            ("role", "Staff"),
            ("managed_services", &first.to_string()),
            ("managed_services", "not-a-uuid"),
            ("managed_services", &second.to_string()),
            ("managed_services", &first.to_string()),
        ]));
        assert_eq!(form.name, "Maria Santos");
        assert_eq!(form.email, "maria.santos@deped.gov.ph");
        assert_eq!(form.managed_services, vec![first, second]);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_form_rejects_unknown_role() {
        let form = EditUserForm::from_pairs(&pairs(&[
            ("name", "Maria Santos"),
            ("email", "maria@deped.gov.ph"),
            ("role", "Superuser"),
        ]));
        let errors = FormErrors::from(form.validate().expect_err("role"));
        assert_eq!(errors.get("role"), Some("Not a valid choice."));
    }
}
