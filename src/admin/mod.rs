//! Admin-only management pages and the staff polling endpoint.

pub mod authorized_emails;
pub mod departments;
pub mod schools;
pub mod services;
pub mod tickets;
pub mod users;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::security::session::AdminUser;
use crate::web::page::PageContext;

pub const ADMIN_DASHBOARD_PATH: &str = "/admin/dashboard";

const ADMIN_LINKS: [(&str, &str, &str); 7] = [
    ("/admin/staff-dashboard", "Ticket Dashboard", "Filter, summarize and export tickets."),
    ("/admin/users", "Users", "Edit roles and the services staff manage."),
    ("/admin/authorized-emails", "Authorized Emails", "Who may self-register."),
    ("/admin/departments", "Departments", "Offices that receive requests."),
    ("/admin/services", "Services", "Request types per department."),
    ("/admin/schools", "Schools", "Schools and offices requesters belong to."),
    ("/admin/canned-responses", "Canned Responses", "Shared replies per department or service."),
];

pub async fn admin_dashboard(AdminUser(_admin): AdminUser, ctx: PageContext) -> Response {
    let cards: String = ADMIN_LINKS
        .iter()
        .map(|(href, title, blurb)| {
            format!(
                "<div class=\"card\"><h2><a href=\"{href}\">{title}</a></h2><p class=\"muted\">{blurb}</p></div>"
            )
        })
        .collect();
    let body = format!("<h1>Admin Dashboard</h1>{cards}");
    ctx.render("Admin Dashboard", &body).into_response()
}

pub fn configure_admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ADMIN_DASHBOARD_PATH, get(admin_dashboard))
        .route("/admin/users", get(users::list_users))
        .route(
            "/admin/user/:id/edit",
            get(users::edit_user_page).post(users::edit_user),
        )
        .route("/admin/user/:id/delete", post(users::delete_user))
        .route(
            authorized_emails::LIST_PATH,
            get(authorized_emails::list_emails).post(authorized_emails::submit_emails),
        )
        .route(
            "/admin/authorized-emails/bulk",
            post(authorized_emails::bulk_upload),
        )
        .route(
            "/admin/authorized-emails/:id/delete",
            post(authorized_emails::delete_email),
        )
        .route(departments::LIST_PATH, get(departments::list_departments))
        .route(
            "/admin/department/add",
            get(departments::add_department_page).post(departments::add_department),
        )
        .route(
            "/admin/department/:id/edit",
            get(departments::edit_department_page).post(departments::edit_department),
        )
        .route(
            "/admin/department/:id/delete",
            post(departments::delete_department),
        )
        .route(services::LIST_PATH, get(services::list_services))
        .route(
            "/admin/service/add",
            get(services::add_service_page).post(services::add_service),
        )
        .route(
            "/admin/service/:id/edit",
            get(services::edit_service_page).post(services::edit_service),
        )
        .route("/admin/service/:id/delete", post(services::delete_service))
        .route(schools::LIST_PATH, get(schools::list_schools))
        .route(
            "/admin/school/add",
            get(schools::add_school_page).post(schools::add_school),
        )
        .route(
            "/admin/school/:id/edit",
            get(schools::edit_school_page).post(schools::edit_school),
        )
        .route("/admin/school/:id/delete", post(schools::delete_school))
        .route(
            crate::dashboards::ui::EXPORT_PATH,
            get(tickets::export_tickets),
        )
        .route("/admin/ticket/:id/delete", post(tickets::delete_ticket))
        .route(
            crate::dashboards::ui::CHECK_NEW_PATH,
            get(tickets::check_new_tickets),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_links_point_at_admin_pages() {
        for (href, _, _) in ADMIN_LINKS {
            assert!(href.starts_with("/admin/"), "{href}");
        }
    }
}
