//! Canned responses: admin-managed replies scoped to a department or a single
//! service, and each staff member's personal snippets.

pub mod personal;
pub mod system;

use axum::{
    routing::{get, post},
    Router,
};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::EservicesError;
use crate::core::shared::models::{CannedResponse, PersonalCannedResponse};
use crate::core::shared::schema::{canned_responses, personal_canned_responses};
use crate::core::shared::state::AppState;

pub const GENERAL_SERVICE_LABEL: &str = "-- General (All Services) --";
pub const NOT_FOUND_OR_DENIED: &str = "Response not found or permission denied.";

/// System responses usable on a ticket: same department, either for the
/// ticket's service or department-wide. Service-specific ones come first.
pub fn scoped_for_ticket(
    conn: &mut PgConnection,
    department_id: Uuid,
    service_id: Uuid,
) -> Result<Vec<CannedResponse>, EservicesError> {
    canned_responses::table
        .filter(canned_responses::department_id.eq(department_id))
        .filter(
            canned_responses::service_id
                .eq(service_id)
                .or(canned_responses::service_id.is_null()),
        )
        .order((
            canned_responses::service_id.desc().nulls_last(),
            canned_responses::title.asc(),
        ))
        .select(CannedResponse::as_select())
        .load(conn)
        .map_err(EservicesError::from)
}

pub fn personal_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Vec<PersonalCannedResponse>, EservicesError> {
    personal_canned_responses::table
        .filter(personal_canned_responses::user_id.eq(user_id))
        .order(personal_canned_responses::title.asc())
        .select(PersonalCannedResponse::as_select())
        .load(conn)
        .map_err(EservicesError::from)
}

/// `0`, empty or junk means "whole department".
pub fn parse_service_choice(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

/// Carries `ticket_id` through the personal-response pages so the user can
/// get back to the ticket they came from.
pub fn ticket_back_query(ticket_id: Option<&str>) -> String {
    match ticket_id.map(str::trim).filter(|t| !t.is_empty()) {
        Some(id) => format!("?ticket_id={}", urlencoding::encode(id)),
        None => String::new(),
    }
}

pub fn configure_canned_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/canned-responses", get(system::list_canned_responses))
        .route(
            "/admin/canned-response/add",
            get(system::add_canned_response_page).post(system::add_canned_response),
        )
        .route(
            "/admin/canned-response/:id/edit",
            get(system::edit_canned_response_page).post(system::edit_canned_response),
        )
        .route(
            "/admin/canned-response/:id/delete",
            post(system::delete_canned_response),
        )
        .route(
            "/admin/_get_services_for_department/",
            get(system::services_for_no_department),
        )
        .route(
            "/admin/_get_services_for_department/:id",
            get(system::services_for_department),
        )
        .route(
            "/admin/my-responses",
            get(personal::list_my_responses).post(personal::add_my_response),
        )
        .route(
            "/admin/my-responses/:id/edit",
            get(personal::edit_my_response_page).post(personal::edit_my_response),
        )
        .route(
            "/admin/my-responses/:id/delete",
            post(personal::delete_my_response),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_choice() {
        let id = Uuid::new_v4();
        assert_eq!(parse_service_choice(&id.to_string()), Some(id));
        assert_eq!(parse_service_choice("0"), None);
        assert_eq!(parse_service_choice(""), None);
    }

    #[test]
    fn test_ticket_back_query() {
        assert_eq!(ticket_back_query(None), "");
        assert_eq!(ticket_back_query(Some("  ")), "");
        assert_eq!(ticket_back_query(Some("abc")), "?ticket_id=abc");
    }
}
