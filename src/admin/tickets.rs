//! Ticket export, deletion and the new-ticket poll.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::EservicesError;
use crate::core::shared::models::Ticket;
use crate::core::shared::schema::{attachments, departments, services, tickets};
use crate::core::shared::state::AppState;
use crate::dashboards::filters::{DashboardQuery, FilterView, TicketScope};
use crate::dashboards::{visible_services, STAFF_DASHBOARD_PATH};
use crate::security::file_validation::remove_uploads;
use crate::security::session::{AdminUser, StaffUser};
use crate::tickets::storage::{hydrate_rows, TicketListRow};
use crate::web::flash::FlashLevel;
use crate::web::page::PageContext;

pub const EXPORT_HEADER: [&str; 9] = [
    "Ticket Number",
    "Status",
    "Requester Name",
    "Requester Email",
    "School/Office",
    "Department",
    "Service",
    "Date Submitted",
    "Assigned Staff",
];

/// Echoed back when the client sends no `since`.
pub const BEGINNING_OF_TIME: &str = "0001-01-01T00:00:00+00:00";

/// Serializes tickets in export order; `departments` maps department ids
/// to names.
pub fn export_csv(
    rows: &[TicketListRow],
    departments: &HashMap<Uuid, String>,
) -> Result<Vec<u8>, EservicesError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| EservicesError::Internal(format!("csv export: {e}"));

    writer.write_record(EXPORT_HEADER).map_err(csv_error)?;
    for row in rows {
        let ticket = &row.ticket;
        writer
            .write_record([
                ticket.ticket_number.as_str(),
                ticket.status.as_str(),
                ticket.requester_name.as_str(),
                ticket.requester_email.as_str(),
                row.school_name.as_deref().unwrap_or("N/A"),
                departments
                    .get(&ticket.department_id)
                    .map(String::as_str)
                    .unwrap_or("N/A"),
                row.service_name.as_str(),
                ticket.date_posted.format("%Y-%m-%d %H:%M:%S").to_string().as_str(),
                row.assigned_name.as_deref().unwrap_or("Unassigned"),
            ])
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| EservicesError::Internal(format!("csv export: {e}")))
}

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("tickets_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Every ticket matching the dashboard filters, newest first.
pub async fn export_tickets(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Query(params): Query<DashboardQuery>,
) -> Result<Response, EservicesError> {
    let view = FilterView::resolve(params.filter_view.as_deref(), admin.role);
    let scope = TicketScope::for_user(
        &admin,
        view,
        None,
        params.search(),
        params.requested_year(),
        params.quarter(),
    );

    let (rows, department_names) = state
        .db(move |conn| {
            let tickets: Vec<(Ticket, String)> = scope
                .query()
                .order(tickets::date_posted.desc())
                .select((Ticket::as_select(), services::name))
                .load(conn)?;
            let department_names: HashMap<Uuid, String> = departments::table
                .select((departments::id, departments::name))
                .load::<(Uuid, String)>(conn)?
                .into_iter()
                .collect();
            Ok((hydrate_rows(conn, tickets)?, department_names))
        })
        .await?;

    let body = export_csv(&rows, &department_names)?;
    info!("Admin {} exported tickets based on current filters.", admin.email);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment;filename={}", export_filename(Utc::now())),
            ),
        ],
        body,
    )
        .into_response())
}

/// Removes a ticket with its responses and attachments.
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
) -> Result<Response, EservicesError> {
    let deleted = state
        .db(move |conn| {
            conn.transaction(|conn| {
                let number: Option<String> = tickets::table
                    .find(id)
                    .select(tickets::ticket_number)
                    .first(conn)
                    .optional()?;
                let Some(number) = number else {
                    return Ok(None);
                };
                let files: Vec<String> = attachments::table
                    .filter(attachments::ticket_id.eq(id))
                    .select(attachments::filename)
                    .load(conn)?;
                diesel::delete(tickets::table.find(id)).execute(conn)?;
                Ok(Some((number, files)))
            })
        })
        .await?;

    match deleted {
        Some((number, files)) => {
            remove_uploads(&state.config.uploads.dir, &files).await;
            info!("Admin {} deleted ticket {}", admin.email, number);
            Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("Ticket {number} deleted."),
                STAFF_DASHBOARD_PATH,
            ))
        }
        None => {
            warn!(
                "Admin {} tried deleting non-existent ticket ID: {}",
                admin.email, id
            );
            Ok(ctx.redirect_with(FlashLevel::Danger, "Ticket not found.", STAFF_DASHBOARD_PATH))
        }
    }
}

/// Accepts ISO-8601 with or without an offset (a bare timestamp is UTC) and
/// plain dates. Anything else is rejected.
pub fn parse_since(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: Option<String>,
}

/// `{new_count, latest_timestamp}` for tickets posted after `since`.
pub async fn check_new_tickets(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    Query(query): Query<SinceQuery>,
) -> Result<Response, EservicesError> {
    let since_raw = query
        .since
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| BEGINNING_OF_TIME.to_string());
    let since = parse_since(&since_raw);

    let result = state
        .db(move |conn| {
            let services = visible_services(conn, &user)?;
            if services.as_ref().is_some_and(|ids| ids.is_empty()) {
                return Ok(None);
            }

            let scoped = || {
                let mut query = tickets::table.into_boxed();
                if let Some(since) = since {
                    query = query.filter(tickets::date_posted.gt(since));
                }
                if let Some(ids) = &services {
                    query = query.filter(tickets::service_id.eq_any(ids.clone()));
                }
                query
            };
            let count: i64 = scoped().count().get_result(conn)?;
            let latest: Option<DateTime<Utc>> = scoped()
                .select(diesel::dsl::max(tickets::date_posted))
                .first(conn)?;
            Ok(Some((count, latest)))
        })
        .await?;

    let (count, latest) = result.unwrap_or((0, None));
    let latest_timestamp = latest
        .map(|t| t.to_rfc3339())
        .unwrap_or(since_raw);
    Ok(Json(json!({
        "new_count": count,
        "latest_timestamp": latest_timestamp,
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::TicketStatus;
    use serde_json::Value;

    fn row(number: &str, school: Option<&str>, assigned: Option<&str>) -> (TicketListRow, Uuid) {
        let department_id = Uuid::new_v4();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: number.into(),
            status: TicketStatus::InProgress,
            date_posted: Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).single().expect("date"),
            requester_name: "Cruz, Juan".into(),
            requester_email: "juan@deped.gov.ph".into(),
            requester_contact: None,
            details: Value::Null,
            department_id,
            service_id: Uuid::new_v4(),
            school_id: None,
            assigned_staff_id: None,
        };
        (
            TicketListRow {
                ticket,
                service_name: "Service Record".into(),
                school_name: school.map(String::from),
                assigned_name: assigned.map(String::from),
            },
            department_id,
        )
    }

    #[test]
    fn test_export_csv_rows() {
        let (with_school, personnel) = row("PERS-2025-0001", Some("Alpha ES"), Some("Maria"));
        let (bare, _) = row("PERS-2025-0002", None, None);
        let departments: HashMap<Uuid, String> = [(personnel, "Personnel".to_string())].into_iter().collect();

        let bytes = export_csv(&[with_school, bare], &departments).expect("csv");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], EXPORT_HEADER.join(","));
        assert_eq!(
            lines[1],
            "PERS-2025-0001,In Progress,\"Cruz, Juan\",juan@deped.gov.ph,Alpha ES,Personnel,Service Record,2025-03-04 05:06:07,Maria"
        );
        assert!(lines[2].ends_with(",N/A,N/A,Service Record,2025-03-04 05:06:07,Unassigned"));
    }

    #[test]
    fn test_export_filename() {
        let now = Utc.with_ymd_and_hms(2025, 12, 1, 8, 30, 0).single().expect("date");
        assert_eq!(export_filename(now), "tickets_export_20251201_083000.csv");
    }

    #[test]
    fn test_parse_since_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("date");
        assert_eq!(parse_since("2025-06-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_since("2025-06-01T12:00:00+00:00"), Some(expected));
        assert_eq!(parse_since("2025-06-01T20:00:00+08:00"), Some(expected));
        assert_eq!(parse_since("2025-06-01T12:00:00"), Some(expected));
        assert_eq!(parse_since("2025-06-01T12:00:00.000000"), Some(expected));
        assert!(parse_since("2025-06-01").is_some());
        assert!(parse_since(BEGINNING_OF_TIME).is_some());
        assert_eq!(parse_since("yesterday"), None);
    }
}
