//! Ticket queries. Every function takes a checked-out connection and is run
//! through `AppState::db`.

use chrono::{Datelike, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use super::numbering::{department_code, next_ticket_number, number_prefix};
use crate::core::error::EservicesError;
use crate::core::shared::models::{
    Attachment, Department, School, Service, Ticket, TicketResponse, User,
};
use crate::core::shared::schema::{
    attachments, departments, schools, services, ticket_responses, tickets, user_services, users,
};
use crate::core::shared::utils::{ilike_pattern, page_window};
use crate::core::shared::{Page, Role, TicketStatus};

/// Display order on the department picker.
pub const DEPARTMENT_ORDER: [&str; 6] = [
    "ICT",
    "Personnel",
    "Legal Services",
    "Office of the SDS",
    "Accounting Unit",
    "Supply Office",
];

const NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct TicketListRow {
    pub ticket: Ticket,
    pub service_name: String,
    pub school_name: Option<String>,
    pub assigned_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResponseView {
    pub response: TicketResponse,
    pub author: Option<(String, Role)>,
}

#[derive(Debug, Clone)]
pub struct TicketView {
    pub ticket: Ticket,
    pub department: Department,
    pub service: Service,
    pub school_name: Option<String>,
    pub assigned_staff: Option<User>,
    pub attachments: Vec<Attachment>,
    pub responses: Vec<ResponseView>,
}

/// Columns of a new ticket that come from the request.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub requester_name: String,
    pub requester_email: String,
    pub requester_contact: Option<String>,
    pub school_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub department: Department,
    pub service_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub attachment: Option<String>,
    pub response: Option<TicketResponse>,
    pub status: Option<TicketStatus>,
    /// `Some(None)` clears the assignee.
    pub assignee: Option<Option<Uuid>>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.attachment.is_none()
            && self.response.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
    }
}

pub fn ordered_departments(conn: &mut PgConnection) -> Result<Vec<Department>, EservicesError> {
    let all: Vec<Department> = departments::table
        .select(Department::as_select())
        .load(conn)?;
    let mut by_name: HashMap<String, Department> =
        all.into_iter().map(|d| (d.name.clone(), d)).collect();
    Ok(DEPARTMENT_ORDER
        .iter()
        .filter_map(|name| by_name.remove(*name))
        .collect())
}

pub fn find_department(conn: &mut PgConnection, id: Uuid) -> Result<Option<Department>, EservicesError> {
    departments::table
        .find(id)
        .select(Department::as_select())
        .first(conn)
        .optional()
        .map_err(EservicesError::from)
}

pub fn services_of(conn: &mut PgConnection, department_id: Uuid) -> Result<Vec<Service>, EservicesError> {
    services::table
        .filter(services::department_id.eq(department_id))
        .order(services::name.asc())
        .select(Service::as_select())
        .load(conn)
        .map_err(EservicesError::from)
}

pub fn find_service(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<(Service, Department)>, EservicesError> {
    services::table
        .inner_join(departments::table)
        .filter(services::id.eq(id))
        .select((Service::as_select(), Department::as_select()))
        .first(conn)
        .optional()
        .map_err(EservicesError::from)
}

pub fn schools_by_name(conn: &mut PgConnection) -> Result<Vec<School>, EservicesError> {
    schools::table
        .order(schools::name.asc())
        .select(School::as_select())
        .load(conn)
        .map_err(EservicesError::from)
}

/// Inserts the ticket and its attachment rows in one transaction, numbering
/// it `<DEPT>-<YEAR>-<NNNN>`. A concurrent insert that takes the same number
/// makes the next attempt pick the following one.
pub fn insert_ticket(
    conn: &mut PgConnection,
    new: &NewTicket,
    stored_files: &[String],
) -> Result<Ticket, EservicesError> {
    let code = department_code(&new.department.name);
    let mut last_error = None;

    for _ in 0..NUMBER_ATTEMPTS {
        let result = conn.transaction::<Ticket, EservicesError, _>(|conn| {
            let now = Utc::now();
            let year = now.year();
            let existing: Vec<String> = tickets::table
                .filter(tickets::ticket_number.like(format!("{}%", number_prefix(code, year))))
                .select(tickets::ticket_number)
                .load(conn)?;

            let ticket = Ticket {
                id: Uuid::new_v4(),
                ticket_number: next_ticket_number(code, year, existing.iter().map(String::as_str)),
                status: TicketStatus::Open,
                date_posted: now,
                requester_name: new.requester_name.clone(),
                requester_email: new.requester_email.clone(),
                requester_contact: new.requester_contact.clone(),
                details: new.details.clone(),
                department_id: new.department.id,
                service_id: new.service_id,
                school_id: new.school_id,
                assigned_staff_id: None,
            };
            diesel::insert_into(tickets::table)
                .values(&ticket)
                .execute(conn)?;

            let rows: Vec<Attachment> = stored_files
                .iter()
                .map(|filename| Attachment {
                    id: Uuid::new_v4(),
                    filename: filename.clone(),
                    ticket_id: ticket.id,
                })
                .collect();
            if !rows.is_empty() {
                diesel::insert_into(attachments::table)
                    .values(&rows)
                    .execute(conn)?;
            }
            Ok(ticket)
        });

        match result {
            Ok(ticket) => return Ok(ticket),
            Err(e) if e.is_unique_violation() => {
                warn!("Ticket number collision for {}, retrying", code);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| EservicesError::Internal("ticket numbering failed".into())))
}

pub type TicketServiceQuery<'a> =
    diesel::dsl::IntoBoxed<'a, diesel::dsl::InnerJoin<tickets::table, services::table>, Pg>;

fn requester_tickets<'a>(email: &'a str, search: &'a str, resolved: bool) -> TicketServiceQuery<'a> {
    let mut query = tickets::table
        .inner_join(services::table)
        .filter(tickets::requester_email.eq(email))
        .into_boxed();
    if !search.is_empty() {
        let pattern = ilike_pattern(search);
        query = query.filter(
            tickets::ticket_number
                .ilike(pattern.clone())
                .or(services::name.ilike(pattern)),
        );
    }
    if resolved {
        query.filter(tickets::status.eq(TicketStatus::Resolved))
    } else {
        query.filter(tickets::status.ne(TicketStatus::Resolved))
    }
}

/// Fills in school and assignee names for a page of tickets.
pub fn hydrate_rows(
    conn: &mut PgConnection,
    rows: Vec<(Ticket, String)>,
) -> Result<Vec<TicketListRow>, EservicesError> {
    let school_ids: Vec<Uuid> = rows.iter().filter_map(|(t, _)| t.school_id).collect();
    let staff_ids: Vec<Uuid> = rows.iter().filter_map(|(t, _)| t.assigned_staff_id).collect();

    let school_names: HashMap<Uuid, String> = if school_ids.is_empty() {
        HashMap::new()
    } else {
        schools::table
            .filter(schools::id.eq_any(school_ids))
            .select((schools::id, schools::name))
            .load::<(Uuid, String)>(conn)?
            .into_iter()
            .collect()
    };
    let staff_names: HashMap<Uuid, String> = if staff_ids.is_empty() {
        HashMap::new()
    } else {
        users::table
            .filter(users::id.eq_any(staff_ids))
            .select((users::id, users::name))
            .load::<(Uuid, String)>(conn)?
            .into_iter()
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|(ticket, service_name)| TicketListRow {
            school_name: ticket.school_id.and_then(|id| school_names.get(&id).cloned()),
            assigned_name: ticket
                .assigned_staff_id
                .and_then(|id| staff_names.get(&id).cloned()),
            ticket,
            service_name,
        })
        .collect())
}

/// One page of a requester's active (Open first, newest first) or resolved
/// (newest first) tickets.
pub fn requester_page(
    conn: &mut PgConnection,
    email: &str,
    search: &str,
    resolved: bool,
    requested_page: Option<i64>,
    per_page: i64,
) -> Result<Page<TicketListRow>, EservicesError> {
    let total: i64 = requester_tickets(email, search, resolved)
        .count()
        .get_result(conn)?;
    let (page, offset) = page_window(requested_page, per_page);

    let query = requester_tickets(email, search, resolved);
    let query = if resolved {
        query.order(tickets::date_posted.desc())
    } else {
        // "Open" sorts after "In Progress", so descending puts Open first.
        query.order((tickets::status.desc(), tickets::date_posted.desc()))
    };
    let rows: Vec<(Ticket, String)> = query
        .select((Ticket::as_select(), services::name))
        .limit(per_page)
        .offset(offset)
        .load(conn)?;

    Ok(Page {
        items: hydrate_rows(conn, rows)?,
        page,
        per_page,
        total,
    })
}

pub fn find_ticket(conn: &mut PgConnection, id: Uuid) -> Result<Option<Ticket>, EservicesError> {
    tickets::table
        .find(id)
        .select(Ticket::as_select())
        .first(conn)
        .optional()
        .map_err(EservicesError::from)
}

pub fn user_manages_service(
    conn: &mut PgConnection,
    user_id: Uuid,
    service_id: Uuid,
) -> Result<bool, EservicesError> {
    let count: i64 = user_services::table
        .filter(user_services::user_id.eq(user_id))
        .filter(user_services::service_id.eq(service_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn managed_service_ids(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Uuid>, EservicesError> {
    user_services::table
        .filter(user_services::user_id.eq(user_id))
        .select(user_services::service_id)
        .load(conn)
        .map_err(EservicesError::from)
}

/// Staff assigned to the service, by name.
pub fn service_managers(conn: &mut PgConnection, service_id: Uuid) -> Result<Vec<User>, EservicesError> {
    user_services::table
        .inner_join(users::table)
        .filter(user_services::service_id.eq(service_id))
        .order(users::name.asc())
        .select(User::as_select())
        .load(conn)
        .map_err(EservicesError::from)
}

pub fn admin_emails(conn: &mut PgConnection) -> Result<Vec<String>, EservicesError> {
    users::table
        .filter(users::role.eq(Role::Admin))
        .select(users::email)
        .load(conn)
        .map_err(EservicesError::from)
}

pub fn load_ticket_view(conn: &mut PgConnection, id: Uuid) -> Result<Option<TicketView>, EservicesError> {
    let Some(ticket) = find_ticket(conn, id)? else {
        return Ok(None);
    };

    let service: Service = services::table
        .find(ticket.service_id)
        .select(Service::as_select())
        .first(conn)?;
    let department: Department = departments::table
        .find(ticket.department_id)
        .select(Department::as_select())
        .first(conn)?;
    let school_name: Option<String> = match ticket.school_id {
        Some(school_id) => schools::table
            .find(school_id)
            .select(schools::name)
            .first(conn)
            .optional()?,
        None => None,
    };
    let assigned_staff: Option<User> = match ticket.assigned_staff_id {
        Some(staff_id) => users::table
            .find(staff_id)
            .select(User::as_select())
            .first(conn)
            .optional()?,
        None => None,
    };
    let attachments: Vec<Attachment> = attachments::table
        .filter(attachments::ticket_id.eq(ticket.id))
        .order(attachments::filename.asc())
        .select(Attachment::as_select())
        .load(conn)?;

    let responses: Vec<(TicketResponse, Option<(String, Role)>)> = ticket_responses::table
        .left_join(users::table.on(ticket_responses::user_id.eq(users::id.nullable())))
        .filter(ticket_responses::ticket_id.eq(ticket.id))
        .order(ticket_responses::date_posted.asc())
        .select((
            TicketResponse::as_select(),
            (users::name, users::role).nullable(),
        ))
        .load(conn)?;

    Ok(Some(TicketView {
        ticket,
        department,
        service,
        school_name,
        assigned_staff,
        attachments,
        responses: responses
            .into_iter()
            .map(|(response, author)| ResponseView { response, author })
            .collect(),
    }))
}

pub fn apply_update(conn: &mut PgConnection, ticket_id: Uuid, update: &TicketUpdate) -> Result<(), EservicesError> {
    conn.transaction::<(), EservicesError, _>(|conn| {
        if let Some(filename) = &update.attachment {
            diesel::insert_into(attachments::table)
                .values(&Attachment {
                    id: Uuid::new_v4(),
                    filename: filename.clone(),
                    ticket_id,
                })
                .execute(conn)?;
        }
        if let Some(response) = &update.response {
            diesel::insert_into(ticket_responses::table)
                .values(response)
                .execute(conn)?;
        }
        if let Some(status) = update.status {
            diesel::update(tickets::table.find(ticket_id))
                .set(tickets::status.eq(status))
                .execute(conn)?;
        }
        if let Some(assignee) = update.assignee {
            diesel::update(tickets::table.find(ticket_id))
                .set(tickets::assigned_staff_id.eq(assignee))
                .execute(conn)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_emptiness() {
        assert!(TicketUpdate::default().is_empty());
        let update = TicketUpdate {
            assignee: Some(None),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_department_order_matches_codes() {
        for name in DEPARTMENT_ORDER {
            assert_ne!(department_code(name), "GEN", "{name}");
        }
    }
}
