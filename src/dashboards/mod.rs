//! The staff and admin ticket dashboard: filtered ticket lists plus
//! department and school summaries.

pub mod filters;
pub mod summary;
pub mod ui;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use self::filters::{available_years, select_year, DashboardQuery, FilterView, TicketScope};
use self::summary::{department_summary, school_summary, ScopedTicket};
use self::ui::DashboardView;
use crate::core::error::EservicesError;
use crate::core::shared::models::{Department, Service, Ticket, User};
use crate::core::shared::schema::{departments, schools, services, tickets};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::page_window;
use crate::core::shared::{Page, TicketStatus};
use crate::security::session::StaffUser;
use crate::tickets::storage::{hydrate_rows, managed_service_ids, TicketListRow, TicketServiceQuery};
use crate::web::flash::FlashLevel;
use crate::web::page::PageContext;

pub const STAFF_DASHBOARD_PATH: &str = "/admin/staff-dashboard";

pub const NO_SERVICES_WARNING: &str = "You are not assigned to any services. Contact admin.";

/// The services a user may see tickets for: `None` for admins (everything),
/// the managed set for staff.
pub fn visible_services(
    conn: &mut PgConnection,
    user: &User,
) -> Result<Option<Vec<Uuid>>, EservicesError> {
    if user.role.is_admin() {
        Ok(None)
    } else {
        managed_service_ids(conn, user.id).map(Some)
    }
}

fn ticket_page(
    conn: &mut PgConnection,
    scope: &TicketScope,
    resolved: bool,
    requested_page: Option<i64>,
    per_page: i64,
) -> Result<Page<TicketListRow>, EservicesError> {
    let status_filter = |query: TicketServiceQuery<'static>| {
        if resolved {
            query.filter(tickets::status.eq(TicketStatus::Resolved))
        } else {
            query.filter(tickets::status.ne(TicketStatus::Resolved))
        }
    };

    let total: i64 = status_filter(scope.query()).count().get_result(conn)?;
    let (page, offset) = page_window(requested_page, per_page);

    let query = status_filter(scope.query());
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

pub async fn staff_dashboard(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    ctx: PageContext,
    Query(params): Query<DashboardQuery>,
) -> Result<Response, EservicesError> {
    let view = FilterView::resolve(params.filter_view.as_deref(), user.role);
    let tickets_per_page = state.config.pagination.tickets_per_page;
    let schools_per_page = state.config.pagination.schools_per_page;
    let search = params.search();
    let quarter = params.quarter();
    let requested_year = params.requested_year();
    let viewer = user.clone();

    let (dashboard, has_services) = state
        .db(move |conn| {
            let mut years = available_years(conn)?;
            let year = select_year(requested_year, &mut years);
            let managed = visible_services(conn, &viewer)?;

            let mut dashboard = DashboardView {
                role: viewer.role,
                view,
                search: search.clone(),
                years,
                year,
                quarter,
                active: Page::empty(tickets_per_page),
                resolved: Page::empty(tickets_per_page),
                departments: Vec::new(),
                schools: Page::empty(schools_per_page),
                since: Utc::now().to_rfc3339(),
            };
            if managed.as_ref().is_some_and(|ids| ids.is_empty()) {
                return Ok((dashboard, false));
            }

            let scope = TicketScope::for_user(&viewer, view, managed.clone(), search, year, quarter);
            dashboard.active = ticket_page(conn, &scope, false, params.page_active(), tickets_per_page)?;
            dashboard.resolved =
                ticket_page(conn, &scope, true, params.page_resolved(), tickets_per_page)?;

            let latest: Option<DateTime<Utc>> = scope
                .query()
                .select(diesel::dsl::max(tickets::date_posted))
                .first(conn)?;
            if let Some(latest) = latest {
                dashboard.since = latest.to_rfc3339();
            }

            if !scope.is_search() {
                let scoped = scoped_tickets(conn, &scope)?;
                let all_departments = departments::table
                    .select(Department::as_select())
                    .load(conn)?;
                let all_services = services::table.select(Service::as_select()).load(conn)?;
                let service_names: HashMap<Uuid, String> = all_services
                    .iter()
                    .map(|s| (s.id, s.name.clone()))
                    .collect();
                let school_names = school_names(conn, &scoped)?;

                dashboard.departments =
                    department_summary(&all_departments, &all_services, managed.as_deref(), &scoped);
                dashboard.schools = school_summary(
                    &school_names,
                    &service_names,
                    &scoped,
                    params.page_school(),
                    schools_per_page,
                );
            }
            Ok((dashboard, true))
        })
        .await?;

    if !has_services {
        warn!("Staff user {} has no services.", user.email);
        ctx.flash(FlashLevel::Warning, NO_SERVICES_WARNING);
    }
    Ok(ctx.render(view.title(), &ui::dashboard(&dashboard)).into_response())
}

fn scoped_tickets(conn: &mut PgConnection, scope: &TicketScope) -> Result<Vec<ScopedTicket>, EservicesError> {
    Ok(scope
        .query()
        .select((tickets::service_id, tickets::status, tickets::school_id))
        .load::<(Uuid, TicketStatus, Option<Uuid>)>(conn)?
        .into_iter()
        .map(|(service_id, status, school_id)| ScopedTicket {
            service_id,
            status,
            school_id,
        })
        .collect())
}

fn school_names(
    conn: &mut PgConnection,
    scoped: &[ScopedTicket],
) -> Result<HashMap<Uuid, String>, EservicesError> {
    let mut ids: Vec<Uuid> = scoped.iter().filter_map(|t| t.school_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(schools::table
        .filter(schools::id.eq_any(ids))
        .select((schools::id, schools::name))
        .load::<(Uuid, String)>(conn)?
        .into_iter()
        .collect())
}

pub fn configure_dashboards_routes() -> Router<Arc<AppState>> {
    Router::new().route(STAFF_DASHBOARD_PATH, get(staff_dashboard))
}
