//! Query-string filters of the staff dashboard and the ticket scope they
//! select. The admin export reuses the same scope so a download matches
//! what is on screen.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::error::EservicesError;
use crate::core::shared::models::User;
use crate::core::shared::schema::{schools, services, tickets};
use crate::core::shared::utils::{ilike_pattern, parse_page};
use crate::core::shared::Role;
use crate::tickets::storage::TicketServiceQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterView {
    AllManaged,
    AllSystem,
    MyAssigned,
}

impl FilterView {
    /// Anything but `my_assigned` falls back to the role's full view.
    pub fn resolve(raw: Option<&str>, role: Role) -> Self {
        match raw.map(str::trim) {
            Some("my_assigned") => Self::MyAssigned,
            _ if role.is_admin() => Self::AllSystem,
            _ => Self::AllManaged,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllManaged => "all_managed",
            Self::AllSystem => "all_system",
            Self::MyAssigned => "my_assigned",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::AllManaged => "My Managed Services Tickets",
            Self::AllSystem => "All System Tickets",
            Self::MyAssigned => "My Assigned Tickets",
        }
    }
}

/// Raw `?` parameters. Numbers stay strings so junk values fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub page_active: Option<String>,
    pub page_resolved: Option<String>,
    pub page_school: Option<String>,
    pub search: Option<String>,
    pub filter_view: Option<String>,
    pub year: Option<String>,
    pub quarter: Option<String>,
}

impl DashboardQuery {
    pub fn search(&self) -> String {
        self.search.as_deref().unwrap_or("").trim().to_string()
    }

    pub fn requested_year(&self) -> i32 {
        self.year
            .as_deref()
            .and_then(|y| y.trim().parse().ok())
            .unwrap_or_else(|| Utc::now().year())
    }

    /// `0` means the whole year.
    pub fn quarter(&self) -> u32 {
        self.quarter
            .as_deref()
            .and_then(|q| q.trim().parse().ok())
            .filter(|q| (1..=4).contains(q))
            .unwrap_or(0)
    }

    pub fn page_active(&self) -> Option<i64> {
        parse_page(self.page_active.as_deref())
    }

    pub fn page_resolved(&self) -> Option<i64> {
        parse_page(self.page_resolved.as_deref())
    }

    pub fn page_school(&self) -> Option<i64> {
        parse_page(self.page_school.as_deref())
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap_or_default())
}

/// `[Jan 1, Jan 1 of the next year)`.
pub fn year_range(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
    Some((start_of_day(start), start_of_day(end)))
}

/// Inclusive bounds of a calendar quarter, ending at 23:59:59 on its last day.
pub fn quarter_range(year: i32, quarter: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (first, last) = match quarter {
        1 => ((1, 1), (3, 31)),
        2 => ((4, 1), (6, 30)),
        3 => ((7, 1), (9, 30)),
        4 => ((10, 1), (12, 31)),
        _ => return None,
    };
    let start = NaiveDate::from_ymd_opt(year, first.0, first.1)?;
    let end = NaiveDate::from_ymd_opt(year, last.0, last.1)?;
    Some((start_of_day(start), end_of_day(end)))
}

/// Years that have tickets, newest first.
pub fn available_years(conn: &mut PgConnection) -> Result<Vec<i32>, EservicesError> {
    let mut years: Vec<i32> = tickets::table
        .select(sql::<Integer>(
            "CAST(EXTRACT(YEAR FROM date_posted AT TIME ZONE 'UTC') AS INTEGER)",
        ))
        .distinct()
        .load(conn)?;
    years.sort_unstable_by(|a, b| b.cmp(a));
    Ok(years)
}

/// The requested year when it has tickets, else the newest year that does.
/// With no tickets at all the current year is offered.
pub fn select_year(requested: i32, available: &mut Vec<i32>) -> i32 {
    if available.is_empty() {
        available.push(Utc::now().year());
        return requested;
    }
    if available.contains(&requested) {
        requested
    } else {
        available[0]
    }
}

/// The tickets one dashboard (or one export) looks at.
#[derive(Debug, Clone)]
pub struct TicketScope {
    /// `None` means every service.
    pub services: Option<Vec<Uuid>>,
    pub assigned_to: Option<Uuid>,
    pub search: String,
    pub year: i32,
    pub quarter: u32,
}

impl TicketScope {
    pub fn for_user(
        user: &User,
        view: FilterView,
        managed: Option<Vec<Uuid>>,
        search: String,
        year: i32,
        quarter: u32,
    ) -> Self {
        Self {
            services: managed,
            assigned_to: (view == FilterView::MyAssigned).then_some(user.id),
            search,
            year,
            quarter,
        }
    }

    /// Searching replaces the period filter and hides the summaries.
    pub fn is_search(&self) -> bool {
        !self.search.is_empty()
    }

    pub fn query(&self) -> TicketServiceQuery<'static> {
        let mut query = tickets::table.inner_join(services::table).into_boxed();

        if let Some(ids) = &self.services {
            query = query.filter(tickets::service_id.eq_any(ids.clone()));
        }
        if let Some(staff_id) = self.assigned_to {
            query = query.filter(tickets::assigned_staff_id.eq(staff_id));
        }

        if self.is_search() {
            let pattern = ilike_pattern(&self.search);
            let matching_schools = schools::table
                .filter(schools::name.ilike(pattern.clone()))
                .select(schools::id);
            query = query.filter(
                tickets::ticket_number
                    .ilike(pattern.clone())
                    .or(tickets::requester_name.ilike(pattern))
                    .or(tickets::school_id.assume_not_null().eq_any(matching_schools)),
            );
        } else {
            if let Some((start, end)) = year_range(self.year) {
                query = query
                    .filter(tickets::date_posted.ge(start))
                    .filter(tickets::date_posted.lt(end));
            }
            if let Some((start, end)) = quarter_range(self.year, self.quarter) {
                query = query.filter(tickets::date_posted.between(start, end));
            }
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_ranges() {
        let (start, end) = quarter_range(2025, 1).expect("q1");
        assert_eq!(start.to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-31T23:59:59+00:00");

        let (start, end) = quarter_range(2024, 4).expect("q4");
        assert_eq!(start.to_rfc3339(), "2024-10-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-12-31T23:59:59+00:00");

        assert!(quarter_range(2025, 0).is_none());
        assert!(quarter_range(2025, 5).is_none());
    }

    #[test]
    fn test_year_range_is_half_open() {
        let (start, end) = year_range(2024).expect("year");
        assert_eq!(start.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_filter_view_defaults_by_role() {
        assert_eq!(FilterView::resolve(None, Role::Staff), FilterView::AllManaged);
        assert_eq!(FilterView::resolve(None, Role::Admin), FilterView::AllSystem);
        assert_eq!(
            FilterView::resolve(Some("all_system"), Role::Staff),
            FilterView::AllManaged
        );
        assert_eq!(
            FilterView::resolve(Some("my_assigned"), Role::Admin),
            FilterView::MyAssigned
        );
        assert_eq!(FilterView::MyAssigned.title(), "My Assigned Tickets");
    }

    #[test]
    fn test_select_year_snaps_to_newest() {
        let mut years = vec![2025, 2023];
        assert_eq!(select_year(2023, &mut years), 2023);
        assert_eq!(select_year(1999, &mut years), 2025);

        let mut none = Vec::new();
        assert_eq!(select_year(2020, &mut none), 2020);
        assert_eq!(none, vec![Utc::now().year()]);
    }

    #[test]
    fn test_query_params_are_lenient() {
        let query = DashboardQuery {
            year: Some("abc".into()),
            quarter: Some("7".into()),
            page_active: Some("2".into()),
            search: Some("  ICT-2025 ".into()),
            ..Default::default()
        };
        assert_eq!(query.requested_year(), Utc::now().year());
        assert_eq!(query.quarter(), 0);
        assert_eq!(query.page_active(), Some(2));
        assert_eq!(query.page_resolved(), None);
        assert_eq!(query.search(), "ICT-2025");
    }
}
