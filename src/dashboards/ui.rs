use crate::core::shared::{html_escape, Page, Role};
use crate::tickets::storage::TicketListRow;
use crate::tickets::ui::ticket_table;
use crate::web::ui;

use super::filters::FilterView;
use super::summary::{DepartmentSummary, SchoolSummary};
use super::STAFF_DASHBOARD_PATH;

pub const EXPORT_PATH: &str = "/admin/export-tickets";
pub const CHECK_NEW_PATH: &str = "/admin/check-new-tickets";

/// Everything the dashboard template shows.
pub struct DashboardView {
    pub role: Role,
    pub view: FilterView,
    pub search: String,
    pub years: Vec<i32>,
    pub year: i32,
    pub quarter: u32,
    pub active: Page<TicketListRow>,
    pub resolved: Page<TicketListRow>,
    pub departments: Vec<DepartmentSummary>,
    pub schools: Page<SchoolSummary>,
    /// Newest `date_posted` on screen, the starting point for polling.
    pub since: String,
}

impl DashboardView {
    /// The filter parameters, repeated on every pagination and export link.
    pub fn filter_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("search", self.search.clone()),
            ("filter_view", self.view.as_str().to_string()),
            ("year", self.year.to_string()),
            ("quarter", self.quarter.to_string()),
        ]
    }

    fn page_params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.filter_params();
        params.push(("page_active", self.active.page.to_string()));
        params.push(("page_resolved", self.resolved.page.to_string()));
        params.push(("page_school", self.schools.page.to_string()));
        params
    }
}

fn filter_form(view: &DashboardView) -> String {
    let all_view = if view.role.is_admin() {
        FilterView::AllSystem
    } else {
        FilterView::AllManaged
    };
    let view_options: Vec<(String, String)> = [all_view, FilterView::MyAssigned]
        .iter()
        .map(|v| (v.as_str().to_string(), v.title().to_string()))
        .collect();
    let year_options: Vec<(String, String)> = view
        .years
        .iter()
        .map(|y| (y.to_string(), y.to_string()))
        .collect();
    let quarter_options: Vec<(String, String)> = [
        ("0", "All Year"),
        ("1", "Q1 (Jan-Mar)"),
        ("2", "Q2 (Apr-Jun)"),
        ("3", "Q3 (Jul-Sep)"),
        ("4", "Q4 (Oct-Dec)"),
    ]
    .iter()
    .map(|(v, t)| (v.to_string(), t.to_string()))
    .collect();

    let export = if view.role.is_admin() {
        format!(
            " <a class=\"btn btn-secondary\" href=\"{}\">Export CSV</a>",
            html_escape(&format!("{EXPORT_PATH}{}", ui::query_string(&view.filter_params())))
        )
    } else {
        String::new()
    };

    format!(
        "<form method=\"get\" action=\"{STAFF_DASHBOARD_PATH}\" class=\"card\">\
            {search}{filter_view}{year}{quarter}\
            <button type=\"submit\" class=\"btn\">Apply</button>{export}\
         </form>",
        search = ui::input_field("text", "search", "Search (ticket #, requester, school)", &view.search, false, None),
        filter_view = ui::select_field("filter_view", "View", &view_options, view.view.as_str(), None),
        year = ui::select_field("year", "Year", &year_options, &view.year.to_string(), None),
        quarter = ui::select_field("quarter", "Quarter", &quarter_options, &view.quarter.to_string(), None),
    )
}

fn department_cards(departments: &[DepartmentSummary]) -> String {
    if departments.is_empty() {
        return ui::empty_state("No departments to summarize.");
    }
    departments
        .iter()
        .map(|department| {
            let rows: String = department
                .services
                .iter()
                .map(|service| {
                    format!(
                        "<tr><td>{name}</td><td>{active}</td><td>{resolved}</td><td>{total}</td>\
                         <td><div class=\"bar\"><div style=\"width:{pct}%;background:{color}\"></div></div>{pct}%</td></tr>",
                        name = html_escape(&service.name),
                        active = service.tally.active,
                        resolved = service.tally.resolved,
                        total = service.tally.total,
                        pct = service.tally.resolved_percent(),
                        color = service.color,
                    )
                })
                .collect();
            format!(
                "<div class=\"card\"><h3>{name} <span class=\"muted\">({count} services, {total} tickets)</span></h3>\
                 <table><thead><tr><th>Service</th><th>Active</th><th>Resolved</th><th>Total</th><th>Resolved %</th></tr></thead>\
                 <tbody>{rows}</tbody></table></div>",
                name = html_escape(&department.name),
                count = department.services.len(),
                total = department.total,
            )
        })
        .collect()
}

fn school_cards(view: &DashboardView) -> String {
    if view.schools.items.is_empty() {
        return ui::empty_state("No school tickets for this period.");
    }
    let rows: String = view
        .schools
        .items
        .iter()
        .map(|school| {
            let breakdown: String = school
                .services
                .iter()
                .map(|s| {
                    format!(
                        "<li>{name}: {active} active, {resolved} resolved ({total})</li>",
                        name = html_escape(&s.name),
                        active = s.tally.active,
                        resolved = s.tally.resolved,
                        total = s.tally.total,
                    )
                })
                .collect();
            format!(
                "<tr><td>{name}</td><td>{total}</td><td><ul>{breakdown}</ul></td></tr>",
                name = html_escape(&school.name),
                total = school.total,
            )
        })
        .collect();
    format!(
        "<table><thead><tr><th>School/Office</th><th>Tickets</th><th>By Service</th></tr></thead>\
         <tbody>{rows}</tbody></table>{pages}",
        pages = ui::pagination(&view.schools, STAFF_DASHBOARD_PATH, "page_school", &view.page_params()),
    )
}

/// Polls for tickets newer than the ones on screen and shows a banner.
fn poll_script(since: &str) -> String {
    format!(
        "<div id=\"new-tickets\" class=\"alert alert-info\" style=\"display:none\"></div>\
         <script>\
         (function () {{\
             var since = '{since}';\
             function check() {{\
                 fetch('{CHECK_NEW_PATH}?since=' + encodeURIComponent(since))\
                     .then(function (r) {{ return r.json(); }})\
                     .then(function (data) {{\
                         if (data.new_count > 0) {{\
                             var box = document.getElementById('new-tickets');\
                             box.innerHTML = data.new_count + ' new ticket(s). <a href=\"\">Refresh</a>';\
                             box.style.display = 'block';\
                         }}\
                     }})\
                     .catch(function () {{}});\
             }}\
             setInterval(check, 60000);\
         }})();\
         </script>",
        since = html_escape(since),
    )
}

pub fn dashboard(view: &DashboardView) -> String {
    let keep = view.page_params();
    let summaries = if view.search.is_empty() {
        format!(
            "<h2>Department Summary</h2>{departments}\
             <div class=\"card\"><h2>School/Office Summary</h2>{schools}</div>",
            departments = department_cards(&view.departments),
            schools = school_cards(view),
        )
    } else {
        String::new()
    };

    format!(
        "<h1>{title}</h1>{filters}{poll}{summaries}\
         <div class=\"card\"><h2>Active Tickets ({active_total})</h2>{active}{active_pages}</div>\
         <div class=\"card\"><h2>Resolved Tickets ({resolved_total})</h2>{resolved}{resolved_pages}</div>",
        title = view.view.title(),
        filters = filter_form(view),
        poll = poll_script(&view.since),
        active_total = view.active.total,
        active = ticket_table(&view.active.items, true, "No active tickets."),
        active_pages = ui::pagination(&view.active, STAFF_DASHBOARD_PATH, "page_active", &keep),
        resolved_total = view.resolved.total,
        resolved = ticket_table(&view.resolved.items, true, "No resolved tickets."),
        resolved_pages = ui::pagination(&view.resolved, STAFF_DASHBOARD_PATH, "page_resolved", &keep),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_view(role: Role, search: &str) -> DashboardView {
        DashboardView {
            role,
            view: FilterView::resolve(None, role),
            search: search.into(),
            years: vec![2025, 2024],
            year: 2025,
            quarter: 2,
            active: Page::empty(10),
            resolved: Page::empty(10),
            departments: Vec::new(),
            schools: Page::empty(10),
            since: "2025-05-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn test_export_link_only_for_admins() {
        let admin = dashboard(&empty_view(Role::Admin, ""));
        assert!(admin.contains(EXPORT_PATH));
        assert!(admin.contains("All System Tickets"));
        assert!(admin.contains("quarter=2"));

        let staff = dashboard(&empty_view(Role::Staff, ""));
        assert!(!staff.contains(EXPORT_PATH));
        assert!(staff.contains("My Managed Services Tickets"));
    }

    #[test]
    fn test_search_hides_summaries() {
        let html = dashboard(&empty_view(Role::Admin, "Alpha"));
        assert!(!html.contains("Department Summary"));
        assert!(html.contains("No active tickets."));

        let html = dashboard(&empty_view(Role::Admin, ""));
        assert!(html.contains("Department Summary"));
    }
}
