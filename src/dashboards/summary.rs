//! Per-department and per-school ticket tallies for the dashboard cards.

use std::collections::HashMap;
use uuid::Uuid;

use crate::core::shared::models::{Department, Service};
use crate::core::shared::utils::page_window;
use crate::core::shared::{Page, TicketStatus};

pub const PALETTE: [&str; 8] = [
    "#FE9321", "#6FE3CC", "#185D7A", "#C8DB2A", "#EF4687", "#5BC0DE", "#F0AD4E", "#D9534F",
];

/// The columns of a scoped ticket the summaries need.
#[derive(Debug, Clone, Copy)]
pub struct ScopedTicket {
    pub service_id: Uuid,
    pub status: TicketStatus,
    pub school_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub active: i64,
    pub resolved: i64,
    pub total: i64,
}

impl Tally {
    fn add(&mut self, status: TicketStatus) {
        self.total += 1;
        if status.is_active() {
            self.active += 1;
        } else {
            self.resolved += 1;
        }
    }

    /// Whole percent, rounded down.
    pub fn resolved_percent(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            self.resolved * 100 / self.total
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSummary {
    pub name: String,
    pub tally: Tally,
    pub color: &'static str,
}

#[derive(Debug, Clone)]
pub struct DepartmentSummary {
    pub name: String,
    pub services: Vec<ServiceSummary>,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct SchoolServiceSummary {
    pub name: String,
    pub tally: Tally,
}

#[derive(Debug, Clone)]
pub struct SchoolSummary {
    pub name: String,
    pub total: i64,
    pub services: Vec<SchoolServiceSummary>,
}

/// One card per department with at least one visible service. Every visible
/// service is listed, including those without tickets in scope.
pub fn department_summary(
    departments: &[Department],
    services: &[Service],
    visible: Option<&[Uuid]>,
    tickets: &[ScopedTicket],
) -> Vec<DepartmentSummary> {
    let mut per_service: HashMap<Uuid, Tally> = HashMap::new();
    for ticket in tickets {
        per_service.entry(ticket.service_id).or_default().add(ticket.status);
    }

    let mut departments: Vec<&Department> = departments.iter().collect();
    departments.sort_by(|a, b| a.name.cmp(&b.name));

    departments
        .into_iter()
        .filter_map(|department| {
            let mut in_department: Vec<&Service> = services
                .iter()
                .filter(|s| s.department_id == department.id)
                .filter(|s| visible.map_or(true, |ids| ids.contains(&s.id)))
                .collect();
            if in_department.is_empty() {
                return None;
            }
            in_department.sort_by(|a, b| a.name.cmp(&b.name));

            let services: Vec<ServiceSummary> = in_department
                .iter()
                .enumerate()
                .map(|(i, service)| ServiceSummary {
                    name: service.name.clone(),
                    tally: per_service.get(&service.id).copied().unwrap_or_default(),
                    color: PALETTE[i % PALETTE.len()],
                })
                .collect();
            let total = services.iter().map(|s| s.tally.total).sum();
            Some(DepartmentSummary {
                name: department.name.clone(),
                services,
                total,
            })
        })
        .collect()
}

/// Schools with tickets in scope, busiest first (ties by name), one page at
/// a time. Tickets without a school are not counted.
pub fn school_summary(
    school_names: &HashMap<Uuid, String>,
    service_names: &HashMap<Uuid, String>,
    tickets: &[ScopedTicket],
    requested_page: Option<i64>,
    per_page: i64,
) -> Page<SchoolSummary> {
    let mut per_school: HashMap<Uuid, HashMap<Uuid, Tally>> = HashMap::new();
    for ticket in tickets {
        if let Some(school_id) = ticket.school_id {
            per_school
                .entry(school_id)
                .or_default()
                .entry(ticket.service_id)
                .or_default()
                .add(ticket.status);
        }
    }

    let mut schools: Vec<SchoolSummary> = per_school
        .into_iter()
        .filter_map(|(school_id, by_service)| {
            let name = school_names.get(&school_id)?.clone();
            let mut services: Vec<SchoolServiceSummary> = by_service
                .into_iter()
                .map(|(service_id, tally)| SchoolServiceSummary {
                    name: service_names.get(&service_id).cloned().unwrap_or_default(),
                    tally,
                })
                .collect();
            services.sort_by(|a, b| a.name.cmp(&b.name));
            let total = services.iter().map(|s| s.tally.total).sum();
            Some(SchoolSummary {
                name,
                total,
                services,
            })
        })
        .collect();
    schools.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

    let total = schools.len() as i64;
    let (page, offset) = page_window(requested_page, per_page);
    let items = schools
        .into_iter()
        .skip(offset as usize)
        .take(per_page.max(1) as usize)
        .collect();
    Page {
        items,
        page,
        per_page,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn department(name: &str) -> Department {
        Department {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    fn service(name: &str, department: &Department) -> Service {
        Service {
            id: Uuid::new_v4(),
            name: name.into(),
            department_id: department.id,
        }
    }

    fn ticket(service: &Service, status: TicketStatus, school: Option<Uuid>) -> ScopedTicket {
        ScopedTicket {
            service_id: service.id,
            status,
            school_id: school,
        }
    }

    #[test]
    fn test_department_summary_counts_and_colors() {
        let ict = department("ICT");
        let legal = department("Legal Services");
        let email = service("DepEd Email Account", &ict);
        let computer = service("Computer Repair", &ict);
        let cases = service("Certificate of No Pending Case", &legal);

        let tickets = vec![
            ticket(&email, TicketStatus::Open, None),
            ticket(&email, TicketStatus::Resolved, None),
            ticket(&email, TicketStatus::InProgress, None),
            ticket(&computer, TicketStatus::Resolved, None),
        ];
        let summary = department_summary(
            &[legal.clone(), ict.clone()],
            &[email.clone(), computer.clone(), cases.clone()],
            None,
            &tickets,
        );

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].name, "ICT");
        assert_eq!(summary[0].total, 4);
        let names: Vec<&str> = summary[0].services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Computer Repair", "DepEd Email Account"]);
        assert_eq!(summary[0].services[0].color, PALETTE[0]);
        assert_eq!(summary[0].services[1].color, PALETTE[1]);

        let email_tally = summary[0].services[1].tally;
        assert_eq!(
            email_tally,
            Tally {
                active: 2,
                resolved: 1,
                total: 3
            }
        );
        assert_eq!(email_tally.resolved_percent(), 33);

        assert_eq!(summary[1].name, "Legal Services");
        assert_eq!(summary[1].total, 0);
        assert_eq!(summary[1].services[0].tally.resolved_percent(), 0);
    }

    #[test]
    fn test_department_summary_respects_visible_services() {
        let ict = department("ICT");
        let legal = department("Legal Services");
        let email = service("DepEd Email Account", &ict);
        let cases = service("Certificate of No Pending Case", &legal);

        let summary = department_summary(
            &[ict.clone(), legal.clone()],
            &[email.clone(), cases.clone()],
            Some(&[email.id]),
            &[ticket(&email, TicketStatus::Open, None)],
        );
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].name, "ICT");
        assert_eq!(summary[0].services.len(), 1);
    }

    #[test]
    fn test_school_summary_orders_and_paginates() {
        let ict = department("ICT");
        let email = service("DepEd Email Account", &ict);
        let repair = service("Computer Repair", &ict);
        let service_names: HashMap<Uuid, String> = [
            (email.id, email.name.clone()),
            (repair.id, repair.name.clone()),
        ]
        .into_iter()
        .collect();

        let alpha = Uuid::new_v4();
        let beta = Uuid::new_v4();
        let gamma = Uuid::new_v4();
        let school_names: HashMap<Uuid, String> = [
            (alpha, "Alpha ES".to_string()),
            (beta, "Beta NHS".to_string()),
            (gamma, "Gamma ES".to_string()),
        ]
        .into_iter()
        .collect();

        let tickets = vec![
            ticket(&email, TicketStatus::Open, Some(gamma)),
            ticket(&repair, TicketStatus::Resolved, Some(gamma)),
            ticket(&email, TicketStatus::Open, Some(beta)),
            ticket(&email, TicketStatus::Open, Some(alpha)),
            ticket(&email, TicketStatus::Open, None),
        ];

        let first = school_summary(&school_names, &service_names, &tickets, None, 2);
        assert_eq!(first.total, 3);
        assert_eq!(first.pages(), 2);
        let names: Vec<&str> = first.items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Gamma ES", "Alpha ES"]);
        assert_eq!(first.items[0].total, 2);
        assert_eq!(first.items[0].services[0].name, "Computer Repair");
        assert_eq!(first.items[0].services[0].tally.resolved, 1);

        let second = school_summary(&school_names, &service_names, &tickets, Some(2), 2);
        assert_eq!(second.page, 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "Beta NHS");

        let past_end = school_summary(&school_names, &service_names, &tickets, Some(9), 2);
        assert_eq!(past_end.page, 9);
        assert_eq!(past_end.total, 3);
        assert!(past_end.items.is_empty());
    }
}
