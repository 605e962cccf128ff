//! Reference data for a fresh database and the bootstrap admin account.
//!
//! Everything here is idempotent except system canned responses, which are
//! cleared and reseeded on every run.

use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::core::error::EservicesError;
use crate::core::shared::models::{AuthorizedEmail, CannedResponse, Department, School, Service, User};
use crate::core::shared::schema::{authorized_emails, canned_responses, departments, schools, services, users};
use crate::core::shared::Role;
use crate::security::password::hash_password;

pub const ADMIN_EMAIL: &str = "admin@deped.gov.ph";
pub const ADMIN_NAME: &str = "Administrator";

pub const SERVICES: [(&str, &[&str]); 6] = [
    (
        "ICT",
        &[
            "Issuances and Online Materials",
            "Repair, Maintenance and Troubleshoot of IT Equipment",
            "DepEd Email Account",
            "DPDS - DepEd Partnership Database System",
            "DCP - DepEd Computerization Program: After-sales",
            "other ICT - Technical Assistance Needed",
        ],
    ),
    (
        "Personnel",
        &[
            "Application for Leave of Absence",
            "Certificate of Employment",
            "Service Record",
            "GSIS BP Number",
        ],
    ),
    ("Legal Services", &["Certificate of NO-Pending Case"]),
    (
        "Office of the SDS",
        &[
            "Request for Approval of Locator Slip",
            "Request for Approval of Authority to Travel",
            "Request for Designation of Officer-in-Charge at the School",
            "Request for Substitute Teacher",
            "Alternative Delivery Mode",
        ],
    ),
    ("Accounting Unit", &["DepEd TCSD Provident Fund"]),
    ("Supply Office", &["Submission of Inventory Custodian Slip \u{2013} ICS"]),
];

pub const SCHOOLS: [&str; 5] = [
    "Alvindia Aguso Central ES",
    "Alvindia Aguso HS",
    "Villa Bacolor ES",
    "Yabutan ES",
    "Division Office",
];

pub const AUTHORIZED_EMAILS: [&str; 4] = [
    "icts.tarlaccity@deped.gov.ph",
    "esmeraldo.lingat@deped.gov.ph",
    "pedro.penduko@deped.gov.ph",
    ADMIN_EMAIL,
];

/// `(department, title, body)`, usable on any ticket of the department.
pub const DEPARTMENT_RESPONSES: [(&str, &str, &str); 2] = [
    (
        "ICT",
        "Transaction Completed",
        "Good day! Your request has been completed. Please check and let us know if you need further assistance.",
    ),
    (
        "Supply Office",
        "ICS Approved",
        "Good day! Your Inventory Custodian Slip has been reviewed and approved. You may claim the signed copy at the Supply Office.",
    ),
];

/// `(service, title, body)`, offered only on tickets of that service.
pub const SERVICE_RESPONSES: [(&str, &str, &str); 2] = [
    (
        "Application for Leave of Absence",
        "Leave Approved (with Soft Copy)",
        "Good day! Your application for leave has been approved. A soft copy of the approved form is attached for your reference.",
    ),
    (
        "GSIS BP Number",
        "GSIS BP Updated",
        "Good day! Your GSIS BP Number has been updated in our records.",
    ),
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub departments: usize,
    pub services: usize,
    pub schools: usize,
    pub authorized_emails: usize,
    pub canned_responses: usize,
}

fn department_id(conn: &mut PgConnection, name: &str) -> Result<Option<Uuid>, EservicesError> {
    departments::table
        .filter(departments::name.eq(name))
        .select(departments::id)
        .first(conn)
        .optional()
        .map_err(EservicesError::from)
}

fn ensure_department(conn: &mut PgConnection, name: &str) -> Result<(Uuid, bool), EservicesError> {
    if let Some(id) = department_id(conn, name)? {
        return Ok((id, false));
    }
    let department = Department {
        id: Uuid::new_v4(),
        name: name.to_string(),
    };
    diesel::insert_into(departments::table)
        .values(&department)
        .execute(conn)?;
    Ok((department.id, true))
}

fn ensure_service(conn: &mut PgConnection, name: &str, department_id: Uuid) -> Result<bool, EservicesError> {
    let existing: i64 = services::table
        .filter(services::name.eq(name))
        .filter(services::department_id.eq(department_id))
        .count()
        .get_result(conn)?;
    if existing > 0 {
        return Ok(false);
    }
    diesel::insert_into(services::table)
        .values(&Service {
            id: Uuid::new_v4(),
            name: name.to_string(),
            department_id,
        })
        .execute(conn)?;
    Ok(true)
}

/// Populates departments, services, schools, the registration allowlist and
/// system canned responses.
pub fn seed_database(conn: &mut PgConnection) -> Result<SeedReport, EservicesError> {
    conn.transaction(|conn| {
        let mut report = SeedReport::default();

        let cleared = diesel::delete(canned_responses::table).execute(conn)?;
        info!("Cleared {} old canned responses", cleared);

        for (department, service_names) in SERVICES {
            let (dept_id, created) = ensure_department(conn, department)?;
            report.departments += usize::from(created);
            for service in service_names {
                report.services += usize::from(ensure_service(conn, service, dept_id)?);
            }
        }
        info!("Departments and services seeded");

        report.schools = diesel::insert_into(schools::table)
            .values(
                SCHOOLS
                    .iter()
                    .map(|name| School {
                        id: Uuid::new_v4(),
                        name: name.to_string(),
                        school_id_code: None,
                    })
                    .collect::<Vec<_>>(),
            )
            .on_conflict(schools::name)
            .do_nothing()
            .execute(conn)?;
        info!("Schools seeded");

        report.authorized_emails = diesel::insert_into(authorized_emails::table)
            .values(
                AUTHORIZED_EMAILS
                    .iter()
                    .map(|email| AuthorizedEmail {
                        id: Uuid::new_v4(),
                        email: email.to_string(),
                    })
                    .collect::<Vec<_>>(),
            )
            .on_conflict(authorized_emails::email)
            .do_nothing()
            .execute(conn)?;
        info!("Authorized emails seeded");

        for (department, title, body) in DEPARTMENT_RESPONSES {
            if let Some(dept_id) = department_id(conn, department)? {
                report.canned_responses += diesel::insert_into(canned_responses::table)
                    .values(&CannedResponse {
                        id: Uuid::new_v4(),
                        title: title.to_string(),
                        body: body.to_string(),
                        department_id: dept_id,
                        service_id: None,
                    })
                    .execute(conn)?;
            }
        }
        for (service, title, body) in SERVICE_RESPONSES {
            let found: Option<(Uuid, Uuid)> = services::table
                .filter(services::name.eq(service))
                .select((services::id, services::department_id))
                .first(conn)
                .optional()?;
            if let Some((service_id, dept_id)) = found {
                report.canned_responses += diesel::insert_into(canned_responses::table)
                    .values(&CannedResponse {
                        id: Uuid::new_v4(),
                        title: title.to_string(),
                        body: body.to_string(),
                        department_id: dept_id,
                        service_id: Some(service_id),
                    })
                    .execute(conn)?;
            }
        }
        info!("Canned responses seeded");

        Ok(report)
    })
}

/// Creates the bootstrap admin. Returns `false` when the account already exists.
pub fn create_admin(conn: &mut PgConnection, password: &str) -> Result<bool, EservicesError> {
    let existing: i64 = users::table
        .filter(users::email.eq(ADMIN_EMAIL))
        .count()
        .get_result(conn)?;
    if existing > 0 {
        return Ok(false);
    }
    let admin = User::new(ADMIN_EMAIL, ADMIN_NAME, Role::Admin, Some(hash_password(password)?));
    diesel::insert_into(users::table).values(&admin).execute(conn)?;
    info!("Created admin user {}", ADMIN_EMAIL);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::forms::ServiceForm;
    use crate::tickets::storage::DEPARTMENT_ORDER;

    #[test]
    fn test_departments_follow_picker_order() {
        let seeded: Vec<&str> = SERVICES.iter().map(|(d, _)| *d).collect();
        assert_eq!(seeded, DEPARTMENT_ORDER.to_vec());
    }

    #[test]
    fn test_every_seeded_service_has_a_form() {
        let all: Vec<&str> = SERVICES.iter().flat_map(|(_, s)| s.iter().copied()).collect();
        assert_eq!(all.len(), 18);
        for name in all {
            assert_ne!(ServiceForm::for_service_name(name), ServiceForm::General, "{name}");
        }
    }

    #[test]
    fn test_canned_responses_point_at_seeded_names() {
        for (department, _, _) in DEPARTMENT_RESPONSES {
            assert!(SERVICES.iter().any(|(d, _)| *d == department));
        }
        for (service, _, _) in SERVICE_RESPONSES {
            assert!(SERVICES.iter().any(|(_, s)| s.contains(&service)));
        }
        assert!(AUTHORIZED_EMAILS.contains(&ADMIN_EMAIL));
    }
}
