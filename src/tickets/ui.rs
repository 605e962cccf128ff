use serde_json::Value;
use std::collections::HashMap;

use super::forms::{requester_fields, FieldKind, FieldSpec, ServiceForm, SCHOOL_FIELD};
use super::storage::{TicketListRow, TicketView};
use crate::core::shared::models::{
    CannedResponse, Department, PersonalCannedResponse, School, Service, User,
};
use crate::core::shared::{html_escape, Page, Role, TicketStatus};
use crate::web::forms::FormErrors;
use crate::web::ui;

pub const NO_DETAILS: &str = "No additional details.";

pub fn department_picker(departments: &[Department]) -> String {
    let items: String = departments
        .iter()
        .map(|d| {
            format!(
                "<li><a class=\"btn\" href=\"/create-ticket/select-service/{id}\">{name}</a></li>",
                id = d.id,
                name = html_escape(&d.name),
            )
        })
        .collect();
    let list = if departments.is_empty() {
        ui::empty_state("No departments are available yet.")
    } else {
        format!("<ul class=\"picker\">{items}</ul>")
    };
    format!("<div class=\"card\"><h1>Select a Department</h1>{list}</div>")
}

pub fn service_picker(department: &Department, services: &[Service]) -> String {
    let items: String = services
        .iter()
        .map(|s| {
            format!(
                "<li><a class=\"btn\" href=\"/create-ticket/form/{id}\">{name}</a></li>",
                id = s.id,
                name = html_escape(&s.name),
            )
        })
        .collect();
    let list = if services.is_empty() {
        ui::empty_state("This department has no services yet.")
    } else {
        format!("<ul class=\"picker\">{items}</ul>")
    };
    format!(
        "<div class=\"card\"><h1>Select a Service for {name}</h1>{list}\
            <p><a href=\"/create-ticket/select-department\">&laquo; Back to departments</a></p>\
         </div>",
        name = html_escape(&department.name),
    )
}

fn spec_input(spec: &FieldSpec, values: &HashMap<String, String>, errors: &FormErrors) -> String {
    let value = values.get(spec.name).map(String::as_str).unwrap_or("");
    let error = errors.get(spec.name);
    match spec.kind {
        FieldKind::Text { .. } => ui::input_field("text", spec.name, spec.label, value, spec.required, error),
        FieldKind::TextArea { .. } => ui::textarea_field(spec.name, spec.label, value, spec.required, error),
        FieldKind::Email => ui::input_field("email", spec.name, spec.label, value, spec.required, error),
        FieldKind::Date => ui::input_field("date", spec.name, spec.label, value, spec.required, error),
        FieldKind::Time => ui::input_field("time", spec.name, spec.label, value, spec.required, error),
        FieldKind::Amount => ui::input_field("number", spec.name, spec.label, value, spec.required, error),
        FieldKind::Select(choices) => {
            let mut options = vec![(String::new(), "-- Select --".to_string())];
            options.extend(choices.iter().map(|c| (c.to_string(), c.to_string())));
            ui::select_field(spec.name, spec.label, &options, value, error)
        }
        FieldKind::File => {
            let mut html = ui::file_field(spec.name, spec.label, spec.required);
            if let Some(e) = error {
                html.push_str(&format!("<div class=\"error\">{}</div>", html_escape(e)));
            }
            html
        }
    }
}

/// The request form for one service. The CSRF field comes first so the
/// middleware finds it without reading past the uploads.
pub fn ticket_form(
    service: &Service,
    department: &Department,
    form: ServiceForm,
    values: &HashMap<String, String>,
    errors: &FormErrors,
    schools: &[School],
    csrf_input: &str,
) -> String {
    let requester: String = requester_fields()
        .iter()
        .map(|spec| spec_input(spec, values, errors))
        .collect();

    let mut school_options = vec![(String::new(), "-- Select School/Office --".to_string())];
    school_options.extend(schools.iter().map(|s| (s.id.to_string(), s.name.clone())));
    let school = ui::select_field(
        SCHOOL_FIELD,
        "School/Office",
        &school_options,
        values.get(SCHOOL_FIELD).map(String::as_str).unwrap_or(""),
        errors.get(SCHOOL_FIELD),
    );

    let specific: String = form
        .fields()
        .iter()
        .map(|spec| spec_input(spec, values, errors))
        .collect();

    format!(
        "<div class=\"card\"><h1>Request for {service_name}</h1>\
            <p class=\"muted\">{department_name}</p>\
            <form method=\"post\" action=\"/create-ticket/form/{id}\" enctype=\"multipart/form-data\">\
                {csrf_input}\
                <h2>Requester Information</h2>{requester}{school}\
                <h2>Request Details</h2>{specific}\
                <button type=\"submit\" class=\"btn\">Submit Request</button>\
            </form>\
         </div>",
        service_name = html_escape(&service.name),
        department_name = html_escape(&department.name),
        id = service.id,
    )
}

/// Ticket list. The staff variant adds requester, school and assignee columns.
pub fn ticket_table(rows: &[TicketListRow], staff: bool, empty_message: &str) -> String {
    if rows.is_empty() {
        return ui::empty_state(empty_message);
    }

    let header = if staff {
        "<tr><th>Ticket #</th><th>Service</th><th>Requester</th><th>School/Office</th>\
         <th>Assigned To</th><th>Status</th><th>Date Posted</th></tr>"
    } else {
        "<tr><th>Ticket #</th><th>Service</th><th>Status</th><th>Date Posted</th></tr>"
    };

    let body: String = rows
        .iter()
        .map(|row| {
            let ticket = &row.ticket;
            let number = format!(
                "<a href=\"/ticket/{}\">{}</a>",
                ticket.id,
                html_escape(&ticket.ticket_number)
            );
            let extra = if staff {
                format!(
                    "<td>{}</td><td>{}</td><td>{}</td>",
                    html_escape(&ticket.requester_name),
                    html_escape(row.school_name.as_deref().unwrap_or("N/A")),
                    html_escape(row.assigned_name.as_deref().unwrap_or("Unassigned")),
                )
            } else {
                String::new()
            };
            format!(
                "<tr><td>{number}</td><td>{service}</td>{extra}<td>{status}</td><td>{date}</td></tr>",
                service = html_escape(&row.service_name),
                status = ui::status_badge(ticket.status),
                date = ui::format_datetime(&ticket.date_posted),
            )
        })
        .collect();

    format!("<table><thead>{header}</thead><tbody>{body}</tbody></table>")
}

pub fn my_tickets(active: &Page<TicketListRow>, resolved: &Page<TicketListRow>, search: &str) -> String {
    let keep = [
        ("search", search.to_string()),
        ("page_active", active.page.to_string()),
        ("page_resolved", resolved.page.to_string()),
    ];
    format!(
        "<div class=\"card\"><h1>My Tickets</h1>\
            <form method=\"get\" action=\"/my-tickets\" class=\"search\">\
                <input type=\"text\" name=\"search\" value=\"{search_value}\" placeholder=\"Search ticket # or service\">\
                <button type=\"submit\" class=\"btn\">Search</button>\
            </form>\
         </div>\
         <div class=\"card\"><h2>Active Tickets ({active_total})</h2>{active_table}{active_pages}</div>\
         <div class=\"card\"><h2>Resolved Tickets ({resolved_total})</h2>{resolved_table}{resolved_pages}</div>",
        search_value = html_escape(search),
        active_total = active.total,
        active_table = ticket_table(&active.items, false, "You have no active tickets."),
        active_pages = ui::pagination(active, "/my-tickets", "page_active", &keep),
        resolved_total = resolved.total,
        resolved_table = ticket_table(&resolved.items, false, "You have no resolved tickets."),
        resolved_pages = ui::pagination(resolved, "/my-tickets", "page_resolved", &keep),
    )
}

/// Pretty-printed detail object, or the placeholder for an empty one.
pub fn details_pretty(details: &Value) -> String {
    let empty = match details {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        return NO_DETAILS.to_string();
    }
    serde_json::to_string_pretty(details).unwrap_or_else(|_| NO_DETAILS.to_string())
}

pub struct StaffTools<'a> {
    pub system_canned: &'a [CannedResponse],
    pub personal_canned: &'a [PersonalCannedResponse],
    pub managers: &'a [User],
    /// Pre-rendered delete button, shown to admins only.
    pub delete_button: Option<String>,
}

fn canned_picker(tools: &StaffTools<'_>, ticket_id: &str) -> String {
    let option = |title: &str, body: &str| {
        format!(
            "<option value=\"{}\">{}</option>",
            html_escape(body),
            html_escape(title)
        )
    };
    let system: String = tools
        .system_canned
        .iter()
        .map(|r| option(&r.title, &r.body))
        .collect();
    let personal: String = tools
        .personal_canned
        .iter()
        .map(|r| option(&r.title, &r.body))
        .collect();

    format!(
        "<div class=\"form-group\">\
            <label for=\"canned\">Insert Canned Response</label>\
            <select id=\"canned\" onchange=\"if(this.value){{var b=document.getElementById('body');b.value=b.value?b.value+'\\n\\n'+this.value:this.value;this.selectedIndex=0;}}\">\
                <option value=\"\">-- Choose a response --</option>\
                <optgroup label=\"System Responses\">{system}</optgroup>\
                <optgroup label=\"My Responses\">{personal}</optgroup>\
            </select>\
            <a href=\"/admin/my-responses?ticket_id={ticket_id}\">Manage my responses</a>\
         </div>"
    )
}

fn response_list(view: &TicketView, staff_view: bool) -> String {
    let items: String = view
        .responses
        .iter()
        .filter(|r| staff_view || !r.response.is_internal)
        .map(|r| {
            let (author, badge) = match &r.author {
                Some((name, role)) if *role != Role::User => (name.as_str(), " <span class=\"badge badge-progress\">Staff</span>"),
                Some((name, _)) => (name.as_str(), ""),
                None => ("Deleted user", ""),
            };
            let internal = if r.response.is_internal {
                " <span class=\"badge badge-open\">Internal note</span>"
            } else {
                ""
            };
            format!(
                "<div class=\"response\"><p><strong>{author}</strong>{badge}{internal} \
                 <span class=\"muted\">{date}</span></p><pre>{body}</pre></div>",
                author = html_escape(author),
                date = ui::format_datetime(&r.response.date_posted),
                body = html_escape(&r.response.body),
            )
        })
        .collect();
    if items.is_empty() {
        ui::empty_state("No responses yet.")
    } else {
        items
    }
}

fn staff_form(view: &TicketView, tools: &StaffTools<'_>, csrf_input: &str) -> String {
    let ticket = &view.ticket;
    let status_options: Vec<(String, String)> = TicketStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), s.as_str().to_string()))
        .collect();
    let mut staff_options = vec![("0".to_string(), "-- Unassigned --".to_string())];
    staff_options.extend(tools.managers.iter().map(|u| (u.id.to_string(), u.name.clone())));
    let assigned = ticket
        .assigned_staff_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "0".to_string());

    format!(
        "<form method=\"post\" action=\"/ticket/{id}\" enctype=\"multipart/form-data\">\
            {csrf_input}{canned}\
            {body}{internal}{status}{assignee}{attachment}\
            <button type=\"submit\" class=\"btn\">Update Ticket</button>\
         </form>",
        id = ticket.id,
        canned = canned_picker(tools, &ticket.id.to_string()),
        body = ui::textarea_field("body", "Response", "", false, None),
        internal = ui::checkbox_field("is_internal", "Internal note (hidden from requester)", "y", false),
        status = ui::select_field("status", "Status", &status_options, ticket.status.as_str(), None),
        assignee = ui::select_field("assigned_staff", "Assign To", &staff_options, &assigned, None),
        attachment = ui::file_field("attachment", "Attachment", false),
    )
}

fn requester_form(view: &TicketView, csrf_input: &str) -> String {
    if view.ticket.status == TicketStatus::Resolved {
        return ui::empty_state("This ticket is resolved and can no longer receive responses.");
    }
    format!(
        "<form method=\"post\" action=\"/ticket/{id}\" enctype=\"multipart/form-data\">\
            {csrf_input}{body}{attachment}\
            <button type=\"submit\" class=\"btn\">Add Response</button>\
         </form>",
        id = view.ticket.id,
        body = ui::textarea_field("body", "Your Response", "", false, None),
        attachment = ui::file_field("attachment", "Attachment", false),
    )
}

pub fn ticket_detail(view: &TicketView, staff_tools: Option<&StaffTools<'_>>, csrf_input: &str) -> String {
    let ticket = &view.ticket;
    let attachments: String = if view.attachments.is_empty() {
        ui::empty_state("No attachments.")
    } else {
        let items: String = view
            .attachments
            .iter()
            .map(|a| {
                format!(
                    "<li><a href=\"/static/uploads/{href}\" target=\"_blank\">{name}</a></li>",
                    href = urlencoding::encode(&a.filename),
                    name = html_escape(&a.filename),
                )
            })
            .collect();
        format!("<ul>{items}</ul>")
    };

    let actions = match staff_tools {
        Some(tools) => format!(
            "{}{}",
            staff_form(view, tools, csrf_input),
            tools.delete_button.as_deref().unwrap_or("")
        ),
        None => requester_form(view, csrf_input),
    };

    format!(
        "<div class=\"card\"><h1>Ticket {number} {status}</h1>\
            <table>\
                <tr><th>Department</th><td>{department}</td></tr>\
                <tr><th>Service</th><td>{service}</td></tr>\
                <tr><th>Requester</th><td>{requester} &lt;{email}&gt;</td></tr>\
                <tr><th>Contact</th><td>{contact}</td></tr>\
                <tr><th>School/Office</th><td>{school}</td></tr>\
                <tr><th>Assigned To</th><td>{assigned}</td></tr>\
                <tr><th>Date Posted</th><td>{date}</td></tr>\
            </table>\
            <h2>Details</h2><pre>{details}</pre>\
            <h2>Attachments</h2>{attachments}\
         </div>\
         <div class=\"card\"><h2>Responses</h2>{responses}</div>\
         <div class=\"card\"><h2>{action_title}</h2>{actions}</div>",
        number = html_escape(&ticket.ticket_number),
        status = ui::status_badge(ticket.status),
        department = html_escape(&view.department.name),
        service = html_escape(&view.service.name),
        requester = html_escape(&ticket.requester_name),
        email = html_escape(&ticket.requester_email),
        contact = html_escape(ticket.requester_contact.as_deref().unwrap_or("N/A")),
        school = html_escape(view.school_name.as_deref().unwrap_or("N/A")),
        assigned = html_escape(
            view.assigned_staff
                .as_ref()
                .map(|u| u.name.as_str())
                .unwrap_or("Unassigned")
        ),
        date = ui::format_datetime(&ticket.date_posted),
        details = html_escape(&details_pretty(&ticket.details)),
        responses = response_list(view, staff_tools.is_some()),
        action_title = if staff_tools.is_some() { "Update Ticket" } else { "Add a Response" },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::{Ticket, TicketResponse};
    use crate::tickets::storage::ResponseView;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn view(status: TicketStatus) -> TicketView {
        let department = Department {
            id: Uuid::new_v4(),
            name: "ICT".into(),
        };
        let service = Service {
            id: Uuid::new_v4(),
            name: "DepEd Email Account".into(),
            department_id: department.id,
        };
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: "ICT-2025-0001".into(),
            status,
            date_posted: Utc::now(),
            requester_name: "Ana <Reyes>".into(),
            requester_email: "ana@deped.gov.ph".into(),
            requester_contact: Some("09171234567".into()),
            details: json!({"request_type": "New Account"}),
            department_id: department.id,
            service_id: service.id,
            school_id: None,
            assigned_staff_id: None,
        };
        let response = |body: &str, is_internal: bool| ResponseView {
            response: TicketResponse {
                id: Uuid::new_v4(),
                body: body.into(),
                is_internal,
                date_posted: Utc::now(),
                user_id: None,
                ticket_id: ticket.id,
            },
            author: Some(("Staff One".into(), Role::Staff)),
        };
        TicketView {
            responses: vec![response("Public reply", false), response("Secret note", true)],
            ticket,
            department,
            service,
            school_name: None,
            assigned_staff: None,
            attachments: vec![],
        }
    }

    #[test]
    fn test_details_pretty() {
        assert_eq!(details_pretty(&json!({})), NO_DETAILS);
        assert_eq!(details_pretty(&Value::Null), NO_DETAILS);
        let pretty = details_pretty(&json!({"purpose": "Loan"}));
        assert!(pretty.contains("\"purpose\": \"Loan\""));
    }

    #[test]
    fn test_requester_does_not_see_internal_notes() {
        let html = ticket_detail(&view(TicketStatus::Open), None, "");
        assert!(html.contains("Public reply"));
        assert!(!html.contains("Secret note"));
        assert!(html.contains("Ana &lt;Reyes&gt;"));
        assert!(html.contains("Add Response"));
    }

    #[test]
    fn test_staff_sees_internal_notes_and_controls() {
        let tools = StaffTools {
            system_canned: &[],
            personal_canned: &[],
            managers: &[],
            delete_button: None,
        };
        let html = ticket_detail(&view(TicketStatus::Open), Some(&tools), "<input name=\"csrf_token\">");
        assert!(html.contains("Secret note"));
        assert!(html.contains("-- Unassigned --"));
        assert!(html.contains("name=\"status\""));
    }

    #[test]
    fn test_resolved_ticket_hides_requester_form() {
        let html = ticket_detail(&view(TicketStatus::Resolved), None, "");
        assert!(!html.contains("Add Response</button>"));
    }

    #[test]
    fn test_ticket_form_puts_csrf_first() {
        let v = view(TicketStatus::Open);
        let html = ticket_form(
            &v.service,
            &v.department,
            ServiceForm::for_service_name(&v.service.name),
            &HashMap::new(),
            &FormErrors::new(),
            &[],
            "<input type=\"hidden\" name=\"csrf_token\" value=\"t\">",
        );
        let csrf = html.find("csrf_token").expect("csrf field");
        let name = html.find("requester_name").expect("name field");
        assert!(csrf < name);
        assert!(html.contains("multipart/form-data"));
    }
}
