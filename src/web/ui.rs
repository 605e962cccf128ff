//! Server-rendered HTML fragments shared by every page.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};

use crate::core::shared::models::User;
use crate::core::shared::{html_escape, Page, TicketStatus};
use crate::security::csrf::CSRF_FIELD;
use crate::web::flash::FlashMessage;

const STYLE: &str = "\
body{font-family:system-ui,-apple-system,Segoe UI,Roboto,sans-serif;margin:0;background:#f4f6f9;color:#212529}\
nav{background:#185D7A;color:#fff;padding:.75rem 1.5rem;display:flex;gap:1rem;align-items:center;flex-wrap:wrap}\
nav a{color:#fff;text-decoration:none}nav .brand{font-weight:700;margin-right:auto}\
main{max-width:1100px;margin:1.5rem auto;padding:0 1rem}\
.card{background:#fff;border-radius:6px;padding:1.25rem;margin-bottom:1rem;box-shadow:0 1px 3px rgba(0,0,0,.08)}\
.alert{padding:.75rem 1rem;border-radius:4px;margin-bottom:.75rem}\
.alert-success{background:#d1e7dd}.alert-info{background:#cff4fc}.alert-warning{background:#fff3cd}.alert-danger{background:#f8d7da}\
table{width:100%;border-collapse:collapse}th,td{padding:.5rem;border-bottom:1px solid #dee2e6;text-align:left;vertical-align:top}\
.badge{display:inline-block;padding:.2rem .5rem;border-radius:3px;font-size:.8rem;color:#fff}\
.badge-open{background:#0d6efd}.badge-progress{background:#F0AD4E}.badge-resolved{background:#198754}\
.form-group{margin-bottom:.9rem}.form-group label{display:block;font-weight:600;margin-bottom:.25rem}\
input[type=text],input[type=email],input[type=password],input[type=date],input[type=time],input[type=number],select,textarea{width:100%;padding:.45rem;border:1px solid #ced4da;border-radius:4px;box-sizing:border-box}\
.error{color:#b02a37;font-size:.85rem}.muted{color:#6c757d}\
.btn{display:inline-block;padding:.45rem .9rem;border:0;border-radius:4px;background:#185D7A;color:#fff;cursor:pointer;text-decoration:none}\
.btn-danger{background:#D9534F}.btn-secondary{background:#6c757d}.inline{display:inline}\
.pagination{display:flex;gap:.35rem;margin-top:.75rem}.pagination a,.pagination span{padding:.25rem .6rem;border:1px solid #dee2e6;border-radius:3px;text-decoration:none}\
.pagination .current{background:#185D7A;color:#fff}\
.bar{height:.6rem;border-radius:3px;background:#e9ecef}.bar>div{height:100%;border-radius:3px}\
pre{white-space:pre-wrap;background:#f8f9fa;padding:.75rem;border-radius:4px}";

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}

fn nav_links(user: Option<&User>) -> String {
    let mut links = vec![(
        "/create-ticket/select-department",
        "New Request",
    )];
    match user {
        Some(user) if user.role.is_admin() => {
            links.push(("/admin/staff-dashboard", "Staff Dashboard"));
            links.push(("/admin/dashboard", "Admin"));
            links.push(("/admin/my-responses", "My Responses"));
        }
        Some(user) if user.role.is_staff_or_admin() => {
            links.push(("/admin/staff-dashboard", "Staff Dashboard"));
            links.push(("/admin/my-responses", "My Responses"));
        }
        Some(_) => links.push(("/my-tickets", "My Tickets")),
        None => {}
    }

    let mut html: String = links
        .iter()
        .map(|(href, label)| format!("<a href=\"{href}\">{label}</a>"))
        .collect();

    match user {
        Some(user) => html.push_str(&format!(
            "<a href=\"/profile\">{name}</a><a href=\"/auth/logout\">Logout</a>",
            name = html_escape(&user.name)
        )),
        None => html.push_str(
            "<a href=\"/auth/login\">Login</a><a href=\"/auth/register\">Register</a>",
        ),
    }
    html
}

pub fn render_flashes(messages: &[FlashMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "<div class=\"alert {class}\" role=\"alert\">{text}</div>",
                class = m.level.css_class(),
                text = html_escape(&m.message)
            )
        })
        .collect()
}

/// Full HTML document around `body`.
pub fn document(title: &str, user: Option<&User>, flashes: &[FlashMessage], body: &str) -> String {
    format!(
        "<!DOCTYPE html>\
        <html lang=\"en\">\
        <head>\
            <meta charset=\"utf-8\">\
            <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
            <title>{title} | TCSD e-Services</title>\
            <style>{style}</style>\
        </head>\
        <body>\
            <nav><a class=\"brand\" href=\"/\">TCSD e-Services</a>{nav}</nav>\
            <main>{flashes}{body}</main>\
        </body>\
        </html>",
        title = html_escape(title),
        style = STYLE,
        nav = nav_links(user),
        flashes = render_flashes(flashes),
        body = body,
    )
}

pub fn error_page(status: StatusCode) -> String {
    let (heading, message) = match status {
        StatusCode::NOT_FOUND => (
            "Page Not Found",
            "The page you are looking for does not exist or has been moved.",
        ),
        StatusCode::FORBIDDEN => (
            "Access Denied",
            "You do not have permission to perform this action.",
        ),
        StatusCode::TOO_MANY_REQUESTS => (
            "Too Many Requests",
            "You have made too many requests. Please wait a moment and try again.",
        ),
        StatusCode::BAD_REQUEST => ("Bad Request", "The request could not be processed."),
        _ => (
            "Something Went Wrong",
            "An unexpected error occurred. Our team has been notified.",
        ),
    };
    let body = format!(
        "<div class=\"card\">\
            <h1>{code} - {heading}</h1>\
            <p>{message}</p>\
            <p><a class=\"btn\" href=\"/\">Return Home</a></p>\
        </div>",
        code = status.as_u16(),
    );
    document(heading, None, &[], &body)
}

pub fn csrf_input(token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{CSRF_FIELD}\" value=\"{}\">",
        html_escape(token)
    )
}

/// A one-button POST form, used for deletes.
pub fn post_button(action: &str, csrf_token: &str, label: &str, confirm: &str) -> String {
    format!(
        "<form class=\"inline\" method=\"post\" action=\"{action}\" onsubmit=\"return confirm('{confirm}');\">\
            {csrf}<button type=\"submit\" class=\"btn btn-danger\">{label}</button>\
        </form>",
        action = html_escape(action),
        confirm = html_escape(confirm),
        csrf = csrf_input(csrf_token),
        label = html_escape(label),
    )
}

pub fn status_badge(status: TicketStatus) -> String {
    let class = match status {
        TicketStatus::Open => "badge-open",
        TicketStatus::InProgress => "badge-progress",
        TicketStatus::Resolved => "badge-resolved",
    };
    format!("<span class=\"badge {class}\">{status}</span>")
}

pub fn empty_state(message: &str) -> String {
    format!("<p class=\"muted\">{}</p>", html_escape(message))
}

fn field_error(error: Option<&str>) -> String {
    error
        .map(|e| format!("<div class=\"error\">{}</div>", html_escape(e)))
        .unwrap_or_default()
}

/// `<input>` of any single-line type.
pub fn input_field(
    input_type: &str,
    name: &str,
    label: &str,
    value: &str,
    required: bool,
    error: Option<&str>,
) -> String {
    format!(
        "<div class=\"form-group\">\
            <label for=\"{name}\">{label}</label>\
            <input type=\"{input_type}\" id=\"{name}\" name=\"{name}\" value=\"{value}\"{req}>\
            {error}\
        </div>",
        label = html_escape(label),
        value = html_escape(value),
        req = if required { " required" } else { "" },
        error = field_error(error),
    )
}

pub fn textarea_field(name: &str, label: &str, value: &str, required: bool, error: Option<&str>) -> String {
    format!(
        "<div class=\"form-group\">\
            <label for=\"{name}\">{label}</label>\
            <textarea id=\"{name}\" name=\"{name}\" rows=\"5\"{req}>{value}</textarea>\
            {error}\
        </div>",
        label = html_escape(label),
        value = html_escape(value),
        req = if required { " required" } else { "" },
        error = field_error(error),
    )
}

/// `options` are `(value, text)` pairs.
pub fn select_field(
    name: &str,
    label: &str,
    options: &[(String, String)],
    selected: &str,
    error: Option<&str>,
) -> String {
    let options: String = options
        .iter()
        .map(|(value, text)| {
            format!(
                "<option value=\"{v}\"{sel}>{t}</option>",
                v = html_escape(value),
                sel = if value == selected { " selected" } else { "" },
                t = html_escape(text),
            )
        })
        .collect();
    format!(
        "<div class=\"form-group\">\
            <label for=\"{name}\">{label}</label>\
            <select id=\"{name}\" name=\"{name}\">{options}</select>\
            {error}\
        </div>",
        label = html_escape(label),
        error = field_error(error),
    )
}

pub fn checkbox_field(name: &str, label: &str, value: &str, checked: bool) -> String {
    format!(
        "<div><label><input type=\"checkbox\" name=\"{name}\" value=\"{value}\"{c}> {label}</label></div>",
        value = html_escape(value),
        c = if checked { " checked" } else { "" },
        label = html_escape(label),
    )
}

pub fn file_field(name: &str, label: &str, required: bool) -> String {
    format!(
        "<div class=\"form-group\">\
            <label for=\"{name}\">{label}{star}</label>\
            <input type=\"file\" id=\"{name}\" name=\"{name}\">\
        </div>",
        label = html_escape(label),
        star = if required { " *" } else { "" },
    )
}

/// `?a=1&b=2` with empty values dropped.
pub fn query_string(params: &[(&str, String)]) -> String {
    let parts: Vec<String> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

/// Page links for one paginated list; `keep` carries the other query
/// parameters so independent lists keep their position.
pub fn pagination<T>(page: &Page<T>, path: &str, param: &str, keep: &[(&str, String)]) -> String {
    if page.pages() <= 1 {
        return String::new();
    }

    let link = |target: i64| {
        let mut params: Vec<(&str, String)> =
            keep.iter().filter(|(k, _)| *k != param).cloned().collect();
        params.push((param, target.to_string()));
        format!("{path}{}", query_string(&params))
    };

    let mut html = String::from("<div class=\"pagination\">");
    if page.has_prev() {
        html.push_str(&format!(
            "<a href=\"{}\">&laquo; Prev</a>",
            html_escape(&link(page.page - 1))
        ));
    }
    for n in 1..=page.pages() {
        if n == page.page {
            html.push_str(&format!("<span class=\"current\">{n}</span>"));
        } else if n <= 2 || n > page.pages() - 2 || (n - page.page).abs() <= 2 {
            html.push_str(&format!("<a href=\"{}\">{n}</a>", html_escape(&link(n))));
        } else if (n - page.page).abs() == 3 {
            html.push_str("<span>&hellip;</span>");
        }
    }
    if page.has_next() {
        html.push_str(&format!(
            "<a href=\"{}\">Next &raquo;</a>",
            html_escape(&link(page.page + 1))
        ));
    }
    html.push_str("</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::flash::FlashLevel;

    #[test]
    fn test_error_page_statuses() {
        assert!(error_page(StatusCode::NOT_FOUND).contains("404 - Page Not Found"));
        assert!(error_page(StatusCode::FORBIDDEN).contains("Access Denied"));
        assert!(error_page(StatusCode::TOO_MANY_REQUESTS).contains("Too Many Requests"));
        assert!(error_page(StatusCode::INTERNAL_SERVER_ERROR).contains("500"));
    }

    #[test]
    fn test_flashes_are_escaped() {
        let html = render_flashes(&[FlashMessage {
            level: FlashLevel::Danger,
            message: "<script>".into(),
        }]);
        assert!(html.contains("alert-danger"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_query_string_drops_empty() {
        assert_eq!(
            query_string(&[("search", "a b".into()), ("year", String::new())]),
            "?search=a%20b"
        );
        assert_eq!(query_string(&[]), "");
    }

    #[test]
    fn test_pagination_keeps_other_params() {
        let page = Page {
            items: vec![(); 10],
            page: 2,
            per_page: 10,
            total: 35,
        };
        let html = pagination(
            &page,
            "/my-tickets",
            "page_active",
            &[("page_resolved", "3".into()), ("page_active", "2".into())],
        );
        assert!(html.contains("/my-tickets?page_resolved=3&amp;page_active=1"));
        assert!(html.contains("/my-tickets?page_resolved=3&amp;page_active=3"));
        assert!(html.contains("<span class=\"current\">2</span>"));

        let single = Page {
            items: vec![(); 3],
            page: 1,
            per_page: 10,
            total: 3,
        };
        assert!(pagination(&single, "/x", "page", &[]).is_empty());
    }

    #[test]
    fn test_nav_depends_on_role() {
        let staff = User::new("staff@deped.gov.ph", "Staff", crate::core::shared::Role::Staff, None);
        let nav = nav_links(Some(&staff));
        assert!(nav.contains("/admin/staff-dashboard"));
        assert!(!nav.contains("/admin/dashboard\""));
        assert!(nav_links(None).contains("/auth/login"));
    }
}
