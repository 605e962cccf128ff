//! The self-registration allowlist.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Form,
};
use diesel::prelude::*;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::core::error::EservicesError;
use crate::core::shared::models::AuthorizedEmail;
use crate::core::shared::schema::authorized_emails;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ilike_pattern, page_window, parse_page};
use crate::core::shared::{html_escape, Page};
use crate::security::session::AdminUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::{MultipartForm, PageContext};
use crate::web::ui;

pub const LIST_PATH: &str = "/admin/authorized-emails";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<String>,
}

impl ListQuery {
    fn search(&self) -> String {
        self.search.as_deref().unwrap_or("").trim().to_string()
    }

    fn page(&self) -> Option<i64> {
        parse_page(self.page.as_deref())
    }

    /// The list URL at the same search and page.
    fn back(&self) -> String {
        let page = self.page().unwrap_or(1).max(1);
        format!(
            "{LIST_PATH}{}",
            ui::query_string(&[("search", self.search()), ("page", page.to_string())])
        )
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct AddEmailForm {
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
}

/// Result of reading an allowlist CSV.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BulkImport {
    pub added: Vec<String>,
    pub skipped: usize,
}

/// Takes the first column of each row, trimmed and lowercased. Addresses
/// already allowed or repeated within the file are skipped; blank rows are
/// ignored.
pub fn parse_bulk_emails(data: &[u8], existing: &HashSet<String>) -> Result<BulkImport, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut seen = existing.clone();
    let mut import = BulkImport::default();

    for record in reader.records() {
        let record = record?;
        let Some(first) = record.get(0) else {
            continue;
        };
        let email = first.trim().to_lowercase();
        if email.is_empty() {
            continue;
        }
        if seen.insert(email.clone()) {
            import.added.push(email);
        } else {
            import.skipped += 1;
        }
    }
    Ok(import)
}

fn render_list(
    ctx: &PageContext,
    query: &ListQuery,
    emails: &Page<AuthorizedEmail>,
    add_value: &str,
    errors: &FormErrors,
) -> Response {
    let search = query.search();
    let action = html_escape(&query.back());
    let rows: String = emails
        .items
        .iter()
        .map(|e| {
            format!(
                "<tr><td><input type=\"checkbox\" name=\"email_ids\" value=\"{id}\" form=\"bulk-delete\"></td>\
                 <td>{email}</td><td>{delete}</td></tr>",
                id = e.id,
                email = html_escape(&e.email),
                delete = ui::post_button(
                    &format!("/admin/authorized-emails/{}/delete{}", e.id, ui::query_string(&[
                        ("search", search.clone()),
                        ("page", emails.page.to_string()),
                    ])),
                    &ctx.csrf_token,
                    "Remove",
                    "Remove this email?",
                ),
            )
        })
        .collect();
    let table = if emails.items.is_empty() {
        ui::empty_state("No authorized emails found.")
    } else {
        format!(
            "<form id=\"bulk-delete\" method=\"post\" action=\"{action}\">{csrf}\
                <button type=\"submit\" name=\"delete_selected\" value=\"1\" class=\"btn btn-danger\" \
                 onclick=\"return confirm('Delete the selected emails?');\">Delete Selected</button>\
             </form>\
             <table><thead><tr><th></th><th>Email</th><th></th></tr></thead><tbody>{rows}</tbody></table>{pages}",
            csrf = ctx.csrf_input(),
            pages = ui::pagination(emails, LIST_PATH, "page", &[("search", search.clone())]),
        )
    };

    let body = format!(
        "<div class=\"card\"><h1>Manage Authorized Emails</h1>\
            <form method=\"post\" action=\"{LIST_PATH}\">{csrf}{email}\
                <button type=\"submit\" name=\"submit\" value=\"1\" class=\"btn\">Authorize Email</button>\
            </form>\
         </div>\
         <div class=\"card\"><h2>Bulk Upload</h2>\
            <p class=\"muted\">CSV file with one email address in the first column.</p>\
            <form method=\"post\" action=\"/admin/authorized-emails/bulk\" enctype=\"multipart/form-data\">{csrf}\
                {file}<button type=\"submit\" class=\"btn\">Upload</button>\
            </form>\
         </div>\
         <div class=\"card\">\
            <form method=\"get\" action=\"{LIST_PATH}\">{search_field}<button type=\"submit\" class=\"btn\">Search</button></form>\
            {table}\
         </div>",
        csrf = ctx.csrf_input(),
        email = ui::input_field("email", "email", "Email", add_value, true, errors.get("email")),
        file = ui::file_field("csv_file", "CSV File", true),
        search_field = ui::input_field("text", "search", "Search", &search, false, None),
    );
    ctx.render("Manage Authorized Emails", &body).into_response()
}

async fn load_page(
    state: &AppState,
    search: String,
    requested: Option<i64>,
) -> Result<Page<AuthorizedEmail>, EservicesError> {
    let per_page = state.config.pagination.emails_per_page;
    state
        .db(move |conn| {
            let filtered = || {
                let mut query = authorized_emails::table.into_boxed();
                if !search.is_empty() {
                    query = query.filter(authorized_emails::email.ilike(ilike_pattern(&search)));
                }
                query
            };
            let total: i64 = filtered().count().get_result(conn)?;
            let (page, offset) = page_window(requested, per_page);
            let items = filtered()
                .order(authorized_emails::email.asc())
                .limit(per_page)
                .offset(offset)
                .select(AuthorizedEmail::as_select())
                .load(conn)?;
            Ok(Page {
                items,
                page,
                per_page,
                total,
            })
        })
        .await
}

pub async fn list_emails(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    ctx: PageContext,
    Query(query): Query<ListQuery>,
) -> Result<Response, EservicesError> {
    let emails = load_page(&state, query.search(), query.page()).await?;
    Ok(render_list(&ctx, &query, &emails, "", &FormErrors::new()))
}

/// Both the single-address form and "Delete Selected" post here.
pub async fn submit_emails(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Query(query): Query<ListQuery>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, EservicesError> {
    let field = |name: &str| pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());

    if field("delete_selected").is_some() {
        let ids: Vec<Uuid> = pairs
            .iter()
            .filter(|(k, _)| k == "email_ids")
            .filter_map(|(_, v)| Uuid::parse_str(v.trim()).ok())
            .collect();
        if ids.is_empty() {
            return Ok(ctx.redirect_with(FlashLevel::Warning, "No emails selected.", &query.back()));
        }
        let count = state
            .db(move |conn| {
                diesel::delete(authorized_emails::table.filter(authorized_emails::id.eq_any(ids)))
                    .execute(conn)
                    .map_err(EservicesError::from)
            })
            .await?;
        info!("Admin {} deleted {} authorized emails via bulk.", admin.email, count);
        return Ok(ctx.redirect_with(
            FlashLevel::Success,
            format!("{count} email(s) deleted."),
            &query.back(),
        ));
    }

    let form = AddEmailForm {
        email: field("email").unwrap_or("").trim().to_lowercase(),
    };
    let mut errors = form.validate().map(|_| FormErrors::new()).unwrap_or_else(FormErrors::from);

    if errors.is_empty() {
        let email = form.email.clone();
        let added = state
            .db(move |conn| {
                let inserted = diesel::insert_into(authorized_emails::table)
                    .values(&AuthorizedEmail {
                        id: Uuid::new_v4(),
                        email,
                    })
                    .on_conflict(authorized_emails::email)
                    .do_nothing()
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await?;
        if added {
            info!("Admin {} added authorized email: {}", admin.email, form.email);
            return Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("Email {} authorized.", form.email),
                LIST_PATH,
            ));
        }
        errors.insert("email", "That email is already authorized.");
    }

    let emails = load_page(&state, query.search(), query.page()).await?;
    Ok(render_list(&ctx, &query, &emails, &form.email, &errors))
}

pub async fn bulk_upload(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    form: MultipartForm,
) -> Result<Response, EservicesError> {
    let Some(file) = form.file("csv_file") else {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "Please choose a CSV file.", LIST_PATH));
    };
    if !file.filename.to_lowercase().ends_with(".csv") {
        return Ok(ctx.redirect_with(FlashLevel::Danger, "CSV files only!", LIST_PATH));
    }

    let data = file.data.clone();
    let result = state
        .db(move |conn| {
            let existing: HashSet<String> = authorized_emails::table
                .select(authorized_emails::email)
                .load::<String>(conn)?
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect();
            let import = match parse_bulk_emails(&data, &existing) {
                Ok(import) => import,
                Err(e) => return Ok(Err(e.to_string())),
            };
            let rows: Vec<AuthorizedEmail> = import
                .added
                .iter()
                .map(|email| AuthorizedEmail {
                    id: Uuid::new_v4(),
                    email: email.clone(),
                })
                .collect();
            if !rows.is_empty() {
                diesel::insert_into(authorized_emails::table)
                    .values(&rows)
                    .on_conflict_do_nothing()
                    .execute(conn)?;
            }
            Ok(Ok(import))
        })
        .await;

    match result {
        Ok(Ok(import)) => {
            info!(
                "Admin {} bulk email upload. Added: {}, Skipped: {}.",
                admin.email,
                import.added.len(),
                import.skipped
            );
            Ok(ctx.redirect_with(
                FlashLevel::Info,
                format!(
                    "Bulk upload complete. Added: {}. Skipped: {}.",
                    import.added.len(),
                    import.skipped
                ),
                LIST_PATH,
            ))
        }
        Ok(Err(message)) => {
            error!("Error bulk email upload by {}: {}", admin.email, message);
            Ok(ctx.redirect_with(
                FlashLevel::Danger,
                format!("Error processing bulk upload: {message}"),
                LIST_PATH,
            ))
        }
        Err(e) => {
            error!("Error bulk email upload by {}: {}", admin.email, e);
            Ok(ctx.redirect_with(
                FlashLevel::Danger,
                "Error processing bulk upload: the upload could not be saved.",
                LIST_PATH,
            ))
        }
    }
}

pub async fn delete_email(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ctx: PageContext,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Response, EservicesError> {
    let removed = state
        .db(move |conn| {
            let email: Option<String> = authorized_emails::table
                .find(id)
                .select(authorized_emails::email)
                .first(conn)
                .optional()?;
            if email.is_some() {
                diesel::delete(authorized_emails::table.find(id)).execute(conn)?;
            }
            Ok(email)
        })
        .await?;

    match removed {
        Some(email) => {
            info!("Admin {} deleted authorized email: {}", admin.email, email);
            Ok(ctx.redirect_with(
                FlashLevel::Success,
                format!("Email {email} removed."),
                &query.back(),
            ))
        }
        None => {
            warn!(
                "Admin {} tried deleting non-existent auth email ID: {}",
                admin.email, id
            );
            Ok(ctx.redirect_with(FlashLevel::Danger, "Email not found.", &query.back()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_parse_counts_added_and_skipped() {
        let existing: HashSet<String> = ["old@deped.gov.ph".to_string()].into_iter().collect();
        let data = b"New@DepEd.gov.ph,Juan\n old@deped.gov.ph \n\nnew@deped.gov.ph\nsecond@deped.gov.ph,extra,cols\n";
        let import = parse_bulk_emails(data, &existing).expect("parse");
        assert_eq!(
            import,
            BulkImport {
                added: vec!["new@deped.gov.ph".into(), "second@deped.gov.ph".into()],
                skipped: 2,
            }
        );
    }

    #[test]
    fn test_bulk_parse_rejects_non_utf8() {
        let data = [0xff_u8, 0xfe, b'\n'];
        assert!(parse_bulk_emails(&data, &HashSet::new()).is_err());
    }

    #[test]
    fn test_back_link_keeps_search_and_page() {
        let query = ListQuery {
            search: Some(" deped ".into()),
            page: Some("3".into()),
        };
        assert_eq!(query.back(), "/admin/authorized-emails?search=deped&page=3");

        let query = ListQuery::default();
        assert_eq!(query.back(), "/admin/authorized-emails?page=1");
    }
}
