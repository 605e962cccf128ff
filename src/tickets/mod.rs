//! Ticket submission, the requester's ticket list and the shared ticket
//! detail page where requesters reply and staff triage.

pub mod forms;
pub mod numbering;
pub mod storage;
pub mod ui;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use self::forms::{FieldSpec, ServiceForm, TicketSubmission};
use self::storage::{NewTicket, TicketUpdate, TicketView};
use crate::canned::{personal_for_user, scoped_for_ticket};
use crate::core::error::EservicesError;
use crate::core::shared::models::{
    CannedResponse, Department, PersonalCannedResponse, School, Service, Ticket, TicketResponse,
    User,
};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::parse_page;
use crate::core::shared::{Role, TicketStatus};
use crate::email::{new_ticket_email, resolution_email, staff_notification_email};
use crate::security::file_validation::{
    remove_uploads, save_upload, secure_filename, stored_filename, validate_file_upload,
    FileValidationConfig, UploadProblem,
};
use crate::security::session::CurrentUser;
use crate::web::flash::FlashLevel;
use crate::web::forms::FormErrors;
use crate::web::page::{MultipartForm, PageContext};

pub const SELECT_DEPARTMENT_PATH: &str = "/create-ticket/select-department";
pub const MY_TICKETS_PATH: &str = "/my-tickets";
pub const RESOLVED_DEFAULT_MESSAGE: &str = "Your ticket has been resolved.";

fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

pub fn ticket_path(id: Uuid) -> String {
    format!("/ticket/{id}")
}

// ============================================================================
// CREATION
// ============================================================================

pub async fn select_department(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
) -> Result<Response, EservicesError> {
    let departments = state.db(storage::ordered_departments).await?;
    Ok(ctx
        .render("Select a Department", &ui::department_picker(&departments))
        .into_response())
}

pub async fn select_service(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Path(department_id): Path<String>,
) -> Result<Response, EservicesError> {
    let found = match parse_id(&department_id) {
        Some(id) => {
            state
                .db(move |conn| {
                    Ok(match storage::find_department(conn, id)? {
                        Some(department) => {
                            let services = storage::services_of(conn, department.id)?;
                            Some((department, services))
                        }
                        None => None,
                    })
                })
                .await?
        }
        None => None,
    };

    let Some((department, services)) = found else {
        return Ok(ctx.redirect_with(
            FlashLevel::Danger,
            "Invalid department selected.",
            SELECT_DEPARTMENT_PATH,
        ));
    };

    let title = format!("Select a Service for {}", department.name);
    Ok(ctx
        .render(&title, &ui::service_picker(&department, &services))
        .into_response())
}

struct CreateContext {
    service: Service,
    department: Department,
    form: ServiceForm,
    schools: Vec<School>,
}

async fn load_create_context(
    state: &AppState,
    service_id: &str,
) -> Result<Option<CreateContext>, EservicesError> {
    let Some(id) = parse_id(service_id) else {
        return Ok(None);
    };
    state
        .db(move |conn| {
            let Some((service, department)) = storage::find_service(conn, id)? else {
                return Ok(None);
            };
            let schools = storage::schools_by_name(conn)?;
            Ok(Some(CreateContext {
                form: ServiceForm::for_service_name(&service.name),
                service,
                department,
                schools,
            }))
        })
        .await
}

fn render_create(
    ctx: &PageContext,
    create: &CreateContext,
    values: &HashMap<String, String>,
    errors: &FormErrors,
) -> Response {
    let body = ui::ticket_form(
        &create.service,
        &create.department,
        create.form,
        values,
        errors,
        &create.schools,
        &ctx.csrf_input(),
    );
    ctx.render(&format!("Request for {}", create.service.name), &body)
        .into_response()
}

pub async fn create_ticket_page(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Path(service_id): Path<String>,
) -> Result<Response, EservicesError> {
    let Some(create) = load_create_context(&state, &service_id).await? else {
        return Ok(ctx.redirect_with(
            FlashLevel::Danger,
            "Invalid service selected.",
            SELECT_DEPARTMENT_PATH,
        ));
    };

    let mut values = HashMap::new();
    if let Some(user) = &ctx.user {
        values.insert(forms::REQUESTER_NAME.name.to_string(), user.name.clone());
        values.insert(forms::REQUESTER_EMAIL.name.to_string(), user.email.clone());
    }
    Ok(render_create(&ctx, &create, &values, &FormErrors::new()))
}

/// An upload that passed validation, waiting to be written.
struct AcceptedUpload<'a> {
    field: &'static str,
    filename: String,
    data: &'a [u8],
}

/// Checks every file field of `form`, flashing a message per rejected
/// upload. Returns the accepted uploads and whether all of them passed.
fn check_ticket_files<'a>(
    ctx: &PageContext,
    config: &FileValidationConfig,
    fields: &[FieldSpec],
    upload: &'a MultipartForm,
) -> (Vec<AcceptedUpload<'a>>, bool) {
    let mut accepted = Vec::new();
    let mut all_ok = true;

    for spec in fields {
        let Some(file) = upload.file(spec.name) else {
            continue;
        };
        let shown = secure_filename(&file.filename);
        match validate_file_upload(config, &file.filename, file.data.len()) {
            Ok(filename) => accepted.push(AcceptedUpload {
                field: spec.name,
                filename,
                data: &file.data,
            }),
            Err(UploadProblem::Empty) => {
                ctx.flash(
                    FlashLevel::Warning,
                    format!("File '{shown}' for '{}' is empty.", spec.label),
                );
                all_ok = false;
            }
            Err(UploadProblem::TooLarge) => {
                ctx.flash(
                    FlashLevel::Danger,
                    format!(
                        "File '{shown}' ({}) exceeds {}MB limit.",
                        spec.label, config.max_size_mb
                    ),
                );
                all_ok = false;
            }
            Err(UploadProblem::DisallowedType) => {
                ctx.flash(
                    FlashLevel::Danger,
                    format!("File type for '{shown}' ({}) not allowed.", spec.label),
                );
                all_ok = false;
            }
        }
    }

    (accepted, all_ok)
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Path(service_id): Path<String>,
    upload: MultipartForm,
) -> Result<Response, EservicesError> {
    let Some(create) = load_create_context(&state, &service_id).await? else {
        return Ok(ctx.redirect_with(
            FlashLevel::Danger,
            "Invalid service selected.",
            SELECT_DEPARTMENT_PATH,
        ));
    };

    let file_config = FileValidationConfig::from(&state.config.uploads);
    let (accepted, files_ok) =
        check_ticket_files(&ctx, &file_config, &create.form.file_fields(), &upload);

    let submission = TicketSubmission {
        values: upload.fields.clone(),
        files: accepted.iter().map(|a| a.field.to_string()).collect(),
    };
    let school_ids: HashSet<Uuid> = create.schools.iter().map(|s| s.id).collect();
    let validated = match forms::validate(create.form, &submission, &school_ids) {
        Ok(validated) if files_ok => validated,
        Ok(_) => return Ok(render_create(&ctx, &create, &upload.fields, &FormErrors::new())),
        Err(field_errors) => {
            let mut errors = FormErrors::new();
            for e in &field_errors {
                errors.insert(&e.field, e.message.clone());
            }
            return Ok(render_create(&ctx, &create, &upload.fields, &errors));
        }
    };

    let upload_dir = state.config.uploads.dir.clone();
    let now = Utc::now();
    let mut saved: Vec<String> = Vec::new();
    for file in &accepted {
        let stored = stored_filename(now, Some(file.field), &file.filename);
        if let Err(e) = save_upload(&upload_dir, &stored, file.data).await {
            error!("Error saving files for new ticket: {}", e);
            remove_uploads(&upload_dir, &saved).await;
            ctx.flash(FlashLevel::Danger, "Error saving attachments. Please try again.");
            return Ok(render_create(&ctx, &create, &upload.fields, &FormErrors::new()));
        }
        saved.push(stored);
    }

    let new_ticket = NewTicket {
        requester_name: validated.requester_name,
        requester_email: validated.requester_email,
        requester_contact: Some(validated.requester_contact),
        school_id: Some(validated.school_id),
        details: validated.details,
        department: create.department.clone(),
        service_id: create.service.id,
    };
    let stored_files = saved.clone();
    let inserted = state
        .db(move |conn| storage::insert_ticket(conn, &new_ticket, &stored_files))
        .await;

    let ticket = match inserted {
        Ok(ticket) => ticket,
        Err(e) => {
            error!("DB error creating ticket for service {}: {}", create.service.name, e);
            remove_uploads(&upload_dir, &saved).await;
            ctx.flash(FlashLevel::Danger, "Database error creating ticket. Please try again.");
            return Ok(render_create(&ctx, &create, &upload.fields, &FormErrors::new()));
        }
    };

    info!(
        "New ticket {} created by {}",
        ticket.ticket_number, ticket.requester_email
    );
    state.mailer.send(new_ticket_email(
        &ticket,
        &create.department.name,
        &create.service.name,
    ));

    let message = format!(
        "Ticket created! Confirmation sent. Your ticket number is {}.",
        ticket.ticket_number
    );
    let target = if ctx.user.is_some() {
        MY_TICKETS_PATH
    } else {
        SELECT_DEPARTMENT_PATH
    };
    Ok(ctx.redirect_with(FlashLevel::Success, message, target))
}

// ============================================================================
// MY TICKETS
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct MyTicketsQuery {
    pub page_active: Option<String>,
    pub page_resolved: Option<String>,
    #[serde(default)]
    pub search: String,
}

pub async fn my_tickets(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ctx: PageContext,
    Query(query): Query<MyTicketsQuery>,
) -> Result<Response, EservicesError> {
    let per_page = state.config.pagination.tickets_per_page;
    let search = query.search.trim().to_string();
    let page_active = parse_page(query.page_active.as_deref());
    let page_resolved = parse_page(query.page_resolved.as_deref());
    let email = user.email.clone();
    let term = search.clone();

    let (active, resolved) = state
        .db(move |conn| {
            let active = storage::requester_page(conn, &email, &term, false, page_active, per_page)?;
            let resolved =
                storage::requester_page(conn, &email, &term, true, page_resolved, per_page)?;
            Ok((active, resolved))
        })
        .await?;

    Ok(ctx
        .render("My Tickets", &ui::my_tickets(&active, &resolved, &search))
        .into_response())
}

// ============================================================================
// DETAIL
// ============================================================================

/// What a signed-in user may do with a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAccess {
    Staff,
    Requester,
    Denied,
}

pub fn ticket_access(user: &User, requester_email: &str, manages_service: bool) -> TicketAccess {
    match user.role {
        Role::Admin => TicketAccess::Staff,
        Role::Staff if manages_service => TicketAccess::Staff,
        _ if user.email.eq_ignore_ascii_case(requester_email) => TicketAccess::Requester,
        _ => TicketAccess::Denied,
    }
}

struct DetailData {
    view: TicketView,
    access: TicketAccess,
    system_canned: Vec<CannedResponse>,
    personal_canned: Vec<PersonalCannedResponse>,
    managers: Vec<User>,
}

async fn load_detail(
    state: &AppState,
    user: &User,
    ticket_id: Uuid,
) -> Result<Option<DetailData>, EservicesError> {
    let user = user.clone();
    state
        .db(move |conn| {
            let Some(view) = storage::load_ticket_view(conn, ticket_id)? else {
                return Ok(None);
            };
            let manages = user.role == Role::Staff
                && storage::user_manages_service(conn, user.id, view.service.id)?;
            let access = ticket_access(&user, &view.ticket.requester_email, manages);

            let (system_canned, personal_canned, managers) = if access == TicketAccess::Staff {
                (
                    scoped_for_ticket(conn, view.ticket.department_id, view.service.id)?,
                    personal_for_user(conn, user.id)?,
                    storage::service_managers(conn, view.service.id)?,
                )
            } else {
                (Vec::new(), Vec::new(), Vec::new())
            };

            Ok(Some(DetailData {
                view,
                access,
                system_canned,
                personal_canned,
                managers,
            }))
        })
        .await
}

/// Resolves the ticket for `user`, or the redirect that ends the request.
async fn authorize_detail(
    state: &AppState,
    ctx: &PageContext,
    user: &User,
    raw_id: &str,
) -> Result<Result<DetailData, Response>, EservicesError> {
    let detail = match parse_id(raw_id) {
        Some(id) => load_detail(state, user, id).await?,
        None => None,
    };
    let Some(detail) = detail else {
        warn!("Attempt to access non-existent ticket ID: {}", raw_id);
        return Ok(Err(ctx.redirect_with(FlashLevel::Danger, "Ticket not found!", "/")));
    };
    if detail.access == TicketAccess::Denied {
        warn!(
            "Unauthorized attempt by {} to view ticket {}",
            user.email, detail.view.ticket.ticket_number
        );
        return Ok(Err(ctx.redirect_with(
            FlashLevel::Danger,
            "You do not have permission to view this ticket.",
            "/",
        )));
    }
    Ok(Ok(detail))
}

pub async fn ticket_detail(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ctx: PageContext,
    Path(ticket_id): Path<String>,
) -> Result<Response, EservicesError> {
    let detail = match authorize_detail(&state, &ctx, &user, &ticket_id).await? {
        Ok(detail) => detail,
        Err(redirect) => return Ok(redirect),
    };

    let tools = ui::StaffTools {
        system_canned: &detail.system_canned,
        personal_canned: &detail.personal_canned,
        managers: &detail.managers,
        delete_button: user.role.is_admin().then(|| {
            crate::web::ui::post_button(
                &format!("/admin/ticket/{}/delete", detail.view.ticket.id),
                &ctx.csrf_token,
                "Delete Ticket",
                "Delete this ticket and all of its responses and attachments?",
            )
        }),
    };
    let staff_tools = (detail.access == TicketAccess::Staff).then_some(&tools);
    let body = ui::ticket_detail(&detail.view, staff_tools, &ctx.csrf_input());
    let title = format!("Ticket {}", detail.view.ticket.ticket_number);
    Ok(ctx.render(&title, &body).into_response())
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentChange {
    Keep,
    Unassign,
    Assign(User),
    Invalid,
}

/// Interprets the `assigned_staff` field: `0` or empty clears, otherwise the
/// id must be one of the service's managers.
pub fn plan_assignment(current: Option<Uuid>, requested: &str, managers: &[User]) -> AssignmentChange {
    let requested = requested.trim();
    if requested.is_empty() || requested == "0" {
        return if current.is_some() {
            AssignmentChange::Unassign
        } else {
            AssignmentChange::Keep
        };
    }
    match parse_id(requested) {
        Some(id) if Some(id) == current => AssignmentChange::Keep,
        Some(id) => managers
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .map(AssignmentChange::Assign)
            .unwrap_or(AssignmentChange::Invalid),
        None => AssignmentChange::Invalid,
    }
}

/// Body of the resolution email, or `None` when the resolving response is an
/// internal note.
pub fn resolution_body(response: Option<&TicketResponse>) -> Option<String> {
    match response {
        Some(r) if r.is_internal => None,
        Some(r) => Some(r.body.clone()),
        None => Some(RESOLVED_DEFAULT_MESSAGE.to_string()),
    }
}

/// The closing flash of a staff update.
pub fn staff_outcome(
    new_status: Option<TicketStatus>,
    response_added: bool,
    assignment_changed: bool,
    attachment_added: bool,
) -> Option<(FlashLevel, String)> {
    match new_status {
        Some(TicketStatus::Resolved) => Some((
            FlashLevel::Success,
            "Ticket resolved and notification sent (if applicable).".to_string(),
        )),
        Some(status) => Some((
            FlashLevel::Success,
            format!("Ticket status updated to {status}."),
        )),
        None if response_added => Some((
            FlashLevel::Success,
            "Response added successfully!".to_string(),
        )),
        None if attachment_added && !assignment_changed => Some((
            FlashLevel::Success,
            "Attachment uploaded successfully.".to_string(),
        )),
        None if !assignment_changed => {
            Some((FlashLevel::Info, "No changes were made.".to_string()))
        }
        None => None,
    }
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ctx: PageContext,
    Path(ticket_id): Path<String>,
    upload: MultipartForm,
) -> Result<Response, EservicesError> {
    let detail = match authorize_detail(&state, &ctx, &user, &ticket_id).await? {
        Ok(detail) => detail,
        Err(redirect) => return Ok(redirect),
    };
    let ticket = &detail.view.ticket;
    let back = ticket_path(ticket.id);
    let is_staff = detail.access == TicketAccess::Staff;

    if ticket.status == TicketStatus::Resolved && !is_staff {
        return Ok(ctx.redirect_with(
            FlashLevel::Info,
            "This ticket is already resolved and cannot receive new responses.",
            &back,
        ));
    }

    // Attachment
    let file_config = FileValidationConfig::from(&state.config.uploads);
    let mut attachment = None;
    if let Some(file) = upload.file("attachment") {
        let shown = secure_filename(&file.filename);
        match validate_file_upload(&file_config, &file.filename, file.data.len()) {
            Ok(filename) => attachment = Some((stored_filename(Utc::now(), None, &filename), file)),
            Err(UploadProblem::Empty) => {
                ctx.flash(FlashLevel::Warning, format!("Attachment '{shown}' is empty."));
            }
            Err(UploadProblem::TooLarge) => {
                return Ok(ctx.redirect_with(
                    FlashLevel::Danger,
                    format!(
                        "Attachment '{shown}' exceeds {}MB limit.",
                        file_config.max_size_mb
                    ),
                    &back,
                ));
            }
            Err(UploadProblem::DisallowedType) => {
                return Ok(ctx.redirect_with(
                    FlashLevel::Danger,
                    format!("Attachment file type for '{shown}' not allowed."),
                    &back,
                ));
            }
        }
    }

    let upload_dir = state.config.uploads.dir.clone();
    let mut update = TicketUpdate::default();
    if let Some((stored, file)) = &attachment {
        if let Err(e) = save_upload(&upload_dir, stored, &file.data).await {
            error!("Error saving attachment for ticket {}: {}", ticket.ticket_number, e);
            return Ok(ctx.redirect_with(
                FlashLevel::Danger,
                "An error occurred while saving. Please try again.",
                &back,
            ));
        }
        update.attachment = Some(stored.clone());
    }

    let body = upload.value("body");
    if !body.trim().is_empty() {
        update.response = Some(TicketResponse {
            id: Uuid::new_v4(),
            body: body.to_string(),
            is_internal: is_staff && upload.flag("is_internal"),
            date_posted: Utc::now(),
            user_id: Some(user.id),
            ticket_id: ticket.id,
        });
    }

    let mut flashes: Vec<(FlashLevel, String)> = Vec::new();
    let mut new_status = None;
    let mut assignment_changed = false;
    if is_staff {
        new_status = upload
            .value("status")
            .parse::<TicketStatus>()
            .ok()
            .filter(|s| *s != ticket.status);
        update.status = new_status;

        match plan_assignment(
            ticket.assigned_staff_id,
            upload.value("assigned_staff"),
            &detail.managers,
        ) {
            AssignmentChange::Keep => {}
            AssignmentChange::Unassign => {
                update.assignee = Some(None);
                assignment_changed = true;
                flashes.push((FlashLevel::Info, "Ticket unassigned.".to_string()));
            }
            AssignmentChange::Assign(staff) => {
                update.assignee = Some(Some(staff.id));
                assignment_changed = true;
                flashes.push((
                    FlashLevel::Success,
                    format!("Ticket assigned to {}.", staff.name),
                ));
                info!(
                    "Ticket {} assigned to {} by {}",
                    ticket.ticket_number, staff.email, user.email
                );
            }
            AssignmentChange::Invalid => {
                flashes.push((FlashLevel::Danger, "Invalid staff member selected.".to_string()));
            }
        }
    }

    if !update.is_empty() {
        let id = ticket.id;
        let pending = update.clone();
        if let Err(e) = state
            .db(move |conn| storage::apply_update(conn, id, &pending))
            .await
        {
            error!("Error saving response/assignment ticket {}: {}", ticket.ticket_number, e);
            if let Some(stored) = &update.attachment {
                remove_uploads(&upload_dir, std::slice::from_ref(stored)).await;
            }
            return Ok(ctx.redirect_with(
                FlashLevel::Danger,
                "An error occurred while saving. Please try again.",
                &back,
            ));
        }
    }

    if let Some(stored) = &update.attachment {
        info!("Saved attachment: {} for ticket {}", stored, ticket.ticket_number);
    }
    if let Some(status) = new_status {
        info!(
            "Ticket {} status changed: '{}' -> '{}' by {}",
            ticket.ticket_number, ticket.status, status, user.email
        );
    }
    if update.assignee == Some(None) {
        info!("Ticket {} unassigned by {}", ticket.ticket_number, user.email);
    }

    let service_name = &detail.view.service.name;
    if is_staff {
        if new_status == Some(TicketStatus::Resolved) {
            if let Some(body) = resolution_body(update.response.as_ref()) {
                state.mailer.send(resolution_email(ticket, service_name, &body));
            }
        }
        flashes.extend(staff_outcome(
            new_status,
            update.response.is_some(),
            assignment_changed,
            update.attachment.is_some(),
        ));
    } else if let Some(response) = &update.response {
        flashes.push((FlashLevel::Success, "Response added successfully!".to_string()));
        notify_staff(&state, ticket, service_name, &response.body).await;
    } else if update.attachment.is_some() {
        flashes.push((FlashLevel::Success, "Attachment uploaded successfully.".to_string()));
    }

    for (level, message) in flashes {
        ctx.flash(level, message);
    }
    Ok(axum::response::Redirect::to(&back).into_response())
}

/// Tells the service's managers and every admin about a requester reply.
async fn notify_staff(state: &AppState, ticket: &Ticket, service_name: &str, body: &str) {
    let service_id = ticket.service_id;
    let recipients = state
        .db(move |conn| {
            let mut emails: Vec<String> = storage::service_managers(conn, service_id)?
                .into_iter()
                .map(|u| u.email)
                .collect();
            emails.extend(storage::admin_emails(conn)?);
            Ok(emails)
        })
        .await;
    let recipients = match recipients {
        Ok(recipients) => recipients,
        Err(e) => {
            error!("Could not load staff recipients for ticket {}: {}", ticket.ticket_number, e);
            return;
        }
    };

    let url = format!(
        "{}{}",
        state.config.server.base_url.trim_end_matches('/'),
        ticket_path(ticket.id)
    );
    match staff_notification_email(ticket, service_name, body, recipients, &url) {
        Some(email) => state.mailer.send(email),
        None => warn!(
            "No staff to notify about a reply on ticket {}",
            ticket.ticket_number
        ),
    }
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(SELECT_DEPARTMENT_PATH, get(select_department))
        .route(
            "/create-ticket/select-service/:department_id",
            get(select_service),
        )
        .route(
            "/create-ticket/form/:service_id",
            get(create_ticket_page).post(create_ticket),
        )
        .route(MY_TICKETS_PATH, get(my_tickets))
        .route("/ticket/:id", get(ticket_detail).post(update_ticket))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, email: &str) -> User {
        User::new(email, "Test User", role, None)
    }

    #[test]
    fn test_ticket_access() {
        let admin = user(Role::Admin, "admin@deped.gov.ph");
        let staff = user(Role::Staff, "staff@deped.gov.ph");
        let requester = user(Role::User, "ana@deped.gov.ph");

        assert_eq!(ticket_access(&admin, "x@deped.gov.ph", false), TicketAccess::Staff);
        assert_eq!(ticket_access(&staff, "x@deped.gov.ph", true), TicketAccess::Staff);
        assert_eq!(ticket_access(&staff, "x@deped.gov.ph", false), TicketAccess::Denied);
        assert_eq!(
            ticket_access(&staff, "STAFF@deped.gov.ph", false),
            TicketAccess::Requester
        );
        assert_eq!(
            ticket_access(&requester, "ana@deped.gov.ph", false),
            TicketAccess::Requester
        );
        assert_eq!(
            ticket_access(&requester, "other@deped.gov.ph", true),
            TicketAccess::Denied
        );
    }

    #[test]
    fn test_plan_assignment() {
        let manager = user(Role::Staff, "m@deped.gov.ph");
        let managers = vec![manager.clone()];

        assert_eq!(plan_assignment(None, "0", &managers), AssignmentChange::Keep);
        assert_eq!(plan_assignment(None, "", &managers), AssignmentChange::Keep);
        assert_eq!(
            plan_assignment(Some(manager.id), "0", &managers),
            AssignmentChange::Unassign
        );
        assert_eq!(
            plan_assignment(Some(manager.id), &manager.id.to_string(), &managers),
            AssignmentChange::Keep
        );
        assert_eq!(
            plan_assignment(None, &manager.id.to_string(), &managers),
            AssignmentChange::Assign(manager.clone())
        );
        assert_eq!(
            plan_assignment(None, &Uuid::new_v4().to_string(), &managers),
            AssignmentChange::Invalid
        );
        assert_eq!(plan_assignment(None, "abc", &managers), AssignmentChange::Invalid);
    }

    fn response(is_internal: bool) -> TicketResponse {
        TicketResponse {
            id: Uuid::new_v4(),
            body: "Fixed the printer.".into(),
            is_internal,
            date_posted: Utc::now(),
            user_id: None,
            ticket_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_resolution_body() {
        assert_eq!(
            resolution_body(None).as_deref(),
            Some(RESOLVED_DEFAULT_MESSAGE)
        );
        assert_eq!(
            resolution_body(Some(&response(false))).as_deref(),
            Some("Fixed the printer.")
        );
        assert_eq!(resolution_body(Some(&response(true))), None);
    }

    #[test]
    fn test_staff_outcome_messages() {
        let text = |o: Option<(FlashLevel, String)>| o.map(|(_, m)| m);
        assert_eq!(
            text(staff_outcome(Some(TicketStatus::Resolved), true, false, false)).as_deref(),
            Some("Ticket resolved and notification sent (if applicable).")
        );
        assert_eq!(
            text(staff_outcome(Some(TicketStatus::InProgress), false, false, false)).as_deref(),
            Some("Ticket status updated to In Progress.")
        );
        assert_eq!(
            text(staff_outcome(None, true, true, false)).as_deref(),
            Some("Response added successfully!")
        );
        assert_eq!(
            text(staff_outcome(None, false, false, true)).as_deref(),
            Some("Attachment uploaded successfully.")
        );
        assert_eq!(
            staff_outcome(None, false, false, false),
            Some((FlashLevel::Info, "No changes were made.".to_string()))
        );
        assert_eq!(staff_outcome(None, false, true, false), None);
    }
}
