use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Role, TicketStatus};
use super::schema::{
    attachments, authorized_emails, canned_responses, departments, personal_canned_responses,
    schools, services, ticket_responses, tickets, user_services, users,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = departments)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = services)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub department_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = schools)]
#[diesel(treat_none_as_null = true)]
pub struct School {
    pub id: Uuid,
    pub name: String,
    pub school_id_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = user_services)]
pub struct UserService {
    pub user_id: Uuid,
    pub service_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub status: TicketStatus,
    pub date_posted: DateTime<Utc>,
    pub requester_name: String,
    pub requester_email: String,
    pub requester_contact: Option<String>,
    pub details: serde_json::Value,
    pub department_id: Uuid,
    pub service_id: Uuid,
    pub school_id: Option<Uuid>,
    pub assigned_staff_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = attachments)]
pub struct Attachment {
    pub id: Uuid,
    pub filename: String,
    pub ticket_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = ticket_responses)]
pub struct TicketResponse {
    pub id: Uuid,
    pub body: String,
    pub is_internal: bool,
    pub date_posted: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub ticket_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = canned_responses)]
#[diesel(treat_none_as_null = true)]
pub struct CannedResponse {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub department_id: Uuid,
    pub service_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = personal_canned_responses)]
pub struct PersonalCannedResponse {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = authorized_emails)]
pub struct AuthorizedEmail {
    pub id: Uuid,
    pub email: String,
}

impl User {
    pub fn new(email: &str, name: &str, role: Role, password_hash: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            name: name.trim().to_string(),
            password_hash,
            role,
            created_at: Utc::now(),
        }
    }
}
