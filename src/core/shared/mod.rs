pub mod enums;
pub mod models;
pub mod schema;
pub mod state;
pub mod utils;

pub use enums::{Role, TicketStatus};
pub use utils::{create_conn, html_escape, DbPool, Page};

pub mod prelude {
    pub use super::models::*;
    pub use super::schema::*;
    pub use super::{DbPool, Page, Role, TicketStatus};

    pub use diesel::prelude::*;
    pub use diesel::{ExpressionMethods, QueryDsl, RunQueryDsl};

    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;
}
