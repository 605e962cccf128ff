pub mod admin;
pub mod auth;
pub mod canned;
pub mod core;
pub mod dashboards;
pub mod email;
pub mod profile;
pub mod security;
pub mod tickets;
pub mod web;

pub use crate::core::config::AppConfig;
pub use crate::core::error::{EservicesError, EservicesResult};
pub use crate::core::shared::state::AppState;
