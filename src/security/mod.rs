//! Passwords, sessions, CSRF protection and upload checks.

pub mod csrf;
pub mod file_validation;
pub mod password;
pub mod session;

pub use password::{hash_password, verify_password};
pub use session::{AdminUser, CurrentUser, OptionalUser, SessionKeys, StaffUser};
