pub mod config;
pub mod error;
pub mod rate_limit;
pub mod seed;
pub mod shared;
