//! HTTP request handlers.

pub mod admin_handler;
pub mod auth_handler;
pub mod health;
pub mod metrics;

pub use admin_handler::handle_revoke_token;
pub use auth_handler::{handle_logout, handle_me, handle_refresh};
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
