//! HTTP middleware.
//!
//! - `auth` - bearer authentication and role guard for protected routes
//! - `rate_limit` - per-client limits for the public auth endpoints

pub mod auth;
pub mod rate_limit;

pub use auth::{require_auth, require_role, AuthState, AuthenticatedUser};
pub use rate_limit::{rate_limit, RateLimitState};
