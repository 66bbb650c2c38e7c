//! Token Lifecycle Service Library
//!
//! Issues, verifies and revokes RS256 tokens for the care platform, and
//! manages the signing keys behind them.
//!
//! # Modules
//!
//! - `cache` - Shared cache abstraction (Redis, in-memory)
//! - `config` - Service configuration
//! - `crypto` - RS256 signing and verification primitives
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `keys` - Key store, key sources, periodic refresh
//! - `middleware` - Authentication, role and rate-limit middleware
//! - `models` - Claims and request/response bodies
//! - `observability` - Metrics and log correlation helpers
//! - `routes` - Axum router setup
//! - `services` - Issuer, verifier, revocation, authorization, rate limiting

pub mod cache;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;

#[cfg(test)]
mod test_support;
