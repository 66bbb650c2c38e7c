//! Common utilities and types shared across the token lifecycle crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, header parsing, `iat` validation)
pub mod jwt;
