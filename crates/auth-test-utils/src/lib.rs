//! # Auth Test Utilities
//!
//! Shared test utilities for the auth service.
//!
//! This crate provides:
//! - Deterministic RSA key fixtures and key-set builders
//! - Test claim builders that sign with fixture keys (TestClaimsBuilder)
//! - Test doubles for the secret source and shared cache
//! - Server test harness (TestAuthServer for E2E tests)
//! - Fixed test IDs
//! - Custom assertions (TokenAssertions trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = test_key_store(TEST_KEY_ID_1);
//!
//!     let token = TestClaimsBuilder::new()
//!         .for_user(TEST_USER_ALICE)
//!         .with_role(Role::Caregiver)
//!         .sign(1, TEST_KEY_ID_1);
//!
//!     token.assert_valid_jwt()
//!          .assert_signed_by(TEST_KEY_ID_1)
//!          .assert_for_subject(TEST_USER_ALICE);
//! }
//! ```

pub mod assertions;
pub mod cache;
pub mod crypto_fixtures;
pub mod secret_source;
pub mod server_harness;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use cache::*;
pub use crypto_fixtures::*;
pub use secret_source::*;
pub use server_harness::*;
pub use test_ids::*;
pub use token_builders::*;
