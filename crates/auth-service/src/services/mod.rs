//! Token lifecycle services.
//!
//! - `token_issuer` - signs access and refresh tokens with the active key
//! - `token_verifier` - checks signature, expiry and claims
//! - `revocation` - shared revocation list (fails closed)
//! - `authenticator` - verifier plus revocation, used by request middleware
//! - `authorization` - role and permission checks
//! - `rate_limiter` - fixed-window limits per client (fails open)

pub mod authenticator;
pub mod authorization;
pub mod rate_limiter;
pub mod revocation;
pub mod token_issuer;
pub mod token_verifier;

pub use authenticator::Authenticator;
pub use rate_limiter::{RateLimitDecision, RateLimitPolicies, RateLimitPolicy, RateLimitScope, RateLimiter};
pub use revocation::RevocationStore;
pub use token_issuer::{IssuedToken, TokenIssuer, TokenPair, TokenSubject};
pub use token_verifier::TokenVerifier;
