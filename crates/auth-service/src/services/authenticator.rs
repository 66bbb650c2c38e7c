//! Request authentication: signature and expiry via [`TokenVerifier`], then
//! the shared revocation list.

use super::revocation::RevocationStore;
use super::token_verifier::TokenVerifier;
use crate::errors::TokenError;
use crate::models::TokenClaims;
use std::sync::Arc;
use tracing::instrument;

pub struct Authenticator {
    verifier: Arc<TokenVerifier>,
    revocation: Arc<RevocationStore>,
}

impl Authenticator {
    pub fn new(verifier: Arc<TokenVerifier>, revocation: Arc<RevocationStore>) -> Self {
        Self {
            verifier,
            revocation,
        }
    }

    /// Authenticate a bearer access token.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verifier.verify_access(token)?;
        self.reject_if_revoked(token).await?;
        Ok(claims)
    }

    /// Authenticate a refresh token presented for rotation.
    #[instrument(skip_all)]
    pub async fn authenticate_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verifier.verify_refresh(token)?;
        self.reject_if_revoked(token).await?;
        Ok(claims)
    }

    async fn reject_if_revoked(&self, token: &str) -> Result<(), TokenError> {
        if self.revocation.is_revoked(token).await {
            tracing::debug!(target: "auth.authenticator", "Token revoked");
            return Err(TokenError::Revoked);
        }
        Ok(())
    }
}
