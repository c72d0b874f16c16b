//! Domain service for credentials and bearer tokens.
//!
//! Handles sign-up, sign-in, token verification and refresh, and the
//! privileged account operations the admin gateway relies on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::user::Identity;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("User not found")]
    UserNotFound,

    #[error("Your account has been deactivated. Please contact an administrator.")]
    Deactivated,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Issued on sign-in and refresh. The token itself is only ever returned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: String,
    pub user: Identity,
}

/// Accounts created on behalf of someone else (admin gateway, access approvals).
#[derive(Debug, Clone)]
pub struct ProvisionedUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: Option<&'a str>,
    pub role: crate::models::user::Role,
    pub temp_password: Option<&'a str>,
    pub created_by: &'a str,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a self-service account with role `user`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for a malformed email or password and
    /// [`AuthError::Conflict`] when the email is taken.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Verifies credentials and issues a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email or a wrong
    /// password alike, and [`AuthError::Deactivated`] when the password is right
    /// but the profile is inactive.
    async fn sign_in(&self, email: &str, password: &str) -> Result<TokenGrant, AuthError>;

    /// Resolves a bearer token to its identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] for unknown, expired or orphaned tokens.
    async fn verify_token(&self, token: &str) -> Result<Identity, AuthError>;

    /// Exchanges a live token for a fresh one. The old token stops working.
    /// Inactive profiles cannot refresh.
    async fn refresh(&self, token: &str) -> Result<TokenGrant, AuthError>;

    /// Revokes the token. Unknown tokens are ignored.
    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    /// Replaces the caller's own password and clears any forced-change state.
    async fn update_password(&self, user_id: &str, new_password: &str) -> Result<(), AuthError>;

    async fn admin_create_user(&self, user: ProvisionedUser<'_>) -> Result<Identity, AuthError>;

    async fn admin_set_password(&self, user_id: &str, password: &str) -> Result<(), AuthError>;

    async fn admin_delete_user(&self, user_id: &str) -> Result<(), AuthError>;

    /// Always succeeds so callers cannot learn which emails exist.
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;
}
