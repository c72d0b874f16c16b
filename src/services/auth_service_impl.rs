//! `SeaORM` implementation of the `AuthService` trait.

use crate::db::{NewIdentity, Store};
use crate::models::user::{Identity, Role, is_valid_email, is_valid_password, normalize_email};
use crate::services::auth_service::{AuthError, AuthService, ProvisionedUser, TokenGrant};
use async_trait::async_trait;
use tracing::{info, warn};

pub struct SeaOrmAuthService {
    store: Store,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    fn validate_email(email: &str) -> Result<(), AuthError> {
        if is_valid_email(email) {
            Ok(())
        } else {
            Err(AuthError::Validation(
                "Please enter a valid email address".to_string(),
            ))
        }
    }

    fn validate_password(&self, password: &str) -> Result<(), AuthError> {
        let security = self.store.security();
        if is_valid_password(
            password,
            security.min_password_length,
            security.max_password_length,
        ) {
            Ok(())
        } else {
            Err(AuthError::Validation(format!(
                "Password must be between {} and {} characters",
                security.min_password_length, security.max_password_length
            )))
        }
    }

    async fn create_identity(&self, new: NewIdentity<'_>) -> Result<Identity, AuthError> {
        if self.store.get_identity_by_email(new.email).await?.is_some() {
            return Err(AuthError::Conflict(
                "A user with this email address has already been registered".to_string(),
            ));
        }

        Ok(self.store.create_identity(new).await?)
    }

    async fn ensure_active(&self, user_id: &str) -> Result<(), AuthError> {
        match self.store.get_profile_status(user_id).await? {
            Some(status) if status.is_active => Ok(()),
            _ => Err(AuthError::Deactivated),
        }
    }

    async fn grant_for(&self, identity: Identity) -> Result<TokenGrant, AuthError> {
        let (access_token, expires_at) = self.store.issue_token(&identity.id).await?;

        Ok(TokenGrant {
            access_token,
            token_type: "bearer".to_string(),
            expires_at,
            user: identity,
        })
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        Self::validate_email(&email)?;
        self.validate_password(password)?;

        let identity = self
            .create_identity(NewIdentity {
                email: &email,
                password,
                full_name: None,
                role: Role::User,
                email_confirmed: false,
                must_change_password: false,
                temp_password: None,
                created_by: None,
            })
            .await?;

        info!(event = "sign_up", user_id = %identity.id, "Account created");
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<TokenGrant, AuthError> {
        let email = normalize_email(email);

        let identity = self
            .store
            .verify_identity_password(&email, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if let Err(err) = self.ensure_active(&identity.id).await {
            warn!(event = "sign_in_refused", user_id = %identity.id, "Sign-in refused for inactive profile");
            return Err(err);
        }

        // A temporary password is shown once; after its first use it is gone.
        self.store.consume_temp_password(&identity.id).await?;

        info!(event = "sign_in", user_id = %identity.id, "Token issued");
        self.grant_for(identity).await
    }

    async fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let user_id = self
            .store
            .verify_token(token)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        self.store
            .get_identity(&user_id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    async fn refresh(&self, token: &str) -> Result<TokenGrant, AuthError> {
        let identity = self.verify_token(token).await?;
        self.ensure_active(&identity.id).await?;
        self.store.revoke_token(token).await?;
        self.grant_for(identity).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        self.store.revoke_token(token).await?;
        Ok(())
    }

    async fn update_password(&self, user_id: &str, new_password: &str) -> Result<(), AuthError> {
        self.validate_password(new_password)?;

        if !self
            .store
            .update_identity_password(user_id, new_password)
            .await?
        {
            return Err(AuthError::UserNotFound);
        }

        self.store.clear_password_change(user_id).await?;

        info!(event = "password_updated", user_id = %user_id, "Password changed");
        Ok(())
    }

    async fn admin_create_user(&self, user: ProvisionedUser<'_>) -> Result<Identity, AuthError> {
        let email = normalize_email(user.email);
        Self::validate_email(&email)?;

        self.create_identity(NewIdentity {
            email: &email,
            password: user.password,
            full_name: user.full_name,
            role: user.role,
            email_confirmed: true,
            must_change_password: true,
            temp_password: user.temp_password,
            created_by: Some(user.created_by),
        })
        .await
    }

    async fn admin_set_password(&self, user_id: &str, password: &str) -> Result<(), AuthError> {
        if self.store.update_identity_password(user_id, password).await? {
            Ok(())
        } else {
            Err(AuthError::UserNotFound)
        }
    }

    async fn admin_delete_user(&self, user_id: &str) -> Result<(), AuthError> {
        if self.store.delete_identity(user_id).await? {
            Ok(())
        } else {
            Err(AuthError::UserNotFound)
        }
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        match self.store.get_identity_by_email(&email).await? {
            Some(identity) => {
                info!(event = "password_reset_requested", user_id = %identity.id, "Password reset requested");
            }
            None => {
                warn!(event = "password_reset_requested", "Password reset requested for unknown email");
            }
        }

        Ok(())
    }
}
