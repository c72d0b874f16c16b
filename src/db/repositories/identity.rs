use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::{
    access_tokens, expenses, identities, income, login_history, profiles, savings, user_roles,
};
use crate::models::user::{Identity, Role};

impl From<identities::Model> for Identity {
    fn from(model: identities::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            email_confirmed: model.email_confirmed,
            created_at: model.created_at,
        }
    }
}

/// Everything needed to create an account in one transaction.
#[derive(Debug, Clone)]
pub struct NewIdentity<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: Option<&'a str>,
    pub role: Role,
    pub email_confirmed: bool,
    pub must_change_password: bool,
    /// Stored on the profile only for administrator-issued credentials.
    pub temp_password: Option<&'a str>,
    pub created_by: Option<&'a str>,
}

pub struct IdentityRepository {
    conn: DatabaseConnection,
    security: SecurityConfig,
}

impl IdentityRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, security: SecurityConfig) -> Self {
        Self { conn, security }
    }

    /// Creates the identity together with its profile and role row.
    pub async fn create(&self, new: NewIdentity<'_>) -> Result<Identity> {
        let password = new.password.to_string();
        let security = self.security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, Some(&security)))
            .await
            .context("Password hashing task panicked")??;

        let id = uuid::Uuid::new_v4().to_string();
        let now = crate::db::now_timestamp();

        let txn = self.conn.begin().await?;

        let identity = identities::ActiveModel {
            id: Set(id.clone()),
            email: Set(new.email.to_string()),
            password_hash: Set(password_hash),
            email_confirmed: Set(new.email_confirmed),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
        }
        .insert(&txn)
        .await
        .context("Failed to insert identity")?;

        profiles::ActiveModel {
            user_id: Set(id.clone()),
            email: Set(new.email.to_string()),
            full_name: Set(new.full_name.map(str::to_string)),
            is_active: Set(true),
            must_change_password: Set(new.must_change_password),
            temp_password: Set(new.temp_password.map(str::to_string)),
            created_by: Set(new.created_by.map(str::to_string)),
            activated_at: Set(Some(now.clone())),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert profile")?;

        user_roles::ActiveModel {
            user_id: Set(id),
            role: Set(new.role.as_str().to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert role")?;

        txn.commit().await?;

        Ok(Identity::from(identity))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let identity = identities::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query identity by ID")?;

        Ok(identity.map(Identity::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let identity = identities::Entity::find()
            .filter(identities::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query identity by email")?;

        Ok(identity.map(Identity::from))
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(identities::Entity::find().count(&self.conn).await?)
    }

    /// Verifies a password and returns the identity on success.
    /// Unknown emails and wrong passwords both yield `None`.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<Option<Identity>> {
        let identity = identities::Entity::find()
            .filter(identities::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query identity for password verification")?;

        let Some(identity) = identity else {
            // Same Argon2 work as a real check, so a miss is not answered faster.
            let password = password.to_string();
            let security = self.security.clone();
            task::spawn_blocking(move || hash_password(&password, Some(&security)))
                .await
                .context("Password hashing task panicked")??;
            return Ok(None);
        };

        let password_hash = identity.password_hash.clone();
        let password = password.to_string();

        // Argon2 is CPU-bound; keep it off the async workers.
        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid.then(|| Identity::from(identity)))
    }

    /// Replaces the password hash. Returns `false` when the identity does not exist.
    pub async fn update_password(&self, id: &str, new_password: &str) -> Result<bool> {
        let Some(identity) = identities::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query identity for password update")?
        else {
            return Ok(false);
        };

        let password = new_password.to_string();
        let security = self.security.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, Some(&security)))
            .await
            .context("Password hashing task panicked")??;

        let mut active: identities::ActiveModel = identity.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(crate::db::now_timestamp());
        active.update(&self.conn).await?;

        Ok(true)
    }

    /// Deletes the identity and every row that belongs to it.
    /// Returns `false` when nothing was deleted.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let txn = self.conn.begin().await?;

        access_tokens::Entity::delete_many()
            .filter(access_tokens::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        login_history::Entity::delete_many()
            .filter(login_history::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        income::Entity::delete_many()
            .filter(income::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        expenses::Entity::delete_many()
            .filter(expenses::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        savings::Entity::delete_many()
            .filter(savings::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user_roles::Entity::delete_many()
            .filter(user_roles::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        profiles::Entity::delete_many()
            .filter(profiles::Column::UserId.eq(id))
            .exec(&txn)
            .await?;

        let result = identities::Entity::delete_by_id(id.to_string())
            .exec(&txn)
            .await
            .context("Failed to delete identity")?;

        txn.commit().await?;

        Ok(result.rows_affected > 0)
    }
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses the argon2 crate defaults.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_verifies() {
        let hash = hash_password("correct horse", None).unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(
            Argon2::default()
                .verify_password(b"correct horse", &parsed)
                .is_ok()
        );
        assert!(Argon2::default().verify_password(b"wrong", &parsed).is_err());
    }
}
