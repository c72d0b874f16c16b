use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};

use crate::entities::access_tokens;

pub struct TokenRepository {
    conn: DatabaseConnection,
}

impl TokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Issues a fresh bearer token for `user_id`; only its digest is persisted.
    pub async fn issue(&self, user_id: &str, ttl: Duration) -> Result<(String, String)> {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = crate::db::format_timestamp(now + ttl);

        access_tokens::ActiveModel {
            token_hash: Set(digest(&token)),
            user_id: Set(user_id.to_string()),
            created_at: Set(crate::db::format_timestamp(now)),
            expires_at: Set(expires_at.clone()),
        }
        .insert(&self.conn)
        .await
        .context("Failed to persist access token")?;

        Ok((token, expires_at))
    }

    /// Returns the owner of a live token. Unknown and expired tokens yield `None`.
    pub async fn verify(&self, token: &str) -> Result<Option<String>> {
        let row = access_tokens::Entity::find_by_id(digest(token))
            .one(&self.conn)
            .await
            .context("Failed to query access token")?;

        let now = crate::db::now_timestamp();
        Ok(row.filter(|t| t.expires_at > now).map(|t| t.user_id))
    }

    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = access_tokens::Entity::delete_by_id(digest(token))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn revoke_all_for(&self, user_id: &str) -> Result<u64> {
        let result = access_tokens::Entity::delete_many()
            .filter(access_tokens::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let result = access_tokens::Entity::delete_many()
            .filter(access_tokens::Column::ExpiresAt.lte(crate::db::now_timestamp()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn digest(token: &str) -> String {
    let hash = Sha256::digest(token.as_bytes());
    to_hex(&hash)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Generate a random bearer token (64 character hex string)
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    to_hex(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest("abc"), digest("abc"));
        assert_ne!(digest("abc"), digest("abd"));
        assert_eq!(digest("abc").len(), 64);
    }
}
