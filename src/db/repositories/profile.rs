use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::profiles;
use crate::models::user::{Profile, ProfileStatus};

impl From<profiles::Model> for Profile {
    fn from(model: profiles::Model) -> Self {
        Self {
            user_id: model.user_id,
            email: model.email,
            full_name: model.full_name,
            is_active: model.is_active,
            must_change_password: model.must_change_password,
            created_by: model.created_by,
            activated_at: model.activated_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct ProfileRepository {
    conn: DatabaseConnection,
}

impl ProfileRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn find(&self, user_id: &str) -> Result<Option<profiles::Model>> {
        profiles::Entity::find()
            .filter(profiles::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query profile")
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<Profile>> {
        Ok(self.find(user_id).await?.map(Profile::from))
    }

    pub async fn status(&self, user_id: &str) -> Result<Option<ProfileStatus>> {
        Ok(self.find(user_id).await?.map(|p| ProfileStatus {
            is_active: p.is_active,
            must_change_password: p.must_change_password,
        }))
    }

    /// Newest accounts first.
    pub async fn list_all(&self) -> Result<Vec<Profile>> {
        let rows = profiles::Entity::find()
            .order_by_desc(profiles::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list profiles")?;

        Ok(rows.into_iter().map(Profile::from).collect())
    }

    pub async fn count_all(&self) -> Result<u64> {
        Ok(profiles::Entity::find().count(&self.conn).await?)
    }

    pub async fn count_active(&self) -> Result<u64> {
        Ok(profiles::Entity::find()
            .filter(profiles::Column::IsActive.eq(true))
            .count(&self.conn)
            .await?)
    }

    /// Returns `false` when the profile does not exist.
    pub async fn update_details(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        is_active: bool,
    ) -> Result<bool> {
        let Some(profile) = self.find(user_id).await? else {
            return Ok(false);
        };

        let reactivated = is_active && !profile.is_active;
        let now = crate::db::now_timestamp();

        let mut active: profiles::ActiveModel = profile.into();
        if let Some(full_name) = full_name {
            active.full_name = Set(Some(full_name.to_string()));
        }
        active.is_active = Set(is_active);
        if reactivated {
            active.activated_at = Set(Some(now.clone()));
        }
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(true)
    }

    /// Stores an administrator-issued password and forces a change at next sign-in.
    pub async fn set_temp_password(&self, user_id: &str, temp_password: &str) -> Result<bool> {
        let Some(profile) = self.find(user_id).await? else {
            return Ok(false);
        };

        let mut active: profiles::ActiveModel = profile.into();
        active.must_change_password = Set(true);
        active.temp_password = Set(Some(temp_password.to_string()));
        active.updated_at = Set(crate::db::now_timestamp());
        active.update(&self.conn).await?;

        Ok(true)
    }

    /// Drops the stored temporary password once it has been used to sign in.
    /// The forced-change flag stays set until the user picks a new password.
    pub async fn consume_temp_password(&self, user_id: &str) -> Result<()> {
        let Some(profile) = self.find(user_id).await? else {
            return Ok(());
        };

        if profile.temp_password.is_none() {
            return Ok(());
        }

        let mut active: profiles::ActiveModel = profile.into();
        active.temp_password = Set(None);
        active.updated_at = Set(crate::db::now_timestamp());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn clear_password_change(&self, user_id: &str) -> Result<()> {
        let Some(profile) = self.find(user_id).await? else {
            return Ok(());
        };

        let mut active: profiles::ActiveModel = profile.into();
        active.must_change_password = Set(false);
        active.temp_password = Set(None);
        active.updated_at = Set(crate::db::now_timestamp());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn temp_password(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.find(user_id).await?.and_then(|p| p.temp_password))
    }
}
