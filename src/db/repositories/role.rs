use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::user_roles;
use crate::models::user::Role;

pub struct RoleRepository {
    conn: DatabaseConnection,
}

impl RoleRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<Role>> {
        let row = user_roles::Entity::find()
            .filter(user_roles::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query role")?;

        row.map(|r| r.role.parse()).transpose()
    }

    /// Upserts the role row for a user.
    pub async fn set(&self, user_id: &str, role: Role) -> Result<()> {
        let existing = user_roles::Entity::find()
            .filter(user_roles::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query role for update")?;

        match existing {
            Some(row) => {
                let mut active: user_roles::ActiveModel = row.into();
                active.role = Set(role.as_str().to_string());
                active.update(&self.conn).await?;
            }
            None => {
                user_roles::ActiveModel {
                    user_id: Set(user_id.to_string()),
                    role: Set(role.as_str().to_string()),
                    created_at: Set(crate::db::now_timestamp()),
                    ..Default::default()
                }
                .insert(&self.conn)
                .await?;
            }
        }

        Ok(())
    }

    pub async fn any_admin(&self) -> Result<bool> {
        let row = user_roles::Entity::find()
            .filter(user_roles::Column::Role.eq(Role::Admin.as_str()))
            .one(&self.conn)
            .await
            .context("Failed to query admin roles")?;

        Ok(row.is_some())
    }
}
