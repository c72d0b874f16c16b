use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::collections::HashMap;

use crate::entities::{login_history, prelude::*, profiles};
use crate::models::user::LoginRecord;

pub struct LoginHistoryRepository {
    conn: DatabaseConnection,
}

impl LoginHistoryRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn record(
        &self,
        user_id: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<i64> {
        let active_model = login_history::ActiveModel {
            user_id: Set(user_id.to_string()),
            login_at: Set(crate::db::now_timestamp()),
            user_agent: Set(user_agent.map(str::to_string)),
            ip_address: Set(ip_address.map(str::to_string)),
            ..Default::default()
        };

        let result = LoginHistory::insert(active_model)
            .exec(&self.conn)
            .await
            .context("Failed to record login")?;

        Ok(result.last_insert_id)
    }

    pub async fn count_since(&self, since: &str) -> Result<u64> {
        Ok(LoginHistory::find()
            .filter(login_history::Column::LoginAt.gte(since))
            .count(&self.conn)
            .await?)
    }

    pub async fn count_for(&self, user_id: &str) -> Result<u64> {
        Ok(LoginHistory::find()
            .filter(login_history::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await?)
    }

    pub async fn last_login_for(&self, user_id: &str) -> Result<Option<String>> {
        let row = LoginHistory::find()
            .filter(login_history::Column::UserId.eq(user_id))
            .order_by_desc(login_history::Column::LoginAt)
            .one(&self.conn)
            .await?;

        Ok(row.map(|r| r.login_at))
    }

    /// Newest first, annotated with the account's email and name.
    pub async fn list(&self, user_id: Option<&str>, limit: u64) -> Result<Vec<LoginRecord>> {
        let mut query = LoginHistory::find()
            .order_by_desc(login_history::Column::LoginAt)
            .order_by_desc(login_history::Column::Id);

        if let Some(user_id) = user_id {
            query = query.filter(login_history::Column::UserId.eq(user_id));
        }

        let rows = query
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list login history")?;

        let user_ids: Vec<String> = rows.iter().map(|r| r.user_id.clone()).collect();
        let owners: HashMap<String, profiles::Model> = Profiles::find()
            .filter(profiles::Column::UserId.is_in(user_ids))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|p| (p.user_id.clone(), p))
            .collect();

        Ok(rows
            .into_iter()
            .map(|r| {
                let owner = owners.get(&r.user_id);
                LoginRecord {
                    id: r.id,
                    email: owner.map(|p| p.email.clone()),
                    full_name: owner.and_then(|p| p.full_name.clone()),
                    user_id: r.user_id,
                    login_at: r.login_at,
                    user_agent: r.user_agent,
                    ip_address: r.ip_address,
                }
            })
            .collect())
    }

    pub async fn delete(&self, id: i64) -> Result<u64> {
        let result = LoginHistory::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected)
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = LoginHistory::delete_many().exec(&self.conn).await?;
        Ok(result.rows_affected)
    }

    pub async fn prune_older_than(&self, hours: i64) -> Result<u64> {
        let cutoff = crate::db::format_timestamp(Utc::now() - Duration::hours(hours));

        let result = LoginHistory::delete_many()
            .filter(login_history::Column::LoginAt.lt(cutoff))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }
}
