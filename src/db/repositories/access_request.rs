use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, sea_query::Expr,
};

use crate::entities::{access_requests, prelude::*};
use crate::models::user::AccessRequestStatus;

pub use crate::entities::access_requests::Model as AccessRequest;

#[derive(Debug, Clone)]
pub struct NewAccessRequest<'a> {
    pub email: &'a str,
    pub phone: &'a str,
    pub full_name: Option<&'a str>,
}

pub struct AccessRequestRepository {
    conn: DatabaseConnection,
}

impl AccessRequestRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn pending_for_email(&self, email: &str) -> Result<Option<AccessRequest>> {
        AccessRequests::find()
            .filter(access_requests::Column::Email.eq(email))
            .filter(access_requests::Column::Status.eq(AccessRequestStatus::Pending.as_str()))
            .one(&self.conn)
            .await
            .context("Failed to query pending access request")
    }

    /// Returns `None` when the email already has a pending request.
    /// The partial unique index on pending emails settles concurrent inserts.
    pub async fn create(&self, new: NewAccessRequest<'_>) -> Result<Option<AccessRequest>> {
        if self.pending_for_email(new.email).await?.is_some() {
            return Ok(None);
        }

        let inserted = access_requests::ActiveModel {
            email: Set(new.email.to_string()),
            phone: Set(new.phone.to_string()),
            full_name: Set(new.full_name.map(str::to_string)),
            status: Set(AccessRequestStatus::Pending.as_str().to_string()),
            created_at: Set(crate::db::now_timestamp()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await;

        match inserted {
            Ok(model) => Ok(Some(model)),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(None)
            }
            Err(err) => Err(err).context("Failed to insert access request"),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<AccessRequest>> {
        Ok(AccessRequests::find_by_id(id).one(&self.conn).await?)
    }

    /// Newest first; `None` lists every status.
    pub async fn list(&self, status: Option<AccessRequestStatus>) -> Result<Vec<AccessRequest>> {
        let mut query = AccessRequests::find()
            .order_by_desc(access_requests::Column::CreatedAt)
            .order_by_desc(access_requests::Column::Id);

        if let Some(status) = status {
            query = query.filter(access_requests::Column::Status.eq(status.as_str()));
        }

        Ok(query.all(&self.conn).await?)
    }

    /// Moves a pending request to `status`. Returns `false` when the request
    /// is gone or was already reviewed, so only one reviewer can win.
    pub async fn mark_reviewed(
        &self,
        id: i64,
        status: AccessRequestStatus,
        reviewer: &str,
        reason: Option<&str>,
    ) -> Result<bool> {
        let mut update = AccessRequests::update_many()
            .col_expr(access_requests::Column::Status, Expr::value(status.as_str()))
            .col_expr(access_requests::Column::ReviewedBy, Expr::value(reviewer))
            .col_expr(
                access_requests::Column::ReviewedAt,
                Expr::value(crate::db::now_timestamp()),
            );
        if let Some(reason) = reason {
            update = update.col_expr(access_requests::Column::RejectionReason, Expr::value(reason));
        }

        let result = update
            .filter(access_requests::Column::Id.eq(id))
            .filter(access_requests::Column::Status.eq(AccessRequestStatus::Pending.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to review access request")?;

        Ok(result.rows_affected > 0)
    }

    /// Puts an approved request back to pending.
    pub async fn reopen(&self, id: i64) -> Result<bool> {
        let result = AccessRequests::update_many()
            .col_expr(
                access_requests::Column::Status,
                Expr::value(AccessRequestStatus::Pending.as_str()),
            )
            .col_expr(access_requests::Column::ReviewedBy, Expr::value(Option::<String>::None))
            .col_expr(access_requests::Column::ReviewedAt, Expr::value(Option::<String>::None))
            .filter(access_requests::Column::Id.eq(id))
            .filter(access_requests::Column::Status.eq(AccessRequestStatus::Approved.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to reopen access request")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = AccessRequests::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected > 0)
    }
}
