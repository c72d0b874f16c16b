//! Domain service for the privileged admin gateway.
//!
//! Every call is authorized in two steps before any action runs: the bearer
//! token is resolved through the ordinary credential path, then the caller's
//! role is re-read from the store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::AccessRequest;
use crate::models::finance::FinancialData;
use crate::models::user::{AccessRequestStatus, Identity, LoginRecord, Role, UserSummary};
use crate::services::auth_service::AuthError;

pub const DEFAULT_HISTORY_LIMIT: u64 = 50;
pub const MAX_HISTORY_LIMIT: u64 = 1000;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Admin access required")]
    Forbidden,

    #[error("Your account has been deactivated. Please contact an administrator.")]
    Deactivated,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AdminError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AdminError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<AuthError> for AdminError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized | AuthError::InvalidCredentials => Self::Unauthorized,
            AuthError::UserNotFound => Self::NotFound("User".to_string()),
            AuthError::Deactivated => Self::Deactivated,
            AuthError::Conflict(msg) | AuthError::Validation(msg) => Self::BadRequest(msg),
            AuthError::Database(msg) => Self::Database(msg),
            AuthError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// Verified administrator on whose behalf an action runs.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub email: String,
}

/// Which access requests `list_access_requests` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestFilter {
    #[default]
    Pending,
    Approved,
    Rejected,
    All,
}

impl RequestFilter {
    #[must_use]
    pub const fn status(self) -> Option<AccessRequestStatus> {
        match self {
            Self::Pending => Some(AccessRequestStatus::Pending),
            Self::Approved => Some(AccessRequestStatus::Approved),
            Self::Rejected => Some(AccessRequestStatus::Rejected),
            Self::All => None,
        }
    }
}

/// Gateway request body, keyed by its `action` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    CreateUser {
        email: String,
        #[serde(default)]
        full_name: Option<String>,
        #[serde(default)]
        role: Role,
    },
    UpdateUser {
        user_id: String,
        #[serde(default)]
        full_name: Option<String>,
        is_active: bool,
        role: Role,
    },
    ResetPassword {
        user_id: String,
    },
    DeleteUser {
        user_id: String,
    },
    GetStats,
    GetUsers,
    GetLoginHistory {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        limit: Option<u64>,
    },
    GetUserFinancialData {
        user_id: String,
    },
    ListAccessRequests {
        #[serde(default)]
        status: RequestFilter,
    },
    ApproveAccessRequest {
        request_id: i64,
        #[serde(default)]
        role: Role,
    },
    RejectAccessRequest {
        request_id: i64,
        #[serde(default)]
        reason: Option<String>,
    },
    DeleteAccessRequest {
        request_id: i64,
    },
    DeleteLoginHistory {
        #[serde(default)]
        id: Option<i64>,
    },
}

impl AdminAction {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateUser { .. } => "create_user",
            Self::UpdateUser { .. } => "update_user",
            Self::ResetPassword { .. } => "reset_password",
            Self::DeleteUser { .. } => "delete_user",
            Self::GetStats => "get_stats",
            Self::GetUsers => "get_users",
            Self::GetLoginHistory { .. } => "get_login_history",
            Self::GetUserFinancialData { .. } => "get_user_financial_data",
            Self::ListAccessRequests { .. } => "list_access_requests",
            Self::ApproveAccessRequest { .. } => "approve_access_request",
            Self::RejectAccessRequest { .. } => "reject_access_request",
            Self::DeleteAccessRequest { .. } => "delete_access_request",
            Self::DeleteLoginHistory { .. } => "delete_login_history",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedUser {
    pub success: bool,
    pub user: Identity,
    /// Shown to the administrator exactly once.
    pub temp_password: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordReset {
    pub success: bool,
    pub temp_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: u64,
    pub active_users: u64,
    pub logins_today: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginHistory {
    pub history: Vec<LoginRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequestList {
    pub requests: Vec<AccessRequest>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeletedCount {
    pub success: bool,
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AdminResponse {
    Created(CreatedUser),
    Success(Success),
    PasswordReset(PasswordReset),
    Stats(AdminStats),
    Users(UserList),
    History(LoginHistory),
    FinancialData(FinancialData),
    AccessRequests(AccessRequestList),
    Deleted(DeletedCount),
}

#[async_trait::async_trait]
pub trait AdminService: Send + Sync {
    /// Resolves the bearer token and confirms the caller holds the admin role.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Unauthorized`] for a missing or invalid token and
    /// [`AdminError::Forbidden`] for any non-admin caller.
    async fn authorize(&self, token: Option<&str>) -> Result<Caller, AdminError>;

    /// Runs one action for an already authorized caller.
    async fn execute(&self, caller: &Caller, action: AdminAction)
    -> Result<AdminResponse, AdminError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_tag_parsing() {
        let action: AdminAction = serde_json::from_str(r#"{"action":"get_stats"}"#).unwrap();
        assert_eq!(action, AdminAction::GetStats);

        let action: AdminAction =
            serde_json::from_str(r#"{"action":"create_user","email":"a@b.co"}"#).unwrap();
        assert_eq!(
            action,
            AdminAction::CreateUser {
                email: "a@b.co".to_string(),
                full_name: None,
                role: Role::User,
            }
        );

        let action: AdminAction =
            serde_json::from_str(r#"{"action":"list_access_requests"}"#).unwrap();
        assert_eq!(
            action,
            AdminAction::ListAccessRequests {
                status: RequestFilter::Pending
            }
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_str::<AdminAction>(r#"{"action":"drop_tables"}"#).is_err());
        assert!(serde_json::from_str::<AdminAction>(r#"{"user_id":"x"}"#).is_err());
        assert!(
            serde_json::from_str::<AdminAction>(r#"{"action":"delete_user"}"#).is_err(),
            "missing params must not parse"
        );
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(AdminStats {
            total_users: 10,
            active_users: 7,
            logins_today: 3,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"totalUsers": 10, "activeUsers": 7, "loginsToday": 3})
        );
    }
}
