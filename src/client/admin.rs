use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

use super::backend::{AuthBackend, BackendError, read_json};
use crate::models::finance::FinancialData;
use crate::models::user::Role;
use crate::services::admin_service::{
    AccessRequestList, AdminAction, AdminStats, CreatedUser, DeletedCount, LoginHistory,
    PasswordReset, RequestFilter, Success, UserList,
};

const GATEWAY_PATH: &str = "/functions/v1/admin-users";

/// Typed caller for the admin gateway, authenticated with the backend's current session.
pub struct AdminClient {
    client: Client,
    endpoint: Url,
    backend: Arc<dyn AuthBackend>,
}

impl AdminClient {
    pub fn new(base_url: &str, backend: Arc<dyn AuthBackend>) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::builder()
                .user_agent(concat!("fintrack/", env!("CARGO_PKG_VERSION")))
                .build()?,
            endpoint: Url::parse(base_url)?.join(GATEWAY_PATH)?,
            backend,
        })
    }

    /// Sends one action. Without a session nothing is sent.
    pub async fn invoke<T: DeserializeOwned>(&self, action: &AdminAction) -> Result<T, BackendError> {
        let session = self
            .backend
            .current_session()
            .await
            .ok_or(BackendError::SessionExpired)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&session.access_token)
            .json(action)
            .send()
            .await?;

        read_json(response).await
    }

    pub async fn create_user(
        &self,
        email: &str,
        full_name: Option<&str>,
        role: Role,
    ) -> Result<CreatedUser, BackendError> {
        self.invoke(&AdminAction::CreateUser {
            email: email.to_string(),
            full_name: full_name.map(str::to_string),
            role,
        })
        .await
    }

    pub async fn update_user(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        is_active: bool,
        role: Role,
    ) -> Result<Success, BackendError> {
        self.invoke(&AdminAction::UpdateUser {
            user_id: user_id.to_string(),
            full_name: full_name.map(str::to_string),
            is_active,
            role,
        })
        .await
    }

    pub async fn reset_password(&self, user_id: &str) -> Result<PasswordReset, BackendError> {
        self.invoke(&AdminAction::ResetPassword {
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<Success, BackendError> {
        self.invoke(&AdminAction::DeleteUser {
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn get_stats(&self) -> Result<AdminStats, BackendError> {
        self.invoke(&AdminAction::GetStats).await
    }

    pub async fn get_users(&self) -> Result<UserList, BackendError> {
        self.invoke(&AdminAction::GetUsers).await
    }

    pub async fn get_login_history(
        &self,
        user_id: Option<&str>,
        limit: Option<u64>,
    ) -> Result<LoginHistory, BackendError> {
        self.invoke(&AdminAction::GetLoginHistory {
            user_id: user_id.map(str::to_string),
            limit,
        })
        .await
    }

    pub async fn get_user_financial_data(
        &self,
        user_id: &str,
    ) -> Result<FinancialData, BackendError> {
        self.invoke(&AdminAction::GetUserFinancialData {
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn list_access_requests(
        &self,
        status: RequestFilter,
    ) -> Result<AccessRequestList, BackendError> {
        self.invoke(&AdminAction::ListAccessRequests { status }).await
    }

    pub async fn approve_access_request(
        &self,
        request_id: i64,
        role: Role,
    ) -> Result<CreatedUser, BackendError> {
        self.invoke(&AdminAction::ApproveAccessRequest { request_id, role })
            .await
    }

    pub async fn reject_access_request(
        &self,
        request_id: i64,
        reason: Option<&str>,
    ) -> Result<Success, BackendError> {
        self.invoke(&AdminAction::RejectAccessRequest {
            request_id,
            reason: reason.map(str::to_string),
        })
        .await
    }

    pub async fn delete_access_request(&self, request_id: i64) -> Result<Success, BackendError> {
        self.invoke(&AdminAction::DeleteAccessRequest { request_id })
            .await
    }

    /// Deletes one record, or the whole history when `id` is `None`.
    pub async fn delete_login_history(&self, id: Option<i64>) -> Result<DeletedCount, BackendError> {
        self.invoke(&AdminAction::DeleteLoginHistory { id }).await
    }
}
