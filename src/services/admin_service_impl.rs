//! `SeaORM` implementation of the `AdminService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, TimeZone, Utc};
use tracing::{error, info, warn};

use crate::db::{Store, format_timestamp};
use crate::models::finance::DateRange;
use crate::models::user::{AccessRequestStatus, Identity, Role, UserSummary};
use crate::services::admin_service::{
    AccessRequestList, AdminAction, AdminError, AdminResponse, AdminService, AdminStats, Caller,
    CreatedUser, DEFAULT_HISTORY_LIMIT, DeletedCount, LoginHistory, MAX_HISTORY_LIMIT,
    PasswordReset, RequestFilter, Success, UserList,
};
use crate::services::auth_service::{AuthService, ProvisionedUser};
use crate::services::passwords::generate_temp_password;

pub struct SeaOrmAdminService {
    store: Store,
    auth: Arc<dyn AuthService>,
}

impl SeaOrmAdminService {
    #[must_use]
    pub fn new(store: Store, auth: Arc<dyn AuthService>) -> Self {
        Self { store, auth }
    }

    fn temp_password(&self) -> String {
        generate_temp_password(self.store.security().temp_password_length)
    }

    async fn require_user(&self, user_id: &str) -> Result<Identity, AdminError> {
        self.store
            .get_identity(user_id)
            .await?
            .ok_or_else(|| AdminError::NotFound("User".to_string()))
    }

    async fn require_pending_request(
        &self,
        request_id: i64,
    ) -> Result<crate::db::AccessRequest, AdminError> {
        let request = self
            .store
            .get_access_request(request_id)
            .await?
            .ok_or_else(|| AdminError::NotFound("Access request".to_string()))?;

        if request.status != AccessRequestStatus::Pending.as_str() {
            return Err(already_reviewed(&request.status));
        }

        Ok(request)
    }

    /// Moves the request out of `pending`, or reports who got there first.
    async fn claim_request(
        &self,
        request_id: i64,
        status: AccessRequestStatus,
        caller: &Caller,
        reason: Option<&str>,
    ) -> Result<(), AdminError> {
        if self
            .store
            .review_access_request(request_id, status, &caller.user_id, reason)
            .await?
        {
            return Ok(());
        }

        // Lost a race with another reviewer, or the request was deleted.
        let request = self.require_pending_request(request_id).await?;
        Err(already_reviewed(&request.status))
    }

    async fn create_user(
        &self,
        caller: &Caller,
        email: &str,
        full_name: Option<&str>,
        role: Role,
    ) -> Result<CreatedUser, AdminError> {
        let temp_password = self.temp_password();

        let user = self
            .auth
            .admin_create_user(ProvisionedUser {
                email,
                password: &temp_password,
                full_name,
                role,
                temp_password: Some(&temp_password),
                created_by: &caller.user_id,
            })
            .await?;

        info!(event = "user_created", user_id = %user.id, role = %role, created_by = %caller.user_id, "User created by admin");

        Ok(CreatedUser {
            success: true,
            user,
            temp_password,
        })
    }

    async fn update_user(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        is_active: bool,
        role: Role,
    ) -> Result<Success, AdminError> {
        if !self
            .store
            .update_profile_details(user_id, full_name, is_active)
            .await?
        {
            return Err(AdminError::NotFound("User".to_string()));
        }

        self.store.set_role(user_id, role).await?;

        if !is_active {
            let revoked = self.store.revoke_tokens_for(user_id).await?;
            if revoked > 0 {
                info!(user_id = %user_id, revoked, "Revoked tokens of deactivated user");
            }
        }

        Ok(Success { success: true })
    }

    async fn reset_password(&self, user_id: &str) -> Result<PasswordReset, AdminError> {
        self.require_user(user_id).await?;

        let temp_password = self.temp_password();
        self.auth.admin_set_password(user_id, &temp_password).await?;
        self.store.set_temp_password(user_id, &temp_password).await?;

        info!(event = "password_reset", user_id = %user_id, "Temporary password issued");

        Ok(PasswordReset {
            success: true,
            temp_password,
        })
    }

    async fn get_stats(&self) -> Result<AdminStats, AdminError> {
        let since = start_of_local_day();

        let (total_users, active_users, logins_today) = futures::try_join!(
            self.store.count_profiles(),
            self.store.count_active_profiles(),
            self.store.count_logins_since(&since),
        )?;

        Ok(AdminStats {
            total_users,
            active_users,
            logins_today,
        })
    }

    /// One pair of lookups per user, matching the listing's expected scale.
    async fn get_users(&self) -> Result<UserList, AdminError> {
        let profiles = self.store.list_profiles().await?;
        let mut users = Vec::with_capacity(profiles.len());

        for profile in profiles {
            let (role, last_login, login_count) = futures::try_join!(
                self.store.get_role(&profile.user_id),
                self.store.last_login_for(&profile.user_id),
                self.store.count_logins_for(&profile.user_id),
            )?;

            users.push(UserSummary {
                profile,
                role: role.unwrap_or_default(),
                last_login,
                login_count,
            });
        }

        Ok(UserList { users })
    }

    async fn get_login_history(
        &self,
        user_id: Option<&str>,
        limit: Option<u64>,
    ) -> Result<LoginHistory, AdminError> {
        if let Some(user_id) = user_id {
            self.require_user(user_id).await?;
        }

        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(AdminError::BadRequest(format!(
                "Invalid limit: {limit}. Limit must be between 1 and {MAX_HISTORY_LIMIT}"
            )));
        }

        let history = self.store.list_logins(user_id, limit).await?;

        Ok(LoginHistory { history })
    }

    async fn approve_access_request(
        &self,
        caller: &Caller,
        request_id: i64,
        role: Role,
    ) -> Result<CreatedUser, AdminError> {
        let request = self.require_pending_request(request_id).await?;

        self.claim_request(request_id, AccessRequestStatus::Approved, caller, None)
            .await?;

        let created = match self
            .create_user(caller, &request.email, request.full_name.as_deref(), role)
            .await
        {
            Ok(created) => created,
            Err(err) => {
                warn!(event = "access_request_reopened", request_id, error = %err, "Account creation failed; request returned to pending");
                if let Err(reopen_err) = self.store.reopen_access_request(request_id).await {
                    error!(request_id, error = %reopen_err, "Failed to reopen access request");
                }
                return Err(err);
            }
        };

        info!(event = "access_request_approved", request_id, user_id = %created.user.id, "Access request approved");
        Ok(created)
    }

    async fn reject_access_request(
        &self,
        caller: &Caller,
        request_id: i64,
        reason: Option<&str>,
    ) -> Result<Success, AdminError> {
        self.claim_request(request_id, AccessRequestStatus::Rejected, caller, reason)
            .await?;

        info!(event = "access_request_rejected", request_id, "Access request rejected");
        Ok(Success { success: true })
    }
}

fn already_reviewed(status: &str) -> AdminError {
    AdminError::BadRequest(format!("Access request has already been {status}"))
}

/// Midnight of the server's local day, as a stored timestamp.
fn start_of_local_day() -> String {
    let now = Local::now();
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map_or_else(|| now.with_timezone(&Utc), |dt| dt.with_timezone(&Utc));

    format_timestamp(midnight)
}

#[async_trait]
impl AdminService for SeaOrmAdminService {
    async fn authorize(&self, token: Option<&str>) -> Result<Caller, AdminError> {
        let token = token.ok_or(AdminError::Unauthorized)?;

        let identity = self.auth.verify_token(token).await?;

        let active = self
            .store
            .get_profile_status(&identity.id)
            .await?
            .is_some_and(|status| status.is_active);
        if !active {
            warn!(event = "admin_forbidden", user_id = %identity.id, "Inactive profile attempted gateway access");
            return Err(AdminError::Deactivated);
        }

        let role = self.store.get_role(&identity.id).await?;
        if !role.is_some_and(Role::is_admin) {
            warn!(event = "admin_forbidden", user_id = %identity.id, "Non-admin attempted gateway access");
            return Err(AdminError::Forbidden);
        }

        Ok(Caller {
            user_id: identity.id,
            email: identity.email,
        })
    }

    async fn execute(
        &self,
        caller: &Caller,
        action: AdminAction,
    ) -> Result<AdminResponse, AdminError> {
        info!(event = "admin_action", action = action.name(), caller = %caller.user_id, "Dispatching admin action");

        match action {
            AdminAction::CreateUser {
                email,
                full_name,
                role,
            } => self
                .create_user(caller, &email, full_name.as_deref(), role)
                .await
                .map(AdminResponse::Created),

            AdminAction::UpdateUser {
                user_id,
                full_name,
                is_active,
                role,
            } => self
                .update_user(&user_id, full_name.as_deref(), is_active, role)
                .await
                .map(AdminResponse::Success),

            AdminAction::ResetPassword { user_id } => self
                .reset_password(&user_id)
                .await
                .map(AdminResponse::PasswordReset),

            AdminAction::DeleteUser { user_id } => {
                self.auth.admin_delete_user(&user_id).await?;
                info!(event = "user_deleted", user_id = %user_id, deleted_by = %caller.user_id, "User deleted by admin");
                Ok(AdminResponse::Success(Success { success: true }))
            }

            AdminAction::GetStats => self.get_stats().await.map(AdminResponse::Stats),

            AdminAction::GetUsers => self.get_users().await.map(AdminResponse::Users),

            AdminAction::GetLoginHistory { user_id, limit } => self
                .get_login_history(user_id.as_deref(), limit)
                .await
                .map(AdminResponse::History),

            AdminAction::GetUserFinancialData { user_id } => {
                self.require_user(&user_id).await?;
                let data = self
                    .store
                    .financial_data(&user_id, &DateRange::default())
                    .await?;
                Ok(AdminResponse::FinancialData(data))
            }

            AdminAction::ListAccessRequests { status } => {
                let requests = self
                    .store
                    .list_access_requests(RequestFilter::status(status))
                    .await?;
                Ok(AdminResponse::AccessRequests(AccessRequestList { requests }))
            }

            AdminAction::ApproveAccessRequest { request_id, role } => self
                .approve_access_request(caller, request_id, role)
                .await
                .map(AdminResponse::Created),

            AdminAction::RejectAccessRequest { request_id, reason } => self
                .reject_access_request(caller, request_id, reason.as_deref())
                .await
                .map(AdminResponse::Success),

            AdminAction::DeleteAccessRequest { request_id } => {
                if !self.store.delete_access_request(request_id).await? {
                    return Err(AdminError::NotFound("Access request".to_string()));
                }
                Ok(AdminResponse::Success(Success { success: true }))
            }

            AdminAction::DeleteLoginHistory { id } => {
                let deleted = match id {
                    Some(id) => self.store.delete_login(id).await?,
                    None => self.store.clear_logins().await?,
                };
                info!(event = "login_history_deleted", deleted, "Login history deleted by admin");
                Ok(AdminResponse::Deleted(DeletedCount {
                    success: true,
                    deleted,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_local_day_is_not_in_future() {
        let since = start_of_local_day();
        assert!(since <= crate::db::now_timestamp());
        assert!(since.ends_with('Z'));
    }
}
