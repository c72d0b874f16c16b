use crate::config::{BootstrapConfig, Config, SecurityConfig};
use crate::models::finance::{
    DateRange, EntryUpdate, ExpenseEntry, FinanceKind, FinancialData, IncomeEntry, LedgerEntry,
    NewEntries, NewExpense, NewIncome, NewSaving, SavingEntry,
};
use crate::models::user::{
    AccessRequestStatus, Identity, LoginRecord, Profile, ProfileStatus, Role,
};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::access_request::{AccessRequest, NewAccessRequest};
pub use repositories::identity::NewIdentity;

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that
/// lexicographic order matches chronological order.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[must_use]
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
    security: SecurityConfig,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1, SecurityConfig::default()).await
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
            config.security.clone(),
        )
        .await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
        security: SecurityConfig,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn, security })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub const fn security(&self) -> &SecurityConfig {
        &self.security
    }

    fn identity_repo(&self) -> repositories::identity::IdentityRepository {
        repositories::identity::IdentityRepository::new(self.conn.clone(), self.security.clone())
    }

    fn profile_repo(&self) -> repositories::profile::ProfileRepository {
        repositories::profile::ProfileRepository::new(self.conn.clone())
    }

    fn role_repo(&self) -> repositories::role::RoleRepository {
        repositories::role::RoleRepository::new(self.conn.clone())
    }

    fn token_repo(&self) -> repositories::token::TokenRepository {
        repositories::token::TokenRepository::new(self.conn.clone())
    }

    fn login_repo(&self) -> repositories::login_history::LoginHistoryRepository {
        repositories::login_history::LoginHistoryRepository::new(self.conn.clone())
    }

    fn access_request_repo(&self) -> repositories::access_request::AccessRequestRepository {
        repositories::access_request::AccessRequestRepository::new(self.conn.clone())
    }

    fn finance_repo(&self) -> repositories::finance::FinanceRepository {
        repositories::finance::FinanceRepository::new(self.conn.clone())
    }

    /// Seeds the configured administrator when no admin account exists yet.
    pub async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> Result<bool> {
        let (Some(email), Some(password)) = (&bootstrap.admin_email, &bootstrap.admin_password)
        else {
            return Ok(false);
        };

        if self.role_repo().any_admin().await? {
            return Ok(false);
        }

        let email = crate::models::user::normalize_email(email);
        if let Some(existing) = self.get_identity_by_email(&email).await? {
            self.set_role(&existing.id, Role::Admin).await?;
            info!(user_id = %existing.id, "Promoted existing account to bootstrap admin");
            return Ok(true);
        }

        let identity = self
            .create_identity(NewIdentity {
                email: &email,
                password,
                full_name: Some("Administrator"),
                role: Role::Admin,
                email_confirmed: true,
                must_change_password: true,
                temp_password: None,
                created_by: None,
            })
            .await?;

        info!(user_id = %identity.id, "Bootstrap admin account created");
        Ok(true)
    }

    // Identities

    pub async fn create_identity(&self, new: NewIdentity<'_>) -> Result<Identity> {
        self.identity_repo().create(new).await
    }

    pub async fn get_identity(&self, id: &str) -> Result<Option<Identity>> {
        self.identity_repo().get_by_id(id).await
    }

    pub async fn get_identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.identity_repo().get_by_email(email).await
    }

    pub async fn verify_identity_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>> {
        self.identity_repo().verify_password(email, password).await
    }

    pub async fn update_identity_password(&self, id: &str, new_password: &str) -> Result<bool> {
        self.identity_repo().update_password(id, new_password).await
    }

    pub async fn delete_identity(&self, id: &str) -> Result<bool> {
        self.identity_repo().delete(id).await
    }

    // Profiles

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.profile_repo().get(user_id).await
    }

    pub async fn get_profile_status(&self, user_id: &str) -> Result<Option<ProfileStatus>> {
        self.profile_repo().status(user_id).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.profile_repo().list_all().await
    }

    pub async fn count_profiles(&self) -> Result<u64> {
        self.profile_repo().count_all().await
    }

    pub async fn count_active_profiles(&self) -> Result<u64> {
        self.profile_repo().count_active().await
    }

    pub async fn update_profile_details(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        is_active: bool,
    ) -> Result<bool> {
        self.profile_repo()
            .update_details(user_id, full_name, is_active)
            .await
    }

    pub async fn set_temp_password(&self, user_id: &str, temp_password: &str) -> Result<bool> {
        self.profile_repo()
            .set_temp_password(user_id, temp_password)
            .await
    }

    pub async fn consume_temp_password(&self, user_id: &str) -> Result<()> {
        self.profile_repo().consume_temp_password(user_id).await
    }

    pub async fn clear_password_change(&self, user_id: &str) -> Result<()> {
        self.profile_repo().clear_password_change(user_id).await
    }

    pub async fn get_temp_password(&self, user_id: &str) -> Result<Option<String>> {
        self.profile_repo().temp_password(user_id).await
    }

    // Roles

    pub async fn get_role(&self, user_id: &str) -> Result<Option<Role>> {
        self.role_repo().get(user_id).await
    }

    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<()> {
        self.role_repo().set(user_id, role).await
    }

    // Access tokens

    pub async fn issue_token(&self, user_id: &str) -> Result<(String, String)> {
        let ttl = chrono::Duration::hours(self.security.token_ttl_hours);
        self.token_repo().issue(user_id, ttl).await
    }

    pub async fn verify_token(&self, token: &str) -> Result<Option<String>> {
        self.token_repo().verify(token).await
    }

    pub async fn revoke_token(&self, token: &str) -> Result<bool> {
        self.token_repo().revoke(token).await
    }

    pub async fn revoke_tokens_for(&self, user_id: &str) -> Result<u64> {
        self.token_repo().revoke_all_for(user_id).await
    }

    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        self.token_repo().purge_expired().await
    }

    // Login history

    pub async fn record_login(
        &self,
        user_id: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<i64> {
        self.login_repo()
            .record(user_id, user_agent, ip_address)
            .await
    }

    pub async fn count_logins_since(&self, since: &str) -> Result<u64> {
        self.login_repo().count_since(since).await
    }

    pub async fn count_logins_for(&self, user_id: &str) -> Result<u64> {
        self.login_repo().count_for(user_id).await
    }

    pub async fn last_login_for(&self, user_id: &str) -> Result<Option<String>> {
        self.login_repo().last_login_for(user_id).await
    }

    pub async fn list_logins(&self, user_id: Option<&str>, limit: u64) -> Result<Vec<LoginRecord>> {
        self.login_repo().list(user_id, limit).await
    }

    pub async fn delete_login(&self, id: i64) -> Result<u64> {
        self.login_repo().delete(id).await
    }

    pub async fn clear_logins(&self) -> Result<u64> {
        self.login_repo().clear().await
    }

    pub async fn prune_logins_older_than(&self, hours: i64) -> Result<u64> {
        self.login_repo().prune_older_than(hours).await
    }

    // Access requests

    pub async fn create_access_request(
        &self,
        new: NewAccessRequest<'_>,
    ) -> Result<Option<AccessRequest>> {
        self.access_request_repo().create(new).await
    }

    pub async fn get_access_request(&self, id: i64) -> Result<Option<AccessRequest>> {
        self.access_request_repo().get(id).await
    }

    pub async fn list_access_requests(
        &self,
        status: Option<AccessRequestStatus>,
    ) -> Result<Vec<AccessRequest>> {
        self.access_request_repo().list(status).await
    }

    pub async fn review_access_request(
        &self,
        id: i64,
        status: AccessRequestStatus,
        reviewer: &str,
        reason: Option<&str>,
    ) -> Result<bool> {
        self.access_request_repo()
            .mark_reviewed(id, status, reviewer, reason)
            .await
    }

    pub async fn reopen_access_request(&self, id: i64) -> Result<bool> {
        self.access_request_repo().reopen(id).await
    }

    pub async fn delete_access_request(&self, id: i64) -> Result<bool> {
        self.access_request_repo().delete(id).await
    }

    // Finance

    pub async fn add_income(&self, user_id: &str, entry: &NewIncome) -> Result<i64> {
        self.finance_repo().add_income(user_id, entry).await
    }

    pub async fn add_expense(&self, user_id: &str, entry: &NewExpense) -> Result<i64> {
        self.finance_repo().add_expense(user_id, entry).await
    }

    pub async fn add_saving(&self, user_id: &str, entry: &NewSaving) -> Result<i64> {
        self.finance_repo().add_saving(user_id, entry).await
    }

    pub async fn list_income(&self, user_id: &str, range: &DateRange) -> Result<Vec<IncomeEntry>> {
        self.finance_repo().list_income(user_id, range).await
    }

    pub async fn insert_finance_entries(&self, user_id: &str, entries: &NewEntries) -> Result<u64> {
        self.finance_repo().insert_all(user_id, entries).await
    }

    pub async fn list_expenses(
        &self,
        user_id: &str,
        range: &DateRange,
        search: Option<&str>,
    ) -> Result<Vec<ExpenseEntry>> {
        self.finance_repo().list_expenses(user_id, range, search).await
    }

    pub async fn list_savings(&self, user_id: &str, range: &DateRange) -> Result<Vec<SavingEntry>> {
        self.finance_repo().list_savings(user_id, range).await
    }

    pub async fn financial_data(&self, user_id: &str, range: &DateRange) -> Result<FinancialData> {
        self.finance_repo().all_for(user_id, range).await
    }

    pub async fn delete_finance_entry(
        &self,
        user_id: &str,
        kind: FinanceKind,
        id: i64,
    ) -> Result<bool> {
        self.finance_repo().delete(user_id, kind, id).await
    }

    pub async fn update_finance_entry(
        &self,
        user_id: &str,
        id: i64,
        update: &EntryUpdate,
    ) -> Result<Option<LedgerEntry>> {
        self.finance_repo().update(user_id, id, update).await
    }

    pub async fn clear_finance_kind(&self, user_id: &str, kind: FinanceKind) -> Result<u64> {
        self.finance_repo().clear(user_id, kind).await
    }

    pub async fn clear_finance_data(&self, user_id: &str) -> Result<u64> {
        self.finance_repo().clear_all(user_id).await
    }
}
