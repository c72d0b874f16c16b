pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, ProvisionedUser, TokenGrant};
pub use auth_service_impl::SeaOrmAuthService;

pub mod admin_service;
pub mod admin_service_impl;
pub use admin_service::{AdminAction, AdminError, AdminResponse, AdminService, Caller};
pub use admin_service_impl::SeaOrmAdminService;

pub mod passwords;

pub mod retention;
pub use retention::RetentionScheduler;

pub mod workbook;
pub use workbook::{ImportSummary, WorkbookError, WorkbookService};
