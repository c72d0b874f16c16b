pub use super::access_requests::Entity as AccessRequests;
pub use super::access_tokens::Entity as AccessTokens;
pub use super::expenses::Entity as Expenses;
pub use super::identities::Entity as Identities;
pub use super::income::Entity as Income;
pub use super::login_history::Entity as LoginHistory;
pub use super::profiles::Entity as Profiles;
pub use super::savings::Entity as Savings;
pub use super::user_roles::Entity as UserRoles;
