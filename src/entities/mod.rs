pub mod prelude;

pub mod access_requests;
pub mod access_tokens;
pub mod expenses;
pub mod identities;
pub mod income;
pub mod login_history;
pub mod profiles;
pub mod savings;
pub mod user_roles;
