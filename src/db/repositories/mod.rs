pub mod access_request;
pub mod finance;
pub mod identity;
pub mod login_history;
pub mod profile;
pub mod role;
pub mod token;
