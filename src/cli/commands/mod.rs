mod retention;
mod users;

pub use retention::cmd_prune_logins;
pub use users::{cmd_create_admin, cmd_list_users};
