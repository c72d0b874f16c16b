//! Client side of the service: session state for an interactive front end and
//! a typed wrapper over the admin gateway.

pub mod admin;
pub mod backend;
pub mod session;

pub use admin::AdminClient;
pub use backend::{AuthBackend, AuthEvent, AuthEventKind, BackendError, HttpAuthBackend, Session};
pub use session::{
    SessionController, SessionError, SessionPhase, SessionSnapshot, ThrottlePolicy,
};
