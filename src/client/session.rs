//! Client-side session state: who is signed in, whether they are an admin,
//! and whether they must change their password before doing anything else.
//!
//! State is published through a [`watch`] channel. Backend auth events are
//! consumed on a dedicated listener task, so follow-up backend calls never run
//! inside the call that emitted the event.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{AuthBackend, AuthEvent, AuthEventKind, BackendError, Session};
use crate::config::AuthThrottleConfig;
use crate::models::user::{is_valid_email, is_valid_password, normalize_email};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Sign-in lockout after repeated failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::from(&AuthThrottleConfig::default())
    }
}

impl From<&AuthThrottleConfig> for ThrottlePolicy {
    fn from(config: &AuthThrottleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            lockout: Duration::from_secs(config.lockout_seconds),
        }
    }
}

impl ThrottlePolicy {
    fn lockout_minutes(&self) -> u64 {
        self.lockout.as_secs().div_ceil(60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Unauthenticated,
    /// Signed in, role and profile flags not yet loaded.
    PendingRoleCheck,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub is_admin: bool,
    pub must_change_password: bool,
    pub failed_attempts: u32,
    pub is_blocked: bool,
    /// True until `init` has looked for an existing session.
    pub loading: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            session: None,
            is_admin: false,
            must_change_password: false,
            failed_attempts: 0,
            is_blocked: false,
            loading: true,
        }
    }
}

impl SessionSnapshot {
    fn clear_session(&mut self) {
        self.phase = SessionPhase::Unauthenticated;
        self.session = None;
        self.is_admin = false;
        self.must_change_password = false;
    }

    fn holds(&self, session: &Session) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.user.id == session.user.id)
    }
}

/// Every operation resolves to one of these; `Display` is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be between {min} and {max} characters")]
    InvalidPassword { min: usize, max: usize },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Too many failed attempts. Please try again in {minutes} minutes.")]
    LockedOut { minutes: u64 },

    #[error("Too many failed attempts. Please try again later.")]
    Blocked,

    #[error("Your account has been deactivated. Please contact an administrator.")]
    Deactivated,

    #[error("Session expired. Please log in again.")]
    NotSignedIn,

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Default)]
struct Throttle {
    failed_attempts: u32,
    blocked_until: Option<Instant>,
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    policy: ThrottlePolicy,
    user_agent: Option<String>,
    state: watch::Sender<SessionSnapshot>,
    throttle: Mutex<Throttle>,
    /// Serializes controller operations with listener event handling.
    gate: Mutex<()>,
}

pub struct SessionController {
    inner: Arc<Inner>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
    unblock: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, policy: ThrottlePolicy) -> Self {
        Self::build(backend, policy, None)
    }

    /// Like [`Self::new`], storing `user_agent` with each login record.
    #[must_use]
    pub fn with_user_agent(
        backend: Arc<dyn AuthBackend>,
        policy: ThrottlePolicy,
        user_agent: impl Into<String>,
    ) -> Self {
        Self::build(backend, policy, Some(user_agent.into()))
    }

    fn build(
        backend: Arc<dyn AuthBackend>,
        policy: ThrottlePolicy,
        user_agent: Option<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());

        Self {
            inner: Arc::new(Inner {
                backend,
                policy,
                user_agent,
                state,
                throttle: Mutex::new(Throttle::default()),
                gate: Mutex::new(()),
            }),
            listener: std::sync::Mutex::new(None),
            unblock: std::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Loads any existing session and starts listening for backend auth events.
    pub async fn init(&self) {
        let events = self.inner.backend.subscribe();
        let gate = self.inner.gate.lock().await;

        if let Some(session) = self.inner.backend.current_session().await {
            self.inner.adopt(&session);
            self.inner.derive_flags(&session).await;
        }
        self.inner.state.send_modify(|s| s.loading = false);
        drop(gate);

        let inner = self.inner.clone();
        let handle = tokio::spawn(listen(inner, events));

        if let Ok(mut slot) = self.listener.lock()
            && let Some(previous) = slot.replace(handle)
        {
            previous.abort();
        }
    }

    /// Stops the listener and any pending unblock timer.
    pub fn shutdown(&self) {
        for slot in [&self.listener, &self.unblock] {
            if let Ok(mut slot) = slot.lock()
                && let Some(handle) = slot.take()
            {
                handle.abort();
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        if self.is_blocked().await {
            return Err(SessionError::Blocked);
        }

        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(SessionError::InvalidEmail);
        }
        // Same message as a wrong password.
        if !is_valid_password(password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH) {
            return Err(SessionError::InvalidCredentials);
        }

        let _gate = self.inner.gate.lock().await;
        let session = match self
            .inner
            .backend
            .sign_in_with_password(&email, password)
            .await
        {
            Ok(session) => session,
            // The server refuses inactive profiles after checking the password.
            Err(BackendError::Api { status: 403, .. }) => {
                info!(email = %email, "Sign-in refused for deactivated account");
                return Err(SessionError::Deactivated);
            }
            Err(e) => {
                debug!(error = %e, "Sign-in rejected by backend");
                return Err(self.record_failure().await);
            }
        };

        self.reset_throttle().await;

        match self.inner.backend.fetch_profile_status().await {
            Ok(status) if !status.is_active => {
                info!(user_id = %session.user.id, "Sign-in refused for deactivated account");
                self.inner.sign_out().await;
                return Err(SessionError::Deactivated);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not load profile after sign-in"),
        }

        self.inner.adopt(&session);
        self.inner.derive_flags(&session).await;
        Ok(())
    }

    /// Creates an account. The new identity is always a plain user.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(SessionError::InvalidEmail);
        }
        if !is_valid_password(password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH) {
            return Err(SessionError::InvalidPassword {
                min: MIN_PASSWORD_LENGTH,
                max: MAX_PASSWORD_LENGTH,
            });
        }

        self.inner
            .backend
            .sign_up(&email, password)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Backend(e.to_string()))
    }

    /// Always leaves the controller unauthenticated.
    pub async fn sign_out(&self) {
        let _gate = self.inner.gate.lock().await;
        self.inner.sign_out().await;
    }

    /// Replaces the signed-in user's password and lifts the forced change.
    pub async fn change_password(&self, new_password: &str) -> Result<(), SessionError> {
        let _gate = self.inner.gate.lock().await;
        if self.inner.state.borrow().session.is_none() {
            return Err(SessionError::NotSignedIn);
        }
        if !is_valid_password(new_password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH) {
            return Err(SessionError::InvalidPassword {
                min: MIN_PASSWORD_LENGTH,
                max: MAX_PASSWORD_LENGTH,
            });
        }

        self.inner
            .backend
            .update_password(new_password)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;

        self.inner
            .state
            .send_modify(|s| s.must_change_password = false);
        Ok(())
    }

    /// Expired lockouts are cleared here as well as by the timer.
    async fn is_blocked(&self) -> bool {
        let mut throttle = self.inner.throttle.lock().await;
        match throttle.blocked_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *throttle = Throttle::default();
                self.inner.publish_throttle(&throttle);
                false
            }
            None => false,
        }
    }

    async fn record_failure(&self) -> SessionError {
        let mut throttle = self.inner.throttle.lock().await;
        throttle.failed_attempts += 1;

        if throttle.failed_attempts < self.inner.policy.max_attempts {
            self.inner.publish_throttle(&throttle);
            return SessionError::InvalidCredentials;
        }

        let until = Instant::now() + self.inner.policy.lockout;
        throttle.blocked_until = Some(until);
        self.inner.publish_throttle(&throttle);
        drop(throttle);

        warn!(
            attempts = self.inner.policy.max_attempts,
            lockout_secs = self.inner.policy.lockout.as_secs(),
            "Too many failed sign-in attempts"
        );

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(until).await;
            let mut throttle = inner.throttle.lock().await;
            if throttle.blocked_until == Some(until) {
                *throttle = Throttle::default();
                inner.publish_throttle(&throttle);
            }
        });

        if let Ok(mut slot) = self.unblock.lock()
            && let Some(previous) = slot.replace(handle)
        {
            previous.abort();
        }

        SessionError::LockedOut {
            minutes: self.inner.policy.lockout_minutes(),
        }
    }

    async fn reset_throttle(&self) {
        let mut throttle = self.inner.throttle.lock().await;
        *throttle = Throttle::default();
        self.inner.publish_throttle(&throttle);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    async fn sign_out(&self) {
        if let Err(e) = self.backend.sign_out().await {
            warn!(error = %e, "Backend sign-out failed; clearing local session anyway");
        }
        self.state.send_modify(SessionSnapshot::clear_session);
    }

    fn publish_throttle(&self, throttle: &Throttle) {
        let failed_attempts = throttle.failed_attempts;
        let is_blocked = throttle.blocked_until.is_some();
        self.state.send_modify(|s| {
            s.failed_attempts = failed_attempts;
            s.is_blocked = is_blocked;
        });
    }

    fn adopt(&self, session: &Session) {
        let session = session.clone();
        self.state.send_modify(|s| {
            if !s.holds(&session) {
                s.phase = SessionPhase::PendingRoleCheck;
                s.is_admin = false;
                s.must_change_password = false;
            }
            s.session = Some(session);
        });
    }

    /// Role and profile lookups fail closed: errors read as "not admin".
    async fn derive_flags(&self, session: &Session) {
        let (role, status) = tokio::join!(
            self.backend.fetch_role(),
            self.backend.fetch_profile_status()
        );

        let is_admin = role
            .inspect_err(|e| warn!(error = %e, "Role lookup failed"))
            .is_ok_and(|r| r.is_admin());
        let must_change_password = status
            .inspect_err(|e| warn!(error = %e, "Profile lookup failed"))
            .is_ok_and(|s| s.must_change_password);

        self.state.send_modify(|s| {
            // Signed out while the lookups were in flight.
            if !s.holds(session) {
                return;
            }
            s.is_admin = is_admin;
            s.must_change_password = must_change_password;
            s.phase = SessionPhase::Ready;
        });
    }

    async fn handle_event(&self, event: AuthEvent) {
        debug!(kind = ?event.kind, "Auth event");
        let _gate = self.gate.lock().await;

        // The event payload may be stale by now; trust the backend's current view.
        let Some(session) = self.backend.current_session().await else {
            self.state.send_modify(SessionSnapshot::clear_session);
            return;
        };

        self.adopt(&session);
        self.derive_flags(&session).await;

        if event.kind == AuthEventKind::SignedIn
            && let Err(e) = self.backend.record_login(self.user_agent.as_deref()).await
        {
            warn!(error = %e, "Failed to record login history");
        }
    }
}

async fn listen(inner: Arc<Inner>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => inner.handle_event(event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth listener lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
