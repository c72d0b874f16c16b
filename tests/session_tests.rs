//! Session controller behaviour against an in-memory credential backend.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fintrack::client::{
    AuthBackend, AuthEvent, AuthEventKind, BackendError, Session, SessionController,
    SessionError, SessionPhase, ThrottlePolicy,
};
use fintrack::models::user::{Identity, ProfileStatus, Role};
use tokio::sync::broadcast;

const EMAIL: &str = "user@example.com";
const PASSWORD: &str = "correct-horse";

#[derive(Default)]
struct Calls {
    sign_in: AtomicUsize,
    sign_up: AtomicUsize,
    sign_out: AtomicUsize,
    fetch_role: AtomicUsize,
    record_login: AtomicUsize,
    update_password: AtomicUsize,
}

struct FakeBackend {
    role: Role,
    status: Mutex<ProfileStatus>,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    calls: Calls,
    /// Answers 403 for inactive profiles the way the server does.
    refuses_inactive: AtomicBool,
}

impl FakeBackend {
    fn new(role: Role, status: ProfileStatus) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            role,
            status: Mutex::new(status),
            session: Mutex::new(None),
            events,
            calls: Calls::default(),
            refuses_inactive: AtomicBool::new(false),
        })
    }

    fn active_user() -> Arc<Self> {
        Self::new(
            Role::User,
            ProfileStatus {
                is_active: true,
                must_change_password: false,
            },
        )
    }

    fn session() -> Session {
        Session {
            access_token: "token-1".to_string(),
            expires_at: "2099-01-01T00:00:00Z".to_string(),
            user: Identity {
                id: "user-1".to_string(),
                email: EMAIL.to_string(),
                email_confirmed: true,
                created_at: "2024-01-01T00:00:00Z".to_string(),
            },
        }
    }

    fn emit(&self, kind: AuthEventKind) {
        let session = self.session.lock().unwrap().clone();
        let _ = self.events.send(AuthEvent { kind, session });
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<Identity, BackendError> {
        self.calls.sign_up.fetch_add(1, Ordering::SeqCst);
        Ok(Identity {
            email: email.to_string(),
            ..Self::session().user
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.calls.sign_in.fetch_add(1, Ordering::SeqCst);
        if email != EMAIL || password != PASSWORD {
            return Err(BackendError::Unauthorized("Invalid credentials".to_string()));
        }
        if self.refuses_inactive.load(Ordering::SeqCst) && !self.status.lock().unwrap().is_active {
            return Err(BackendError::Api {
                status: 403,
                message: "Your account has been deactivated. Please contact an administrator."
                    .to_string(),
            });
        }

        let session = Self::session();
        *self.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEventKind::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.calls.sign_out.fetch_add(1, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
        self.emit(AuthEventKind::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let session = self
            .session
            .lock()
            .unwrap()
            .clone()
            .ok_or(BackendError::SessionExpired)?;
        self.emit(AuthEventKind::TokenRefreshed);
        Ok(session)
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    async fn fetch_role(&self) -> Result<Role, BackendError> {
        self.calls.fetch_role.fetch_add(1, Ordering::SeqCst);
        Ok(self.role)
    }

    async fn fetch_profile_status(&self) -> Result<ProfileStatus, BackendError> {
        Ok(*self.status.lock().unwrap())
    }

    async fn record_login(&self, _user_agent: Option<&str>) -> Result<(), BackendError> {
        self.calls.record_login.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_password(&self, _new_password: &str) -> Result<(), BackendError> {
        self.calls.update_password.fetch_add(1, Ordering::SeqCst);
        self.status.lock().unwrap().must_change_password = false;
        self.emit(AuthEventKind::PasswordUpdated);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Lets the listener task drain pending events.
async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(done(), "condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_lockout_after_repeated_failures() {
    let backend = FakeBackend::active_user();
    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());

    for attempt in 1..=4 {
        let err = controller.sign_in(EMAIL, "wrong-password").await.unwrap_err();
        assert_eq!(err, SessionError::InvalidCredentials);
        assert_eq!(controller.snapshot().failed_attempts, attempt);
    }

    let err = controller.sign_in(EMAIL, "wrong-password").await.unwrap_err();
    assert_eq!(err, SessionError::LockedOut { minutes: 15 });
    assert_eq!(
        err.to_string(),
        "Too many failed attempts. Please try again in 15 minutes."
    );
    assert!(controller.snapshot().is_blocked);

    // Correct credentials are refused without reaching the backend.
    let err = controller.sign_in(EMAIL, PASSWORD).await.unwrap_err();
    assert_eq!(err, SessionError::Blocked);
    assert_eq!(FakeBackend::count(&backend.calls.sign_in), 5);

    tokio::time::advance(Duration::from_secs(15 * 60 + 1)).await;

    controller.sign_in(EMAIL, PASSWORD).await.unwrap();
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.failed_attempts, 0);
    assert!(!snapshot.is_blocked);
    assert_eq!(snapshot.phase, SessionPhase::Ready);
    assert_eq!(FakeBackend::count(&backend.calls.sign_in), 6);
}

#[tokio::test(start_paused = true)]
async fn test_lockout_uses_configured_policy() {
    let backend = FakeBackend::active_user();
    let policy = ThrottlePolicy {
        max_attempts: 2,
        lockout: Duration::from_secs(90),
    };
    let controller = SessionController::new(backend.clone(), policy);

    let _ = controller.sign_in(EMAIL, "wrong-password").await;
    let err = controller.sign_in(EMAIL, "wrong-password").await.unwrap_err();
    assert_eq!(err, SessionError::LockedOut { minutes: 2 });

    tokio::time::advance(Duration::from_secs(91)).await;
    wait_until(|| !controller.snapshot().is_blocked).await;
    assert_eq!(controller.snapshot().failed_attempts, 0);
}

#[tokio::test]
async fn test_deactivated_account_is_signed_out() {
    let backend = FakeBackend::new(
        Role::User,
        ProfileStatus {
            is_active: false,
            must_change_password: false,
        },
    );
    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());

    let err = controller.sign_in(EMAIL, PASSWORD).await.unwrap_err();
    assert_eq!(err, SessionError::Deactivated);
    assert_eq!(
        err.to_string(),
        "Your account has been deactivated. Please contact an administrator."
    );

    let snapshot = controller.snapshot();
    assert!(snapshot.session.is_none());
    assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
    assert_eq!(FakeBackend::count(&backend.calls.sign_out), 1);
    assert!(backend.current_session().await.is_none());
}

#[tokio::test]
async fn test_server_refusal_of_inactive_profile_is_not_a_failed_attempt() {
    let backend = FakeBackend::new(
        Role::User,
        ProfileStatus {
            is_active: false,
            must_change_password: false,
        },
    );
    backend.refuses_inactive.store(true, Ordering::SeqCst);
    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());

    for _ in 0..6 {
        let err = controller.sign_in(EMAIL, PASSWORD).await.unwrap_err();
        assert_eq!(err, SessionError::Deactivated);
    }

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.failed_attempts, 0);
    assert!(!snapshot.is_blocked);
    assert!(snapshot.session.is_none());
    assert_eq!(FakeBackend::count(&backend.calls.sign_in), 6);
}

#[tokio::test]
async fn test_listener_records_login_only_on_sign_in() {
    let backend = FakeBackend::active_user();
    let controller = SessionController::with_user_agent(
        backend.clone(),
        ThrottlePolicy::default(),
        "session-tests",
    );
    controller.init().await;

    controller.sign_in(EMAIL, PASSWORD).await.unwrap();
    wait_until(|| FakeBackend::count(&backend.calls.record_login) == 1).await;

    let role_lookups = FakeBackend::count(&backend.calls.fetch_role);
    backend.refresh_session().await.unwrap();
    wait_until(|| FakeBackend::count(&backend.calls.fetch_role) > role_lookups).await;

    assert_eq!(FakeBackend::count(&backend.calls.record_login), 1);
    assert_eq!(controller.snapshot().phase, SessionPhase::Ready);

    controller.sign_out().await;
    let snapshot = controller.snapshot();
    assert!(snapshot.session.is_none());
    assert!(!snapshot.is_admin);
}

#[tokio::test]
async fn test_validation_precedes_backend_calls() {
    let backend = FakeBackend::active_user();
    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());

    assert_eq!(
        controller.sign_in("not-an-email", PASSWORD).await,
        Err(SessionError::InvalidEmail)
    );
    assert_eq!(
        controller.sign_in(EMAIL, "short").await,
        Err(SessionError::InvalidCredentials)
    );
    assert_eq!(
        controller.sign_up(EMAIL, "short").await,
        Err(SessionError::InvalidPassword { min: 8, max: 128 })
    );
    assert_eq!(
        controller.sign_up("missing-at.example.com", PASSWORD).await,
        Err(SessionError::InvalidEmail)
    );

    assert_eq!(FakeBackend::count(&backend.calls.sign_in), 0);
    assert_eq!(FakeBackend::count(&backend.calls.sign_up), 0);
    assert_eq!(controller.snapshot().failed_attempts, 0);

    assert_eq!(
        controller.change_password("new-password-1").await,
        Err(SessionError::NotSignedIn)
    );
    assert_eq!(FakeBackend::count(&backend.calls.update_password), 0);

    controller.sign_up(" User@Example.com ", PASSWORD).await.unwrap();
    assert_eq!(FakeBackend::count(&backend.calls.sign_up), 1);
}

#[tokio::test]
async fn test_change_password_clears_forced_change() {
    let backend = FakeBackend::new(
        Role::User,
        ProfileStatus {
            is_active: true,
            must_change_password: true,
        },
    );
    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());

    controller.sign_in(EMAIL, PASSWORD).await.unwrap();
    assert!(controller.snapshot().must_change_password);

    assert_eq!(
        controller.change_password("short").await,
        Err(SessionError::InvalidPassword { min: 8, max: 128 })
    );
    assert!(controller.snapshot().must_change_password);

    controller.change_password("a-much-better-one").await.unwrap();
    assert!(!controller.snapshot().must_change_password);
    assert_eq!(FakeBackend::count(&backend.calls.update_password), 1);
}

#[tokio::test]
async fn test_admin_flag_and_restored_session() {
    let backend = FakeBackend::new(
        Role::Admin,
        ProfileStatus {
            is_active: true,
            must_change_password: false,
        },
    );
    *backend.session.lock().unwrap() = Some(FakeBackend::session());

    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());
    assert!(controller.snapshot().loading);

    let mut updates = controller.watch();
    controller.init().await;

    let snapshot = updates.borrow_and_update().clone();
    assert!(!snapshot.loading);
    assert!(snapshot.is_admin);
    assert_eq!(snapshot.phase, SessionPhase::Ready);
    assert_eq!(
        snapshot.session.map(|s| s.user.email).as_deref(),
        Some(EMAIL)
    );
}
