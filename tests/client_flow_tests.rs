//! Client types against a live server on a loopback port.

use std::sync::Arc;

use fintrack::client::{
    AdminClient, AuthBackend, BackendError, HttpAuthBackend, SessionController, SessionPhase,
    ThrottlePolicy,
};
use fintrack::config::Config;
use fintrack::models::user::Role;
use fintrack::services::admin_service::RequestFilter;

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password-1";

async fn spawn_server() -> String {
    let db_path =
        std::env::temp_dir().join(format!("fintrack-client-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.bootstrap.admin_email = Some(ADMIN_EMAIL.to_string());
    config.bootstrap.admin_password = Some(ADMIN_PASSWORD.to_string());
    config.retention.enabled = false;
    config.security.argon2_memory_cost_kib = 64;
    config.security.argon2_time_cost = 1;

    let state = fintrack::api::create_app_state_from_config(config, None)
        .await
        .expect("failed to create app state");
    let app = fintrack::api::router(state).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn test_admin_provisions_user_who_must_change_password() {
    let base_url = spawn_server().await;

    let admin_backend = Arc::new(HttpAuthBackend::new(&base_url).unwrap());
    admin_backend
        .sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();

    let admin = AdminClient::new(&base_url, admin_backend.clone()).unwrap();
    let created = admin
        .create_user("new.user@example.com", Some("New User"), Role::User)
        .await
        .unwrap();
    assert!(created.success);

    let stats = admin.get_stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.active_users, 2);

    let backend = Arc::new(HttpAuthBackend::new(&base_url).unwrap());
    let controller = SessionController::with_user_agent(
        backend.clone(),
        ThrottlePolicy::default(),
        "client-flow-tests",
    );
    controller.init().await;

    controller
        .sign_in("new.user@example.com", &created.temp_password)
        .await
        .unwrap();

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Ready);
    assert!(snapshot.must_change_password);
    assert!(!snapshot.is_admin);

    controller.change_password("my-own-password").await.unwrap();
    assert!(!controller.snapshot().must_change_password);

    controller.sign_out().await;
    assert!(controller.snapshot().session.is_none());
    assert!(backend.current_session().await.is_none());

    // The temporary password no longer works.
    let err = controller
        .sign_in("new.user@example.com", &created.temp_password)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid credentials");

    controller
        .sign_in("new.user@example.com", "my-own-password")
        .await
        .unwrap();
    assert!(!controller.snapshot().must_change_password);

    let requests = admin.list_access_requests(RequestFilter::All).await.unwrap();
    assert!(requests.requests.is_empty());
}

#[tokio::test]
async fn test_admin_client_requires_session() {
    let base_url = spawn_server().await;

    let backend = Arc::new(HttpAuthBackend::new(&base_url).unwrap());
    let admin = AdminClient::new(&base_url, backend.clone()).unwrap();

    let err = admin.get_stats().await.unwrap_err();
    assert!(matches!(err, BackendError::SessionExpired));

    backend.sign_out().await.unwrap();

    let err = backend.refresh_session().await.unwrap_err();
    assert!(matches!(err, BackendError::SessionExpired));
}

#[tokio::test]
async fn test_non_admin_is_forbidden_at_gateway() {
    let base_url = spawn_server().await;

    let backend = Arc::new(HttpAuthBackend::new(&base_url).unwrap());
    backend
        .sign_up("plain@example.com", "plain-password")
        .await
        .unwrap();
    backend
        .sign_in_with_password("plain@example.com", "plain-password")
        .await
        .unwrap();

    assert_eq!(backend.fetch_role().await.unwrap(), Role::User);

    let admin = AdminClient::new(&base_url, backend.clone()).unwrap();
    match admin.get_users().await {
        Err(BackendError::Api { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "Admin access required");
        }
        other => panic!("expected 403, got {other:?}"),
    }
}

#[tokio::test]
async fn test_restored_session_resumes_admin_access() {
    let base_url = spawn_server().await;

    let first_run = HttpAuthBackend::new(&base_url).unwrap();
    first_run
        .sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();
    let saved = first_run.current_session().await.unwrap();

    let backend = Arc::new(HttpAuthBackend::new(&base_url).unwrap());
    assert!(backend.current_session().await.is_none());
    backend.restore_session(saved.clone()).await;

    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());
    controller.init().await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Ready);
    assert!(snapshot.is_admin);
    assert_eq!(
        snapshot.session.map(|s| s.access_token),
        Some(saved.access_token)
    );

    let admin = AdminClient::new(&base_url, backend).unwrap();
    assert_eq!(admin.get_stats().await.unwrap().total_users, 1);
}

#[tokio::test]
async fn test_deactivated_user_is_refused_by_server() {
    let base_url = spawn_server().await;

    let admin_backend = Arc::new(HttpAuthBackend::new(&base_url).unwrap());
    admin_backend
        .sign_in_with_password(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();
    let admin = AdminClient::new(&base_url, admin_backend).unwrap();

    let created = admin
        .create_user("quinn@example.com", Some("Quinn"), Role::Admin)
        .await
        .unwrap();
    admin
        .update_user(&created.user.id, None, false, Role::Admin)
        .await
        .unwrap();

    let backend = Arc::new(HttpAuthBackend::new(&base_url).unwrap());
    let controller = SessionController::new(backend.clone(), ThrottlePolicy::default());

    let err = controller
        .sign_in("quinn@example.com", &created.temp_password)
        .await
        .unwrap_err();
    assert_eq!(err, fintrack::client::SessionError::Deactivated);
    assert_eq!(controller.snapshot().failed_attempts, 0);
    assert!(backend.current_session().await.is_none());

    match backend
        .sign_in_with_password("quinn@example.com", &created.temp_password)
        .await
    {
        Err(BackendError::Api { status, .. }) => assert_eq!(status, 403),
        other => panic!("expected 403, got {other:?}"),
    }
}
