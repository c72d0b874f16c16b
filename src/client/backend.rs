//! Seam between the session controller and the credential service.
//!
//! [`HttpAuthBackend`] talks to the server's `/auth/v1` and `/rest/v1/me`
//! routes; tests substitute in-memory implementations of [`AuthBackend`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use url::Url;

use crate::api::ErrorBody;
use crate::models::user::{Identity, Profile, ProfileStatus, Role};
use crate::services::TokenGrant;

const EVENT_CAPACITY: usize = 32;

/// Live credential held by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: String,
    pub user: Identity,
}

impl From<TokenGrant> for Session {
    fn from(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            expires_at: grant.expires_at,
            user: grant.user,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    TokenRefreshed,
    SignedOut,
    PasswordUpdated,
}

/// Broadcast after the backend's own session changed.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("Session expired. Please log in again.")]
    SessionExpired,

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<url::ParseError> for BackendError {
    fn from(err: url::ParseError) -> Self {
        Self::Transport(format!("Invalid URL: {err}"))
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError>;

    /// Emits [`AuthEventKind::SignedIn`] on success.
    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, BackendError>;

    /// Drops the local session even when the server call fails.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Emits [`AuthEventKind::TokenRefreshed`] on success.
    async fn refresh_session(&self) -> Result<Session, BackendError>;

    async fn current_session(&self) -> Option<Session>;

    /// Role of the signed-in identity, read fresh from the server.
    async fn fetch_role(&self) -> Result<Role, BackendError>;

    async fn fetch_profile_status(&self) -> Result<ProfileStatus, BackendError>;

    async fn record_login(&self, user_agent: Option<&str>) -> Result<(), BackendError>;

    async fn update_password(&self, new_password: &str) -> Result<(), BackendError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Reads the JSON body of a successful response, or converts the `{ error }` body.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let response = check_status(response).await?;
    Ok(response.json::<T>().await?)
}

pub(crate) async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    if status == StatusCode::UNAUTHORIZED {
        Err(BackendError::Unauthorized(message))
    } else {
        Err(BackendError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct UserBody {
    user: Identity,
}

#[derive(Deserialize)]
struct RoleBody {
    role: Role,
}

pub struct HttpAuthBackend {
    client: Client,
    base_url: Url,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpAuthBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(concat!("fintrack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, BackendError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            session: RwLock::new(None),
            events,
        })
    }

    /// Adopts a session persisted by an earlier run. No event is emitted.
    pub async fn restore_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(path)?)
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(BackendError::SessionExpired)?;

        Ok(builder.bearer_auth(token))
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(AuthEvent { kind, session });
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let response = self
            .client
            .post(self.endpoint("/auth/v1/signup")?)
            .json(&CredentialsBody { email, password })
            .send()
            .await?;

        let body: UserBody = read_json(response).await?;
        Ok(body.user)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let response = self
            .client
            .post(self.endpoint("/auth/v1/token")?)
            .json(&CredentialsBody { email, password })
            .send()
            .await?;

        let grant: TokenGrant = read_json(response).await?;
        let session = Session::from(grant);

        *self.session.write().await = Some(session.clone());
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));

        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        self.emit(AuthEventKind::SignedOut, None);

        let response = self
            .client
            .post(self.endpoint("/auth/v1/logout")?)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        check_status(response).await?;
        debug!(user_id = %session.user.id, "Signed out");
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let request = self
            .authorized(self.client.post(self.endpoint("/auth/v1/refresh")?))
            .await?;

        let grant: TokenGrant = match read_json(request.send().await?).await {
            Ok(grant) => grant,
            Err(BackendError::Unauthorized(message)) => {
                warn!(error = %message, "Refresh rejected; dropping session");
                *self.session.write().await = None;
                self.emit(AuthEventKind::SignedOut, None);
                return Err(BackendError::SessionExpired);
            }
            Err(e) => return Err(e),
        };

        let session = Session::from(grant);
        *self.session.write().await = Some(session.clone());
        self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));

        Ok(session)
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    async fn fetch_role(&self) -> Result<Role, BackendError> {
        let request = self
            .authorized(self.client.get(self.endpoint("/rest/v1/me/role")?))
            .await?;

        let body: RoleBody = read_json(request.send().await?).await?;
        Ok(body.role)
    }

    async fn fetch_profile_status(&self) -> Result<ProfileStatus, BackendError> {
        let request = self
            .authorized(self.client.get(self.endpoint("/rest/v1/me/profile")?))
            .await?;

        let profile: Profile = read_json(request.send().await?).await?;
        Ok(ProfileStatus {
            is_active: profile.is_active,
            must_change_password: profile.must_change_password,
        })
    }

    async fn record_login(&self, user_agent: Option<&str>) -> Result<(), BackendError> {
        let request = self
            .authorized(self.client.post(self.endpoint("/rest/v1/me/logins")?))
            .await?;

        let response = request
            .json(&serde_json::json!({ "user_agent": user_agent }))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<(), BackendError> {
        let request = self
            .authorized(self.client.put(self.endpoint("/auth/v1/user")?))
            .await?;

        let response = request
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await?;

        check_status(response).await?;

        let session = self.session.read().await.clone();
        self.emit(AuthEventKind::PasswordUpdated, session);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
