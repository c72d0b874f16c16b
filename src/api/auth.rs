use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::models::user::Identity;
use crate::services::TokenGrant;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: Identity,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct EmptyResponse {}

/// Caller resolved from the bearer token, placed in request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Rejects requests without a live bearer token.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or_else(ApiError::unauthorized)?;
    let identity = state.auth_service().verify_token(&token).await?;

    tracing::Span::current().record("user_id", identity.id.as_str());

    request.extensions_mut().insert(AuthUser {
        id: identity.id,
        email: identity.email,
    });

    Ok(next.run(request).await)
}

/// Owner routes refuse deactivated profiles. Must run after [`auth_middleware`].
pub async fn active_user_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(ApiError::unauthorized)?;

    let status = state.store().get_profile_status(&user.id).await?;
    if !status.is_some_and(|s| s.is_active) {
        return Err(ApiError::deactivated());
    }

    Ok(next.run(request).await)
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();

    (!token.is_empty()).then(|| token.to_string())
}

fn require_token(headers: &HeaderMap) -> Result<String, ApiError> {
    bearer_token(headers).ok_or_else(ApiError::unauthorized)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/v1/signup
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .auth_service()
        .sign_up(&payload.email, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// POST /auth/v1/token
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<Json<TokenGrant>, ApiError> {
    let grant = state
        .auth_service()
        .sign_in(&payload.email, &payload.password)
        .await?;

    tracing::info!(event = "signed_in", user_id = %grant.user.id, "User signed in");
    Ok(Json(grant))
}

/// POST /auth/v1/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TokenGrant>, ApiError> {
    let token = require_token(&headers)?;
    let grant = state.auth_service().refresh(&token).await?;
    Ok(Json(grant))
}

/// POST /auth/v1/logout
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.auth_service().sign_out(&token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/v1/user
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let token = require_token(&headers)?;
    let user = state.auth_service().verify_token(&token).await?;
    Ok(Json(UserResponse { user }))
}

/// PUT /auth/v1/user
/// Replaces the caller's password and clears any forced change.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let token = require_token(&headers)?;
    let user = state.auth_service().verify_token(&token).await?;

    state
        .auth_service()
        .update_password(&user.id, &payload.password)
        .await?;

    tracing::info!(event = "password_updated", user_id = %user.id, "Password updated");
    Ok(Json(UserResponse { user }))
}

/// POST /auth/v1/recover
pub async fn recover(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecoverRequest>,
) -> Result<Json<EmptyResponse>, ApiError> {
    state
        .auth_service()
        .request_password_reset(&payload.email)
        .await?;
    Ok(Json(EmptyResponse {}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));

        headers.insert("Authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
