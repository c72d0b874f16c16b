use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, AppState, auth::AuthUser};
use crate::models::user::{Profile, Role};

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordLoginRequest {
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordLoginResponse {
    pub id: i64,
}

/// GET /rest/v1/me/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .store()
        .get_profile(&user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    Ok(Json(profile))
}

/// GET /rest/v1/me/role
/// Identities without a role row are plain users.
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RoleResponse>, ApiError> {
    let role = state.store().get_role(&user.id).await?.unwrap_or_default();
    Ok(Json(RoleResponse { role }))
}

/// POST /rest/v1/me/logins
pub async fn record_login(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Option<Json<RecordLoginRequest>>,
) -> Result<(StatusCode, Json<RecordLoginResponse>), ApiError> {
    let user_agent = payload
        .and_then(|Json(p)| p.user_agent)
        .or_else(|| header_str(&headers, "user-agent").map(str::to_string));

    let ip_address = client_ip(&headers);

    let id = state
        .store()
        .record_login(&user.id, user_agent.as_deref(), ip_address.as_deref())
        .await?;

    tracing::info!(event = "login_recorded", user_id = %user.id, login_id = id, "Login recorded");
    Ok((StatusCode::CREATED, Json(RecordLoginResponse { id })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.9"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
