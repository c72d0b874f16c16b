use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, AppState, validation::validate_phone};
use crate::db::{AccessRequest, NewAccessRequest};
use crate::models::user::{is_valid_email, normalize_email};

#[derive(Debug, Deserialize)]
pub struct CreateAccessRequest {
    pub email: String,
    #[serde(alias = "phone_number")]
    pub phone: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// POST /rest/v1/access-requests
/// Unauthenticated intake; an email may only have one pending request.
pub async fn create_access_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAccessRequest>,
) -> Result<(StatusCode, Json<AccessRequest>), ApiError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Please enter a valid email address"));
    }

    let phone = validate_phone(&payload.phone)?;
    let full_name = payload
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let request = state
        .store()
        .create_access_request(NewAccessRequest {
            email: &email,
            phone,
            full_name,
        })
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("A pending request already exists for this email".to_string())
        })?;

    tracing::info!(
        event = "access_requested",
        request_id = request.id,
        "Access request submitted"
    );

    Ok((StatusCode::CREATED, Json(request)))
}
