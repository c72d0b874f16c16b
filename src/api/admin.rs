use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use std::sync::Arc;

use super::{ApiError, AppState, auth::bearer_token};
use crate::services::{AdminAction, AdminResponse};

/// POST /functions/v1/admin-users
///
/// Authentication and the admin role are checked before the body is parsed,
/// so an anonymous or non-admin caller never learns whether an action exists.
pub async fn admin_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AdminResponse>, ApiError> {
    let token = bearer_token(&headers);
    let caller = state.admin_service().authorize(token.as_deref()).await?;

    let action: AdminAction = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected admin request body");
        ApiError::validation(invalid_action_message(&e))
    })?;

    let name = action.name();
    let response = state
        .admin_service()
        .execute(&caller, action)
        .await
        .inspect_err(|e| {
            tracing::error!(
                event = "admin_action_failed",
                action = name,
                admin_id = %caller.user_id,
                error = %e,
                "Admin action failed"
            );
        })?;

    Ok(Json(response))
}

/// Unknown or missing tags read as "Invalid action"; bad parameters keep serde's detail.
fn invalid_action_message(err: &serde_json::Error) -> String {
    if err.is_syntax() || err.is_eof() {
        return "Invalid request body".to_string();
    }

    let detail = err.to_string();
    if detail.contains("unknown variant") || detail.contains("missing field `action`") {
        "Invalid action".to_string()
    } else {
        format!("Invalid parameters: {detail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_action_message() {
        let unknown = serde_json::from_str::<AdminAction>(r#"{"action":"drop_tables"}"#)
            .unwrap_err();
        assert_eq!(invalid_action_message(&unknown), "Invalid action");

        let untagged = serde_json::from_str::<AdminAction>(r#"{"user_id":"x"}"#).unwrap_err();
        assert_eq!(invalid_action_message(&untagged), "Invalid action");

        let bad_params =
            serde_json::from_str::<AdminAction>(r#"{"action":"delete_user"}"#).unwrap_err();
        assert!(invalid_action_message(&bad_params).starts_with("Invalid parameters"));
    }
}
