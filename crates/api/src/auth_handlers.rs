use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Extension, Json,
};
use mediadesk_auth::AuthUser;
use mediadesk_core::models::{RegisterInput, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::forms::MultipartForm;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or primary phone number
    #[serde(alias = "username")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub message: &'static str,
}

/// POST /api/auth/register (multipart, optional `profile_picture` file)
pub async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.max_upload_bytes).await?;

    let input = RegisterInput {
        username: form.require("username")?.to_string(),
        email: form.optional("email").unwrap_or_default(),
        password: form.require("password")?.to_string(),
        primary_phone: form.require("primary_phone")?.to_string(),
        primary_type: form.optional("primary_type"),
        secondary_phone: form.optional("secondary_phone"),
        secondary_type: form.optional("secondary_type"),
    };
    let profile_picture = form.take_file("profile_picture");

    let registration = state.users.register(input, profile_picture).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: registration.user,
            warnings: registration.warnings,
            message: "Account created. Please log in.",
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state.users.authenticate(&req.login, &req.password).await?;
    let token = state.keys.issue(user.id, &user.username, user.is_staff)?;

    tracing::info!("User {} logged in", user.username);
    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in: state.keys.ttl_secs(),
        user,
    }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    let user = state.users.get(auth.user_id).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_accepts_username_alias() {
        let req: LoginRequest = serde_json::from_str(r#"{"username":"asha","password":"pw"}"#).unwrap();
        assert_eq!(req.login, "asha");

        let req: LoginRequest = serde_json::from_str(r#"{"login":"+919876543210","password":"pw"}"#).unwrap();
        assert_eq!(req.login, "+919876543210");
    }
}
