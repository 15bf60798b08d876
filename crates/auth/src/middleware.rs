//! Request authentication for axum routes

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Extension,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::jwt::JwtKeys;

/// The authenticated caller, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub ip_address: Option<String>,
}

#[derive(Clone)]
pub struct AuthState {
    pub pool: PgPool,
    pub keys: JwtKeys,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate the bearer token and re-check the account on every request, so a
/// deactivated user or a revoked staff flag takes effect immediately.
pub async fn auth_middleware_with_db(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = state.keys.verify(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    let account: Option<(String, bool, bool)> = sqlx::query_as(
        "SELECT username, is_active, is_staff FROM users WHERE id = $1"
    )
    .bind(claims.sub)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load user for authentication: {:?}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let (username, is_active, is_staff) = account.ok_or(StatusCode::UNAUTHORIZED)?;
    if !is_active {
        tracing::warn!("Inactive user {} attempted to use a session token", claims.sub);
        return Err(StatusCode::FORBIDDEN);
    }

    let ip_address = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    req.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        username,
        is_staff,
        ip_address,
    });

    Ok(next.run(req).await)
}

/// Must run inside `auth_middleware_with_db`
pub async fn require_staff(
    Extension(auth): Extension<AuthUser>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !auth.is_staff {
        tracing::warn!("User {} attempted to reach a staff-only route", auth.user_id);
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}
