use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use mediadesk_auth::AuthUser;
use mediadesk_core::models::{CreateMediaRequestInput, DashboardEntry, MediaRequest};
use mediadesk_core::RequestNumber;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::forms::{parse_date, parse_time, MultipartForm};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub username: String,
    pub requests: Vec<DashboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct CreateRequestResponse {
    pub request: MediaRequest,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub message: String,
}

/// GET /api/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let requests = state.requests.dashboard(auth.user_id).await?;
    Ok(Json(DashboardResponse {
        username: auth.username,
        requests,
    }))
}

/// POST /api/requests (multipart, optional `reference_image` file)
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreateRequestResponse>), ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.max_upload_bytes).await?;
    let input = request_input(&form)?;
    let reference_image = form.take_file("reference_image");

    let owner = state.users.get(auth.user_id).await?;
    let created = state.requests.create(&owner, input, reference_image, Utc::now()).await?;

    let message = format!(
        "Request sent successfully. Your request number is {}.",
        created.request.request_number
    );
    Ok((
        StatusCode::CREATED,
        Json(CreateRequestResponse {
            request: created.request,
            warnings: created.warnings,
            message,
        }),
    ))
}

fn request_input(form: &MultipartForm) -> Result<CreateMediaRequestInput, ApiError> {
    Ok(CreateMediaRequestInput {
        customer_phone: form.require("customer_phone")?.to_string(),
        date: parse_date("date", form.require("date")?)?,
        time: parse_time("time", form.require("time")?)?,
        location: form.require("location")?.to_string(),
        note: form.optional("note").unwrap_or_default(),
    })
}

/// GET /api/requests/{request_number}
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(request_number): Path<String>,
) -> Result<Json<MediaRequest>, ApiError> {
    let number: RequestNumber = request_number.parse()?;
    let request = state
        .requests
        .get(auth.user_id, auth.is_staff, &number.to_string())
        .await?;
    Ok(Json(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_input_from_form() {
        let form = MultipartForm::from_fields(&[
            ("customer_phone", "+919876543210"),
            ("date", "2025-03-14"),
            ("time", "09:30"),
            ("location", "Main hall"),
        ]);
        let input = request_input(&form).unwrap();
        assert_eq!(input.location, "Main hall");
        assert_eq!(input.note, "");
        assert_eq!(input.time.to_string(), "09:30:00");
    }

    #[test]
    fn test_request_input_requires_location() {
        let form = MultipartForm::from_fields(&[
            ("customer_phone", "+919876543210"),
            ("date", "2025-03-14"),
            ("time", "09:30"),
        ]);
        assert!(matches!(request_input(&form), Err(ApiError::BadRequest(_))));
    }
}
