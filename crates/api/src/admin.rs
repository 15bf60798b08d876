//! Staff-only endpoints. Routed behind `require_staff`.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use mediadesk_auth::AuthUser;
use mediadesk_core::models::{AdminUserUpdate, MediaRequest, RequestStatus, SiteSettings, UpdateSiteSettingsInput, User};
use mediadesk_core::site_settings::ResolvedFolders;
use mediadesk_core::RequestNumber;
use mediadesk_storage::extract_folder_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveRequests {
    pub request_numbers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestFilter {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct SiteSettingsResponse {
    pub settings: SiteSettings,
    pub effective_profile_folder: Option<String>,
    pub effective_reference_folder: Option<String>,
    pub effective_data_folder: Option<String>,
}

impl SiteSettingsResponse {
    fn new(settings: SiteSettings, folders: ResolvedFolders) -> Self {
        Self {
            settings,
            effective_profile_folder: folders.profile,
            effective_reference_folder: folders.reference,
            effective_data_folder: folders.data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FolderFile {
    pub id: String,
    pub name: String,
    pub link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FolderListing {
    pub folder_id: String,
    pub backend: &'static str,
    pub files: Vec<FolderFile>,
}

/// `status=open|resolved`; empty or missing lists everything
fn status_filter(filter: &RequestFilter) -> Result<Option<RequestStatus>, ApiError> {
    match filter.status.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(ApiError::BadRequest),
    }
}

/// GET /api/admin/requests?status=open
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RequestFilter>,
) -> Result<Json<Vec<MediaRequest>>, ApiError> {
    let requests = state.requests.list_all(status_filter(&filter)?).await?;
    Ok(Json(requests))
}

/// GET /api/admin/users?q=
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.users.search(query.q.as_deref().unwrap_or_default()).await?;
    Ok(Json(users))
}

/// POST /api/admin/requests/resolve
pub async fn resolve_requests(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ResolveRequests>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.requests.resolve(&body.request_numbers).await?;
    tracing::info!("{} resolved {} media requests", auth.username, updated);
    Ok(Json(serde_json::json!({ "updated": updated })))
}

/// PUT /api/admin/requests/{request_number}/status
pub async fn set_request_status(
    State(state): State<Arc<AppState>>,
    Path(request_number): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<MediaRequest>, ApiError> {
    let number: RequestNumber = request_number.parse()?;
    let status: RequestStatus = body.status.parse().map_err(ApiError::BadRequest)?;
    let request = state.requests.set_status(&number.to_string(), status).await?;
    Ok(Json(request))
}

/// PUT /api/admin/users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<AdminUserUpdate>,
) -> Result<Json<User>, ApiError> {
    let user = state.users.update_admin_fields(id, update).await?;
    Ok(Json(user))
}

/// GET /api/admin/site-settings
pub async fn get_site_settings(State(state): State<Arc<AppState>>) -> Result<Json<SiteSettingsResponse>, ApiError> {
    let settings = state.site_settings.get().await?;
    let folders = settings.resolve(state.site_settings.defaults());
    Ok(Json(SiteSettingsResponse::new(settings, folders)))
}

/// PUT /api/admin/site-settings
pub async fn update_site_settings(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UpdateSiteSettingsInput>,
) -> Result<Json<SiteSettingsResponse>, ApiError> {
    let settings = state.site_settings.update(input).await?;
    let folders = settings.resolve(state.site_settings.defaults());
    Ok(Json(SiteSettingsResponse::new(settings, folders)))
}

/// `profile`, `reference` and `data` name the configured folders; anything
/// else is taken as a folder id or link.
fn pick_folder(folders: &ResolvedFolders, folder: &str) -> Option<String> {
    match folder {
        "profile" => folders.profile.clone(),
        "reference" => folders.reference.clone(),
        "data" => folders.data.clone(),
        other => extract_folder_id(other),
    }
}

/// GET /api/admin/storage/{folder}
pub async fn list_storage_folder(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
) -> Result<Json<FolderListing>, ApiError> {
    let folders = state.site_settings.folders().await?;
    let folder_id = pick_folder(&folders, &folder)
        .ok_or_else(|| ApiError::BadRequest(format!("No folder is configured for {}", folder)))?;

    let files = state
        .storage
        .list(&folder_id)
        .await?
        .into_iter()
        .map(|f| FolderFile {
            link: state.storage.share_link(&f.id),
            id: f.id,
            name: f.name,
        })
        .collect();

    Ok(Json(FolderListing {
        folder_id,
        backend: state.storage.backend_name(),
        files,
    }))
}
