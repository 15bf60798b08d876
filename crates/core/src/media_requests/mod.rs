//! Media requests: creation with request number allocation, dashboards and
//! staff status changes

mod creation;

pub use creation::{Creation, CreationTx, PgCreationTx, PgLedger, ReferenceUpload, RequestLedger};

use chrono::{DateTime, Utc};
use mediadesk_storage::{Storage, StoredFile};
use serde::Deserialize;
use sqlx::PgPool;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    CreateMediaRequestInput, CreatedMediaRequest, DashboardEntry, MediaRequest, NewMediaRecord,
    RequestStatus, UploadedFile, User,
};
use crate::request_number::RequestNumberAllocator;
use crate::site_settings::SiteSettingsService;
use crate::validation::{validate_location, validate_note, validate_phone};

/// Whether a failed reference image upload blocks request creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPolicy {
    /// Commit the request, then upload; a failed upload becomes a warning
    #[default]
    BestEffort,
    /// Upload inside the transaction; a failed upload rolls the request back
    Required,
}

impl FromStr for UploadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" | "" => Ok(UploadPolicy::BestEffort),
            "required" => Ok(UploadPolicy::Required),
            other => Err(format!("Unknown upload policy: {}", other)),
        }
    }
}

/// Find the data-folder file named after a request number, ignoring extension
pub fn find_request_file<'a>(files: &'a [StoredFile], request_number: &str) -> Option<&'a StoredFile> {
    files.iter().find(|f| {
        Path::new(&f.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem == request_number)
    })
}

#[derive(Debug, Clone)]
pub struct MediaRequestOptions {
    pub upload_policy: UploadPolicy,
    /// Serialize allocations per minute prefix with an advisory lock
    pub lock_prefix: bool,
}

impl Default for MediaRequestOptions {
    fn default() -> Self {
        Self {
            upload_policy: UploadPolicy::BestEffort,
            lock_prefix: true,
        }
    }
}

#[derive(Clone)]
pub struct MediaRequestService {
    pool: PgPool,
    storage: Arc<dyn Storage>,
    settings: SiteSettingsService,
    allocator: RequestNumberAllocator,
    options: MediaRequestOptions,
}

impl MediaRequestService {
    pub fn new(
        pool: PgPool,
        storage: Arc<dyn Storage>,
        settings: SiteSettingsService,
        allocator: RequestNumberAllocator,
        options: MediaRequestOptions,
    ) -> Self {
        Self {
            pool,
            storage,
            settings,
            allocator,
            options,
        }
    }

    /// Create a request owned by `owner`, numbered from the minute of `at`.
    ///
    /// The record and its number are written in one transaction. An allocation
    /// conflict is retried once more here before it reaches the caller.
    pub async fn create(
        &self,
        owner: &User,
        input: CreateMediaRequestInput,
        reference_image: Option<UploadedFile>,
        at: DateTime<Utc>,
    ) -> Result<CreatedMediaRequest, CoreError> {
        let record = NewMediaRecord {
            user_id: owner.id,
            customer_name: owner.username.clone(),
            customer_email: owner.email.clone(),
            customer_phone: validate_phone("customer_phone", &input.customer_phone)?,
            date: input.date,
            time: input.time,
            location: validate_location(&input.location)?,
            reference_image_name: reference_image.as_ref().map(|f| f.filename.clone()),
            note: validate_note(&input.note)?,
            created_at: at,
        };

        let folder_id = match &reference_image {
            Some(_) => self.settings.folders().await?.reference,
            None => None,
        };
        if self.options.upload_policy == UploadPolicy::Required && reference_image.is_some() && folder_id.is_none() {
            return Err(CoreError::UploadFailed("no reference image folder is configured".to_string()));
        }

        let upload = match (reference_image.as_ref(), folder_id.as_deref()) {
            (Some(file), Some(folder_id)) => Some(ReferenceUpload { file, folder_id }),
            _ => None,
        };

        let ledger = PgLedger::new(self.pool.clone(), self.options.lock_prefix);
        Creation {
            ledger: &ledger,
            storage: self.storage.as_ref(),
            allocator: &self.allocator,
            policy: self.options.upload_policy,
        }
        .run(&record, upload, at)
        .await
    }

    /// Newest first
    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<MediaRequest>, CoreError> {
        let requests = sqlx::query_as::<_, MediaRequest>(
            "SELECT * FROM media_requests WHERE user_id = $1 ORDER BY created_at DESC, request_number DESC"
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    /// Every request, newest first, optionally narrowed to one status
    pub async fn list_all(&self, status: Option<RequestStatus>) -> Result<Vec<MediaRequest>, CoreError> {
        let requests = sqlx::query_as::<_, MediaRequest>(
            "SELECT * FROM media_requests
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC, request_number DESC"
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    /// The owner's requests with links to matching data-folder files.
    /// The data folder is listed once; listing failures leave links empty.
    pub async fn dashboard(&self, owner_id: Uuid) -> Result<Vec<DashboardEntry>, CoreError> {
        let requests = self.list_for_owner(owner_id).await?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let files = match self.settings.folders().await {
            Ok(folders) => match folders.data {
                Some(folder_id) => self.storage.list(&folder_id).await.unwrap_or_else(|e| {
                    tracing::warn!("Could not list data folder {}: {}", folder_id, e);
                    Vec::new()
                }),
                None => Vec::new(),
            },
            Err(e) => {
                tracing::warn!("Could not load site settings for dashboard: {}", e);
                Vec::new()
            }
        };

        Ok(requests
            .into_iter()
            .map(|request| {
                let file = find_request_file(&files, &request.request_number);
                DashboardEntry {
                    drive_file_id: file.map(|f| f.id.clone()),
                    drive_link: file.and_then(|f| self.storage.share_link(&f.id)),
                    request,
                }
            })
            .collect())
    }

    /// Owners see their own requests; staff see all
    pub async fn get(&self, viewer_id: Uuid, viewer_is_staff: bool, request_number: &str) -> Result<MediaRequest, CoreError> {
        let request = sqlx::query_as::<_, MediaRequest>("SELECT * FROM media_requests WHERE request_number = $1")
            .bind(request_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound)?;

        if request.user_id != viewer_id && !viewer_is_staff {
            return Err(CoreError::Forbidden);
        }
        Ok(request)
    }

    /// Mark requests resolved, returning how many changed
    pub async fn resolve(&self, request_numbers: &[String]) -> Result<u64, CoreError> {
        if request_numbers.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE media_requests SET status = 'resolved', updated_at = NOW()
             WHERE request_number = ANY($1) AND status <> 'resolved'"
        )
        .bind(request_numbers)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected();
        tracing::info!("Resolved {} of {} requested media requests", updated, request_numbers.len());
        Ok(updated)
    }

    pub async fn set_status(&self, request_number: &str, status: RequestStatus) -> Result<MediaRequest, CoreError> {
        let request = sqlx::query_as::<_, MediaRequest>(
            "UPDATE media_requests SET status = $2, updated_at = NOW()
             WHERE request_number = $1 RETURNING *"
        )
        .bind(request_number)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CoreError::NotFound)?;

        tracing::info!("Media request {} set to {}", request_number, status);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, name: &str) -> StoredFile {
        StoredFile {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_upload_policy_parsing() {
        assert_eq!("best_effort".parse::<UploadPolicy>().unwrap(), UploadPolicy::BestEffort);
        assert_eq!("Best-Effort".parse::<UploadPolicy>().unwrap(), UploadPolicy::BestEffort);
        assert_eq!("required".parse::<UploadPolicy>().unwrap(), UploadPolicy::Required);
        assert_eq!("".parse::<UploadPolicy>().unwrap(), UploadPolicy::default());
        assert!("sometimes".parse::<UploadPolicy>().is_err());
    }

    #[test]
    fn test_find_request_file_matches_stem() {
        let files = vec![
            file("a", "20250314_0915_0001_brief.pdf"),
            file("b", "20250314_0915_0001.mp4"),
            file("c", "20250314_0915_0002.mov"),
        ];
        assert_eq!(find_request_file(&files, "20250314_0915_0001").map(|f| f.id.as_str()), Some("b"));
        assert_eq!(find_request_file(&files, "20250314_0915_0002").map(|f| f.id.as_str()), Some("c"));
        assert!(find_request_file(&files, "20250314_0915_0003").is_none());
    }

    #[test]
    fn test_find_request_file_without_extension() {
        let files = vec![file("x", "20250314_0915_0004")];
        assert!(find_request_file(&files, "20250314_0915_0004").is_some());
    }

    #[test]
    fn test_find_request_file_strips_only_last_extension() {
        let files = vec![file("x", "20250314_0915_0005.tar.gz")];
        assert!(find_request_file(&files, "20250314_0915_0005").is_none());
        assert!(find_request_file(&files, "20250314_0915_0005.tar").is_some());
    }
}
