//! Request creation: the numbered insert and the reference image upload,
//! committed together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediadesk_storage::Storage;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::UploadPolicy;
use crate::error::CoreError;
use crate::models::{CreatedMediaRequest, MediaRequest, NewMediaRecord, UploadedFile};
use crate::request_number::{AllocationError, PgRequestStore, RequestNumberAllocator, StoreError};

const ATTACH_REFERENCE_SQL: &str = "UPDATE media_requests SET reference_image_drive_id = $1, updated_at = NOW()
     WHERE id = $2 RETURNING *";

/// One creation attempt. Dropping it without `commit` rolls back the insert
/// and frees its request number.
#[async_trait]
pub trait CreationTx: Send {
    /// Allocate a request number and insert `record` under it
    async fn insert(
        &mut self,
        allocator: &RequestNumberAllocator,
        record: &NewMediaRecord,
        at: DateTime<Utc>,
    ) -> Result<MediaRequest, CoreError>;

    async fn attach_reference(&mut self, id: Uuid, file_id: &str) -> Result<MediaRequest, CoreError>;

    async fn commit(self) -> Result<(), CoreError>;
}

/// Where media requests are persisted
#[async_trait]
pub trait RequestLedger: Send + Sync {
    type Tx: CreationTx;

    async fn begin(&self) -> Result<Self::Tx, CoreError>;

    /// Record an uploaded reference image on an already committed request
    async fn attach_reference(&self, id: Uuid, file_id: &str) -> Result<MediaRequest, CoreError>;
}

pub struct PgLedger {
    pool: PgPool,
    lock_prefix: bool,
}

impl PgLedger {
    pub fn new(pool: PgPool, lock_prefix: bool) -> Self {
        Self { pool, lock_prefix }
    }
}

pub struct PgCreationTx {
    tx: Transaction<'static, Postgres>,
    lock_prefix: bool,
}

#[async_trait]
impl CreationTx for PgCreationTx {
    async fn insert(
        &mut self,
        allocator: &RequestNumberAllocator,
        record: &NewMediaRecord,
        at: DateTime<Utc>,
    ) -> Result<MediaRequest, CoreError> {
        let mut store = PgRequestStore::new(&mut *self.tx, record, self.lock_prefix);
        let number = allocator.allocate(&mut store, at).await?;
        store
            .into_inserted()
            .ok_or_else(|| CoreError::from(StoreError::Backend(format!("claimed {} but no row was returned", number))))
    }

    async fn attach_reference(&mut self, id: Uuid, file_id: &str) -> Result<MediaRequest, CoreError> {
        let request = sqlx::query_as::<_, MediaRequest>(ATTACH_REFERENCE_SQL)
            .bind(file_id)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(request)
    }

    async fn commit(self) -> Result<(), CoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RequestLedger for PgLedger {
    type Tx = PgCreationTx;

    async fn begin(&self) -> Result<PgCreationTx, CoreError> {
        Ok(PgCreationTx {
            tx: self.pool.begin().await?,
            lock_prefix: self.lock_prefix,
        })
    }

    async fn attach_reference(&self, id: Uuid, file_id: &str) -> Result<MediaRequest, CoreError> {
        let request = sqlx::query_as::<_, MediaRequest>(ATTACH_REFERENCE_SQL)
            .bind(file_id)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(request)
    }
}

/// A reference image and the folder it goes to
#[derive(Debug, Clone, Copy)]
pub struct ReferenceUpload<'a> {
    pub file: &'a UploadedFile,
    pub folder_id: &'a str,
}

pub struct Creation<'a, L> {
    pub ledger: &'a L,
    pub storage: &'a dyn Storage,
    pub allocator: &'a RequestNumberAllocator,
    pub policy: UploadPolicy,
}

impl<L: RequestLedger> Creation<'_, L> {
    /// Create the request, retrying once more on an allocation conflict.
    ///
    /// Under `Required` the upload happens inside the transaction, so a slow
    /// provider holds the prefix lock for every creation in that minute.
    pub async fn run(
        &self,
        record: &NewMediaRecord,
        upload: Option<ReferenceUpload<'_>>,
        at: DateTime<Utc>,
    ) -> Result<CreatedMediaRequest, CoreError> {
        let mut retried = false;
        loop {
            match self.once(record, upload, at).await {
                Err(CoreError::Allocation(e @ AllocationError::Conflict { .. })) if !retried => {
                    tracing::warn!("{}; retrying request creation", e);
                    retried = true;
                }
                result => return result,
            }
        }
    }

    async fn once(
        &self,
        record: &NewMediaRecord,
        upload: Option<ReferenceUpload<'_>>,
        at: DateTime<Utc>,
    ) -> Result<CreatedMediaRequest, CoreError> {
        let mut tx = self.ledger.begin().await?;
        let mut request = tx.insert(self.allocator, record, at).await?;

        let mut warnings = Vec::new();
        match (self.policy, upload) {
            (UploadPolicy::Required, Some(upload)) => {
                let file_id = self
                    .upload_reference(&request.request_number, upload)
                    .await
                    .map_err(|e| {
                        tracing::error!("Reference upload for {} failed, rolling back: {}", request.request_number, e);
                        CoreError::UploadFailed(e)
                    })?;
                request = tx.attach_reference(request.id, &file_id).await?;
                tx.commit().await?;
            }
            (UploadPolicy::BestEffort, Some(upload)) => {
                tx.commit().await?;
                match self.upload_reference(&request.request_number, upload).await {
                    Ok(file_id) => match self.ledger.attach_reference(request.id, &file_id).await {
                        Ok(updated) => request = updated,
                        Err(e) => {
                            tracing::warn!(
                                "Reference image {} uploaded but not linked to {}: {}",
                                file_id,
                                request.request_number,
                                e
                            );
                            warnings.push(
                                "Request saved and the reference image uploaded, but it could not be linked to the request."
                                    .to_string(),
                            );
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Reference upload for {} failed: {}", request.request_number, e);
                        warnings.push(format!("Request saved, but the reference image upload failed: {}", e));
                    }
                }
            }
            (_, None) => tx.commit().await?,
        }

        tracing::info!("Created media request {} for user {}", request.request_number, request.user_id);
        Ok(CreatedMediaRequest { request, warnings })
    }

    async fn upload_reference(&self, request_number: &str, upload: ReferenceUpload<'_>) -> Result<String, String> {
        let file = upload.file;
        let filename = format!("{}_{}", request_number, file.filename);
        self.storage
            .upload(file.data.clone(), &filename, file.content_type.as_deref(), upload.folder_id)
            .await
            .map_err(|e| e.to_string())
    }
}
