//! PostgreSQL request number store
//!
//! Claiming a number is the insert of the `media_requests` row that carries
//! it, so the record and its number persist together or not at all. The store
//! borrows a connection from a caller-owned transaction; nothing is committed
//! here.

use async_trait::async_trait;
use sqlx::PgConnection;

use super::{Claim, RequestNumberStore, StoreError};
use crate::models::{MediaRequest, NewMediaRecord};

const SLOT_CONSTRAINT: &str = "unique_request_per_slot";

/// `LIKE` pattern matching `<prefix>_<anything>`, with the prefix's own
/// underscores escaped so they match literally
pub fn prefix_like_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 8);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push_str("\\_%");
    pattern
}

pub(crate) fn map_store_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.constraint() == Some(SLOT_CONSTRAINT) => StoreError::SlotTaken,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

pub struct PgRequestStore<'a> {
    conn: &'a mut PgConnection,
    record: &'a NewMediaRecord,
    lock_prefix: bool,
    locked: Option<String>,
    inserted: Option<MediaRequest>,
}

impl<'a> PgRequestStore<'a> {
    /// `conn` must belong to an open transaction: the per-prefix advisory lock
    /// is transaction scoped and is released on commit or rollback.
    pub fn new(conn: &'a mut PgConnection, record: &'a NewMediaRecord, lock_prefix: bool) -> Self {
        Self {
            conn,
            record,
            lock_prefix,
            locked: None,
            inserted: None,
        }
    }

    /// The row written by the successful claim
    pub fn into_inserted(self) -> Option<MediaRequest> {
        self.inserted
    }

    async fn lock(&mut self, prefix: &str) -> Result<(), StoreError> {
        if self.locked.as_deref() == Some(prefix) {
            return Ok(());
        }
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(format!("request_number:{}", prefix))
            .execute(&mut *self.conn)
            .await
            .map_err(map_store_error)?;
        self.locked = Some(prefix.to_string());
        Ok(())
    }
}

#[async_trait]
impl RequestNumberStore for PgRequestStore<'_> {
    async fn count_with_prefix(&mut self, prefix: &str) -> Result<u32, StoreError> {
        if self.lock_prefix {
            self.lock(prefix).await?;
        }

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM media_requests WHERE request_number LIKE $1"
        )
        .bind(prefix_like_pattern(prefix))
        .fetch_one(&mut *self.conn)
        .await
        .map_err(map_store_error)?;

        u32::try_from(count).map_err(|_| StoreError::Backend(format!("prefix count out of range: {}", count)))
    }

    async fn claim(&mut self, request_number: &str) -> Result<Claim, StoreError> {
        let record = self.record;
        let row: Option<MediaRequest> = sqlx::query_as(
            r#"
            INSERT INTO media_requests (
                request_number, user_id, customer_name, customer_email, customer_phone,
                date, time, location, reference_image_name, note, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'open', $11, $11)
            ON CONFLICT (request_number) DO NOTHING
            RETURNING *
            "#
        )
        .bind(request_number)
        .bind(record.user_id)
        .bind(&record.customer_name)
        .bind(&record.customer_email)
        .bind(&record.customer_phone)
        .bind(record.date)
        .bind(record.time)
        .bind(&record.location)
        .bind(&record.reference_image_name)
        .bind(&record.note)
        .bind(record.created_at)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(map_store_error)?;

        match row {
            Some(row) => {
                self.inserted = Some(row);
                Ok(Claim::Claimed)
            }
            None => Ok(Claim::Taken),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_like_pattern_escapes_underscores() {
        assert_eq!(prefix_like_pattern("20250314_0915"), "20250314\\_0915\\_%");
    }

    #[test]
    fn test_prefix_like_pattern_escapes_wildcards() {
        assert_eq!(prefix_like_pattern("a%b\\c"), "a\\%b\\\\c\\_%");
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        assert!(matches!(map_store_error(sqlx::Error::PoolTimedOut), StoreError::Unavailable(_)));
        assert!(matches!(map_store_error(sqlx::Error::RowNotFound), StoreError::Backend(_)));
    }
}
