//! Process-local request number store

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Claim, RequestNumberStore, StoreError};

/// Clones share the same set, so one store can be handed to many tasks.
///
/// Counting and claiming take the lock separately: two tasks can read the same
/// count and race for the same number, exactly as two database sessions would.
#[derive(Debug, Clone, Default)]
pub struct MemoryRequestStore {
    numbers: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_numbers<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            numbers: Arc::new(Mutex::new(numbers.into_iter().map(Into::into).collect())),
        }
    }

    /// Snapshot in sorted order
    pub async fn numbers(&self) -> Vec<String> {
        self.numbers.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.numbers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.numbers.lock().await.is_empty()
    }
}

#[async_trait]
impl RequestNumberStore for MemoryRequestStore {
    async fn count_with_prefix(&mut self, prefix: &str) -> Result<u32, StoreError> {
        let start = format!("{}_", prefix);
        let numbers = self.numbers.lock().await;
        let count = numbers
            .range(start.clone()..)
            .take_while(|n| n.starts_with(&start))
            .count();
        u32::try_from(count).map_err(|_| StoreError::Backend("prefix count overflow".to_string()))
    }

    async fn claim(&mut self, request_number: &str) -> Result<Claim, StoreError> {
        let inserted = self.numbers.lock().await.insert(request_number.to_string());
        Ok(if inserted { Claim::Claimed } else { Claim::Taken })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_count_only_matches_whole_prefix() {
        let mut store = MemoryRequestStore::with_numbers([
            "20250314_0915_0001",
            "20250314_0915_0002",
            "20250314_0916_0001",
            "20250314_09150_0001",
        ]);
        assert_eq!(store.count_with_prefix("20250314_0915").await.unwrap(), 2);
        assert_eq!(store.count_with_prefix("20250314_0916").await.unwrap(), 1);
        assert_eq!(store.count_with_prefix("20250314_0917").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let mut store = MemoryRequestStore::new();
        let mut other = store.clone();
        assert_eq!(store.claim("20250314_0915_0001").await.unwrap(), Claim::Claimed);
        assert_eq!(other.claim("20250314_0915_0001").await.unwrap(), Claim::Taken);
        assert_eq!(store.len().await, 1);
    }
}
