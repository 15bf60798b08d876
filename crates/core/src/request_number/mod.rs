//! Request number allocation
//!
//! A request number is the creation minute followed by a four digit ordinal
//! that is unique within that minute, e.g. `20250314_0915_0003`. Numbers sort
//! lexicographically in creation order across minutes.
//!
//! Uniqueness is owned by the store, never by a process-local counter. The
//! allocator derives the next ordinal from a count of existing numbers and asks
//! the store to claim it; a store that already holds the number answers
//! [`Claim::Taken`] and the allocator re-counts and tries again within a
//! bounded budget. Stores may additionally serialize claims per prefix.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use memory::MemoryRequestStore;
pub use postgres::PgRequestStore;

/// strftime layout of the minute prefix
pub const PREFIX_FORMAT: &str = "%Y%m%d_%H%M";

/// Largest ordinal that fits the zero-padded four digit width
pub const MAX_SEQUENCE: u32 = 9999;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request store unavailable: {0}")]
    Unavailable(String),

    #[error("You already have a request for the same date, time and location.")]
    SlotTaken,

    #[error("Request store error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Could not allocate a unique request number for {prefix} after {attempts} attempts")]
    Conflict { prefix: String, attempts: u32 },

    #[error("All {max} request numbers for {prefix} are in use")]
    PrefixExhausted { prefix: String, max: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocationError {
    /// Transient failures are worth one more attempt from the caller
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AllocationError::Conflict { .. } | AllocationError::Store(StoreError::Unavailable(_))
        )
    }
}

/// Outcome of asking the store to take ownership of a number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    Taken,
}

/// Backing store for allocated numbers.
///
/// `claim` must be atomic with respect to other claims of the same number:
/// exactly one caller may observe `Claimed` for a given number.
#[async_trait]
pub trait RequestNumberStore: Send {
    /// Number of existing request numbers that start with `prefix`
    async fn count_with_prefix(&mut self, prefix: &str) -> Result<u32, StoreError>;

    /// Insert `request_number`, reporting `Taken` if it already exists
    async fn claim(&mut self, request_number: &str) -> Result<Claim, StoreError>;
}

/// Minute prefix for a timestamp
pub fn prefix_for(at: DateTime<Utc>) -> String {
    at.format(PREFIX_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestNumber {
    prefix: String,
    seq: u32,
}

impl RequestNumber {
    pub fn new(prefix: impl Into<String>, seq: u32) -> Self {
        Self {
            prefix: prefix.into(),
            seq,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }
}

impl fmt::Display for RequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:04}", self.prefix, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed request number: {0}")]
pub struct ParseRequestNumberError(String);

impl FromStr for RequestNumber {
    type Err = ParseRequestNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRequestNumberError(s.to_string());
        let (prefix, seq) = s.rsplit_once('_').ok_or_else(err)?;
        if seq.len() != 4 || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        NaiveDateTime::parse_from_str(prefix, PREFIX_FORMAT).map_err(|_| err())?;
        let seq: u32 = seq.parse().map_err(|_| err())?;
        if seq == 0 {
            return Err(err());
        }
        Ok(Self::new(prefix, seq))
    }
}

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Claims attempted before giving up with `AllocationError::Conflict`
    pub max_attempts: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestNumberAllocator {
    config: AllocatorConfig,
}

impl RequestNumberAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Allocate and claim the next request number for the minute of `at`.
    ///
    /// Ordinals past [`MAX_SEQUENCE`] fail with `PrefixExhausted` rather than
    /// widening the suffix, which would break lexicographic ordering.
    pub async fn allocate<S>(&self, store: &mut S, at: DateTime<Utc>) -> Result<RequestNumber, AllocationError>
    where
        S: RequestNumberStore + ?Sized,
    {
        let prefix = prefix_for(at);
        let max_attempts = self.max_attempts();
        // Highest ordinal known to be taken; a stale count never sends us below it
        let mut floor = 0u32;

        for attempt in 1..=max_attempts {
            let existing = store.count_with_prefix(&prefix).await?;
            let seq = existing.saturating_add(1).max(floor + 1);
            if seq > MAX_SEQUENCE {
                tracing::error!("Request numbers exhausted for prefix {}", prefix);
                return Err(AllocationError::PrefixExhausted {
                    prefix,
                    max: MAX_SEQUENCE,
                });
            }

            let candidate = RequestNumber::new(prefix.clone(), seq);
            match store.claim(&candidate.to_string()).await? {
                Claim::Claimed => {
                    tracing::debug!(attempt, request_number = %candidate, "Allocated request number");
                    return Ok(candidate);
                }
                Claim::Taken => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        request_number = %candidate,
                        "Request number already taken, retrying"
                    );
                    floor = seq;
                }
            }
        }

        Err(AllocationError::Conflict {
            prefix,
            attempts: max_attempts,
        })
    }
}
