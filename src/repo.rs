mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use uuid::Uuid;

use crate::domain::{Coupon, CouponCode};
use crate::ledger::Offering;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a registration store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A compare-and-swap lost against a concurrent writer
    #[error("Concurrent write conflict")]
    Conflict,
    /// The outcome of the operation is unknown (timeouts, dropped connections)
    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
    /// A record with the same key or unique code already exists
    #[error("{0}")]
    Duplicate(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            // serialization_failure, deadlock_detected
            sqlx::Error::Database(ref db)
                if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
            {
                Self::Conflict
            }
            // unique_violation
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
                Self::Duplicate(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Unavailable(e.into()),
            e => Self::Database(e),
        }
    }
}

impl StoreError {
    /// Whether re-running the whole read-modify-write may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::Unavailable(_))
    }
}

/// A stored record paired with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: i64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: i64) -> Self {
        Self { value, version }
    }

    /// Replace the value, keeping the version it must still match on commit
    pub fn replace(self, value: T) -> Self {
        Self {
            value,
            version: self.version,
        }
    }
}

/// Changes written in one atomic unit.
///
/// Each record's `version` is the version it was read at; the commit fails
/// with [`StoreError::Conflict`] if any of them moved in the meantime.
#[derive(Debug, Clone)]
pub struct Commit {
    pub offering: Versioned<Offering>,
    pub coupon: Option<Versioned<Coupon>>,
}

/// Storage port for offerings and coupons.
///
/// Implemented for Postgres and in memory; the registration service only
/// talks to this trait.
#[async_trait::async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn insert_offering(&self, offering: &Offering) -> StoreResult<()>;

    async fn fetch_offering(&self, id: Uuid) -> StoreResult<Option<Versioned<Offering>>>;

    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()>;

    async fn fetch_coupon(&self, id: Uuid) -> StoreResult<Option<Versioned<Coupon>>>;

    async fn fetch_coupon_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>>;

    /// Atomically write every record in `commit`, or nothing
    async fn commit(&self, commit: Commit) -> StoreResult<()>;
}
