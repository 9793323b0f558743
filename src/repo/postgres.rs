use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use sqlx::types::Json;
use sqlx::PgPool;

use uuid::Uuid;

use crate::domain::{Coupon, CouponCode, Discount, RegistrationEntry};
use crate::ledger::Offering;

use super::{Commit, RegistrationStore, StoreError, StoreResult, Versioned};

/// Postgres registration store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OfferingRow {
    id: Uuid,
    name: String,
    kind: String,
    capacity: Option<i32>,
    registration_deadline: Option<DateTime<Utc>>,
    registrations: Json<Vec<RegistrationEntry>>,
    waitlist: Json<Vec<RegistrationEntry>>,
    version: i64,
}

impl TryFrom<OfferingRow> for Versioned<Offering> {
    type Error = StoreError;

    fn try_from(row: OfferingRow) -> StoreResult<Self> {
        let kind = row.kind.parse().map_err(StoreError::InvalidRecord)?;
        let capacity = row
            .capacity
            .map(u32::try_from)
            .transpose()
            .map_err(|_| {
                StoreError::InvalidRecord(format!("Offering {} has negative capacity", row.id))
            })?;

        let offering = Offering {
            id: row.id,
            name: row.name,
            kind,
            capacity,
            registration_deadline: row.registration_deadline,
            registrations: row.registrations.0,
            waitlist: row.waitlist.0,
        };
        Ok(Versioned::new(offering, row.version))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_value: i64,
    usage_count: i32,
    max_usage: Option<i32>,
    used_by: Vec<Uuid>,
    redeemed_by_requests: Vec<Uuid>,
    version: i64,
}

impl TryFrom<CouponRow> for Versioned<Coupon> {
    type Error = StoreError;

    fn try_from(row: CouponRow) -> StoreResult<Self> {
        let id = row.id;
        let invalid = move |what: &str| {
            StoreError::InvalidRecord(format!("Coupon {} has invalid {}", id, what))
        };

        let code = row.code.parse().map_err(StoreError::InvalidRecord)?;
        let discount_value =
            u64::try_from(row.discount_value).map_err(|_| invalid("discount value"))?;
        let discount = Discount::new(&row.discount_type, discount_value)
            .map_err(StoreError::InvalidRecord)?;
        let usage_count = u32::try_from(row.usage_count).map_err(|_| invalid("usage count"))?;
        let max_usage = row
            .max_usage
            .map(u32::try_from)
            .transpose()
            .map_err(|_| invalid("usage limit"))?;

        let coupon = Coupon {
            id: row.id,
            code,
            discount,
            usage_count,
            max_usage,
            used_by: row.used_by.into_iter().collect::<BTreeSet<_>>(),
            redeemed_by_requests: row.redeemed_by_requests.into_iter().collect(),
        };
        Ok(Versioned::new(coupon, row.version))
    }
}

/// Map a unique violation to [`StoreError::Duplicate`] with `message`
fn duplicate_or(e: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match StoreError::from(e) {
        StoreError::Duplicate(_) => StoreError::Duplicate(message()),
        other => other,
    }
}

fn to_i32(value: u32, what: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::InvalidRecord(format!("{} out of range", what)))
}

#[async_trait::async_trait]
impl RegistrationStore for PgStore {
    #[tracing::instrument(
        name = "Insert offering",
        skip(self, offering),
        fields(offering_id = %offering.id)
    )]
    async fn insert_offering(&self, offering: &Offering) -> StoreResult<()> {
        let capacity = offering
            .capacity
            .map(|capacity| to_i32(capacity, "capacity"))
            .transpose()?;

        sqlx::query(
            "insert into offerings(id, name, kind, capacity, registration_deadline, \
             registrations, waitlist) values ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(offering.id)
        .bind(&offering.name)
        .bind(offering.kind.as_str())
        .bind(capacity)
        .bind(offering.registration_deadline)
        .bind(Json(&offering.registrations))
        .bind(Json(&offering.waitlist))
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, || format!("Offering {} already exists", offering.id)))?;
        Ok(())
    }

    #[tracing::instrument(name = "Fetch offering", skip(self))]
    async fn fetch_offering(&self, id: Uuid) -> StoreResult<Option<Versioned<Offering>>> {
        sqlx::query_as::<_, OfferingRow>(
            "select id, name, kind, capacity, registration_deadline, registrations, waitlist, \
             version from offerings where id=$1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Versioned::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "Insert coupon", skip(self, coupon), fields(code = %coupon.code))]
    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()> {
        let max_usage = coupon
            .max_usage
            .map(|max_usage| to_i32(max_usage, "usage limit"))
            .transpose()?;
        let discount_value = i64::try_from(coupon.discount.value())
            .map_err(|_| StoreError::InvalidRecord("discount value out of range".into()))?;
        let used_by: Vec<Uuid> = coupon.used_by.iter().copied().collect();
        let redeemed_by_requests: Vec<Uuid> = coupon.redeemed_by_requests.iter().copied().collect();

        sqlx::query(
            "insert into coupons(id, code, discount_type, discount_value, usage_count, max_usage, \
             used_by, redeemed_by_requests) values ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(coupon.id)
        .bind(coupon.code.as_ref())
        .bind(coupon.discount.discount_type())
        .bind(discount_value)
        .bind(to_i32(coupon.usage_count, "usage count")?)
        .bind(max_usage)
        .bind(used_by)
        .bind(redeemed_by_requests)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, || format!("Coupon {} already exists", coupon.code)))?;
        Ok(())
    }

    #[tracing::instrument(name = "Fetch coupon", skip(self))]
    async fn fetch_coupon(&self, id: Uuid) -> StoreResult<Option<Versioned<Coupon>>> {
        sqlx::query_as::<_, CouponRow>(
            "select id, code, discount_type, discount_value, usage_count, max_usage, used_by, \
             redeemed_by_requests, version from coupons where id=$1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Versioned::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "Fetch coupon by code", skip(self))]
    async fn fetch_coupon_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, CouponRow>(
            "select id, code, discount_type, discount_value, usage_count, max_usage, used_by, \
             redeemed_by_requests, version from coupons where code=$1",
        )
        .bind(code.as_ref())
        .fetch_optional(&self.pool)
        .await?
        .map(Versioned::try_from)
        .transpose()?;

        Ok(coupon.map(|versioned| versioned.value))
    }

    #[tracing::instrument(
        name = "Commit registration changes",
        skip(self, commit),
        fields(offering_id = %commit.offering.value.id, version = commit.offering.version)
    )]
    async fn commit(&self, commit: Commit) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let offering = &commit.offering.value;
        let updated = sqlx::query(
            "update offerings set registrations=$3, waitlist=$4, version=version+1, \
             updated_at=now() where id=$1 and version=$2",
        )
        .bind(offering.id)
        .bind(commit.offering.version)
        .bind(Json(&offering.registrations))
        .bind(Json(&offering.waitlist))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(StoreError::Conflict);
        }

        if let Some(Versioned { value: coupon, version }) = &commit.coupon {
            let used_by: Vec<Uuid> = coupon.used_by.iter().copied().collect();
            let redeemed_by_requests: Vec<Uuid> =
                coupon.redeemed_by_requests.iter().copied().collect();
            let updated = sqlx::query(
                "update coupons set usage_count=$3, used_by=$4, redeemed_by_requests=$5, \
                 version=version+1, updated_at=now() where id=$1 and version=$2",
            )
            .bind(coupon.id)
            .bind(*version)
            .bind(to_i32(coupon.usage_count, "usage count")?)
            .bind(used_by)
            .bind(redeemed_by_requests)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(StoreError::Conflict);
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
