use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::domain::{Coupon, CouponCode};
use crate::ledger::Offering;

use super::{Commit, RegistrationStore, StoreError, StoreResult, Versioned};

#[derive(Debug, Default)]
struct State {
    offerings: HashMap<Uuid, Versioned<Offering>>,
    coupons: HashMap<Uuid, Versioned<Coupon>>,
}

/// Process-local store with the same compare-and-swap semantics as [`super::PgStore`].
///
/// Used for development and tests. Faults can be injected to exercise the
/// retry paths of the registration service.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    injected_conflicts: AtomicU32,
    lost_acknowledgements: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with a conflict without writing
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.fetch_add(count, Ordering::SeqCst);
    }

    /// Make the next `count` commits write, then report the outcome as unknown
    pub fn inject_lost_acknowledgements(&self, count: u32) {
        self.lost_acknowledgements.fetch_add(count, Ordering::SeqCst);
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow::anyhow!("In-memory store lock poisoned")))
    }
}

/// Decrement `counter` if it is positive, reporting whether it was
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait::async_trait]
impl RegistrationStore for InMemoryStore {
    async fn insert_offering(&self, offering: &Offering) -> StoreResult<()> {
        let mut state = self.state()?;
        if state.offerings.contains_key(&offering.id) {
            return Err(StoreError::Duplicate(format!("Offering {} already exists", offering.id)));
        }
        state
            .offerings
            .insert(offering.id, Versioned::new(offering.clone(), 0));
        Ok(())
    }

    async fn fetch_offering(&self, id: Uuid) -> StoreResult<Option<Versioned<Offering>>> {
        Ok(self.state()?.offerings.get(&id).cloned())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()> {
        let mut state = self.state()?;
        if state.coupons.values().any(|c| c.value.code == coupon.code) {
            return Err(StoreError::Duplicate(format!("Coupon {} already exists", coupon.code)));
        }
        state.coupons.insert(coupon.id, Versioned::new(coupon.clone(), 0));
        Ok(())
    }

    async fn fetch_coupon(&self, id: Uuid) -> StoreResult<Option<Versioned<Coupon>>> {
        Ok(self.state()?.coupons.get(&id).cloned())
    }

    async fn fetch_coupon_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        Ok(self
            .state()?
            .coupons
            .values()
            .find(|c| &c.value.code == code)
            .map(|c| c.value.clone()))
    }

    async fn commit(&self, commit: Commit) -> StoreResult<()> {
        if take_one(&self.injected_conflicts) {
            return Err(StoreError::Conflict);
        }

        let mut state = self.state()?;

        let offering_version = state
            .offerings
            .get(&commit.offering.value.id)
            .map(|stored| stored.version);
        if offering_version != Some(commit.offering.version) {
            return Err(StoreError::Conflict);
        }
        if let Some(coupon) = &commit.coupon {
            let coupon_version = state.coupons.get(&coupon.value.id).map(|c| c.version);
            if coupon_version != Some(coupon.version) {
                return Err(StoreError::Conflict);
            }
        }

        let Versioned { value, version } = commit.offering;
        state.offerings.insert(value.id, Versioned::new(value, version + 1));
        if let Some(Versioned { value, version }) = commit.coupon {
            state.coupons.insert(value.id, Versioned::new(value, version + 1));
        }

        if take_one(&self.lost_acknowledgements) {
            return Err(StoreError::Unavailable(anyhow::anyhow!(
                "Commit acknowledgement lost"
            )));
        }
        Ok(())
    }
}
