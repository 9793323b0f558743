use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use serde::Serialize;

use uuid::Uuid;

use crate::domain::{Coupon, CouponCode, CouponError, RegistrationEntry, RegistrationRequest};
use crate::error::{Error, Result};
use crate::ledger::{Offering, Placement, Spots};
use crate::notification::NotificationEvent;
use crate::promotion::{promote_from_waitlist, Promotion};
use crate::repo::{Commit, RegistrationStore, Versioned};
use crate::settings::RegistrationSettings;

/// Final placement of a registration request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Confirmed,
    Waitlisted,
}

/// What happened to the coupon referenced by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponStatus {
    /// The request did not reference a coupon
    NotRequested,
    /// Redeemed together with the registration
    Applied(CouponCode),
    /// Not redeemed; the registration went ahead without it
    Rejected(CouponError),
    /// Left untouched because the request was waitlisted
    Deferred,
}

#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub disposition: Disposition,
    /// Offering as committed
    pub offering: Offering,
    /// Entries created for this request, in participant order
    pub entries: Vec<RegistrationEntry>,
    pub coupon: CouponStatus,
    /// Event to hand to the notification dispatcher
    pub notification: NotificationEvent,
}

#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    pub offering: Offering,
    pub promoted: Vec<RegistrationEntry>,
    /// `None` when nobody was promoted
    pub notification: Option<NotificationEvent>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalOutcome {
    pub offering: Offering,
    pub withdrawn: RegistrationEntry,
    pub promotion: PromotionOutcome,
}

/// Registration changes decided by one attempt, before notification
#[derive(Debug)]
struct Placed {
    disposition: Disposition,
    offering: Offering,
    entries: Vec<RegistrationEntry>,
    coupon: CouponStatus,
}

/// Registration transaction, waitlist and withdrawal workflows over a [`RegistrationStore`].
///
/// Every mutation is a read-modify-write of the offering (and the coupon, if
/// one is redeemed) committed with compare-and-swap. Conflicting or
/// interrupted commits are re-run from a fresh read.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    max_commit_attempts: u32,
    retry_backoff: Duration,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>, settings: &RegistrationSettings) -> Self {
        Self {
            store,
            max_commit_attempts: settings.max_commit_attempts().max(1),
            retry_backoff: settings.retry_backoff(),
        }
    }

    #[tracing::instrument(
        name = "Create offering",
        skip(self, offering),
        fields(offering_id = %offering.id)
    )]
    pub async fn create_offering(&self, offering: Offering) -> Result<Offering> {
        self.store.insert_offering(&offering).await?;
        Ok(offering)
    }

    #[tracing::instrument(name = "Fetch offering", skip(self))]
    pub async fn fetch_offering(&self, offering_id: Uuid) -> Result<Offering> {
        Ok(self.load_offering(offering_id).await?.value)
    }

    #[tracing::instrument(name = "Create coupon", skip(self, coupon), fields(code = %coupon.code))]
    pub async fn create_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        self.store.insert_coupon(&coupon).await?;
        Ok(coupon)
    }

    /// Coupon lookup for price calculation ahead of a registration
    #[tracing::instrument(name = "Find coupon by code", skip(self))]
    pub async fn find_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.store.fetch_coupon_by_code(code).await?)
    }

    /// Register every participant of `request`, or waitlist them all if the group does not fit.
    ///
    /// Fails with [`Error::OfferingNotFound`], [`Error::CouponNotFound`] or
    /// [`Error::DeadlinePassed`] without changing anything. A coupon that can
    /// no longer be redeemed does not block the registration.
    #[tracing::instrument(
        name = "Submit registration",
        skip(self, request),
        fields(request_id = %request.request_id(), participants = request.participants().len())
    )]
    pub async fn submit_registration(
        &self,
        offering_id: Uuid,
        request: &RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<RegistrationOutcome> {
        ensure_targets(offering_id, request)?;
        // Built once so every attempt commits the same entries
        let entries = request.entries(now);
        let entries = entries.as_slice();

        let placed = self
            .retrying(|| self.try_register(offering_id, request, entries, now))
            .await?;

        tracing::info!(disposition = ?placed.disposition, "Registration committed");
        Ok(outcome(request, placed))
    }

    /// Append every participant of `request` straight to the waitlist
    #[tracing::instrument(
        name = "Submit waitlist join",
        skip(self, request),
        fields(request_id = %request.request_id(), participants = request.participants().len())
    )]
    pub async fn submit_waitlist_join(
        &self,
        offering_id: Uuid,
        request: &RegistrationRequest,
    ) -> Result<RegistrationOutcome> {
        ensure_targets(offering_id, request)?;
        let entries = request.entries(Utc::now());
        let entries = entries.as_slice();

        let placed = self
            .retrying(|| self.try_join_waitlist(offering_id, request, entries))
            .await?;

        Ok(outcome(request, placed))
    }

    /// Promote up to `freed_spots` waitlist entries, first come first served.
    ///
    /// Never promotes beyond the offering's capacity. Promoting zero entries
    /// commits nothing.
    #[tracing::instrument(name = "Promote from waitlist", skip(self))]
    pub async fn promote_from_waitlist(
        &self,
        offering_id: Uuid,
        freed_spots: u32,
    ) -> Result<PromotionOutcome> {
        let promotion = self
            .retrying(|| self.try_promote(offering_id, freed_spots))
            .await?;

        tracing::info!(promoted = promotion.promoted.len(), "Waitlist promotion committed");
        Ok(promotion_outcome(promotion))
    }

    /// Look up one entry without changing the offering
    #[tracing::instrument(name = "Find registration entry", skip(self))]
    pub async fn find_entry(
        &self,
        offering_id: Uuid,
        entry_id: Uuid,
    ) -> Result<(Offering, RegistrationEntry, Placement)> {
        let offering = self.load_offering(offering_id).await?.value;
        let (entry, placement) = offering
            .find_entry(entry_id)
            .map(|(entry, placement)| (entry.clone(), placement))
            .ok_or(Error::EntryNotFound(entry_id))?;
        Ok((offering, entry, placement))
    }

    /// Remove one entry, refilling freed confirmed capacity from the waitlist in the same commit
    #[tracing::instrument(name = "Withdraw registration", skip(self))]
    pub async fn withdraw(&self, offering_id: Uuid, entry_id: Uuid) -> Result<WithdrawalOutcome> {
        let (withdrawn, promotion) = self
            .retrying(|| self.try_withdraw(offering_id, entry_id))
            .await?;

        let promotion = promotion_outcome(promotion);
        Ok(WithdrawalOutcome {
            offering: promotion.offering.clone(),
            withdrawn,
            promotion,
        })
    }

    /// One attempt of [`Self::submit_registration`], from a fresh read
    async fn try_register(
        &self,
        offering_id: Uuid,
        request: &RegistrationRequest,
        entries: &[RegistrationEntry],
        now: DateTime<Utc>,
    ) -> Result<Placed> {
        let stored = self.load_offering(offering_id).await?;

        // An earlier attempt may have landed even though its commit reported an error
        if let Some(mut placed) = already_placed(&stored.value, request) {
            if let (Disposition::Confirmed, Some(coupon_id)) =
                (placed.disposition, request.coupon_id())
            {
                let coupon = self.load_coupon(coupon_id).await?;
                placed.coupon = recovered_coupon_status(&coupon.value, request);
            }
            return Ok(placed);
        }

        if !stored.value.is_registration_open(now) {
            return Err(Error::DeadlinePassed(offering_id));
        }

        // Groups are confirmed or waitlisted as a whole
        if !stored.value.spots_remaining().has_room_for(entries.len()) {
            let offering = stored.value.clone().append_to_waitlist(entries.to_vec());
            self.commit(stored.replace(offering.clone()), None).await?;

            return Ok(Placed {
                disposition: Disposition::Waitlisted,
                offering,
                entries: entries.to_vec(),
                coupon: deferred_coupon(request),
            });
        }

        let (coupon_commit, coupon_status) = match request.coupon_id() {
            None => (None, CouponStatus::NotRequested),
            Some(coupon_id) => {
                let coupon = self.load_coupon(coupon_id).await?;
                let redemption = coupon
                    .value
                    .clone()
                    .redeem(request.coupon_consumer(), request.request_id());
                match redemption {
                    Ok(redeemed) => {
                        let code = redeemed.code.clone();
                        (Some(coupon.replace(redeemed)), CouponStatus::Applied(code))
                    }
                    Err(rejection) => {
                        tracing::info!(%rejection, "Registering without coupon");
                        (None, CouponStatus::Rejected(rejection))
                    }
                }
            }
        };

        let offering = stored.value.clone().append_registrations(entries.to_vec());
        self.commit(stored.replace(offering.clone()), coupon_commit)
            .await?;

        Ok(Placed {
            disposition: Disposition::Confirmed,
            offering,
            entries: entries.to_vec(),
            coupon: coupon_status,
        })
    }

    /// One attempt of [`Self::submit_waitlist_join`]
    async fn try_join_waitlist(
        &self,
        offering_id: Uuid,
        request: &RegistrationRequest,
        entries: &[RegistrationEntry],
    ) -> Result<Placed> {
        let stored = self.load_offering(offering_id).await?;
        if let Some(placed) = already_placed(&stored.value, request) {
            return Ok(placed);
        }

        let offering = stored.value.clone().append_to_waitlist(entries.to_vec());
        self.commit(stored.replace(offering.clone()), None).await?;

        Ok(Placed {
            disposition: Disposition::Waitlisted,
            offering,
            entries: entries.to_vec(),
            coupon: deferred_coupon(request),
        })
    }

    /// One attempt of [`Self::promote_from_waitlist`]
    async fn try_promote(&self, offering_id: Uuid, freed_spots: u32) -> Result<Promotion> {
        let stored = self.load_offering(offering_id).await?;
        let promotable = match stored.value.spots_remaining() {
            Spots::Unbounded => freed_spots,
            Spots::Limited(remaining) => freed_spots.min(remaining),
        };

        let promotion = promote_from_waitlist(stored.value.clone(), promotable as usize);
        if !promotion.promoted.is_empty() {
            self.commit(stored.replace(promotion.offering.clone()), None)
                .await?;
        }
        Ok(promotion)
    }

    /// One attempt of [`Self::withdraw`]
    async fn try_withdraw(
        &self,
        offering_id: Uuid,
        entry_id: Uuid,
    ) -> Result<(RegistrationEntry, Promotion)> {
        let stored = self.load_offering(offering_id).await?;
        let (offering, withdrawn, placement) = stored
            .value
            .clone()
            .remove_entry(entry_id)
            .ok_or(Error::EntryNotFound(entry_id))?;

        let promotion = match (placement, offering.spots_remaining()) {
            (Placement::Waitlisted, _) => Promotion {
                offering,
                promoted: Vec::new(),
            },
            (Placement::Registered, Spots::Unbounded) => promote_from_waitlist(offering, 1),
            (Placement::Registered, Spots::Limited(remaining)) => {
                promote_from_waitlist(offering, remaining as usize)
            }
        };

        self.commit(stored.replace(promotion.offering.clone()), None)
            .await?;
        Ok((withdrawn, promotion))
    }

    async fn load_offering(&self, offering_id: Uuid) -> Result<Versioned<Offering>> {
        self.store
            .fetch_offering(offering_id)
            .await?
            .ok_or(Error::OfferingNotFound(offering_id))
    }

    async fn load_coupon(&self, coupon_id: Uuid) -> Result<Versioned<Coupon>> {
        self.store
            .fetch_coupon(coupon_id)
            .await?
            .ok_or(Error::CouponNotFound(coupon_id))
    }

    async fn commit(
        &self,
        offering: Versioned<Offering>,
        coupon: Option<Versioned<Coupon>>,
    ) -> Result<()> {
        self.store.commit(Commit { offering, coupon }).await?;
        Ok(())
    }

    /// Run `attempt` until it succeeds, fails terminally, or runs out of attempts
    async fn retrying<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match attempt().await {
                Err(Error::Store(error)) if error.is_retryable() => {
                    if attempts >= self.max_commit_attempts {
                        tracing::error!(
                            error.cause_chain = ?error,
                            attempts,
                            "Giving up on commit"
                        );
                        return Err(Error::TransactionFailed(attempts));
                    }
                    tracing::warn!(
                        error.cause_chain = ?error,
                        attempts,
                        "Retrying commit from a fresh read"
                    );
                    tokio::time::sleep(self.retry_backoff * attempts).await;
                }
                result => return result,
            }
        }
    }
}

fn ensure_targets(offering_id: Uuid, request: &RegistrationRequest) -> Result<()> {
    if request.offering_id() != offering_id {
        return Err(Error::ParsingError(format!(
            "Registration request targets offering {}, not {}",
            request.offering_id(),
            offering_id
        )));
    }
    Ok(())
}

/// The placement of `request` in `offering`, if a previous attempt already committed it
fn already_placed(offering: &Offering, request: &RegistrationRequest) -> Option<Placed> {
    let placement = offering.placement_of_request(request.request_id())?;
    tracing::info!(?placement, "Request already committed by an earlier attempt");

    let (disposition, coupon) = match placement {
        Placement::Registered => (
            Disposition::Confirmed,
            if request.coupon_id().is_some() {
                CouponStatus::Deferred
            } else {
                CouponStatus::NotRequested
            },
        ),
        Placement::Waitlisted => (Disposition::Waitlisted, deferred_coupon(request)),
    };

    Some(Placed {
        disposition,
        offering: offering.clone(),
        entries: offering.entries_of_request(request.request_id(), placement),
        coupon,
    })
}

fn deferred_coupon(request: &RegistrationRequest) -> CouponStatus {
    match request.coupon_id() {
        Some(_) => CouponStatus::Deferred,
        None => CouponStatus::NotRequested,
    }
}

/// Coupon status of a registration committed by an earlier attempt
fn recovered_coupon_status(coupon: &Coupon, request: &RegistrationRequest) -> CouponStatus {
    if coupon.was_redeemed_by(request.request_id()) {
        return CouponStatus::Applied(coupon.code.clone());
    }
    // Exhaustion and per-consumer redemption only ever grow, so the original rejection still holds
    let rejection = coupon
        .check_redeemable(request.coupon_consumer())
        .err()
        .unwrap_or_else(|| CouponError::Exhausted(coupon.code.clone()));
    CouponStatus::Rejected(rejection)
}

fn outcome(request: &RegistrationRequest, placed: Placed) -> RegistrationOutcome {
    let contact = request.contact();
    let notification = match placed.disposition {
        Disposition::Confirmed => NotificationEvent::RegistrationConfirmed {
            offering_id: placed.offering.id,
            offering_name: placed.offering.name.clone(),
            contact_email: contact.email.clone(),
            contact_name: contact.name.clone(),
            participants: placed.entries.clone(),
            total_price: request.total_price(),
        },
        Disposition::Waitlisted => NotificationEvent::WaitlistJoined {
            offering_id: placed.offering.id,
            offering_name: placed.offering.name.clone(),
            contact_email: contact.email.clone(),
            contact_name: contact.name.clone(),
            participants: placed.entries.clone(),
        },
    };

    RegistrationOutcome {
        disposition: placed.disposition,
        offering: placed.offering,
        entries: placed.entries,
        coupon: placed.coupon,
        notification,
    }
}

fn promotion_outcome(promotion: Promotion) -> PromotionOutcome {
    let notification =
        (!promotion.promoted.is_empty()).then(|| NotificationEvent::WaitlistPromoted {
            offering_id: promotion.offering.id,
            offering_name: promotion.offering.name.clone(),
            promoted_entries: promotion.promoted.clone(),
        });

    PromotionOutcome {
        offering: promotion.offering,
        promoted: promotion.promoted,
        notification,
    }
}
