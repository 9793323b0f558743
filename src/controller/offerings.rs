use actix_web::dev::HttpServiceFactory;
use actix_web::http::header::HeaderMap;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};

use chrono::{DateTime, NaiveDate, Utc};

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use crate::crypto::{SigningKey, Withdrawal};
use crate::domain::{Contact, Participant, Price, RegistrationEntry, RegistrationRequest};
use crate::error::{RestError, RestResult};
use crate::ledger::{Offering, OfferingKind, Placement, Spots};
use crate::notification::NotificationDispatcher;
use crate::registration::{CouponStatus, Disposition, RegistrationOutcome, RegistrationService};

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Form deserialization wrapper for registration requests
#[derive(Debug, Deserialize)]
pub struct RegistrationForm {
    user_id: Uuid,
    club_id: Option<Uuid>,
    contact: ContactForm,
    participants: Vec<ParticipantForm>,
    /// Price in cents, already calculated by the caller
    total_price: u64,
    coupon_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ContactForm {
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantForm {
    name: String,
    birth_date: NaiveDate,
    role: String,
}

impl RegistrationForm {
    /// Validate the form into a request for `offering_id`
    pub fn into_request(
        self,
        offering_id: Uuid,
        request_id: Option<Uuid>,
    ) -> Result<RegistrationRequest, String> {
        let contact = Contact {
            name: self.contact.name.parse()?,
            email: self.contact.email.parse()?,
        };

        let mut builder = RegistrationRequest::builder(offering_id, self.user_id, contact)
            .club_id(self.club_id)
            .total_price(Price::from_cents(self.total_price))
            .coupon_id(self.coupon_id);
        if let Some(request_id) = request_id {
            builder = builder.request_id(request_id);
        }
        for participant in self.participants {
            builder = builder.participant(Participant {
                name: participant.name.parse()?,
                birth_date: participant.birth_date,
                role: participant.role.parse()?,
            });
        }

        builder.build()
    }
}

/// Public snapshot of an offering
#[derive(Debug, Serialize)]
pub struct OfferingView {
    id: Uuid,
    name: String,
    kind: OfferingKind,
    capacity: Option<u32>,
    registration_deadline: Option<DateTime<Utc>>,
    /// `None` when the offering is unbounded
    spots_remaining: Option<u32>,
    registered: usize,
    waitlisted: usize,
}

impl From<&Offering> for OfferingView {
    fn from(offering: &Offering) -> Self {
        let spots_remaining = match offering.spots_remaining() {
            Spots::Unbounded => None,
            Spots::Limited(remaining) => Some(remaining),
        };

        Self {
            id: offering.id,
            name: offering.name.clone(),
            kind: offering.kind,
            capacity: offering.capacity,
            registration_deadline: offering.registration_deadline,
            spots_remaining,
            registered: offering.registrations.len(),
            waitlisted: offering.waitlist.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    id: Uuid,
    participant_name: String,
    registered_at: DateTime<Utc>,
}

impl From<&RegistrationEntry> for EntryView {
    fn from(entry: &RegistrationEntry) -> Self {
        Self {
            id: entry.id,
            participant_name: entry.participant_name.to_string(),
            registered_at: entry.registered_at,
        }
    }
}

pub fn entry_views(entries: &[RegistrationEntry]) -> Vec<EntryView> {
    entries.iter().map(EntryView::from).collect()
}

#[derive(Debug, Serialize)]
struct CouponStatusView {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<&CouponStatus> for CouponStatusView {
    fn from(status: &CouponStatus) -> Self {
        let (status, reason) = match status {
            CouponStatus::NotRequested => ("not_requested", None),
            CouponStatus::Applied(_) => ("applied", None),
            CouponStatus::Rejected(rejection) => ("rejected", Some(rejection.to_string())),
            CouponStatus::Deferred => ("deferred", None),
        };
        Self { status, reason }
    }
}

#[derive(Debug, Serialize)]
struct RegistrationView {
    disposition: Disposition,
    offering: OfferingView,
    entries: Vec<EntryView>,
    coupon: CouponStatusView,
}

impl From<&RegistrationOutcome> for RegistrationView {
    fn from(outcome: &RegistrationOutcome) -> Self {
        Self {
            disposition: outcome.disposition,
            offering: OfferingView::from(&outcome.offering),
            entries: entry_views(&outcome.entries),
            coupon: CouponStatusView::from(&outcome.coupon),
        }
    }
}

#[derive(Debug, Serialize)]
struct PendingWithdrawalView {
    entry: EntryView,
    placement: Placement,
    offering: OfferingView,
    /// Where to POST the same token to confirm
    confirm_with: String,
}

#[derive(Debug, Serialize)]
struct WithdrawalView {
    withdrawn: EntryView,
    promoted: Vec<EntryView>,
    offering: OfferingView,
}

/// Optional client supplied idempotency key
fn idempotency_key(headers: &HeaderMap) -> RestResult<Option<Uuid>> {
    headers
        .get(IDEMPOTENCY_KEY)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|value| Uuid::parse_str(value.trim()).ok())
                .ok_or_else(|| RestError::ParseError(format!("{} must be a UUID", IDEMPOTENCY_KEY)))
        })
        .transpose()
}

/// Offering snapshot endpoint
#[tracing::instrument(name = "Fetch an offering", skip(service))]
#[get("/{offering_id}")]
async fn fetch(
    service: web::Data<RegistrationService>,
    path: web::Path<(Uuid,)>,
) -> RestResult<impl Responder> {
    let (offering_id,) = path.into_inner();

    let offering = service.fetch_offering(offering_id).await?;

    Ok(HttpResponse::Ok().json(OfferingView::from(&offering)))
}

/// Registration endpoint; confirms the whole group or waitlists it
#[tracing::instrument(name = "Register participants", skip(req, service, dispatcher, form))]
#[post("/{offering_id}/registrations")]
async fn register(
    req: HttpRequest,
    service: web::Data<RegistrationService>,
    dispatcher: web::Data<NotificationDispatcher>,
    path: web::Path<(Uuid,)>,
    form: web::Json<RegistrationForm>,
) -> RestResult<impl Responder> {
    let (offering_id,) = path.into_inner();
    let request_id = idempotency_key(req.headers())?;
    let request = form
        .into_inner()
        .into_request(offering_id, request_id)
        .map_err(RestError::ParseError)?;

    let outcome = service
        .submit_registration(offering_id, &request, Utc::now())
        .await?;
    // Committed; delivery problems no longer matter to the caller
    dispatcher.dispatch(&outcome.notification).await;

    Ok(HttpResponse::Created().json(RegistrationView::from(&outcome)))
}

/// Explicit waitlist sign-up
#[tracing::instrument(name = "Join a waitlist", skip(req, service, dispatcher, form))]
#[post("/{offering_id}/waitlist")]
async fn join_waitlist(
    req: HttpRequest,
    service: web::Data<RegistrationService>,
    dispatcher: web::Data<NotificationDispatcher>,
    path: web::Path<(Uuid,)>,
    form: web::Json<RegistrationForm>,
) -> RestResult<impl Responder> {
    let (offering_id,) = path.into_inner();
    let request_id = idempotency_key(req.headers())?;
    let request = form
        .into_inner()
        .into_request(offering_id, request_id)
        .map_err(RestError::ParseError)?;

    let outcome = service.submit_waitlist_join(offering_id, &request).await?;
    dispatcher.dispatch(&outcome.notification).await;

    Ok(HttpResponse::Created().json(RegistrationView::from(&outcome)))
}

/// Landing page of the signed links sent in confirmation emails; changes nothing
#[tracing::instrument(name = "Show a pending withdrawal", skip(req, service, signing_key))]
#[get("/withdraw/{token_str}")]
async fn withdrawal_details(
    req: HttpRequest,
    service: web::Data<RegistrationService>,
    signing_key: web::Data<SigningKey>,
    path: web::Path<(String,)>,
) -> RestResult<impl Responder> {
    let (token_str,) = path.into_inner();
    let claim = Withdrawal::verify(signing_key.get_ref(), &token_str)?;

    let (offering, entry, placement) = service
        .find_entry(claim.offering_id, claim.entry_id)
        .await?;

    Ok(HttpResponse::Ok().json(PendingWithdrawalView {
        entry: EntryView::from(&entry),
        placement,
        offering: OfferingView::from(&offering),
        confirm_with: format!("POST {}", req.path()),
    }))
}

/// Confirms a withdrawal with the token from a confirmation email link
#[tracing::instrument(
    name = "Withdraw a registration by token",
    skip(service, dispatcher, signing_key)
)]
#[post("/withdraw/{token_str}")]
async fn withdraw(
    service: web::Data<RegistrationService>,
    dispatcher: web::Data<NotificationDispatcher>,
    signing_key: web::Data<SigningKey>,
    path: web::Path<(String,)>,
) -> RestResult<impl Responder> {
    let (token_str,) = path.into_inner();
    let claim = Withdrawal::verify(signing_key.get_ref(), &token_str)?;

    let outcome = service.withdraw(claim.offering_id, claim.entry_id).await?;
    if let Some(notification) = &outcome.promotion.notification {
        dispatcher.dispatch(notification).await;
    }

    Ok(HttpResponse::Ok().json(WithdrawalView {
        withdrawn: EntryView::from(&outcome.withdrawn),
        promoted: entry_views(&outcome.promotion.promoted),
        offering: OfferingView::from(&outcome.offering),
    }))
}

/// Offering API endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/offerings")
        .service(withdrawal_details)
        .service(withdraw)
        .service(fetch)
        .service(register)
        .service(join_waitlist)
}
