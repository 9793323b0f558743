use actix_web::dev::HttpServiceFactory;
use actix_web::{post, web, HttpResponse, Responder};

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use crate::auth::Administrator;
use crate::controller::coupons::CouponView;
use crate::controller::offerings::{entry_views, EntryView, OfferingView};
use crate::domain::{Coupon, Discount};
use crate::error::{RestError, RestResult};
use crate::ledger::Offering;
use crate::notification::NotificationDispatcher;
use crate::registration::RegistrationService;

#[derive(Debug, Deserialize)]
pub struct NewOfferingForm {
    name: String,
    kind: String,
    capacity: Option<u32>,
    registration_deadline: Option<DateTime<Utc>>,
}

impl TryFrom<NewOfferingForm> for Offering {
    type Error = String;

    fn try_from(form: NewOfferingForm) -> Result<Self, Self::Error> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err("Offering name cannot be empty".into());
        }
        let kind = form.kind.parse()?;

        Ok(Offering::new(name.into(), kind, form.capacity, form.registration_deadline))
    }
}

#[derive(Debug, Deserialize)]
pub struct NewCouponForm {
    code: String,
    discount_type: String,
    discount_value: u64,
    max_usage: Option<u32>,
}

impl TryFrom<NewCouponForm> for Coupon {
    type Error = String;

    fn try_from(form: NewCouponForm) -> Result<Self, Self::Error> {
        let code = form.code.parse()?;
        let discount = Discount::new(&form.discount_type, form.discount_value)?;

        Ok(Coupon::new(code, discount, form.max_usage))
    }
}

#[derive(Debug, Deserialize)]
pub struct PromotionForm {
    freed_spots: u32,
}

#[derive(Debug, Serialize)]
struct PromotionView {
    promoted: Vec<EntryView>,
    offering: OfferingView,
}

/// Create a camp or bootcamp
#[tracing::instrument(name = "Create an offering", skip(service))]
#[post("/offerings")]
async fn create_offering(
    admin: Administrator,
    service: web::Data<RegistrationService>,
    form: web::Json<NewOfferingForm>,
) -> RestResult<impl Responder> {
    let offering: Offering = form.into_inner().try_into().map_err(RestError::ParseError)?;

    let offering = service.create_offering(offering).await?;

    Ok(HttpResponse::Created().json(OfferingView::from(&offering)))
}

/// Create a coupon
#[tracing::instrument(name = "Create a coupon", skip(service))]
#[post("/coupons")]
async fn create_coupon(
    admin: Administrator,
    service: web::Data<RegistrationService>,
    form: web::Json<NewCouponForm>,
) -> RestResult<impl Responder> {
    let coupon: Coupon = form.into_inner().try_into().map_err(RestError::ParseError)?;

    let coupon = service.create_coupon(coupon).await?;

    Ok(HttpResponse::Created().json(CouponView::new(&coupon, None)))
}

/// Move waitlisted entries into freed spots, first come first served
#[tracing::instrument(name = "Promote from a waitlist", skip(service, dispatcher))]
#[post("/offerings/{offering_id}/promotions")]
async fn promote(
    admin: Administrator,
    service: web::Data<RegistrationService>,
    dispatcher: web::Data<NotificationDispatcher>,
    path: web::Path<(Uuid,)>,
    form: web::Json<PromotionForm>,
) -> RestResult<impl Responder> {
    let (offering_id,) = path.into_inner();

    let outcome = service
        .promote_from_waitlist(offering_id, form.freed_spots)
        .await?;
    if let Some(notification) = &outcome.notification {
        dispatcher.dispatch(notification).await;
    }

    Ok(HttpResponse::Ok().json(PromotionView {
        promoted: entry_views(&outcome.promoted),
        offering: OfferingView::from(&outcome.offering),
    }))
}

/// Administrative API endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/admin")
        .service(create_offering)
        .service(create_coupon)
        .service(promote)
}
