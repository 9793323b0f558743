use actix_web::dev::HttpServiceFactory;
use actix_web::{get, web, HttpResponse, Responder};

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use crate::domain::{Coupon, CouponCode, Discount, Price};
use crate::error::{RestError, RestResult};
use crate::registration::RegistrationService;

/// Coupon as shown to clients; redemptions stay private
#[derive(Debug, Serialize)]
pub struct CouponView {
    id: Uuid,
    code: CouponCode,
    discount: Discount,
    usage_count: u32,
    max_usage: Option<u32>,
    exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    discounted_price: Option<Price>,
}

impl CouponView {
    pub fn new(coupon: &Coupon, price: Option<Price>) -> Self {
        Self {
            id: coupon.id,
            code: coupon.code.clone(),
            discount: coupon.discount,
            usage_count: coupon.usage_count,
            max_usage: coupon.max_usage,
            exhausted: coupon.is_exhausted(),
            discounted_price: price.map(|price| coupon.apply_to(price)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    /// Price in cents to apply the discount to
    total_price: Option<u64>,
}

/// Coupon validation endpoint
#[tracing::instrument(name = "Look up a coupon", skip(service))]
#[get("/{code}")]
async fn fetch(
    service: web::Data<RegistrationService>,
    path: web::Path<(String,)>,
    query: web::Query<PriceQuery>,
) -> RestResult<impl Responder> {
    let (code,) = path.into_inner();
    let code: CouponCode = code.parse().map_err(RestError::ParseError)?;

    let coupon = service
        .find_coupon(&code)
        .await?
        .ok_or_else(|| RestError::NotFound(format!("Coupon {} not found", code)))?;

    let price = query.total_price.map(Price::from_cents);
    Ok(HttpResponse::Ok().json(CouponView::new(&coupon, price)))
}

/// Coupon API endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/coupons").service(fetch)
}
