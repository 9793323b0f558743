use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use super::Price;

/// Normalized, user-facing coupon code (e.g. `SUMMER24`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct CouponCode(String);

impl FromStr for CouponCode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        lazy_static::lazy_static! {
            static ref CODE_REGEX: Regex = Regex::new(r"^[A-Z0-9_-]{3,32}$").unwrap();
        }

        let value = value.trim().to_uppercase();
        if !CODE_REGEX.is_match(&value) {
            return Err(format!("{} is not a valid coupon code", value));
        }
        Ok(Self(value))
    }
}

impl TryFrom<String> for CouponCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl AsRef<str> for CouponCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Discount granted by a coupon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Discount {
    /// Percentage off the total, `0..=100`
    Percentage(u8),
    /// Fixed amount off the total
    Fixed(Price),
}

impl Discount {
    /// Build a discount from its stored/transmitted parts
    pub fn new(discount_type: &str, value: u64) -> Result<Self, String> {
        match discount_type.trim().to_lowercase().as_str() {
            "percentage" => match u8::try_from(value) {
                Ok(percent) if percent <= 100 => Ok(Self::Percentage(percent)),
                _ => Err(format!("{} is not a valid percentage", value)),
            },
            "fixed" => Ok(Self::Fixed(Price::from_cents(value))),
            other => Err(format!("{} is not a valid discount type", other)),
        }
    }

    pub fn discount_type(&self) -> &str {
        match self {
            Self::Percentage(_) => "percentage",
            Self::Fixed(_) => "fixed",
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            Self::Percentage(percent) => u64::from(*percent),
            Self::Fixed(amount) => amount.cents(),
        }
    }
}

/// Reasons a coupon cannot be redeemed for a registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponError {
    #[error("Coupon {0} has reached its usage limit")]
    Exhausted(CouponCode),
    #[error("Coupon {0} was already redeemed by {1}")]
    AlreadyRedeemed(CouponCode, Uuid),
}

/// A discount code with an optional usage limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub discount: Discount,
    pub usage_count: u32,
    pub max_usage: Option<u32>,
    /// Clubs or accounts that have redeemed this coupon
    pub used_by: BTreeSet<Uuid>,
    /// Registration requests that booked a redemption
    pub redeemed_by_requests: BTreeSet<Uuid>,
}

impl Coupon {
    pub fn new(code: CouponCode, discount: Discount, max_usage: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            discount,
            usage_count: 0,
            max_usage,
            used_by: BTreeSet::new(),
            redeemed_by_requests: BTreeSet::new(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_usage
            .map(|max_usage| self.usage_count >= max_usage)
            .unwrap_or(false)
    }

    /// Check whether `consumer` may redeem this coupon, without changing it
    pub fn check_redeemable(&self, consumer: Uuid) -> Result<(), CouponError> {
        if self.is_exhausted() {
            return Err(CouponError::Exhausted(self.code.clone()));
        }
        if self.used_by.contains(&consumer) {
            return Err(CouponError::AlreadyRedeemed(self.code.clone(), consumer));
        }
        Ok(())
    }

    /// Record one redemption by `consumer`, booked by registration request `request_id`
    pub fn redeem(mut self, consumer: Uuid, request_id: Uuid) -> Result<Self, CouponError> {
        self.check_redeemable(consumer)?;
        self.usage_count += 1;
        self.used_by.insert(consumer);
        self.redeemed_by_requests.insert(request_id);
        Ok(self)
    }

    /// Whether registration request `request_id` booked a redemption of this coupon
    pub fn was_redeemed_by(&self, request_id: Uuid) -> bool {
        self.redeemed_by_requests.contains(&request_id)
    }

    /// Price after applying this coupon's discount
    pub fn apply_to(&self, price: Price) -> Price {
        match self.discount {
            Discount::Percentage(percent) => {
                let remaining = u128::from(100u8.saturating_sub(percent));
                // At most the original u64 amount, so narrowing cannot truncate
                let cents = u128::from(price.cents()) * remaining / 100;
                Price::from_cents(cents as u64)
            }
            Discount::Fixed(amount) => price.saturating_sub(amount),
        }
    }
}
