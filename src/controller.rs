/// Administrative endpoints behind basic auth
pub mod admin;
/// Coupon lookup
pub mod coupons;
/// Offering snapshots, registrations and withdrawals
pub mod offerings;
