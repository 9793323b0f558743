mod coupon;
mod email_address;
mod person_name;
mod price;
mod registration;
mod role;

pub use coupon::*;
pub use email_address::*;
pub use person_name::*;
pub use price::*;
pub use registration::*;
pub use role::*;
