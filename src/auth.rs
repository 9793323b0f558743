mod admin_guard;
mod credentials;

pub use admin_guard::*;
pub use credentials::*;
