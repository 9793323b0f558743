mod signing_key;
mod token;
mod withdrawal;

pub use signing_key::*;
pub use token::*;
pub use withdrawal::*;
