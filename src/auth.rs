//! Auth-domain models: scope sets, token secrets, the identity credential seam, and JWT expiry
//! decoding.

pub mod credential;
pub mod jwt;
pub mod scope;
pub mod token;

pub use credential::*;
pub use scope::*;
pub use token::{record::*, secret::*};
