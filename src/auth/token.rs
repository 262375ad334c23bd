//! Token secrets and the access/refresh token records built from them.

pub mod record;
pub mod secret;
