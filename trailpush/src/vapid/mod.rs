//! VAPID sender authentication: key material, signature encoding, token
//! signing and the `Authorization` header.

pub mod audience;
pub mod header;
pub mod keys;
pub mod signature;
pub mod token;

pub use audience::{Audience, AudienceTable, Provider};
pub use header::VapidHeader;
pub use keys::KeyPair;
pub use token::{Token, VapidClaims, VapidSigner};
