mod claims;
pub(crate) mod extractors;
mod verifier;

pub use claims::Identity;
pub use extractors::AuthUser;
pub use verifier::{IdentityVerifier, JwtVerifier};
