//! Time-bound credentials and the Git credential-store bridge.
//!
//! Issuers mint [`TtlSecret`] values with an explicit expiration instant;
//! [`CredentialFileHandler`] renders them into the single-line format
//! consumed by Git's `store` credential helper and keeps the line fresh
//! across secret rotations. Secret values never appear in `Debug` output,
//! log lines, or error messages.

pub mod clock;
pub mod error;
pub mod file_handler;
pub mod issuer;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, SystemClock};
pub use error::CredentialError;
pub use file_handler::CredentialFileHandler;
pub use issuer::{ConstantIssuer, CredentialIssuer, TtlSecret};

#[cfg(test)]
mod file_handler_tests;
