//! Error types surfaced by credential issuance and storage.

use thiserror::Error;

/// Errors raised while minting or persisting credentials.
///
/// None of the variants ever embed a secret value; messages carry the
/// issuer description or the affected host/path instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The issuer failed to mint a new secret.
    #[error("credential issuer '{issuer}' failed: {message}")]
    Issuing {
        /// Human-readable issuer description.
        issuer: String,
        /// Failure detail reported by the issuer.
        message: String,
    },

    /// A previously issued secret could no longer be retrieved.
    #[error("credential for '{issuer}' could not be retrieved: {message}")]
    Retrieval {
        /// Human-readable issuer description.
        issuer: String,
        /// Failure detail.
        message: String,
    },

    /// Writing the credential-store file failed.
    #[error("error writing access token for {host}/{path}: {message}")]
    Storage {
        /// Host the credential belongs to.
        host: String,
        /// Repository path component of the credential line.
        path: String,
        /// I/O error detail.
        message: String,
    },
}
