//! Secret issuance: the [`TtlSecret`] value and the [`CredentialIssuer`]
//! contract.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::clock::Clock;
use super::error::CredentialError;

/// A credential value with an optional expiration instant.
///
/// The value is opaque: `Debug` prints the description and expiry but never
/// the secret itself. A secret is immutable; once expired, a fresh instance
/// must be obtained from the issuer.
#[derive(Clone)]
pub struct TtlSecret {
    value: String,
    description: String,
    expiration: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl TtlSecret {
    /// Creates a secret that expires at `expiration`.
    #[must_use]
    pub fn new(
        value: impl Into<String>,
        description: impl Into<String>,
        expiration: Option<DateTime<Utc>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            value: value.into(),
            description: description.into(),
            expiration,
            clock,
        }
    }

    /// The secret value. Callers must not log this.
    #[must_use]
    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    /// Human-readable description of where the secret came from.
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Whether the secret has reached its expiration instant.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiration
            .is_some_and(|expiration| self.clock.now() >= expiration)
    }

    /// The expiration instant, if the secret ever expires.
    #[must_use]
    pub const fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }
}

impl fmt::Debug for TtlSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlSecret")
            .field("value", &"<redacted>")
            .field("description", &self.description)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Mints [`TtlSecret`] values.
///
/// Repeated calls may return a cached secret while it is still valid; the
/// caching policy belongs to the issuer (or a consumer-side cache such as
/// [`super::CredentialFileHandler`]), never to global state.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialIssuer: Send + Sync + fmt::Debug {
    /// Issues a secret, possibly returning a cached unexpired one.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Issuing`] when the backing source cannot
    /// produce a value.
    fn issue(&self) -> Result<TtlSecret, CredentialError>;

    /// Describes the issuer for logs and error messages.
    fn describe(&self) -> String;
}

/// Issuer for values known up front: either open values that are safe to
/// log (e.g. `x-access-token`) or static secrets.
#[derive(Clone)]
pub struct ConstantIssuer {
    name: String,
    value: String,
    clock: Arc<dyn Clock>,
}

impl ConstantIssuer {
    /// Creates an issuer for a value that is safe to read and log.
    #[must_use]
    pub fn open_value(value: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let value = value.into();
        Self {
            name: value.clone(),
            value,
            clock,
        }
    }

    /// Creates an issuer for a named plaintext secret.
    #[must_use]
    pub fn secret(name: impl Into<String>, value: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            clock,
        }
    }
}

impl fmt::Debug for ConstantIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantIssuer")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

impl CredentialIssuer for ConstantIssuer {
    fn issue(&self) -> Result<TtlSecret, CredentialError> {
        Ok(TtlSecret::new(
            self.value.clone(),
            self.name.clone(),
            None,
            Arc::clone(&self.clock),
        ))
    }

    fn describe(&self) -> String {
        format!("constant credential '{name}'", name = self.name)
    }
}
