//! Deterministic clocks and issuers for credential tests.

// Test helpers may panic on poisoned locks; that already means a test failed.
#![expect(clippy::expect_used, reason = "test-support helpers panic on poisoned locks")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use super::clock::Clock;
use super::error::CredentialError;
use super::issuer::{CredentialIssuer, TtlSecret};

/// A clock whose current instant can be advanced manually.
#[derive(Debug)]
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `delta`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned, which only happens after
    /// another test thread panicked while advancing the clock.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("clock mutex should be available");
        *now += delta;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex should be available")
    }
}

/// An issuer that mints `"<prefix>-<n>"` secrets with a fixed TTL and
/// counts how many times [`CredentialIssuer::issue`] ran.
#[derive(Debug)]
pub struct RotatingIssuer {
    prefix: String,
    ttl: Duration,
    clock: Arc<FakeClock>,
    issued: AtomicUsize,
}

impl RotatingIssuer {
    /// Creates an issuer minting secrets valid for `ttl` from issue time.
    #[must_use]
    pub fn new(prefix: impl Into<String>, ttl: Duration, clock: Arc<FakeClock>) -> Self {
        Self {
            prefix: prefix.into(),
            ttl,
            clock,
            issued: AtomicUsize::new(0),
        }
    }

    /// Number of secrets minted so far.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl CredentialIssuer for RotatingIssuer {
    fn issue(&self) -> Result<TtlSecret, CredentialError> {
        let count = self.issued.fetch_add(1, Ordering::SeqCst);
        let clock: Arc<dyn Clock> = Arc::clone(&self.clock) as Arc<dyn Clock>;
        Ok(TtlSecret::new(
            format!("{prefix}-{count}", prefix = self.prefix),
            format!("rotating credential '{prefix}'", prefix = self.prefix),
            Some(self.clock.now() + self.ttl),
            clock,
        ))
    }

    fn describe(&self) -> String {
        format!("rotating credential '{prefix}'", prefix = self.prefix)
    }
}

/// An issuer that always fails, for error-path tests.
#[derive(Debug, Default)]
pub struct FailingIssuer;

impl CredentialIssuer for FailingIssuer {
    fn issue(&self) -> Result<TtlSecret, CredentialError> {
        Err(CredentialError::Issuing {
            issuer: "failing credential".to_owned(),
            message: "issuer is configured to fail".to_owned(),
        })
    }

    fn describe(&self) -> String {
        "failing credential".to_owned()
    }
}
