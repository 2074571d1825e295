//! TOTP Engine
//!
//! RFC 6238 codes: SHA-1, 6 digits, 30 second steps, with a symmetric skew
//! window around the current step.

use std::sync::Arc;

use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::clock::Clock;

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;

/// TOTP construction errors.
#[derive(Debug, Error)]
pub enum TotpError {
    #[error("Invalid TOTP secret")]
    InvalidSecret,

    #[error("Failed to build TOTP: {0}")]
    Build(String),
}

/// Fresh enrollment material. Not persisted until confirmed.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// Base32-encoded secret.
    pub secret: String,
    /// `otpauth://` URI for authenticator apps.
    pub enrollment_uri: String,
}

/// Generates secrets and checks codes against the injected clock.
pub struct TotpEngine {
    issuer: String,
    skew: u8,
    clock: Arc<dyn Clock>,
}

impl TotpEngine {
    pub fn new(issuer: impl Into<String>, skew: u8, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: issuer.into(),
            skew,
            clock,
        }
    }

    fn build(&self, secret: &str, label: &str) -> Result<TOTP, TotpError> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|_| TotpError::InvalidSecret)?;

        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            self.skew,
            STEP_SECS,
            bytes,
            Some(self.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| TotpError::Build(e.to_string()))
    }

    /// Generate a random secret and its enrollment URI for `label`.
    pub fn enroll(&self, label: &str) -> Result<Enrollment, TotpError> {
        let secret = Secret::generate_secret().to_encoded().to_string();
        // Colons are label separators in otpauth URIs.
        let label = label.replace(':', "_");
        let totp = self.build(&secret, &label)?;

        Ok(Enrollment {
            enrollment_uri: totp.get_url(),
            secret,
        })
    }

    /// Check `code` at the clock's current time. Never errors.
    pub fn check(&self, secret: &str, code: &str) -> bool {
        let now = u64::try_from(self.clock.now().timestamp()).unwrap_or_default();
        self.check_at(secret, code, now)
    }

    /// Check `code` at a given Unix time.
    pub fn check_at(&self, secret: &str, code: &str, unix_secs: u64) -> bool {
        let code = code.trim();
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        self.build(secret, "check")
            .map(|totp| totp.check(code, unix_secs))
            .unwrap_or(false)
    }

    /// Code for a given Unix time.
    pub fn generate_at(&self, secret: &str, unix_secs: u64) -> Result<String, TotpError> {
        Ok(self.build(secret, "generate")?.generate(unix_secs))
    }
}
