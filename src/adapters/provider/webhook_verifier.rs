//! Webhook signature verification.
//!
//! The webhook ingress verifies the provider's HMAC-SHA256 signature
//! before handing the parsed tuple to the engine's phase one. This
//! utility implements that check with constant-time comparison and a
//! replay window on the signed timestamp.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Signature verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookVerifyError {
    #[error("invalid signature header: {0}")]
    InvalidHeader(String),

    #[error("signature does not match payload")]
    SignatureMismatch,

    #[error("event timestamp is {age_secs}s old; possible replay")]
    EventTooOld { age_secs: i64 },

    #[error("event timestamp is in the future")]
    EventFromFuture,
}

/// Parsed components from the signature header.
///
/// Format: `t=<unix-seconds>,v1=<hex hmac>`; unknown fields are ignored
/// for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// HMAC-SHA256 signature bytes.
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses a signature header string.
    pub fn parse(header: &str) -> Result<Self, WebhookVerifyError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                WebhookVerifyError::InvalidHeader("expected key=value pairs".to_string())
            })?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookVerifyError::InvalidHeader("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        WebhookVerifyError::InvalidHeader("invalid signature hex".to_string())
                    })?);
                }
                _ => {
                    // Unknown fields are ignored.
                }
            }
        }

        Ok(SignatureHeader {
            timestamp: timestamp.ok_or_else(|| {
                WebhookVerifyError::InvalidHeader("missing timestamp".to_string())
            })?,
            v1_signature: v1_signature.ok_or_else(|| {
                WebhookVerifyError::InvalidHeader("missing v1 signature".to_string())
            })?,
        })
    }
}

/// Verifier for provider webhook signatures.
pub struct WebhookSignatureVerifier {
    /// Webhook signing secret from the provider dashboard.
    secret: String,
}

impl WebhookSignatureVerifier {
    /// Creates a new verifier with the given signing secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies the signature over a raw payload.
    ///
    /// # Verification Steps
    ///
    /// 1. Parse the signature header
    /// 2. Validate the timestamp against the replay window
    /// 3. Compute the expected HMAC-SHA256 over `<timestamp>.<payload>`
    /// 4. Compare signatures in constant time
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<(), WebhookVerifyError> {
        let header = SignatureHeader::parse(signature_header)?;
        self.validate_timestamp(header.timestamp)?;

        let expected = self.compute_signature(header.timestamp, payload);
        if expected.ct_eq(header.v1_signature.as_slice()).into() {
            Ok(())
        } else {
            Err(WebhookVerifyError::SignatureMismatch)
        }
    }

    fn validate_timestamp(&self, timestamp: i64) -> Result<(), WebhookVerifyError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > MAX_EVENT_AGE_SECS {
            return Err(WebhookVerifyError::EventTooOld { age_secs: age });
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookVerifyError::EventFromFuture);
        }
        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
