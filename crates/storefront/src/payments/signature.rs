//! Webhook signature verification.
//!
//! The processor signs each delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw body}"` and sends it as
//! `Stripe-Signature: t=<unix seconds>,v1=<hex digest>[,v1=...]`.
//! Several `v1` entries may be present while a secret is being rotated; any
//! one matching is enough.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

type HmacSha256 = Hmac<Sha256>;

/// Why a delivery failed verification. None of these are retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingHeader,

    #[error("signature header is malformed")]
    MalformedHeader,

    #[error("signature header has no timestamp")]
    MissingTimestamp,

    #[error("signature header has no v1 signature")]
    MissingSignature,

    #[error("signature timestamp is outside the accepted window")]
    TimestampOutOfTolerance,

    #[error("signature does not match payload")]
    Mismatch,
}

/// Verifies inbound webhook signatures against the shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString, tolerance: Duration) -> Self {
        Self { secret, tolerance }
    }

    /// Verify `payload` against the raw `Stripe-Signature` header value.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError` if the header is absent or malformed, the
    /// timestamp is too far from now, or no signature matches.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(payload, header, unix_now())
    }

    /// [`verify`](Self::verify) against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or(SignatureError::MalformedHeader)?;
            match key {
                "t" => {
                    let ts = value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?;
                    timestamp = Some(ts);
                }
                "v1" => signatures.push(value),
                // Other schemes (v0, test-mode signatures) are not trusted
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if signatures.is_empty() {
            return Err(SignatureError::MissingSignature);
        }

        if now.abs_diff(timestamp) > self.tolerance.as_secs() {
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        for signature in signatures {
            let Ok(expected) = hex::decode(signature) else {
                continue;
            };
            // verify_slice compares in constant time
            if self.mac(timestamp, payload)?.verify_slice(&expected).is_ok() {
                debug!("Webhook signature verified");
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }

    /// Header value signing `payload` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::Mismatch` if the secret cannot key the MAC.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
