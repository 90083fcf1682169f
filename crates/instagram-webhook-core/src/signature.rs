//! Delivery signature verification.
//!
//! The platform signs every delivery with HMAC-SHA256 over the raw request
//! body, keyed by the app secret, and sends the result in the
//! `X-Hub-Signature-256` header as `sha256=<lowercase hex>`.
//!
//! Verification must run on the exact bytes received. Re-serializing parsed
//! JSON is not byte-identical and would reject every valid delivery.

use crate::error::SignatureError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies delivery signatures against the app secret.
///
/// An empty secret disables enforcement: [`verify`](Self::verify) then
/// accepts everything. Construction logs a `WARN` in that case so the
/// downgrade is visible at startup.
///
/// # Examples
///
/// ```rust
/// use instagram_webhook_core::{compute_signature, SignatureVerifier};
///
/// let verifier = SignatureVerifier::new("app-secret");
/// let body = br#"{"object":"instagram","entry":[]}"#;
/// let signature = compute_signature(body, "app-secret").unwrap();
///
/// assert!(verifier.verify(body, &signature));
/// assert!(!verifier.verify(body, "sha256=deadbeef"));
/// ```
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Zeroizing<String>,
}

impl SignatureVerifier {
    /// Create a verifier for the given app secret.
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            warn!(
                "INSTAGRAM_APP_SECRET is not configured; delivery signatures will NOT be verified. \
                 Do not run like this in production."
            );
        }
        Self { secret }
    }

    /// Whether signatures are checked at all.
    pub fn is_enforced(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Verify `signature` (the full header value, prefix included) against
    /// the raw `payload`.
    ///
    /// Returns `true` when no secret is configured.
    #[instrument(skip_all, fields(payload_len = payload.len(), sig_len = signature.len()))]
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        if !self.is_enforced() {
            debug!("Signature enforcement disabled; skipping verification");
            return true;
        }

        let expected = match compute_signature(payload, &self.secret) {
            Ok(expected) => expected,
            Err(e) => {
                warn!(error = %e, "Could not compute expected signature");
                return false;
            }
        };

        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }
}

// Never expose the secret through Debug output.
impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<REDACTED>")
            .field("enforced", &self.is_enforced())
            .finish()
    }
}

/// Compute the header value the platform would send for `payload`.
///
/// Output is `sha256=` followed by the lowercase hex HMAC-SHA256 digest.
pub fn compute_signature(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SignatureError::InvalidKey {
            message: e.to_string(),
        })?;
    mac.update(payload);

    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Compare two byte strings without leaking where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    // Length is not secret.
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
