//! Per-vendor webhook authenticity checks over the raw request body.
//!
//! Two real schemes plus the internal-replay check:
//!
//! - marketplace: `X-Hub-Signature: sha1=<hex HMAC-SHA1(secret, body)>`
//! - commerce platform: `X-FS-Signature: <base64 HMAC-SHA256(secret, body)>`
//! - internal replay (manual purchases, renewal scanner): the body must be
//!   byte-for-byte equal to the payload attached by the internal caller.
//!
//! All comparisons are constant time. Any failure is terminal for the
//! request: 403, no ledger write, no partial processing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::BillingError;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Verifies the marketplace scheme: `sha1=` followed by the lowercase hex
/// HMAC-SHA1 of the raw body. Missing header or mismatch both reject.
pub fn verify_marketplace_signature(
    secret: &[u8],
    header: Option<&str>,
    body: &[u8],
) -> Result<(), BillingError> {
    let header = header.ok_or(BillingError::Forbidden)?;
    let provided = header.strip_prefix("sha1=").ok_or(BillingError::Forbidden)?;

    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = hex_encode(&mac.finalize().into_bytes());

    if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        Ok(())
    } else {
        Err(BillingError::Forbidden)
    }
}

/// Verifies the commerce-platform scheme: base64 HMAC-SHA256 of the raw body.
pub fn verify_commerce_signature(
    secret: &[u8],
    header: Option<&str>,
    body: &[u8],
) -> Result<(), BillingError> {
    let provided = header.ok_or(BillingError::Forbidden)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = BASE64.encode(mac.finalize().into_bytes());

    if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        Ok(())
    } else {
        Err(BillingError::Forbidden)
    }
}

/// Verifies an internally replayed request.
///
/// The upstream step attaches the payload it is about to replay; the request
/// body must equal it exactly. An external caller cannot attach anything, so
/// forged calls to the internal routes always fail here. This defends the
/// route, not against a real adversary with internal access.
pub fn verify_internal_replay(
    attached: Option<&[u8]>,
    body: &[u8],
) -> Result<(), BillingError> {
    let attached = attached.ok_or(BillingError::Forbidden)?;
    if constant_time_eq(attached, body) {
        Ok(())
    } else {
        Err(BillingError::Forbidden)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
