// SPDX-License-Identifier: MIT
//! Webhook authenticity checks.
//!
//! GitHub and Bitbucket sign deliveries with HMAC-SHA256 over the *exact*
//! raw request bytes (`sha256=<hex>`); GitLab sends a shared token header.
//! All comparisons are constant-time. Outside production, a delivery with
//! *no* signature is tolerated to ease local testing — an invalid signature
//! is always rejected.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Signature present and correct.
    Valid,
    /// No signature on the delivery (or no secret configured to verify one).
    Missing,
    /// Signature present but wrong. Always rejected.
    Invalid,
}

impl SignatureCheck {
    /// Whether the delivery may proceed given the deployment environment.
    pub fn accepted(self, production: bool) -> bool {
        match self {
            SignatureCheck::Valid => true,
            SignatureCheck::Missing => !production,
            SignatureCheck::Invalid => false,
        }
    }
}

/// Verify an `sha256=<hex>` HMAC header over the raw payload bytes.
pub fn check_hmac_signature(
    secret: Option<&str>,
    payload: &[u8],
    header: Option<&str>,
) -> SignatureCheck {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return SignatureCheck::Missing;
    };
    let Some(header) = header.filter(|h| !h.is_empty()) else {
        return SignatureCheck::Missing;
    };

    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return SignatureCheck::Invalid;
    };
    let Ok(signature) = hex::decode(hex_digest) else {
        return SignatureCheck::Invalid;
    };

    // Key length is unrestricted for HMAC; new_from_slice cannot fail.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return SignatureCheck::Invalid;
    };
    mac.update(payload);
    if mac.verify_slice(&signature).is_ok() {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

/// Verify a shared-token header (GitLab's `X-Gitlab-Token`).
pub fn check_shared_token(secret: Option<&str>, header: Option<&str>) -> SignatureCheck {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return SignatureCheck::Missing;
    };
    let Some(header) = header.filter(|h| !h.is_empty()) else {
        return SignatureCheck::Missing;
    };
    if constant_time_eq(secret.as_bytes(), header.as_bytes()) {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

/// Constant-time byte comparison via HMAC's `CtOutput` equality.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let Ok(mut mac_a) = HmacSha256::new_from_slice(b"reviewd.ct-compare") else {
        return false;
    };
    let Ok(mut mac_b) = HmacSha256::new_from_slice(b"reviewd.ct-compare") else {
        return false;
    };
    mac_a.update(a);
    mac_b.update(b);
    mac_a.finalize() == mac_b.finalize()
}

/// Compute the `sha256=<hex>` header value for a payload (used by tests and
/// by deployments that re-deliver events internally).
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_round_trips() {
        let payload = br#"{"zen":"Keep it logically awesome."}"#;
        let header = sign_payload("s3cret", payload);
        assert_eq!(
            check_hmac_signature(Some("s3cret"), payload, Some(&header)),
            SignatureCheck::Valid
        );
    }

    #[test]
    fn tampered_payload_is_invalid() {
        let header = sign_payload("s3cret", b"original");
        assert_eq!(
            check_hmac_signature(Some("s3cret"), b"tampered", Some(&header)),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let header = sign_payload("other", b"payload");
        assert_eq!(
            check_hmac_signature(Some("s3cret"), b"payload", Some(&header)),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn missing_header_or_secret_is_missing() {
        assert_eq!(
            check_hmac_signature(Some("s3cret"), b"payload", None),
            SignatureCheck::Missing
        );
        assert_eq!(
            check_hmac_signature(None, b"payload", Some("sha256=ab")),
            SignatureCheck::Missing
        );
    }

    #[test]
    fn malformed_header_is_invalid() {
        assert_eq!(
            check_hmac_signature(Some("s3cret"), b"payload", Some("md5=nope")),
            SignatureCheck::Invalid
        );
        assert_eq!(
            check_hmac_signature(Some("s3cret"), b"payload", Some("sha256=zz")),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn shared_token_comparison() {
        assert_eq!(
            check_shared_token(Some("tok"), Some("tok")),
            SignatureCheck::Valid
        );
        assert_eq!(
            check_shared_token(Some("tok"), Some("other")),
            SignatureCheck::Invalid
        );
        assert_eq!(check_shared_token(Some("tok"), None), SignatureCheck::Missing);
    }

    #[test]
    fn acceptance_depends_on_environment() {
        assert!(SignatureCheck::Valid.accepted(true));
        assert!(SignatureCheck::Missing.accepted(false));
        assert!(!SignatureCheck::Missing.accepted(true));
        assert!(!SignatureCheck::Invalid.accepted(false));
    }
}
