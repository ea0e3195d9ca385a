//! Shared-secret authorization
//!
//! The configured secret is hashed once; each credential is hashed and the
//! two digests compared in constant time. No sessions, no rate limiting.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

lazy_static! {
    static ref BEARER_RE: Regex = Regex::new(r"(?i)^\s*bearer\s+(\S+)\s*$").unwrap();
}

#[derive(Clone)]
pub struct AuthGuard {
    secret_digest: [u8; 32],
}

impl AuthGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            secret_digest: digest(secret),
        }
    }

    /// Check a single credential. Empty never matches.
    pub fn authorize(&self, credential: &str) -> bool {
        if credential.is_empty() {
            return false;
        }
        digest(credential)[..].ct_eq(&self.secret_digest[..]).into()
    }

    /// Check the credential from whichever request location carries it
    pub fn authorize_request(&self, query_key: Option<&str>, authorization: Option<&str>) -> bool {
        extract_credential(query_key, authorization)
            .map(|credential| self.authorize(credential))
            .unwrap_or(false)
    }
}

impl fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGuard")
            .field("secret_digest", &"<redacted>")
            .finish()
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    BEARER_RE
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// A non-empty query key wins; otherwise the bearer header is used
pub fn extract_credential<'a>(
    query_key: Option<&'a str>,
    authorization: Option<&'a str>,
) -> Option<&'a str> {
    query_key
        .filter(|key| !key.is_empty())
        .or_else(|| authorization.and_then(bearer_token))
}
