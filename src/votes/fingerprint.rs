//! # Voter Fingerprinting
//!
//! Derives a stable, non-reversible voter key from the client address. The raw address is
//! never stored; only the keyed HMAC-SHA256 digest (truncated) reaches the vote log.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Length of the hex voter key stored in the vote log.
pub const VOTER_KEY_LEN: usize = 32;

const UNKNOWN_IP: &str = "unknown";

/// HMAC key for voter fingerprints, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VoteSalt(Vec<u8>);

impl VoteSalt {
    pub fn new(salt: impl Into<Vec<u8>>) -> Self {
        Self(salt.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for VoteSalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VoteSalt([REDACTED])")
    }
}

/// Best-effort client address: first `x-forwarded-for` hop, then `x-real-ip`, then `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_IP)
        .to_string()
}

/// Fingerprint derivation failed
#[derive(Debug, thiserror::Error)]
#[error("could not derive voter key")]
pub struct FingerprintError;

/// `hex(HMAC-SHA256(salt, ip))` truncated to [`VOTER_KEY_LEN`] characters.
pub fn voter_key(ip: &str, salt: &VoteSalt) -> Result<String, FingerprintError> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).map_err(|_| FingerprintError)?;
    mac.update(ip.as_bytes());
    let mut key = hex::encode(mac.finalize().into_bytes());
    key.truncate(VOTER_KEY_LEN);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let map = headers(&[
            ("x-forwarded-for", " 203.0.113.7 , 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&map), "203.0.113.7");
    }

    #[test]
    fn test_falls_back_to_real_ip_then_unknown() {
        assert_eq!(
            client_ip(&headers(&[("x-real-ip", "198.51.100.2")])),
            "198.51.100.2"
        );
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", " , 10.0.0.1")])),
            "unknown"
        );
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_voter_key_is_stable_and_salted() {
        let salt = VoteSalt::new("pepper");
        let key = voter_key("203.0.113.7", &salt).unwrap();

        assert_eq!(key.len(), VOTER_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, voter_key("203.0.113.7", &salt).unwrap());
        assert_ne!(key, voter_key("203.0.113.8", &salt).unwrap());
        assert_ne!(
            key,
            voter_key("203.0.113.7", &VoteSalt::new("other")).unwrap()
        );
    }

    #[test]
    fn test_salt_debug_is_redacted() {
        assert_eq!(format!("{:?}", VoteSalt::new("secret")), "VoteSalt([REDACTED])");
    }
}
