//! Keyed identifier suffixes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Number of base32 characters kept from the HMAC.
pub const SUFFIX_LEN: usize = 12;

/// First [`SUFFIX_LEN`] chars of the lowercase, unpadded base32 encoding of
/// `HMAC-SHA256(key, data)`.
pub fn hmac_suffix(key: &str, data: &str) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(data.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut encoded = data_encoding::BASE32_NOPAD.encode(&digest).to_ascii_lowercase();
    encoded.truncate(SUFFIX_LEN);
    encoded
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_deterministic() {
        assert_eq!(hmac_suffix("db-name:c1", "web"), hmac_suffix("db-name:c1", "web"));
    }

    #[test]
    fn suffix_depends_on_key_and_data() {
        let base = hmac_suffix("db-name:c1", "web");
        assert_ne!(base, hmac_suffix("db-name:c2", "web"));
        assert_ne!(base, hmac_suffix("db-name:c1", "api"));
    }

    #[test]
    fn suffix_is_lowercase_base32() {
        let s = hmac_suffix("db-user:c1", "node");
        assert_eq!(s.len(), SUFFIX_LEN);
        assert!(s.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')));
    }
}
