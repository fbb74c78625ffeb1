//! Random credential material drawn from the OS CSPRNG.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Length of generated database passwords.
pub const PASSWORD_LEN: usize = 32;
/// Length of generated client secrets.
pub const CLIENT_SECRET_LEN: usize = 32;
/// Prefix every join token carries.
pub const JOIN_TOKEN_PREFIX: &str = "pjt_";

const CLIENT_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const CLIENT_ID_RANDOM_LEN: usize = 16;

fn alphanumeric(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A fresh database password. Never derived from any input.
pub fn generate_password() -> String {
    alphanumeric(PASSWORD_LEN)
}

/// A fresh client secret handed to a node once and stored only as a hash.
pub fn generate_client_secret() -> String {
    alphanumeric(CLIENT_SECRET_LEN)
}

/// A client ID of the form `cid_<16 lowercase alphanumerics>`.
pub fn generate_client_id() -> String {
    let mut rng = OsRng;
    let suffix: String = (0..CLIENT_ID_RANDOM_LEN)
        .map(|_| char::from(CLIENT_ID_CHARSET[rng.gen_range(0..CLIENT_ID_CHARSET.len())]))
        .collect();
    format!("cid_{suffix}")
}

/// A join token: 32 random bytes, base64url without padding, prefixed `pjt_`.
pub fn generate_join_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("{JOIN_TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}
