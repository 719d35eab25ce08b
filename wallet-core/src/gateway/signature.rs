//! Webhook signatures: lowercase hex HMAC-SHA512 of the raw body

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Compute the signature header value for `body`
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha512::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a signature header against `body`
pub fn verify(secret: &[u8], signature: &str, body: &[u8]) -> bool {
    let expected = match hex::decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha512::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
