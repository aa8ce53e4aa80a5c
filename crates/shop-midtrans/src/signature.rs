//! # Notification Signatures
//!
//! Midtrans signs each HTTP notification with
//! `SHA512(order_id + status_code + gross_amount + server_key)`, hex encoded.

use sha2::{Digest, Sha512};

/// Compute the expected `signature_key` for a notification
pub fn notification_signature(
    order_id: &str,
    status: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
