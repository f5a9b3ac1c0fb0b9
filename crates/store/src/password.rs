//! Password hashing: PBKDF2-HMAC-SHA-256 with a random per-password salt.
//!
//! Verifiers are stored as `pbkdf2$<iterations>$<salt_hex>$<dk_hex>` so the
//! iteration count can be raised later without invalidating old rows.

use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;

const SCHEME: &str = "pbkdf2";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Iteration count for newly created verifiers.
pub const PBKDF2_ITERATIONS: u32 = 120_000;

/// Derives a fresh verifier string for `password`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt);
    let dk = derive(password.as_bytes(), &salt, PBKDF2_ITERATIONS);
    format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(dk)
    )
}

/// Checks `password` against a stored verifier.
///
/// The salt and iteration count come from the verifier itself; the derived
/// keys are compared in constant time. Any malformed verifier fails closed.
pub fn verify_password(password: &str, stored: &str) -> bool {
    check(password, stored).unwrap_or(false)
}

fn check(password: &str, stored: &str) -> Option<bool> {
    let mut parts = stored.split('$');
    if parts.next()? != SCHEME {
        return Some(false);
    }
    let iterations: u32 = parts.next()?.parse().ok()?;
    let salt = hex::decode(parts.next()?).ok()?;
    let expected = hex::decode(parts.next()?).ok()?;
    if parts.next().is_some() || expected.len() != KEY_LEN {
        return Some(false);
    }

    let dk = derive(password.as_bytes(), &salt, iterations);

    let mut diff = 0u8;
    for (a, b) in dk.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }
    Some(diff == 0)
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut dk = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut dk);
    dk
}
