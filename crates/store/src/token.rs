//! Bearer token generation.

use rand::Rng;

/// Token length in bytes (produces 64 hex characters).
const TOKEN_BYTES: usize = 32;

/// Generates a CSPRNG bearer token as a 64-character lowercase hex string.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
