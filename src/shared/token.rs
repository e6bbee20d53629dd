//! Cryptographically random correlation tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per token. Well above the 128-bit floor for `state`.
pub const TOKEN_BYTES: usize = 32;

/// Generate a URL-safe token from the OS CSPRNG.
///
/// On `wasm32` this draws from `crypto.getRandomValues` via `getrandom`'s
/// `js` backend (enabled by the `wasm` feature).
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
