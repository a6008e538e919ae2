//! Utility functions for authentication.

use base64::Engine;
use rand::RngCore;

/// Generate an unguessable URL-safe token from 32 random bytes.
///
/// Used for session bearer tokens and OAuth `state` values.
///
/// # Examples
///
/// ```
/// use talkboard_auth::utils::generate_token;
///
/// let a = generate_token();
/// let b = generate_token();
/// assert_eq!(a.len(), 43);
/// assert_ne!(a, b);
/// ```
#[must_use]
pub fn generate_token() -> String {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_url_safe() {
        let token = generate_token();
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
