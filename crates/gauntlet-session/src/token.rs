//! Registration tokens and the random secrets behind session ids.

use tokio::time::Instant;

use rand::Rng;

/// A short-lived capability issued after the last challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationToken {
    /// The secret the client must echo back.
    pub value: String,
    /// When the token stops being accepted.
    pub expires_at: Instant,
}

impl RegistrationToken {
    /// Whether the token is no longer valid at `now`.
    ///
    /// The expiry instant itself already counts as expired.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Used for both session ids and registration tokens; guessing either is
/// the same as guessing 16 random bytes.
pub(crate) fn generate_secret() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_generate_secret_is_32_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_secret_is_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_expired_at_boundary_counts_as_expired() {
        let now = Instant::now();
        let token = RegistrationToken {
            value: "t".into(),
            expires_at: now + Duration::from_secs(10),
        };
        assert!(!token.is_expired_at(now));
        assert!(!token.is_expired_at(now + Duration::from_secs(9)));
        assert!(token.is_expired_at(now + Duration::from_secs(10)));
    }
}
