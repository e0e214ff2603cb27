//! Proof-of-work stamping for gossip messages.
//!
//! A stamp is a nonce such that the hex SHA-256 digest of the message's
//! canonical string followed by the decimal nonce starts with `n` zero digits.
//! Finding one costs on average `16^n` hashes, checking it costs one.
//!
//! The canonical string covers the kind, sender, payload, TTL and message ID.
//! Relaying nodes change the sender and TTL, so every hop stamps again.

use crate::error::P2pError;
use gossip_proto::GossipMessage;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of leading zero hex digits a stamp must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Difficulty(u8);

impl Difficulty {
    /// Largest accepted difficulty. Each extra digit multiplies the expected
    /// stamping work by 16; at 8 a stamp already takes around 2^32 hashes.
    pub const MAX: u8 = 8;

    /// Creates a difficulty of `zeros` leading hex digits.
    ///
    /// # Errors
    ///
    /// Returns [`P2pError::Config`] if `zeros` exceeds [`Difficulty::MAX`].
    pub fn new(zeros: u8) -> Result<Self, P2pError> {
        if zeros > Self::MAX {
            return Err(P2pError::Config(format!(
                "difficulty {zeros} exceeds the maximum of {}",
                Self::MAX
            )));
        }
        Ok(Self(zeros))
    }

    /// Returns the number of leading zero digits.
    #[must_use]
    pub const fn zeros(self) -> u8 {
        self.0
    }

    /// Returns the required digest prefix, e.g. `"0000"`.
    #[must_use]
    pub fn prefix(self) -> String {
        "0".repeat(usize::from(self.0))
    }

    fn is_met_by(self, digest: &[u8]) -> bool {
        hex::encode(digest)
            .bytes()
            .take(usize::from(self.0))
            .all(|digit| digit == b'0')
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds the string hashed for a message's stamp.
#[must_use]
pub fn canonical(msg: &GossipMessage) -> String {
    format!(
        "{}{}{}{}{}",
        msg.kind,
        msg.from,
        String::from_utf8_lossy(&msg.payload),
        msg.ttl,
        msg.message_id
    )
}

/// Searches for a nonce satisfying `difficulty` and stores it on `msg`.
///
/// CPU-bound: async callers should use [`stamp_blocking`].
///
/// # Errors
///
/// Returns [`P2pError::Pow`] if the whole nonce space is exhausted.
pub fn stamp(msg: &mut GossipMessage, difficulty: Difficulty) -> Result<(), P2pError> {
    let mut base = Sha256::new();
    base.update(canonical(msg).as_bytes());

    let mut nonce: u64 = 0;
    loop {
        let mut hasher = base.clone();
        hasher.update(nonce.to_string().as_bytes());
        if difficulty.is_met_by(&hasher.finalize()) {
            msg.nonce = nonce;
            return Ok(());
        }
        nonce = nonce
            .checked_add(1)
            .ok_or_else(|| P2pError::Pow(format!("no nonce found at difficulty {difficulty}")))?;
    }
}

/// Stamps `msg` on the blocking thread pool and hands it back.
///
/// # Errors
///
/// Returns an error if stamping fails or the blocking task panics.
pub async fn stamp_blocking(
    mut msg: GossipMessage,
    difficulty: Difficulty,
) -> Result<GossipMessage, P2pError> {
    tokio::task::spawn_blocking(move || {
        stamp(&mut msg, difficulty)?;
        Ok(msg)
    })
    .await
    .map_err(|e| P2pError::Task(format!("stamping task: {e}")))?
}

/// Checks the nonce stored on `msg` against `difficulty`.
#[must_use]
pub fn validate(msg: &GossipMessage, difficulty: Difficulty) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(canonical(msg).as_bytes());
    hasher.update(msg.nonce.to_string().as_bytes());
    difficulty.is_met_by(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFFICULTY: Difficulty = Difficulty(3);

    fn sample() -> GossipMessage {
        GossipMessage::data("127.0.0.1:7001", 7, b"hi".to_vec(), 3)
    }

    #[test]
    fn canonical_concatenates_fields() {
        let mut msg = GossipMessage::data("a:1", 7, b"hi".to_vec(), 3);
        msg.message_id = 42;
        assert_eq!(canonical(&msg), "7a:1hi342");
    }

    #[test]
    fn canonical_ignores_nonce() {
        let mut msg = sample();
        let before = canonical(&msg);
        msg.nonce = 99;
        assert_eq!(canonical(&msg), before);
    }

    #[test]
    fn stamped_message_validates() {
        let mut msg = sample();
        stamp(&mut msg, DIFFICULTY).unwrap();
        assert!(validate(&msg, DIFFICULTY));
    }

    #[test]
    fn stamp_produces_required_prefix() {
        let mut msg = sample();
        stamp(&mut msg, DIFFICULTY).unwrap();

        let digest = Sha256::digest(format!("{}{}", canonical(&msg), msg.nonce).as_bytes());
        assert!(hex::encode(digest).starts_with(&DIFFICULTY.prefix()));
    }

    #[test]
    fn zero_difficulty_accepts_first_nonce() {
        let mut msg = sample();
        stamp(&mut msg, Difficulty::default()).unwrap();
        assert_eq!(msg.nonce, 0);
        assert!(validate(&msg, Difficulty::default()));
    }

    #[test]
    fn tampered_fields_fail_validation() {
        let mut msg = sample();
        stamp(&mut msg, DIFFICULTY).unwrap();

        let mut payload = msg.clone();
        payload.payload = b"ho".to_vec();
        let mut ttl = msg.clone();
        ttl.ttl -= 1;
        let mut from = msg.clone();
        from.from = "127.0.0.1:7002".to_string();
        let mut id = msg.clone();
        id.message_id ^= 1;
        let mut kind = msg.clone();
        kind.kind = 8;

        // A tampered message can still hit the prefix by chance, 16^-3 each.
        let failures = [payload, ttl, from, id, kind]
            .iter()
            .filter(|m| !validate(m, DIFFICULTY))
            .count();
        assert!(failures >= 4);
    }

    #[test]
    fn unstamped_message_rarely_validates() {
        let rejected = (0..200)
            .map(|_| sample())
            .filter(|m| !validate(m, Difficulty(6)))
            .count();
        assert!(rejected >= 199);
    }

    #[test]
    fn difficulty_bounds() {
        assert!(Difficulty::new(Difficulty::MAX).is_ok());
        assert!(matches!(Difficulty::new(9), Err(P2pError::Config(_))));
        assert!(matches!(Difficulty::new(64), Err(P2pError::Config(_))));
        assert_eq!(Difficulty::new(4).unwrap().prefix(), "0000");
    }

    #[tokio::test]
    async fn stamp_blocking_returns_stamped_message() {
        let msg = stamp_blocking(sample(), DIFFICULTY).await.unwrap();
        assert!(validate(&msg, DIFFICULTY));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn stamp_then_validate(
                datatype in 0u16..500,
                payload in prop::collection::vec(any::<u8>(), 0..64),
                ttl in 0i32..16,
                zeros in 0u8..3
            ) {
                let difficulty = Difficulty::new(zeros).unwrap();
                let mut msg = GossipMessage::data("10.0.0.1:4000", datatype, payload, ttl);
                stamp(&mut msg, difficulty).unwrap();
                prop_assert!(validate(&msg, difficulty));
            }
        }
    }
}
