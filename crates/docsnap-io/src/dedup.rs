//! Photo dedup.
//!
//! The hardware service re-sends the last `photoImg` with unrelated
//! responses. A capture is only processed when its payload differs from
//! the previous one, compared by a 128-bit SipHash of the raw text so the
//! multi-megabyte string need not be retained.

use std::hash::Hasher;

use siphasher::sip128::{Hasher128, SipHasher13};

/// 128-bit fingerprint of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u128);

impl Fingerprint {
    /// Fingerprint a payload.
    #[must_use]
    pub fn of(payload: &str) -> Self {
        let mut hasher = SipHasher13::new();
        hasher.write(payload.as_bytes());
        Self(hasher.finish128().as_u128())
    }

    /// The raw 128-bit value.
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

/// Remembers the last payload seen.
#[derive(Debug, Default)]
pub struct PhotoDedup {
    last: Option<Fingerprint>,
}

impl PhotoDedup {
    /// Nothing seen yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// `true` if `payload` differs from the last one seen. Records it.
    pub fn is_new(&mut self, payload: &str) -> bool {
        let fingerprint = Fingerprint::of(payload);
        if self.last == Some(fingerprint) {
            return false;
        }
        self.last = Some(fingerprint);
        true
    }

    /// Forget the last payload.
    pub const fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(Fingerprint::of("abc"), Fingerprint::of("abc"));
        assert_ne!(Fingerprint::of("abc"), Fingerprint::of("abd"));
    }

    #[test]
    fn repeated_payload_is_skipped() {
        let mut dedup = PhotoDedup::new();
        assert!(dedup.is_new("first"));
        assert!(!dedup.is_new("first"));
        assert!(dedup.is_new("second"));
        assert!(dedup.is_new("first"));
    }

    #[test]
    fn reset_forgets() {
        let mut dedup = PhotoDedup::new();
        assert!(dedup.is_new("photo"));
        dedup.reset();
        assert!(dedup.is_new("photo"));
    }
}
