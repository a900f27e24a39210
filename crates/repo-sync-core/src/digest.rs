//! Digest: an order-sensitive, finalize-once hash accumulator.
//!
//! Digests fingerprint sync state so two repositories can tell whether they
//! diverged. They are not a security commitment.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A finalized 32-byte digest value.
///
/// This is what travels in request names and what the logs are keyed by.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DigestValue(pub [u8; 32]);

impl DigestValue {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidDigest(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(CoreError::InvalidDigest(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// The zero digest (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for DigestValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for DigestValue {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

enum State {
    Open(blake3::Hasher),
    Finalized(DigestValue),
}

/// A hash accumulator with two states: open and finalized.
///
/// `update`, `add_u64` and `combine` are only valid while open. Comparing two
/// digests with [`Digest::matches`] finalizes both of them.
pub struct Digest {
    state: State,
}

impl Digest {
    /// Create an open, empty digest.
    pub fn new() -> Self {
        Self {
            state: State::Open(blake3::Hasher::new()),
        }
    }

    /// Return to the initial open state, discarding everything fed so far.
    pub fn reset(&mut self) {
        self.state = State::Open(blake3::Hasher::new());
    }

    /// Whether `finalize` has been called.
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized(_))
    }

    /// Feed raw bytes.
    pub fn update(&mut self, bytes: &[u8]) -> Result<&mut Self, CoreError> {
        match &mut self.state {
            State::Open(hasher) => {
                hasher.update(bytes);
                Ok(self)
            }
            State::Finalized(_) => Err(CoreError::DigestFinalized),
        }
    }

    /// Feed a string's UTF-8 bytes.
    pub fn update_str(&mut self, s: &str) -> Result<&mut Self, CoreError> {
        self.update(s.as_bytes())
    }

    /// Feed a big-endian `u64`.
    pub fn add_u64(&mut self, value: u64) -> Result<&mut Self, CoreError> {
        self.update(&value.to_be_bytes())
    }

    /// Chain another digest into this one: the result is H(self || H(other)).
    ///
    /// `other` is finalized as a side effect.
    pub fn combine(&mut self, other: &mut Digest) -> Result<&mut Self, CoreError> {
        let value = other.finalize();
        self.combine_value(&value)
    }

    /// Chain an already finalized value into this digest.
    pub fn combine_value(&mut self, value: &DigestValue) -> Result<&mut Self, CoreError> {
        self.update(value.as_bytes())
    }

    /// Finalize and return the value. Idempotent.
    pub fn finalize(&mut self) -> DigestValue {
        let value = match &self.state {
            State::Open(hasher) => DigestValue(*hasher.finalize().as_bytes()),
            State::Finalized(value) => *value,
        };
        self.state = State::Finalized(value);
        value
    }

    /// Compare two digests, finalizing both.
    pub fn matches(&mut self, other: &mut Digest) -> bool {
        self.finalize() == other.finalize()
    }

    /// Whether the finalized value is the all-zero digest. Finalizes `self`.
    pub fn is_zero(&mut self) -> bool {
        self.finalize().is_zero()
    }

    /// Hash a single string in one shot.
    pub fn of_str(s: &str) -> DigestValue {
        DigestValue(*blake3::hash(s.as_bytes()).as_bytes())
    }

    /// One-shot equivalent of `update_str(uri)` followed by `add_u64(seq)`.
    pub fn of_name_seq(uri: &str, seq: u64) -> DigestValue {
        let mut hasher = blake3::Hasher::new();
        hasher.update(uri.as_bytes());
        hasher.update(&seq.to_be_bytes());
        DigestValue(*hasher.finalize().as_bytes())
    }

    /// One-shot equivalent of combining `values` in order into a fresh digest.
    pub fn chain<'a, I>(values: I) -> DigestValue
    where
        I: IntoIterator<Item = &'a DigestValue>,
    {
        let mut hasher = blake3::Hasher::new();
        for value in values {
            hasher.update(value.as_bytes());
        }
        DigestValue(*hasher.finalize().as_bytes())
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Open(_) => write!(f, "Digest(open)"),
            State::Finalized(value) => write!(f, "{:?}", value),
        }
    }
}
