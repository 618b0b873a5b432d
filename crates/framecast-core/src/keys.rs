//! Opaque session keys.
//!
//! A key is 16 bytes from the operating system CSPRNG, hex-encoded to 32
//! lowercase characters. Uniqueness rests on the 128 bits of entropy; nothing
//! downstream checks for collisions.

use std::fmt;
use std::str::FromStr;

use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::constants::{KEY_BYTES, KEY_HEX_LEN};
use crate::errors::KeyError;

/// Identifier handed to a client by `GET /new`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Validate the wire form of a key (32 lowercase hex characters).
    pub fn parse(s: &str) -> Option<Self> {
        let well_formed = s.len() == KEY_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(s.to_owned()))
    }

    /// Borrow the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionKey {
    type Err = InvalidKey;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(InvalidKey)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returned by [`SessionKey::from_str`] for malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session key must be {KEY_HEX_LEN} lowercase hex characters")]
pub struct InvalidKey;

/// Generate a fresh key from the OS randomness source.
pub fn generate_key() -> Result<SessionKey, KeyError> {
    generate_key_with(&mut OsRng)
}

/// Generate a key from the given fallible RNG.
///
/// An RNG error is surfaced as [`KeyError::RandomSource`].
pub fn generate_key_with<R>(rng: &mut R) -> Result<SessionKey, KeyError>
where
    R: TryRngCore + ?Sized,
{
    let mut bytes = [0u8; KEY_BYTES];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| KeyError::RandomSource(e.to_string()))?;
    Ok(SessionKey(hex::encode(bytes)))
}
