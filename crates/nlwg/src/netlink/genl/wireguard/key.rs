//! WireGuard keys.

use std::fmt;
use std::str::FromStr;

use base64::prelude::*;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::netlink::error::{Error, Result};

/// Size of a WireGuard key in bytes.
pub const KEY_LEN: usize = 32;

/// A 32-byte Curve25519 key: private, public or preshared.
///
/// Displayed and parsed as standard base64. `Debug` never prints key
/// material. The all-zero key means "unset" in kernel replies.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random key, suitable as a preshared key.
    pub fn generate_key() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Generate a random private key, clamped for Curve25519.
    pub fn generate_private_key() -> Self {
        let mut key = Self::generate_key().0;
        key[0] &= 248;
        key[31] &= 127;
        key[31] |= 64;
        Self(key)
    }

    /// Derive the public key from this private key.
    pub fn public_key(&self) -> Key {
        let secret = StaticSecret::from(self.0);
        Self(PublicKey::from(&secret).to_bytes())
    }

    /// Check if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl From<[u8; KEY_LEN]> for Key {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        bytes.try_into().map(Self).map_err(|_| {
            Error::MalformedAttribute(format!(
                "key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(s.trim())
            .map_err(|e| Error::InvalidInput(format!("invalid base64 key: {e}")))?;
        let len = bytes.len();
        bytes.try_into().map(Self).map_err(|_| {
            Error::InvalidInput(format!("key must be {KEY_LEN} bytes, got {len}"))
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64_STANDARD.encode(self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            f.write_str("Key(zero)")
        } else {
            f.write_str("Key(..)")
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Key {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
