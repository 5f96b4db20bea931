//! Content identity of a media payload.
//!
//! The digest is the only deduplication key, so it must be stable across
//! runs and collision resistant: SHA-256 over the raw media bytes, or over the
//! platform's stable media reference when downloads are disabled.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::platform::MediaRef;

pub const HASH_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// Rebuilds a hash read back from storage. Returns `None` for blobs of the
    /// wrong length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; HASH_LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

pub fn fingerprint(media: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(media);
    ContentHash(hasher.finalize().into())
}

pub fn fingerprint_reference(reference: &MediaRef) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(b"ref:");
    hasher.update(reference.as_str().as_bytes());
    ContentHash(hasher.finalize().into())
}
