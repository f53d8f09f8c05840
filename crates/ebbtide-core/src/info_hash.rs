//! Canonical torrent content identifier.

use std::fmt;
use std::str::{self, FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::TorrentError;

/// Length in characters of the canonical hex form.
pub const INFO_HASH_LEN: usize = 40;

/// Length in characters of a hybrid (v2) hex digest.
const HYBRID_DIGEST_LEN: usize = 64;

/// Torrent content identifier: exactly forty lowercase hex characters.
///
/// This is the key for resume artifacts on disk, the live handle registry,
/// and every event envelope, so equality is byte equality and ordering is
/// plain lexicographic ordering. Construction always folds to lowercase;
/// two spellings of the same digest compare equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

impl InfoHash {
    /// Parse an identifier from its canonical hex form.
    ///
    /// Accepts exactly forty hex characters in either case and folds the
    /// result to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InvalidInfoHash`] when the input is not
    /// exactly forty hex characters.
    pub fn parse(value: &str) -> Result<Self, TorrentError> {
        if value.len() != INFO_HASH_LEN {
            return Err(TorrentError::invalid_info_hash(
                value,
                "expected exactly 40 hex characters",
            ));
        }
        Self::copy_lowercase(value)
    }

    /// Parse an identifier from a digest found in a magnet URI.
    ///
    /// Accepts the forty-character v1 form verbatim and truncates
    /// sixty-four-character hybrid digests to their forty-character prefix,
    /// matching how session libraries render truncated v2 hashes.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InvalidInfoHash`] when the input is neither
    /// forty nor sixty-four hex characters.
    pub fn from_digest(value: &str) -> Result<Self, TorrentError> {
        match value.len() {
            INFO_HASH_LEN => Self::copy_lowercase(value),
            HYBRID_DIGEST_LEN => {
                let Some(prefix) = value.get(..INFO_HASH_LEN) else {
                    return Err(TorrentError::invalid_info_hash(
                        value,
                        "expected hex characters only",
                    ));
                };
                Self::copy_lowercase(prefix)
            }
            _ => Err(TorrentError::invalid_info_hash(
                value,
                "expected 40 or 64 hex characters",
            )),
        }
    }

    fn copy_lowercase(value: &str) -> Result<Self, TorrentError> {
        let mut bytes = [0_u8; INFO_HASH_LEN];
        for (slot, byte) in bytes.iter_mut().zip(value.bytes()) {
            if !byte.is_ascii_hexdigit() {
                return Err(TorrentError::invalid_info_hash(
                    value,
                    "expected hex characters only",
                ));
            }
            *slot = byte.to_ascii_lowercase();
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = str::from_utf8(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(text)
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({self})")
    }
}

impl FromStr for InfoHash {
    type Err = TorrentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(de::Error::custom)
    }
}
