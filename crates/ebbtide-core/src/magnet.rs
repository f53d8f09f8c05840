//! Magnet URI validation, parsing, and generation.
//!
//! Validation mirrors what the session library itself will accept: the
//! `magnet:?` scheme, a `xt=urn:btih:` parameter carrying a forty or
//! sixty-four character hex digest, and a hard length cap to reject
//! pathological input before it reaches the engine.

use std::fmt::Write as _;

use regex::Regex;

use crate::error::TorrentError;
use crate::info_hash::InfoHash;

/// Maximum accepted magnet URI length in characters.
pub const MAX_MAGNET_LEN: usize = 10_000;

const MAGNET_PREFIX: &str = "magnet:?";
const BTIH_MARKER: &str = "xt=urn:btih:";
const BTIH_DIGEST_PATTERN: &str = "xt=urn:btih:([a-fA-F0-9]+)";

/// Fields extracted from a validated magnet URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetInfo {
    /// Canonical identifier from the `xt=urn:btih:` parameter.
    pub info_hash: InfoHash,
    /// Display name from the `dn` parameter, percent-decoded.
    pub display_name: Option<String>,
    /// Tracker URLs from `tr` parameters, percent-decoded, in order.
    pub trackers: Vec<String>,
    /// The validated URI, trimmed but otherwise unchanged.
    pub uri: String,
}

/// Whether the input looks like a magnet URI at all.
///
/// This is the cheap routing check used for command-line arguments and IPC
/// payloads; full validation happens in [`parse_magnet`].
#[must_use]
pub fn is_magnet_link(value: &str) -> bool {
    value.trim().starts_with(MAGNET_PREFIX)
}

/// Validate a magnet URI and extract its identifier, name, and trackers.
///
/// # Errors
///
/// Returns [`TorrentError::InvalidMagnet`] when the input is empty, lacks
/// the `magnet:?` scheme, lacks an `xt=urn:btih:` parameter, exceeds
/// [`MAX_MAGNET_LEN`], or carries a digest that is not forty or sixty-four
/// hex characters. Returns [`TorrentError::OperationFailed`] if the digest
/// pattern itself fails to compile.
pub fn parse_magnet(uri: &str) -> Result<MagnetInfo, TorrentError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(TorrentError::invalid_magnet("magnet link cannot be empty"));
    }
    if !uri.starts_with(MAGNET_PREFIX) {
        return Err(TorrentError::invalid_magnet(format!(
            "must start with '{MAGNET_PREFIX}'"
        )));
    }
    if !uri.contains(BTIH_MARKER) {
        return Err(TorrentError::invalid_magnet(format!(
            "missing info hash ({BTIH_MARKER})"
        )));
    }
    if uri.len() > MAX_MAGNET_LEN {
        return Err(TorrentError::invalid_magnet(format!(
            "exceeds {MAX_MAGNET_LEN} characters"
        )));
    }

    let pattern = Regex::new(BTIH_DIGEST_PATTERN)
        .map_err(|source| TorrentError::operation_failed("magnet.pattern", None, source))?;
    let digest = pattern
        .captures(uri)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| TorrentError::invalid_magnet("malformed info hash"))?;
    let info_hash = InfoHash::from_digest(digest.as_str()).map_err(|_| {
        TorrentError::invalid_magnet("info hash must be 40 or 64 hex characters")
    })?;

    let mut display_name = None;
    let mut trackers = Vec::new();
    for pair in uri[MAGNET_PREFIX.len()..].split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "dn" if display_name.is_none() => display_name = Some(percent_decode(value)),
            "tr" => trackers.push(percent_decode(value)),
            _ => {}
        }
    }

    Ok(MagnetInfo {
        info_hash,
        display_name,
        trackers,
        uri: uri.to_string(),
    })
}

/// Build a canonical magnet URI for an identifier.
///
/// Used when a torrent has to be persisted by reference because its full
/// metadata is unavailable or failed to serialize.
#[must_use]
pub fn magnet_for(info_hash: InfoHash, display_name: Option<&str>, trackers: &[String]) -> String {
    let mut uri = format!("{MAGNET_PREFIX}{BTIH_MARKER}{info_hash}");
    if let Some(name) = display_name {
        uri.push_str("&dn=");
        uri.push_str(&percent_encode(name));
    }
    for tracker in trackers {
        uri.push_str("&tr=");
        uri.push_str(&percent_encode(tracker));
    }
    uri
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'%' if index + 2 < bytes.len() => {
                match (hex_nibble(bytes[index + 1]), hex_nibble(bytes[index + 2])) {
                    (Some(high), Some(low)) => {
                        out.push((high << 4) | low);
                        index += 3;
                    }
                    _ => {
                        out.push(b'%');
                        index += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                index += 1;
            }
            other => {
                out.push(other);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}

const fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
