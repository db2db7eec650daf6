//! Reversible, checksummed encoding of path segments.
//!
//! Every segment stored in an archive is rewritten as
//! `<crc32-decimal>#<base64url(segment)>`. The alphabet is the standard
//! base64 alphabet with `+` and `/` replaced by `-` and `_`, keeping `=`
//! padding, so an encoded segment never contains a path separator and is a
//! valid file name on every common filesystem.
//!
//! Decoding is total: a value that is not a well-formed encoded segment, or
//! whose checksum does not match the decoded bytes, is returned unchanged.
//! This lets archives written by other tools, or names that merely happen to
//! contain `#`, pass through untouched.
//!
//! ```
//! use zipname::codec;
//!
//! let stored = codec::encode_path(b"docs/na#me.bin", b'/');
//! assert!(!stored.contains("na#me"));
//! assert_eq!(codec::decode_path(stored.as_bytes(), b'/'), b"docs/na#me.bin");
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

/// Separator used for archive paths.
pub const SEPARATOR: u8 = b'/';

/// Delimiter between the checksum and the payload of an encoded segment.
pub const HASH_DELIMITER: u8 = b'#';

/// Encode one path segment.
///
/// Any byte sequence is encodable, including the empty one (`"0#"`).
pub fn encode(segment: &[u8]) -> String {
    format!("{}#{}", crc32fast::hash(segment), URL_SAFE.encode(segment))
}

/// Decode one segment, falling back to the input when it is not a valid
/// encoding produced by [`encode`].
pub fn decode(value: &[u8]) -> Vec<u8> {
    try_decode(value).unwrap_or_else(|| value.to_vec())
}

/// Decode one segment, returning `None` when `value` is plain or corrupted.
pub fn try_decode(value: &[u8]) -> Option<Vec<u8>> {
    let delimiter = value.iter().position(|&b| b == HASH_DELIMITER)?;
    let (hash, payload) = (&value[..delimiter], &value[delimiter + 1..]);

    let expected: u32 = std::str::from_utf8(hash).ok()?.parse().ok()?;
    let candidate = URL_SAFE.decode(payload).ok()?;

    (crc32fast::hash(&candidate) == expected).then_some(candidate)
}

/// Encode every segment of `path` independently.
///
/// Empty segments (a leading separator of an absolute path, the trailing
/// separator of a directory entry, doubled separators) stay empty so that
/// the shape of the path is preserved.
pub fn encode_path(path: &[u8], separator: u8) -> String {
    let mut out = String::with_capacity(path.len() * 2);
    for (i, segment) in path.split(|&b| b == separator).enumerate() {
        if i > 0 {
            out.push(char::from(separator));
        }
        if !segment.is_empty() {
            out.push_str(&encode(segment));
        }
    }
    out
}

/// Decode every segment of `path` independently.
pub fn decode_path(path: &[u8], separator: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len());
    for (i, segment) in path.split(|&b| b == separator).enumerate() {
        if i > 0 {
            out.push(separator);
        }
        out.extend_from_slice(&decode(segment));
    }
    out
}

/// Split a path into its segments. The number of segments is always the
/// number of separators plus one.
pub fn segments(path: &[u8], separator: u8) -> Vec<&[u8]> {
    path.split(|&b| b == separator).collect()
}
