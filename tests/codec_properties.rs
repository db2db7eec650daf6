//! Property-based tests for the name codec.

use proptest::prelude::*;
use zipname::codec::{self, SEPARATOR};

/// Byte segments joined by `/`, segments possibly empty
fn path_strategy() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..12), 1..5)
        .prop_map(|segments| segments.join(&SEPARATOR))
}

proptest! {
    /// Any byte sequence survives a round trip, `/`, `#` and non-UTF-8 included.
    #[test]
    fn segment_round_trip(segment in proptest::collection::vec(any::<u8>(), 0..64)) {
        let encoded = codec::encode(&segment);
        prop_assert_eq!(codec::decode(encoded.as_bytes()), segment);
    }

    #[test]
    fn path_round_trip(path in path_strategy()) {
        let encoded = codec::encode_path(&path, SEPARATOR);
        prop_assert_eq!(codec::decode_path(encoded.as_bytes(), SEPARATOR), path);
    }

    /// Encoded names are portable: no separator, no NUL, ASCII only.
    #[test]
    fn encoded_segments_are_portable(segment in proptest::collection::vec(any::<u8>(), 0..64)) {
        let encoded = codec::encode(&segment);
        prop_assert!(encoded.is_ascii());
        prop_assert!(!encoded.contains('/'));
        prop_assert!(!encoded.contains('\0'));
    }

    /// Values without a delimiter are returned unchanged.
    #[test]
    fn plain_names_pass_through(value in proptest::collection::vec(any::<u8>(), 0..64)) {
        prop_assume!(!value.contains(&b'#'));
        prop_assert_eq!(codec::decode(&value), value.clone());
        prop_assert!(codec::try_decode(&value).is_none());
    }

    /// A damaged checksum never yields bytes; the stored value comes back as-is.
    #[test]
    fn corrupted_checksum_passes_through(
        segment in proptest::collection::vec(any::<u8>(), 0..64),
        position in any::<prop::sample::Index>(),
    ) {
        let mut encoded = codec::encode(&segment).into_bytes();
        let digits = encoded.iter().position(|&b| b == b'#').unwrap();
        let at = position.index(digits);
        encoded[at] = b'0' + (encoded[at] - b'0' + 1) % 10;

        prop_assert_eq!(codec::decode(&encoded), encoded.clone());
    }
}
