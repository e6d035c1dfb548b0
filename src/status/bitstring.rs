//! # Status-List Bitstring
//!
//! The compressed bitstring at the heart of a StatusList2021 credential: a
//! sequence of at least 131,072 bits (16 KiB uncompressed), GZIP-compressed
//! and base64url-encoded without padding. Bit index 0 is the most
//! significant bit of byte 0; positions count left to right within each
//! byte.

use std::io::{Read, Write};

use anyhow::anyhow;
use base64ct::{Base64UrlUnpadded, Encoding};
use bitvec::order::Msb0;
use bitvec::vec::BitVec;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::provider::Result;

/// Number of entries in a status list. The minimum length required for herd
/// privacy: 131,072 bits, or 16KB uncompressed.
pub const MAX_ENTRIES: usize = 8 * 1024 * 16;

/// A status-list bitstring with left-to-right bit positions.
pub type Bitstring = BitVec<u8, Msb0>;

/// Returns a fresh bitstring with every status bit unset.
#[must_use]
pub fn generate() -> Bitstring {
    BitVec::repeat(false, MAX_ENTRIES)
}

/// Compresses and encodes the bitstring for embedding as an `encodedList`
/// claim.
///
/// # Errors
///
/// Returns an error if compression fails.
pub fn encode(bits: &Bitstring) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bits.as_raw_slice())?;
    let compressed = encoder.finish()?;
    Ok(Base64UrlUnpadded::encode_string(&compressed))
}

/// Decodes an `encodedList` claim back into a bitstring.
///
/// # Errors
///
/// Returns an error if the value is not base64url, does not inflate, or
/// inflates to less than the minimum list length.
pub fn decode(encoded: &str) -> Result<Bitstring> {
    let compressed = Base64UrlUnpadded::decode_vec(encoded)
        .map_err(|e| anyhow!("encoded list is not base64url: {e}"))?;

    let mut raw = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut raw)?;

    if raw.len() * 8 < MAX_ENTRIES {
        return Err(anyhow!(
            "encoded list inflates to {} bits, below the minimum {MAX_ENTRIES}",
            raw.len() * 8
        ));
    }

    Ok(BitVec::from_vec(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_round_trip() {
        let bits = generate();
        assert_eq!(bits.len(), MAX_ENTRIES);

        let encoded = encode(&bits).expect("should encode");
        let decoded = decode(&encoded).expect("should decode");
        assert_eq!(decoded.len(), MAX_ENTRIES);
        assert!(!decoded.any());
    }

    #[test]
    fn set_bit_round_trips() {
        let mut bits = generate();
        bits.set(42, true);
        bits.set(MAX_ENTRIES - 1, true);

        let decoded = decode(&encode(&bits).expect("should encode")).expect("should decode");
        assert!(decoded[42]);
        assert!(decoded[MAX_ENTRIES - 1]);
        assert!(!decoded[41]);
        assert_eq!(decoded.count_ones(), 2);
    }

    #[test]
    fn bit_zero_is_msb_of_byte_zero() {
        let mut bits = generate();
        bits.set(0, true);
        bits.set(8, true);

        let raw = bits.as_raw_slice();
        assert_eq!(raw[0], 0b1000_0000);
        assert_eq!(raw[1], 0b1000_0000);
    }

    #[test]
    fn malformed_input_rejected() {
        assert!(decode("not base64!").is_err());

        // valid base64 that is not gzip
        let bogus = Base64UrlUnpadded::encode_string(b"plainly not gzip");
        assert!(decode(&bogus).is_err());

        // a list shorter than the herd-privacy minimum
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0u8; 16]).expect("should compress");
        let short = Base64UrlUnpadded::encode_string(&encoder.finish().expect("should finish"));
        assert!(decode(&short).is_err());
    }
}
