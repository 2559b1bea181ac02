//! Compact text encoding of feature vectors.
//!
//! Vectors are stored as standard base64 over little-endian `f32` bytes. The
//! output alphabet is printable ASCII, so encoded vectors can sit inside JSON
//! strings of a text key-value store without escaping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{AppError, Result};
use crate::models::catalog::FeatureVector;

/// Byte width of one encoded component.
pub const ELEMENT_WIDTH: usize = std::mem::size_of::<f32>();

/// Encode a vector as base64 of its little-endian `f32` bytes.
pub fn encode_vector(vector: &[f32]) -> String {
    let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

/// Decode a string produced by [`encode_vector`].
///
/// Fails with [`AppError::CorruptData`] when the input is not base64 or its
/// byte length is not a multiple of [`ELEMENT_WIDTH`].
pub fn decode_vector(encoded: &str) -> Result<FeatureVector> {
    let bytes = STANDARD.decode(encoded.trim())?;
    if bytes.len() % ELEMENT_WIDTH != 0 {
        return Err(AppError::CorruptData(format!(
            "encoded vector is {} bytes, not a multiple of {}",
            bytes.len(),
            ELEMENT_WIDTH
        )));
    }
    Ok(bytes
        .chunks_exact(ELEMENT_WIDTH)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_exact() {
        let v = vec![0.0, -1.5, 3.25e-7, f32::MAX, f32::MIN_POSITIVE, 0.707_106_77];
        let decoded = decode_vector(&encode_vector(&v)).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn test_empty_vector() {
        assert_eq!(encode_vector(&[]), "");
        assert!(decode_vector("").unwrap().is_empty());
    }

    #[test]
    fn test_encoding_is_printable_ascii() {
        let v: Vec<f32> = (0..512).map(|i| (i as f32).sin()).collect();
        let encoded = encode_vector(&v);
        assert!(encoded.bytes().all(|b| b.is_ascii_graphic()));
    }

    #[test]
    fn test_length_not_multiple_of_width() {
        // "AAAA" decodes to three bytes
        let err = decode_vector("AAAA").unwrap_err();
        assert!(matches!(err, AppError::CorruptData(_)));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(decode_vector("not base64!"), Err(AppError::CorruptData(_))));
    }
}
