//! Base64 codec for the scan payload
//!
//! The device armours its binary payload with the standard, padded base64
//! alphabet so it can travel through the line-oriented AT protocol.

use data_encoding::BASE64;

/// Decode standard base64 into raw bytes
pub fn decode(encoded: &str) -> Result<Vec<u8>, data_encoding::DecodeError> {
    BASE64.decode(encoded.as_bytes())
}

/// Encode raw bytes as standard base64
pub fn encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cases: [&[u8]; 5] = [b"", b"f", b"fo", b"foo", &[0x00, 0xFF, 0x10, 0x80]];
        for data in cases {
            assert_eq!(decode(&encode(data)).unwrap(), data);
        }
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(encode(b"Hello"), "SGVsbG8=");
        assert_eq!(decode("SGVsbG8=").unwrap(), b"Hello");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(decode("SGVsbG8").is_err()); // missing padding
        assert!(decode("SGV*bG8=").is_err()); // outside the alphabet
    }
}
