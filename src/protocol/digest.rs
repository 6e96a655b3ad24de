//! SHA-256 integrity check over the CBOR record
//!
//! The comparison is a plain byte comparison. The digest guards against
//! transport corruption, it does not authenticate the device.

use sha2::{Digest as _, Sha256};

use crate::config::protocol::DIGEST_LEN;

/// A SHA-256 digest
pub type Digest = [u8; DIGEST_LEN];

/// Compute the digest of `data`
pub fn digest(data: &[u8]) -> Digest {
    Sha256::digest(data).into()
}

/// Check that `expected` is the digest of `data`
pub fn verify(data: &[u8], expected: &[u8]) -> bool {
    digest(data).as_slice() == expected
}

/// Lowercase hex rendering for diagnostics
pub fn to_hex(bytes: &[u8]) -> String {
    data_encoding::HEXLOWER.encode(bytes)
}
