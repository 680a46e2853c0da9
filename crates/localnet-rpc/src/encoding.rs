//! Payload encoding accepted by the control plane.

use sha2::{Digest, Sha256};

const CHECKSUM_LEN: usize = 4;

/// Hex-encode `bytes` with a trailing 4-byte SHA-256 checksum and `0x` prefix.
pub fn hex_with_checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut payload = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    payload.extend_from_slice(bytes);
    payload.extend_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
    format!("0x{}", hex::encode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_tail_of_sha256() {
        // sha256("") = e3b0...b855
        assert_eq!(hex_with_checksum(&[]), "0x7852b855");
    }

    #[test]
    fn payload_precedes_checksum() {
        let encoded = hex_with_checksum(b"{}");
        assert!(encoded.starts_with("0x7b7d"));
        assert_eq!(encoded.len(), 2 + 2 * (2 + CHECKSUM_LEN));
    }
}
