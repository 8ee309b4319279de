//! Hashing.

use crate::codec::hex_to_bytes;
use crate::error::CapabilityResult;
use sha3::{Digest, Keccak256};

/// Keccak-256 of hex input (optional `0x`), returned as `0x` + 64 hex digits.
///
/// This is the original Keccak padding, not the NIST SHA3-256 variant.
pub fn sha3(hex_input: &str) -> CapabilityResult<String> {
    let bytes = hex_to_bytes(hex_input)?;
    Ok(format!("0x{}", hex::encode(keccak256(&bytes))))
}

/// Raw Keccak-256 digest.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
