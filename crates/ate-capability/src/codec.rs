//! Hex and JSON codecs.

use crate::error::{CapabilityError, CapabilityResult};

/// Minimum width, in bytes, of a [`string_to_hex`] result.
pub const MIN_HEX_WIDTH: usize = 32;

/// Strip an optional `0x`/`0X` prefix.
pub fn strip_hex_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

/// Decode hex (with or without `0x`) into raw bytes.
pub fn hex_to_bytes(input: &str) -> CapabilityResult<Vec<u8>> {
    hex::decode(strip_hex_prefix(input))
        .map_err(|e| CapabilityError::InvalidHex(format!("{input:?}: {e}")))
}

/// Encode bytes as `0x` + hex, left-padded with zero bytes to 32 bytes.
pub fn string_to_hex(input: &[u8]) -> String {
    let pad = MIN_HEX_WIDTH.saturating_sub(input.len());
    let mut bytes = vec![0u8; pad];
    bytes.extend_from_slice(input);
    format!("0x{}", hex::encode(bytes))
}

/// Serialize a value to compact JSON text.
pub fn json_encode(value: &serde_json::Value) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

/// Parse JSON text.
pub fn json_decode(text: &str) -> serde_json::Result<serde_json::Value> {
    serde_json::from_str(text)
}
