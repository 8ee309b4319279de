//! Error types for the capability surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by capability functions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// An operand was not a decimal or `0x`-prefixed hex integer.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// Division or modulus by zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// The result of an operation was negative.
    #[error("Underflow: result is negative")]
    Underflow,

    /// An exponentiation whose result would exceed the configured bit limit.
    #[error("Exponent too large: result would exceed {0} bits")]
    ExponentTooLarge(u64),

    /// Input was not valid hex.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

impl CapabilityError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CapabilityError::ParseFailure(_) => ErrorKind::ParseFailure,
            CapabilityError::DivisionByZero => ErrorKind::DivisionByZero,
            CapabilityError::Underflow => ErrorKind::Underflow,
            CapabilityError::ExponentTooLarge(_) => ErrorKind::ExponentTooLarge,
            CapabilityError::InvalidHex(_) => ErrorKind::InvalidHex,
        }
    }
}

/// Coarse classification of a [`CapabilityError`], as seen by scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseFailure,
    DivisionByZero,
    Underflow,
    ExponentTooLarge,
    InvalidHex,
}

impl ErrorKind {
    /// The name handed to scripts alongside the failure sentinel.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::DivisionByZero => "division_by_zero",
            ErrorKind::Underflow => "underflow",
            ErrorKind::ExponentTooLarge => "exponent_too_large",
            ErrorKind::InvalidHex => "invalid_hex",
        }
    }
}

/// Result type for capability operations.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;
