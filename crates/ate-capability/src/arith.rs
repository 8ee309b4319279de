//! Arbitrary-precision integer arithmetic over string operands.
//!
//! Scripts have no native big-integer type, so every operand crosses the
//! boundary as text: either `0x`-prefixed hex or plain decimal, with an
//! optional leading `-`. Results are re-encoded as `0x` followed by the
//! lowercase hex of the minimal big-endian byte string. Zero encodes as
//! `"0x"` and every byte takes two digits, so 256 is `"0x0100"`.
//!
//! Results are never signed. An operation whose result is negative fails
//! with [`CapabilityError::Underflow`].

use crate::error::{CapabilityError, CapabilityResult};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

/// Default ceiling on the size of an [`exp`] result.
pub const DEFAULT_MAX_EXP_BITS: u64 = 65_536;

/// Parse a decimal or `0x`-prefixed hex integer.
pub fn parse_int(input: &str) -> CapabilityResult<BigInt> {
    let trimmed = input.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let magnitude = if let Some(digits) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        if digits.is_empty() {
            BigUint::zero()
        } else if digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            BigUint::parse_bytes(digits.as_bytes(), 16)
                .ok_or_else(|| CapabilityError::ParseFailure(input.to_string()))?
        } else {
            return Err(CapabilityError::ParseFailure(input.to_string()));
        }
    } else if !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit()) {
        BigUint::parse_bytes(unsigned.as_bytes(), 10)
            .ok_or_else(|| CapabilityError::ParseFailure(input.to_string()))?
    } else {
        return Err(CapabilityError::ParseFailure(input.to_string()));
    };

    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok(BigInt::from_biguint(sign, magnitude))
}

/// Encode a non-negative integer as `0x` + minimal big-endian hex.
pub fn encode(value: &BigInt) -> CapabilityResult<String> {
    if value.is_negative() {
        return Err(CapabilityError::Underflow);
    }
    if value.is_zero() {
        return Ok("0x".to_string());
    }
    let (_, bytes) = value.to_bytes_be();
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Parse and re-encode, yielding the canonical form of an operand.
pub fn canonical(input: &str) -> CapabilityResult<String> {
    encode(&parse_int(input)?)
}

fn parse_pair(a: &str, b: &str) -> CapabilityResult<(BigInt, BigInt)> {
    Ok((parse_int(a)?, parse_int(b)?))
}

pub fn add(a: &str, b: &str) -> CapabilityResult<String> {
    let (a, b) = parse_pair(a, b)?;
    encode(&(a + b))
}

pub fn sub(a: &str, b: &str) -> CapabilityResult<String> {
    let (a, b) = parse_pair(a, b)?;
    encode(&(a - b))
}

pub fn mul(a: &str, b: &str) -> CapabilityResult<String> {
    let (a, b) = parse_pair(a, b)?;
    encode(&(a * b))
}

/// Euclidean quotient and remainder; the remainder is never negative.
fn div_rem_euclid(a: &BigInt, b: &BigInt) -> CapabilityResult<(BigInt, BigInt)> {
    if b.is_zero() {
        return Err(CapabilityError::DivisionByZero);
    }
    let mut rem = a % b;
    if rem.is_negative() {
        rem += b.abs();
    }
    let quot = (a - &rem) / b;
    Ok((quot, rem))
}

pub fn div(a: &str, b: &str) -> CapabilityResult<String> {
    let (a, b) = parse_pair(a, b)?;
    let (quot, _) = div_rem_euclid(&a, &b)?;
    encode(&quot)
}

pub fn modulo(a: &str, b: &str) -> CapabilityResult<String> {
    let (a, b) = parse_pair(a, b)?;
    let (_, rem) = div_rem_euclid(&a, &b)?;
    encode(&rem)
}

/// `a` raised to `b` with the default size ceiling.
pub fn exp(a: &str, b: &str) -> CapabilityResult<String> {
    exp_bounded(a, b, DEFAULT_MAX_EXP_BITS)
}

/// `a` raised to `b`, refusing results wider than `max_bits`.
///
/// A non-positive exponent yields 1.
pub fn exp_bounded(a: &str, b: &str, max_bits: u64) -> CapabilityResult<String> {
    let (base, exponent) = parse_pair(a, b)?;
    if !exponent.is_positive() {
        return encode(&BigInt::from(1u8));
    }

    let magnitude_bits = base.bits();
    if magnitude_bits > 1 {
        // Lower bound on the width of the result: (bits - 1) * exp + 1.
        let too_large = exponent
            .to_u64()
            .and_then(|e| (magnitude_bits - 1).checked_mul(e))
            .and_then(|bits| bits.checked_add(1))
            .map_or(true, |bits| bits > max_bits);
        if too_large {
            return Err(CapabilityError::ExponentTooLarge(max_bits));
        }
    }

    let result = if magnitude_bits <= 1 {
        // 0, 1 and -1 stay bounded for any exponent; only the parity matters.
        let odd = !(&exponent % BigInt::from(2u8)).is_zero();
        if base.is_negative() && !odd {
            base.abs()
        } else {
            base
        }
    } else {
        let e = exponent
            .to_u32()
            .ok_or(CapabilityError::ExponentTooLarge(max_bits))?;
        base.pow(e)
    };
    encode(&result)
}

/// Numeric equality of two operands.
pub fn equals(a: &str, b: &str) -> CapabilityResult<bool> {
    let (a, b) = parse_pair(a, b)?;
    Ok(a == b)
}

/// Literal zero check: only `"0"`, `"0x"` and `"0x0"` count.
///
/// This is a string match, not a numeric test. `"0x00"` is not zero.
pub fn is_zero(input: &str) -> bool {
    matches!(input, "0" | "0x" | "0x0")
}
