//! # ate-capability
//!
//! The fixed, auditable set of host functions bound into every Atë script
//! runtime.
//!
//! This crate provides:
//! - Arbitrary-precision integer arithmetic over `0x`-hex/decimal strings
//! - Hex codecs and JSON helpers
//! - Keccak-256 hashing
//! - A pluggable millisecond clock
//! - Go-style formatting for script logging, routed to an injected logger
//!
//! ## Determinism
//!
//! Apart from `TimeMS` and the logging functions, every capability is a
//! pure function of its string arguments. Failures are reported as a
//! [`CapabilityError`] carrying an [`ErrorKind`], never as a panic.

pub mod arith;
pub mod clock;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod logger;
pub mod surface;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CapabilityError, CapabilityResult, ErrorKind};
pub use logger::{CapturingLogger, ScriptLogger, TracingLogger};
pub use surface::{CapabilitySurface, PRIMITIVES};
