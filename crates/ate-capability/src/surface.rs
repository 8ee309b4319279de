//! The capability surface handed to every runtime.

use crate::arith::{self, DEFAULT_MAX_EXP_BITS};
use crate::clock::{Clock, SystemClock};
use crate::error::CapabilityResult;
use crate::logger::{self, ScriptLogger, TracingLogger};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Names of the functions bound into every runtime.
pub const PRIMITIVES: &[&str] = &[
    "Add",
    "Sub",
    "Mul",
    "Div",
    "Mod",
    "Exp",
    "Equals",
    "IsZero",
    "HexToString",
    "StringToHex",
    "TimeMS",
    "SHA3",
    "Print",
    "Println",
    "Printf",
    "JsonEncode",
    "JsonDecode",
];

/// Stateful dependencies of the capability functions.
///
/// Everything except logging and time is a pure function in [`arith`],
/// [`crate::codec`] and [`crate::crypto`]. The surface carries the
/// injected logger, the clock and the arithmetic limits, and is cheap to
/// clone into each runtime.
#[derive(Clone)]
pub struct CapabilitySurface {
    logger: Arc<dyn ScriptLogger>,
    clock: Arc<dyn Clock>,
    max_exp_bits: u64,
}

impl CapabilitySurface {
    /// Create a surface that logs through `logger`.
    pub fn new(logger: Arc<dyn ScriptLogger>) -> Self {
        Self {
            logger,
            clock: Arc::new(SystemClock),
            max_exp_bits: DEFAULT_MAX_EXP_BITS,
        }
    }

    /// Replace the clock used by `TimeMS`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the ceiling on `Exp` results.
    pub fn with_max_exp_bits(mut self, bits: u64) -> Self {
        self.max_exp_bits = bits;
        self
    }

    pub fn logger(&self) -> &Arc<dyn ScriptLogger> {
        &self.logger
    }

    pub fn max_exp_bits(&self) -> u64 {
        self.max_exp_bits
    }

    /// `Exp` under this surface's limit.
    pub fn exp(&self, a: &str, b: &str) -> CapabilityResult<String> {
        arith::exp_bounded(a, b, self.max_exp_bits)
    }

    /// `TimeMS`.
    pub fn time_ms(&self) -> i64 {
        self.clock.now_millis()
    }

    /// `Print`.
    pub fn print(&self, runtime: &str, args: &[Value]) {
        self.logger.log(runtime, &logger::sprint(args));
    }

    /// `Println`.
    pub fn println(&self, runtime: &str, args: &[Value]) {
        self.logger.log(runtime, &logger::sprintln(args));
    }

    /// `Printf`. A missing or non-string template logs an empty line.
    pub fn printf(&self, runtime: &str, args: &[Value]) {
        let line = match args.split_first() {
            Some((Value::String(template), rest)) => logger::sprintf(template, rest),
            _ => String::new(),
        };
        self.logger.log(runtime, &line);
    }
}

impl Default for CapabilitySurface {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger::default()))
    }
}

impl fmt::Debug for CapabilitySurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySurface")
            .field("max_exp_bits", &self.max_exp_bits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::logger::CapturingLogger;
    use serde_json::json;

    #[test]
    fn test_logging_goes_to_injected_logger() {
        let sink = Arc::new(CapturingLogger::new());
        let surface = CapabilitySurface::new(sink.clone());

        surface.print("rt", &[json!("a"), json!("b")]);
        surface.println("rt", &[json!("a"), json!("b")]);
        surface.printf("rt", &[json!("%s-%d"), json!("x"), json!(3)]);
        surface.printf("rt", &[]);

        assert_eq!(sink.messages(), vec!["ab", "a b", "x-3", ""]);
        assert!(sink.entries().iter().all(|(rt, _)| rt == "rt"));
    }

    #[test]
    fn test_clock_and_limits() {
        let surface = CapabilitySurface::default()
            .with_clock(Arc::new(FixedClock::new(42)))
            .with_max_exp_bits(8);
        assert_eq!(surface.time_ms(), 42);
        assert_eq!(surface.exp("2", "7").unwrap(), "0x80");
        assert!(surface.exp("2", "8").is_err());
    }
}
