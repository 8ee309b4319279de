//! Script logging: the injected logger and Go-style formatting helpers.
//!
//! `Print`, `Println` and `Printf` never write to stdout directly. They
//! format their arguments here and hand the line to a [`ScriptLogger`]
//! supplied when the capability surface is built.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt::Write;

/// Sink for script output.
pub trait ScriptLogger: Send + Sync {
    /// Record one formatted line emitted by the runtime named `runtime`.
    fn log(&self, runtime: &str, message: &str);
}

/// Forwards script output to `tracing` at info level.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    name: String,
}

impl TracingLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new("JsRuntime")
    }
}

impl ScriptLogger for TracingLogger {
    fn log(&self, runtime: &str, message: &str) {
        tracing::info!(target: "ate::script", logger = %self.name, runtime = %runtime, "{}", message);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct CapturingLogger {
    lines: Mutex<Vec<(String, String)>>,
}

impl CapturingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(runtime, message)` pairs logged so far.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.lines.lock().clone()
    }

    /// Messages only, in order.
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl ScriptLogger for CapturingLogger {
    fn log(&self, runtime: &str, message: &str) {
        self.lines
            .lock()
            .push((runtime.to_string(), message.to_string()));
    }
}

/// Render a single value the way `%v` does.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Concatenate operands, adding a space only between two non-strings.
pub fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        out.push_str(&display(arg));
    }
    out
}

/// Join operands with single spaces.
pub fn sprintln(args: &[Value]) -> String {
    args.iter().map(display).collect::<Vec<_>>().join(" ")
}

/// Expand a Go-style format template.
///
/// Supported verbs: `%v %s %d %x %X %q %%`. Missing operands render as
/// `%!v(MISSING)`, unused ones are appended as `%!(EXTRA ...)`, and a verb
/// that does not fit its operand renders as `%!d(value)`.
pub fn sprintf(template: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next_arg) else {
            let _ = write!(out, "%!{verb}(MISSING)");
            continue;
        };
        next_arg += 1;
        format_verb(&mut out, verb, arg);
    }

    if next_arg < args.len() {
        let extra = args[next_arg..]
            .iter()
            .map(display)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(out, "%!(EXTRA {extra})");
    }
    out
}

fn format_verb(out: &mut String, verb: char, arg: &Value) {
    match (verb, arg) {
        ('v' | 's', _) => out.push_str(&display(arg)),
        ('d', Value::Number(n)) if n.is_i64() || n.is_u64() => {
            let _ = write!(out, "{n}");
        }
        ('x' | 'X', Value::Number(n)) if n.is_i64() || n.is_u64() => {
            let text = match n.as_i64() {
                Some(i) if i < 0 => format!("-{:x}", i.unsigned_abs()),
                _ => format!("{:x}", n.as_u64().unwrap_or_default()),
            };
            out.push_str(&if verb == 'X' { text.to_uppercase() } else { text });
        }
        ('x', Value::String(s)) => out.push_str(&hex::encode(s)),
        ('X', Value::String(s)) => out.push_str(&hex::encode_upper(s)),
        ('q', Value::String(s)) => out.push_str(&Value::String(s.clone()).to_string()),
        _ => {
            let _ = write!(out, "%!{verb}({})", display(arg));
        }
    }
}
