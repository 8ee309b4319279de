//! Installs the capability surface into an interpreter.
//!
//! Every primitive is stored in a hidden table that only the `_G`
//! metamethods can reach. A `__newindex` guard rejects assignments to
//! those names, the metatable itself is locked, and `rawset` is removed,
//! which keeps the capability set fixed for the lifetime of the runtime.

use crate::value::{json_to_lua, operand_text, to_json_lossy};
use ate_capability::arith;
use ate_capability::codec::{hex_to_bytes, json_decode, json_encode, string_to_hex};
use ate_capability::crypto::sha3;
use ate_capability::{CapabilityError, CapabilityResult, CapabilitySurface, ErrorKind};
use mlua::{Function, Lua, LuaSerdeExt, MultiValue, Table, Value, Variadic};

/// Globals bound by the runtime itself, alongside the capability primitives.
pub const RUNTIME_GLOBALS: &[&str] = &["RuntimeId", "events_subscribe", "events_unsubscribe"];

const GUARD_GLOBALS: &str = r#"
return function(protected)
    local rawget, rawset, error, tostring = rawget, rawset, error, tostring
    setmetatable(_G, {
        __index = function(_, k)
            return rawget(protected, k)
        end,
        __newindex = function(t, k, v)
            if rawget(protected, k) ~= nil then
                error("attempt to overwrite read-only global '" .. tostring(k) .. "'", 2)
            end
            rawset(t, k, v)
        end,
        __metatable = false,
    })
    rawset(_G, "rawset", nil)
end
"#;

/// Whether `name` is a read-only global in every runtime.
pub fn is_protected(name: &str) -> bool {
    ate_capability::PRIMITIVES.contains(&name) || RUNTIME_GLOBALS.contains(&name)
}

/// Bind the capability surface into `protected`, the table that backs
/// the read-only globals.
pub(crate) fn install_capabilities(
    lua: &Lua,
    protected: &Table,
    runtime: &str,
    surface: &CapabilitySurface,
) -> mlua::Result<()> {
    protected.set("Add", binary(lua, arith::add)?)?;
    protected.set("Sub", binary(lua, arith::sub)?)?;
    protected.set("Mul", binary(lua, arith::mul)?)?;
    protected.set("Div", binary(lua, arith::div)?)?;
    protected.set("Mod", binary(lua, arith::modulo)?)?;
    let max_bits = surface.max_exp_bits();
    protected.set(
        "Exp",
        binary(lua, move |a, b| arith::exp_bounded(a, b, max_bits))?,
    )?;

    protected.set(
        "Equals",
        lua.create_function(|lua, (a, b): (Value, Value)| {
            match operands(&a, &b).and_then(|(a, b)| arith::equals(&a, &b)) {
                Ok(eq) => Ok(single(Value::Boolean(eq))),
                Err(e) => failure(lua, &e),
            }
        })?,
    )?;

    protected.set(
        "IsZero",
        lua.create_function(|_, x: Value| {
            Ok(operand_text(&x).map_or(Value::Nil, |s| Value::Boolean(arith::is_zero(&s))))
        })?,
    )?;

    protected.set(
        "HexToString",
        lua.create_function(|lua, x: Value| {
            let Some(text) = operand_text(&x) else {
                return failure(lua, &CapabilityError::InvalidHex(x.type_name().to_string()));
            };
            match hex_to_bytes(&text) {
                Ok(bytes) => Ok(single(Value::String(lua.create_string(bytes)?))),
                Err(e) => failure(lua, &e),
            }
        })?,
    )?;

    protected.set(
        "StringToHex",
        lua.create_function(|lua, x: Value| {
            let bytes = match &x {
                Value::String(s) => s.as_bytes().to_vec(),
                other => match operand_text(other) {
                    Some(text) => text.into_bytes(),
                    None => return Ok(Value::Nil),
                },
            };
            Ok(Value::String(lua.create_string(string_to_hex(&bytes))?))
        })?,
    )?;

    let clock = surface.clone();
    protected.set(
        "TimeMS",
        lua.create_function(move |_, ()| Ok(clock.time_ms()))?,
    )?;

    protected.set(
        "SHA3",
        lua.create_function(|lua, x: Value| {
            let Some(text) = operand_text(&x) else {
                return failure(lua, &CapabilityError::InvalidHex(x.type_name().to_string()));
            };
            match sha3(&text) {
                Ok(digest) => Ok(single(Value::String(lua.create_string(digest)?))),
                Err(e) => failure(lua, &e),
            }
        })?,
    )?;

    protected.set("Print", printer(lua, runtime, surface, CapabilitySurface::print)?)?;
    protected.set("Println", printer(lua, runtime, surface, CapabilitySurface::println)?)?;
    protected.set("Printf", printer(lua, runtime, surface, CapabilitySurface::printf)?)?;

    protected.set(
        "JsonEncode",
        lua.create_function(|lua, value: Value| {
            let encoded = lua
                .from_value::<serde_json::Value>(value)
                .map_err(|e| e.to_string())
                .and_then(|json| json_encode(&json).map_err(|e| e.to_string()));
            match encoded {
                Ok(text) => Ok(single(Value::String(lua.create_string(text)?))),
                Err(message) => pair(lua, Value::Nil, &message),
            }
        })?,
    )?;

    protected.set(
        "JsonDecode",
        lua.create_function(|lua, text: Value| {
            let Some(text) = operand_text(&text) else {
                return pair(lua, Value::Nil, "JsonDecode expects a string");
            };
            match json_decode(&text) {
                Ok(json) => Ok(single(json_to_lua(lua, &json)?)),
                Err(e) => pair(lua, Value::Nil, &e.to_string()),
            }
        })?,
    )?;

    Ok(())
}

/// Make every entry of `protected` visible and read-only through `_G`.
pub(crate) fn guard_globals(lua: &Lua, protected: Table) -> mlua::Result<()> {
    let guard: Function = lua.load(GUARD_GLOBALS).set_name("=guard").eval()?;
    guard.call::<()>(protected)
}

/// Remove base-library entry points that reach the filesystem.
pub(crate) fn strip_unsafe_globals(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    for name in ["dofile", "loadfile", "print"] {
        globals.raw_set(name, Value::Nil)?;
    }
    Ok(())
}

fn operands(a: &Value, b: &Value) -> CapabilityResult<(String, String)> {
    match (operand_text(a), operand_text(b)) {
        (Some(a), Some(b)) => Ok((a, b)),
        (None, _) => Err(CapabilityError::ParseFailure(a.type_name().to_string())),
        (_, None) => Err(CapabilityError::ParseFailure(b.type_name().to_string())),
    }
}

fn binary<F>(lua: &Lua, op: F) -> mlua::Result<Function>
where
    F: Fn(&str, &str) -> CapabilityResult<String> + Send + 'static,
{
    lua.create_function(move |lua, (a, b): (Value, Value)| {
        match operands(&a, &b).and_then(|(a, b)| op(&a, &b)) {
            Ok(encoded) => Ok(single(Value::String(lua.create_string(encoded)?))),
            Err(e) => failure(lua, &e),
        }
    })
}

fn printer(
    lua: &Lua,
    runtime: &str,
    surface: &CapabilitySurface,
    emit: fn(&CapabilitySurface, &str, &[serde_json::Value]),
) -> mlua::Result<Function> {
    let runtime = runtime.to_string();
    let surface = surface.clone();
    lua.create_function(move |lua, args: Variadic<Value>| {
        let json: Vec<_> = args.iter().map(|v| to_json_lossy(lua, v)).collect();
        emit(&surface, &runtime, &json);
        Ok(())
    })
}

fn single(value: Value) -> MultiValue {
    MultiValue::from_vec(vec![value])
}

fn pair(lua: &Lua, first: Value, message: &str) -> mlua::Result<MultiValue> {
    Ok(MultiValue::from_vec(vec![
        first,
        Value::String(lua.create_string(message)?),
    ]))
}

/// `(sentinel, kind)`: NaN for a zero divisor, nil for everything else.
fn failure(lua: &Lua, err: &CapabilityError) -> mlua::Result<MultiValue> {
    let sentinel = match err.kind() {
        ErrorKind::DivisionByZero => Value::Number(f64::NAN),
        _ => Value::Nil,
    };
    pair(lua, sentinel, err.kind().as_str())
}
