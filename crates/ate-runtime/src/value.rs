//! Host values that can be bound into a runtime, and conversions between
//! host-native JSON values and interpreter values.

use mlua::{Lua, LuaSerdeExt, MultiValue, SerializeOptions, Table, Value, Variadic};
use std::fmt;
use std::sync::Arc;

/// A host function callable from scripts.
///
/// Arguments and the result cross the boundary as JSON values. An `Err`
/// is raised inside the script as a runtime error.
pub type HostFunction =
    Arc<dyn Fn(Vec<serde_json::Value>) -> Result<serde_json::Value, String> + Send + Sync>;

/// Something the host can expose to scripts under a global name.
#[derive(Clone)]
pub enum ApiValue {
    /// Plain data.
    Value(serde_json::Value),

    /// A free function, called as `name(args...)`.
    Function(HostFunction),

    /// A table of members. Function members are methods and are called
    /// as `name:member(args...)`; the receiver is not passed to the host.
    Object(Vec<(String, ApiValue)>),
}

impl ApiValue {
    /// Wrap a closure as a host function.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        ApiValue::Function(Arc::new(f))
    }

    /// Start an empty object.
    pub fn object() -> Self {
        ApiValue::Object(Vec::new())
    }

    /// Add a member to an object. Has no effect on other variants.
    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<ApiValue>) -> Self {
        if let ApiValue::Object(members) = &mut self {
            members.push((name.into(), value.into()));
        }
        self
    }

    /// Build the interpreter value for this binding.
    pub(crate) fn to_lua(&self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            ApiValue::Value(json) => json_to_lua(lua, json),
            ApiValue::Function(f) => Ok(Value::Function(host_function(lua, Arc::clone(f), false)?)),
            ApiValue::Object(members) => Ok(Value::Table(host_object(lua, members)?)),
        }
    }
}

impl From<serde_json::Value> for ApiValue {
    fn from(value: serde_json::Value) -> Self {
        ApiValue::Value(value)
    }
}

impl fmt::Debug for ApiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ApiValue::Function(_) => f.write_str("Function(..)"),
            ApiValue::Object(members) => f
                .debug_map()
                .entries(members.iter().map(|(k, v)| (k, v)))
                .finish(),
        }
    }
}

fn host_object(lua: &Lua, members: &[(String, ApiValue)]) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (name, member) in members {
        let value = match member {
            ApiValue::Function(f) => Value::Function(host_function(lua, Arc::clone(f), true)?),
            other => other.to_lua(lua)?,
        };
        table.set(name.as_str(), value)?;
    }
    Ok(table)
}

fn host_function(lua: &Lua, f: HostFunction, method: bool) -> mlua::Result<mlua::Function> {
    lua.create_function(move |lua, args: Variadic<Value>| {
        let skip = usize::from(method && !args.is_empty());
        let json_args = args
            .iter()
            .skip(skip)
            .map(|v| lua.from_value::<serde_json::Value>(v.clone()))
            .collect::<mlua::Result<Vec<_>>>()?;
        match f(json_args) {
            Ok(result) => json_to_lua(lua, &result),
            Err(message) => Err(mlua::Error::RuntimeError(message)),
        }
    })
}

/// Convert host arguments into interpreter values.
pub(crate) fn to_lua_args(
    lua: &Lua,
    receiver: Option<Value>,
    args: &[serde_json::Value],
) -> mlua::Result<MultiValue> {
    let mut values = Vec::with_capacity(args.len() + 1);
    values.extend(receiver);
    for arg in args {
        values.push(json_to_lua(lua, arg)?);
    }
    Ok(MultiValue::from_vec(values))
}

/// Convert a JSON value for the interpreter. JSON `null` becomes `nil`.
pub(crate) fn json_to_lua(lua: &Lua, json: &serde_json::Value) -> mlua::Result<Value> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(json, options)
}

/// Best-effort JSON view of a value, used for logging arguments.
///
/// Values with no JSON form (functions, userdata) render as their type name.
pub(crate) fn to_json_lossy(lua: &Lua, value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => {
            serde_json::Value::String(String::from_utf8_lossy(&s.as_bytes()).into_owned())
        }
        other => lua
            .from_value::<serde_json::Value>(other.clone())
            .unwrap_or_else(|_| serde_json::Value::String(format!("<{}>", other.type_name()))),
    }
}

/// Text form of a numeric operand: strings as-is, integral numbers in decimal.
pub(crate) fn operand_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(String::from_utf8_lossy(&s.as_bytes()).into_owned()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(format!("{n:.0}")),
        _ => None,
    }
}
