//! Value conversion across the sandbox boundary.
//!
//! Host values are `serde_json::Value`. Only plain data crosses: null,
//! booleans, numbers, strings, arrays and string-keyed records. Functions,
//! userdata, threads and host references never do.
//!
//! Lua has no separate array type and no null, so:
//! - JSON null becomes the engine's null sentinel (`api.null`)
//! - arrays carry a marker metatable, which keeps `[]` distinct from `{}`
//! - an unmarked table is an array when its keys are exactly `1..=n`

use crate::error::MarshalError;
use mlua::{Lua, MultiValue, Table, Value};
use serde_json::{Map, Number, Value as JsonValue};

/// Maximum nesting accepted in either direction. Also stops cyclic tables.
pub const MAX_DEPTH: usize = 32;

const ARRAY_MARKER: &str = "__plugbridge_array";
const ARRAY_METATABLE_KEY: &str = "plugbridge.array_metatable";

pub fn to_sandbox(lua: &Lua, value: &JsonValue) -> Result<Value, MarshalError> {
    to_sandbox_at(lua, value, 0)
}

fn to_sandbox_at(lua: &Lua, value: &JsonValue, depth: usize) -> Result<Value, MarshalError> {
    if depth > MAX_DEPTH {
        return Err(MarshalError::TooDeep(MAX_DEPTH));
    }
    let converted = match value {
        JsonValue::Null => Value::NULL,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            // Lua integers are i64; a float would silently lose digits.
            None if n.is_u64() => return Err(MarshalError::NumberOutOfRange(n.to_string())),
            None => Value::Number(n.as_f64().ok_or(MarshalError::NonFiniteNumber)?),
        },
        JsonValue::String(s) => Value::String(lua.create_string(s)?),
        JsonValue::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (index, item) in items.iter().enumerate() {
                table.raw_set(index + 1, to_sandbox_at(lua, item, depth + 1)?)?;
            }
            table.set_metatable(Some(array_metatable(lua)?));
            Value::Table(table)
        }
        JsonValue::Object(fields) => {
            let table = lua.create_table_with_capacity(0, fields.len())?;
            for (key, item) in fields {
                table.raw_set(key.as_str(), to_sandbox_at(lua, item, depth + 1)?)?;
            }
            Value::Table(table)
        }
    };
    Ok(converted)
}

/// Marshals an argument list for a callback invocation.
pub fn to_sandbox_args(lua: &Lua, args: &[JsonValue]) -> Result<MultiValue, MarshalError> {
    let values = args
        .iter()
        .map(|arg| to_sandbox(lua, arg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MultiValue::from_vec(values))
}

pub fn from_sandbox(value: &Value) -> Result<JsonValue, MarshalError> {
    from_sandbox_at(value, 0)
}

fn from_sandbox_at(value: &Value, depth: usize) -> Result<JsonValue, MarshalError> {
    if depth > MAX_DEPTH {
        return Err(MarshalError::TooDeep(MAX_DEPTH));
    }
    match value {
        Value::Nil => Ok(JsonValue::Null),
        Value::LightUserData(ud) if ud.0.is_null() => Ok(JsonValue::Null),
        Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
        Value::Integer(i) => Ok(JsonValue::Number(Number::from(*i))),
        Value::Number(n) => Number::from_f64(*n)
            .map(JsonValue::Number)
            .ok_or(MarshalError::NonFiniteNumber),
        Value::String(s) => s
            .to_str()
            .map(|s| JsonValue::String(s.to_string()))
            .map_err(|_| MarshalError::InvalidUtf8),
        Value::Table(table) => table_from_sandbox(table, depth),
        other => Err(MarshalError::UnsupportedType(other.type_name())),
    }
}

fn table_from_sandbox(table: &Table, depth: usize) -> Result<JsonValue, MarshalError> {
    let marked = is_marked_array(table);
    let mut entries = Vec::new();
    for pair in table.clone().pairs::<Value, Value>() {
        entries.push(pair?);
    }

    if entries.is_empty() {
        return Ok(if marked {
            JsonValue::Array(Vec::new())
        } else {
            JsonValue::Object(Map::new())
        });
    }

    let all_integer_keys = entries.iter().all(|(key, _)| matches!(key, Value::Integer(_)));
    if marked || all_integer_keys {
        let mut indexed = Vec::with_capacity(entries.len());
        for (key, item) in entries {
            match key {
                Value::Integer(i) => indexed.push((i, item)),
                other => return Err(MarshalError::UnsupportedKey(describe_key(&other))),
            }
        }
        indexed.sort_by_key(|(i, _)| *i);
        let gap = indexed
            .iter()
            .enumerate()
            .find(|(position, (i, _))| *i != *position as i64 + 1);
        if let Some((_, (key, _))) = gap {
            return Err(MarshalError::UnsupportedKey(key.to_string()));
        }
        let items = indexed
            .iter()
            .map(|(_, item)| from_sandbox_at(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(JsonValue::Array(items));
    }

    let mut fields = Map::new();
    for (key, item) in entries {
        let key = match key {
            Value::String(s) => s.to_str().map_err(|_| MarshalError::InvalidUtf8)?.to_string(),
            other => return Err(MarshalError::UnsupportedKey(describe_key(&other))),
        };
        fields.insert(key, from_sandbox_at(&item, depth + 1)?);
    }
    Ok(JsonValue::Object(fields))
}

fn is_marked_array(table: &Table) -> bool {
    table
        .metatable()
        .and_then(|mt| mt.raw_get(ARRAY_MARKER).ok())
        .unwrap_or(false)
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => other.type_name().to_string(),
    }
}

/// Shared metatable marking tables that came from JSON arrays.
fn array_metatable(lua: &Lua) -> Result<Table, MarshalError> {
    if let Value::Table(mt) = lua.named_registry_value::<Value>(ARRAY_METATABLE_KEY)? {
        return Ok(mt);
    }
    let mt = lua.create_table()?;
    mt.raw_set(ARRAY_MARKER, true)?;
    lua.set_named_registry_value(ARRAY_METATABLE_KEY, mt.clone())?;
    Ok(mt)
}
