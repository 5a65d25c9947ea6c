//! JSON conversion.
//!
//! Fixtures are most conveniently written with `serde_json::json!`, so any
//! `serde_json::Value` converts into a fresh raw [`Value`]. The reverse
//! direction takes a snapshot of the raw data behind any handles without
//! recording dependencies.

use std::collections::HashSet;

use serde::ser::{Error as _, Serialize, Serializer};
use serde_json::{Map, Number};

use super::{Key, ObjectId, Target, TargetKind, Traps, Value};
use crate::error::{ReactiveError, Result};
use crate::observable::to_raw;
use crate::reactive::untracked;

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Object(Target::sequence(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(fields) => {
                let target = Target::record();
                let receiver = Value::Object(target.clone());
                for (key, value) in fields {
                    target.set_with(Key::from(key), Value::from(value), &receiver);
                }
                receiver
            }
        }
    }
}

/// Snapshot a value as JSON.
///
/// Handles are unwrapped to their raw data and refs are read untracked.
/// Undefined fields are omitted, undefined elements become `null`, and
/// symbol keys are skipped. Fails on cycles.
pub fn to_json(value: &Value) -> Result<serde_json::Value> {
    untracked(|| {
        let mut ancestors = HashSet::new();
        snapshot(value, &mut ancestors)
    })
}

fn number(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        serde_json::Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Symbol(_) => None,
        k => Some(k.to_string()),
    }
}

fn snapshot(value: &Value, ancestors: &mut HashSet<ObjectId>) -> Result<serde_json::Value> {
    let target = match to_raw(value) {
        Value::Undefined | Value::Null | Value::Symbol(_) => return Ok(serde_json::Value::Null),
        Value::Bool(b) => return Ok(serde_json::Value::Bool(b)),
        Value::Number(n) => return Ok(number(n)),
        Value::Str(s) => return Ok(serde_json::Value::String(s.to_string())),
        Value::Ref(r) => return snapshot(&r.get(), ancestors),
        Value::Object(target) => target,
        // to_raw never leaves an observable behind
        Value::Observable(_) => return Ok(serde_json::Value::Null),
    };

    if !ancestors.insert(target.id()) {
        return Err(ReactiveError::CyclicValue);
    }
    let receiver = Value::Object(target.clone());
    let json = match target.kind() {
        TargetKind::Sequence => {
            let items = target
                .raw_values()
                .iter()
                .map(|item| snapshot(item, ancestors))
                .collect::<Result<Vec<_>>>()?;
            serde_json::Value::Array(items)
        }
        TargetKind::Set => {
            let members = target
                .own_keys()
                .iter()
                .map(|key| snapshot(&Value::from(key), ancestors))
                .collect::<Result<Vec<_>>>()?;
            serde_json::Value::Array(members)
        }
        TargetKind::Record | TargetKind::Map => {
            let mut fields = Map::new();
            for key in target.own_keys() {
                let Some(name) = key_name(&key) else {
                    continue;
                };
                let field = target.get_with(&key, &receiver);
                if field.is_undefined() {
                    continue;
                }
                fields.insert(name, snapshot(&field, ancestors)?);
            }
            serde_json::Value::Object(fields)
        }
    };
    ancestors.remove(&target.id());
    Ok(json)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        to_json(self)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}
