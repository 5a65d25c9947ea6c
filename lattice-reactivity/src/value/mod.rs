//! Dynamic Value Model
//!
//! Observation works on dynamically shaped data: records, sequences, maps and
//! sets whose properties are read and written by key. This module provides
//! that data model.
//!
//! # Layers
//!
//! - [`Target`]: raw structured data with identity. Never tracks.
//! - [`Observable`](crate::Observable): a handle over a target that records
//!   reads and triggers on writes.
//! - [`Ref`](crate::Ref): a single boxed cell.
//!
//! All three are reached through [`Value`], and structured access goes
//! through the [`Traps`] capability interface so raw and observable values
//! are used the same way.
//!
//! # Equality
//!
//! `Value`'s `PartialEq` is SameValue: handles compare by identity, strings
//! by content, `NaN` equals `NaN` and `+0` differs from `-0`. This is the
//! comparison change detection uses (see [`has_changed`]).

mod json;
mod key;
mod target;

pub use json::to_json;
pub use key::{Key, ObjectId, ReactiveFlag, Symbol};
pub use target::{Getter, Setter, Target, TargetKind, MAX_SEQUENCE_LENGTH};

use std::fmt;
use std::rc::Rc;

use crate::observable::Observable;
use crate::reactive::Ref;

/// The capability set every structured value exposes.
///
/// `receiver` is the value the access originally went through. Accessor
/// properties receive it as their `this`, which is how a getter defined on a
/// raw target ends up reading through the observable handle.
pub trait Traps {
    fn get_with(&self, key: &Key, receiver: &Value) -> Value;

    fn set_with(&self, key: Key, value: Value, receiver: &Value) -> bool;

    fn has(&self, key: &Key) -> bool;

    fn delete(&self, key: &Key) -> bool;

    fn own_keys(&self) -> Vec<Key>;
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Symbol(Symbol),
    /// A raw structured value.
    Object(Target),
    /// An observable handle over a structured value.
    Observable(Observable),
    /// A boxed value (plain ref, computed, or field adapter).
    Ref(Ref),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Whether the value is a record, sequence or collection (raw or wrapped).
    pub fn is_structured(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Observable(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(t) => t.kind().name(),
            Value::Observable(o) => o.kind().name(),
            Value::Ref(_) => "ref",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_observable(&self) -> Option<&Observable> {
        match self {
            Value::Observable(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Truthiness in the usual dynamic-language sense.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Identity of a structured value or handle.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(t) => Some(t.id()),
            Value::Observable(o) => Some(o.id()),
            Value::Ref(r) => Some(r.id()),
            _ => None,
        }
    }

    fn traps(&self) -> Option<&dyn Traps> {
        match self {
            Value::Object(t) => Some(t as &dyn Traps),
            Value::Observable(o) => Some(o as &dyn Traps),
            _ => None,
        }
    }

    /// Read a property. Non-structured values yield `Undefined`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        self.traps()
            .map(|t| t.get_with(&key, self))
            .unwrap_or_default()
    }

    /// Write a property. Returns whether the write was accepted.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        match self.traps() {
            Some(t) => t.set_with(key.into(), value.into(), self),
            None => false,
        }
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.traps().map(|t| t.has(&key)).unwrap_or(false)
    }

    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.traps().map(|t| t.delete(&key)).unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.traps().map(|t| t.own_keys()).unwrap_or_default()
    }
}

/// SameValue: identity for handles, content for strings, NaN equal to
/// itself, signed zeros distinct.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x == y && x.is_sign_negative() == y.is_sign_negative()
            }
        }
        _ => loose_identity(a, b),
    }
}

/// Strict equality: NaN never equals anything, signed zeros are equal.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => loose_identity(a, b),
    }
}

/// SameValueZero: like SameValue but signed zeros are equal.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x.is_nan() && y.is_nan()) || x == y,
        _ => loose_identity(a, b),
    }
}

fn loose_identity(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Observable(x), Value::Observable(y)) => x.ptr_eq(y),
        (Value::Ref(x), Value::Ref(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Change detection used by every write path.
pub fn has_changed(new: &Value, old: &Value) -> bool {
    !same_value(new, old)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{:?}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Symbol(sym) => write!(f, "Symbol({})", sym.description()),
            Value::Object(t) => fmt::Debug::fmt(t, f),
            Value::Observable(o) => fmt::Debug::fmt(o, f),
            Value::Ref(r) => fmt::Debug::fmt(r, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Value::Symbol(sym)
    }
}

impl From<&Key> for Value {
    fn from(key: &Key) -> Self {
        match key {
            Key::Str(s) => Value::Str(Rc::clone(s)),
            Key::Index(i) => Value::Number(*i as f64),
            Key::Symbol(sym) => Value::Symbol(sym.clone()),
        }
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Object(t)
    }
}

impl From<Observable> for Value {
    fn from(o: Observable) -> Self {
        Value::Observable(o)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}
