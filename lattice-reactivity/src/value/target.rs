//! Raw structured values.
//!
//! A [`Target`] is the plain data an observable handle wraps. It knows
//! nothing about tracking: its [`Traps`] implementation is the "reflect"
//! layer the observable handlers delegate to after recording dependencies.
//!
//! Borrows of the inner `RefCell` are never held across calls into user code
//! (accessor closures) so getters may freely read other properties.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::key::{Key, ObjectId};
use super::{Traps, Value};
use crate::reactive::Runtime;

/// Getter for an accessor property. Receives the receiver the read went
/// through, so reads of other fields resolve via the observable handle.
pub type Getter = Rc<dyn Fn(&Value) -> Value>;

/// Setter for an accessor property. Receives the receiver and the new value.
pub type Setter = Rc<dyn Fn(&Value, Value)>;

/// Largest length a sequence may reach. Index writes at or beyond it, and
/// `length` writes above it, are rejected.
pub const MAX_SEQUENCE_LENGTH: usize = u32::MAX as usize;

/// The shape of a structured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Keyed record with string/symbol keys and optional accessors.
    Record,
    /// Ordered sequence indexed by position, with a `length` key.
    Sequence,
    /// Keyed collection whose values participate in iteration.
    Map,
    /// Collection of unique keys.
    Set,
}

impl TargetKind {
    pub fn name(&self) -> &'static str {
        match self {
            TargetKind::Record => "record",
            TargetKind::Sequence => "sequence",
            TargetKind::Map => "map",
            TargetKind::Set => "set",
        }
    }

    pub(crate) fn is_collection(&self) -> bool {
        matches!(self, TargetKind::Map | TargetKind::Set)
    }
}

#[derive(Clone)]
pub(crate) enum Property {
    Data(Value),
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
}

pub(crate) enum TargetData {
    Record(IndexMap<Key, Property>),
    Sequence(Vec<Value>),
    Map(IndexMap<Key, Value>),
    Set(IndexSet<Key>),
}

impl TargetData {
    fn kind(&self) -> TargetKind {
        match self {
            TargetData::Record(_) => TargetKind::Record,
            TargetData::Sequence(_) => TargetKind::Sequence,
            TargetData::Map(_) => TargetKind::Map,
            TargetData::Set(_) => TargetKind::Set,
        }
    }
}

struct TargetInner {
    id: ObjectId,
    kind: TargetKind,
    data: RefCell<TargetData>,
    /// Set by `mark_raw`; the target is never wrapped.
    skip: Cell<bool>,
    /// Frozen targets reject writes and cannot be wrapped.
    frozen: Cell<bool>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
    }
}

/// A reference-counted structured value with identity.
///
/// Cloning a `Target` yields another handle to the **same** data.
#[derive(Clone)]
pub struct Target(Rc<TargetInner>);

impl Target {
    fn from_data(data: TargetData) -> Self {
        Self(Rc::new(TargetInner {
            id: ObjectId::next(),
            kind: data.kind(),
            data: RefCell::new(data),
            skip: Cell::new(false),
            frozen: Cell::new(false),
        }))
    }

    /// Create an empty keyed record.
    pub fn record() -> Self {
        Self::from_data(TargetData::Record(IndexMap::new()))
    }

    /// Create an ordered sequence from the given items.
    pub fn sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::from_data(TargetData::Sequence(
            items.into_iter().map(Into::into).collect(),
        ))
    }

    /// Create an empty map collection.
    pub fn map() -> Self {
        Self::from_data(TargetData::Map(IndexMap::new()))
    }

    /// Create a set collection from the given members.
    pub fn set<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self::from_data(TargetData::Set(
            members.into_iter().map(Into::into).collect(),
        ))
    }

    /// Builder-style insert, used to assemble fixtures.
    pub fn with(self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        let receiver = Value::Object(self.clone());
        self.set_with(key.into(), value.into(), &receiver);
        self
    }

    /// Define a computed-style getter on a record.
    pub fn define_getter<F>(&self, key: impl Into<Key>, get: F)
    where
        F: Fn(&Value) -> Value + 'static,
    {
        self.define_accessor(key, Some(Rc::new(get)), None);
    }

    /// Define an accessor property on a record. Has no effect on other kinds.
    pub fn define_accessor(&self, key: impl Into<Key>, get: Option<Getter>, set: Option<Setter>) {
        if let TargetData::Record(props) = &mut *self.0.data.borrow_mut() {
            props.insert(key.into(), Property::Accessor { get, set });
        }
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> TargetKind {
        self.0.kind
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of entries, elements or members. Does not track.
    pub fn len(&self) -> usize {
        match &*self.0.data.borrow() {
            TargetData::Record(props) => props.len(),
            TargetData::Sequence(items) => items.len(),
            TargetData::Map(entries) => entries.len(),
            TargetData::Set(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prevent any further writes. Frozen targets are never wrapped.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub(crate) fn mark_skip(&self) {
        self.0.skip.set(true);
    }

    pub fn is_marked_raw(&self) -> bool {
        self.0.skip.get()
    }

    /// Whether the key is an own slot of this target.
    ///
    /// For sequences this means the index is in bounds; `length` is always
    /// present.
    pub fn has_own(&self, key: &Key) -> bool {
        match &*self.0.data.borrow() {
            TargetData::Record(props) => props.contains_key(key),
            TargetData::Sequence(items) => match key {
                Key::Index(i) => *i < items.len(),
                k => k.is_length(),
            },
            TargetData::Map(entries) => entries.contains_key(key),
            TargetData::Set(members) => members.contains(key),
        }
    }

    /// Snapshot of the stored values, in iteration order. Accessors are
    /// skipped and set members yield their keys as values.
    pub(crate) fn raw_values(&self) -> Vec<Value> {
        match &*self.0.data.borrow() {
            TargetData::Record(props) => props
                .values()
                .filter_map(|p| match p {
                    Property::Data(v) => Some(v.clone()),
                    Property::Accessor { .. } => None,
                })
                .collect(),
            TargetData::Sequence(items) => items.clone(),
            TargetData::Map(entries) => entries.values().cloned().collect(),
            TargetData::Set(members) => members.iter().map(Value::from).collect(),
        }
    }

    /// Remove every entry of a map or set. Returns false for other kinds.
    pub(crate) fn clear_collection(&self) -> bool {
        match &mut *self.0.data.borrow_mut() {
            TargetData::Map(entries) => entries.clear(),
            TargetData::Set(members) => members.clear(),
            _ => return false,
        }
        true
    }

    fn set_length(items: &mut Vec<Value>, value: &Value) -> bool {
        match value.as_f64() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= MAX_SEQUENCE_LENGTH as f64 => {
                Self::resize_items(items, n as usize)
            }
            _ => false,
        }
    }

    /// Resize to `len`, padding with `Undefined`. Fails instead of aborting
    /// when the storage cannot be reserved.
    fn resize_items(items: &mut Vec<Value>, len: usize) -> bool {
        if len > items.len() && items.try_reserve(len - items.len()).is_err() {
            return false;
        }
        items.resize(len, Value::Undefined);
        true
    }
}

impl Traps for Target {
    fn get_with(&self, key: &Key, receiver: &Value) -> Value {
        let getter = match &*self.0.data.borrow() {
            TargetData::Record(props) => match props.get(key) {
                Some(Property::Data(v)) => return v.clone(),
                Some(Property::Accessor { get: Some(get), .. }) => Rc::clone(get),
                _ => return Value::Undefined,
            },
            TargetData::Sequence(items) => {
                return match key {
                    Key::Index(i) => items.get(*i).cloned().unwrap_or_default(),
                    k if k.is_length() => Value::Number(items.len() as f64),
                    _ => Value::Undefined,
                };
            }
            TargetData::Map(entries) => return entries.get(key).cloned().unwrap_or_default(),
            TargetData::Set(members) => return Value::Bool(members.contains(key)),
        };
        getter(receiver)
    }

    fn set_with(&self, key: Key, value: Value, receiver: &Value) -> bool {
        if self.is_frozen() {
            return false;
        }
        let setter = {
            let mut data = self.0.data.borrow_mut();
            match &mut *data {
                TargetData::Record(props) => match props.get_mut(&key) {
                    Some(Property::Accessor { set: Some(set), .. }) => Rc::clone(set),
                    Some(Property::Accessor { set: None, .. }) => return false,
                    Some(Property::Data(slot)) => {
                        *slot = value;
                        return true;
                    }
                    None => {
                        props.insert(key, Property::Data(value));
                        return true;
                    }
                },
                TargetData::Sequence(items) => {
                    return match key {
                        Key::Index(i) => {
                            let Some(needed) =
                                i.checked_add(1).filter(|&n| n <= MAX_SEQUENCE_LENGTH)
                            else {
                                return false;
                            };
                            if needed > items.len() && !Self::resize_items(items, needed) {
                                return false;
                            }
                            items[i] = value;
                            true
                        }
                        k if k.is_length() => Self::set_length(items, &value),
                        _ => false,
                    };
                }
                TargetData::Map(entries) => {
                    entries.insert(key, value);
                    return true;
                }
                TargetData::Set(members) => {
                    members.insert(key);
                    return true;
                }
            }
        };
        setter(receiver, value);
        true
    }

    fn has(&self, key: &Key) -> bool {
        self.has_own(key)
    }

    fn delete(&self, key: &Key) -> bool {
        if self.is_frozen() {
            return false;
        }
        match &mut *self.0.data.borrow_mut() {
            TargetData::Record(props) => {
                props.shift_remove(key);
            }
            TargetData::Sequence(items) => {
                // Deleting an element leaves a hole; the length is unchanged.
                if let Some(slot) = key.as_index().and_then(|i| items.get_mut(i)) {
                    *slot = Value::Undefined;
                } else if key.is_length() {
                    return false;
                }
            }
            TargetData::Map(entries) => {
                entries.shift_remove(key);
            }
            TargetData::Set(members) => {
                members.shift_remove(key);
            }
        }
        true
    }

    fn own_keys(&self) -> Vec<Key> {
        match &*self.0.data.borrow() {
            TargetData::Record(props) => props.keys().cloned().collect(),
            TargetData::Sequence(items) => (0..items.len()).map(Key::Index).collect(),
            TargetData::Map(entries) => entries.keys().cloned().collect(),
            TargetData::Set(members) => members.iter().cloned().collect(),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}
