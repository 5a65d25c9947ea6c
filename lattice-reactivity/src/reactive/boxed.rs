//! Boxed Values
//!
//! A [`Ref`] is a single observable cell. Reading it inside an effect
//! subscribes the effect to the cell's own [`Dep`]; writing a different
//! value notifies those subscribers.
//!
//! # Flavours
//!
//! - [`make_ref`]: stores the raw form of the value and hands out the
//!   observable form on read, so structured contents are deeply reactive.
//! - [`shallow_ref`]: stores and returns the value as given. Only replacing
//!   the whole value notifies; see [`trigger_ref`] for in-place changes.
//! - [`to_ref`] / [`to_refs`]: field adapters that expose one property of a
//!   structured value as a box. They own no dep; reads and writes go
//!   through the structure itself.
//!
//! Computed values are boxes as well (`Ref::from(computed)`).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::warn;

use super::runtime::{Dep, Runtime};
use crate::observable::{is_proxy, is_readonly, is_shallow, to_raw, to_reactive};
use crate::value::{has_changed, Key, ObjectId, Value};

/// The behaviour every kind of box provides.
pub(crate) trait BoxedValue {
    fn id(&self) -> ObjectId;

    fn get(&self) -> Value;

    fn set(&self, value: Value);

    /// The dep notified when the box changes, if the box owns one.
    fn dep(&self) -> Option<&Dep> {
        None
    }
}

/// A handle to a boxed value. Cloning yields another handle to the same box.
#[derive(Clone)]
pub struct Ref(Rc<dyn BoxedValue>);

impl Ref {
    pub(crate) fn from_boxed(boxed: Rc<dyn BoxedValue>) -> Self {
        Self(boxed)
    }

    /// Read the current value, tracking it when inside an effect.
    pub fn get(&self) -> Value {
        self.0.get()
    }

    /// Read the current value without subscribing the active effect.
    pub fn get_untracked(&self) -> Value {
        super::context::untracked(|| self.0.get())
    }

    /// Replace the value. Notifies only if it changed.
    pub fn set(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    /// Derive the next value from the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        self.id() == other.id()
    }

    /// Number of effects subscribed to this box's own dep.
    pub fn subscriber_count(&self) -> usize {
        self.0.dep().map(Dep::len).unwrap_or(0)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.id())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Subscribe the active effect to a box's dep.
pub(crate) fn track_ref_value(dep: &Dep) {
    Runtime::track_dep(dep);
}

/// Notify every effect subscribed to a box's dep.
pub(crate) fn trigger_ref_value(dep: &Dep) {
    Runtime::trigger_dep(dep);
}

struct RefImpl {
    id: ObjectId,
    /// Raw form, used for change detection.
    raw: RefCell<Value>,
    /// Form handed out on read.
    value: RefCell<Value>,
    dep: Dep,
    shallow: bool,
}

impl RefImpl {
    fn new(value: Value, shallow: bool) -> Self {
        let (raw, value) = if shallow {
            (value.clone(), value)
        } else {
            (to_raw(&value), to_reactive(value))
        };
        Self {
            id: ObjectId::next(),
            raw: RefCell::new(raw),
            value: RefCell::new(value),
            dep: Dep::new(),
            shallow,
        }
    }
}

impl BoxedValue for RefImpl {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn get(&self) -> Value {
        track_ref_value(&self.dep);
        self.value.borrow().clone()
    }

    fn set(&self, new_value: Value) {
        // Readonly and shallow handles are kept as given so they are not
        // re-wrapped into a mutable deep handle.
        let direct = self.shallow || is_shallow(&new_value) || is_readonly(&new_value);
        let new_raw = if direct {
            new_value.clone()
        } else {
            to_raw(&new_value)
        };
        if !has_changed(&new_raw, &self.raw.borrow()) {
            return;
        }
        let new_value = if direct {
            new_raw.clone()
        } else {
            to_reactive(new_raw.clone())
        };
        *self.raw.borrow_mut() = new_raw;
        *self.value.borrow_mut() = new_value;
        trigger_ref_value(&self.dep);
    }

    fn dep(&self) -> Option<&Dep> {
        Some(&self.dep)
    }
}

/// One property of a structured value, exposed as a box.
struct FieldRef {
    id: ObjectId,
    object: Value,
    key: Key,
    default: Value,
}

impl BoxedValue for FieldRef {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn get(&self) -> Value {
        let value = self.object.get(&self.key);
        if value.is_undefined() {
            self.default.clone()
        } else {
            value
        }
    }

    fn set(&self, value: Value) {
        self.object.set(&self.key, value);
    }
}

/// Box a value. Boxing a box returns it unchanged.
///
/// # Example
///
/// ```rust,ignore
/// let count = make_ref(0);
/// effect({
///     let count = count.clone();
///     move || println!("count: {:?}", count.get())
/// });
/// count.set(1); // prints "count: 1"
/// ```
pub fn make_ref(value: impl Into<Value>) -> Ref {
    create_ref(value.into(), false)
}

/// Box a value without making its contents observable.
pub fn shallow_ref(value: impl Into<Value>) -> Ref {
    create_ref(value.into(), true)
}

fn create_ref(value: Value, shallow: bool) -> Ref {
    match value {
        Value::Ref(r) => r,
        value => Ref(Rc::new(RefImpl::new(value, shallow))),
    }
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// A box's current value, or the input itself if it is not a box.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

/// Expose `object[key]` as a box, falling back to `default` while the field
/// is undefined. A field already holding a box yields that box.
pub fn to_ref(object: &Value, key: impl Into<Key>, default: impl Into<Value>) -> Ref {
    let key = key.into();
    if let Value::Ref(existing) = to_raw(object).get(&key) {
        return existing;
    }
    Ref(Rc::new(FieldRef {
        id: ObjectId::next(),
        object: object.clone(),
        key,
        default: default.into(),
    }))
}

/// One field adapter per own key of `object`, in enumeration order.
pub fn to_refs(object: &Value) -> IndexMap<Key, Ref> {
    if !is_proxy(object) {
        warn!(
            found = object.type_name(),
            "to_refs() expects an observable handle, field refs will not be reactive"
        );
    }
    object
        .keys()
        .into_iter()
        .map(|key| {
            let field = to_ref(object, key.clone(), Value::Undefined);
            (key, field)
        })
        .collect()
}

/// Notify a box's subscribers without changing its value.
///
/// Useful after mutating the contents of a [`shallow_ref`] in place.
pub fn trigger_ref(r: &Ref) {
    if let Some(dep) = r.0.dep() {
        trigger_ref_value(dep);
    }
}
