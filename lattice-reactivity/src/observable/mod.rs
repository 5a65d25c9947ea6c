//! Observable Handles
//!
//! An [`Observable`] wraps a structured value so that reading a property
//! through it subscribes the running effect and writing a property notifies
//! the effects that read it.
//!
//! # Flavours
//!
//! | factory | writes | nested values |
//! |---|---|---|
//! | [`reactive`] | tracked and triggered | wrapped with [`reactive`] on read |
//! | [`shallow_reactive`] | tracked and triggered | returned as stored |
//! | [`readonly`] | ignored | wrapped with [`readonly`] on read |
//! | [`shallow_readonly`] | ignored | returned as stored |
//!
//! # Identity
//!
//! Each flavour keeps a thread-local map from the wrapped value's identity to
//! its live handle, so wrapping the same target twice yields the same handle
//! for as long as that handle is alive. The maps hold handles weakly and
//! drop their entry when the handle goes away.
//!
//! Nested values are wrapped lazily: a handle is only created when a nested
//! structured value is actually read.

mod collection;
mod handlers;
mod sequence;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::value::{Key, ObjectId, Target, TargetKind, Traps, Value};

/// The (readonly, shallow) combination a handle was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl Flavor {
    pub fn is_readonly(&self) -> bool {
        matches!(self, Flavor::Readonly | Flavor::ShallowReadonly)
    }

    pub fn is_shallow(&self) -> bool {
        matches!(self, Flavor::ShallowReactive | Flavor::ShallowReadonly)
    }
}

pub(crate) struct ObservableInner {
    id: ObjectId,
    flavor: Flavor,
    /// What this handle wraps: a raw target, or a reactive handle when a
    /// readonly view was taken of one.
    target: Value,
    /// Innermost raw target. Dependencies are keyed on it.
    raw: Target,
    /// Identity-map key of the wrapped value.
    wrapped_id: ObjectId,
}

impl Drop for ObservableInner {
    fn drop(&mut self) {
        let key = (self.flavor, self.wrapped_id);
        // The map may already be gone during thread teardown.
        let _ = HANDLES.try_with(|handles| {
            if let Ok(mut handles) = handles.try_borrow_mut() {
                if handles.get(&key).is_some_and(|h| h.strong_count() == 0) {
                    handles.remove(&key);
                }
            }
        });
    }
}

thread_local! {
    static HANDLES: RefCell<HashMap<(Flavor, ObjectId), Weak<ObservableInner>>> =
        RefCell::new(HashMap::new());
}

/// A tracking handle over a structured value.
///
/// Cloning yields another reference to the same handle.
#[derive(Clone)]
pub struct Observable(Rc<ObservableInner>);

impl Observable {
    /// Identity of this handle (distinct from the raw target's).
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn flavor(&self) -> Flavor {
        self.0.flavor
    }

    pub fn kind(&self) -> TargetKind {
        self.0.raw.kind()
    }

    pub fn ptr_eq(&self, other: &Observable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The innermost raw target.
    pub fn raw_target(&self) -> &Target {
        &self.0.raw
    }

    /// The value this handle directly wraps.
    pub(crate) fn wrapped(&self) -> &Value {
        &self.0.target
    }

    fn receiver(&self) -> Value {
        Value::Observable(self.clone())
    }

    /// Whether this is the handle the identity map hands out for its target.
    pub(crate) fn is_canonical(&self) -> bool {
        HANDLES.with(|handles| {
            handles
                .borrow()
                .get(&(self.0.flavor, self.0.wrapped_id))
                .and_then(Weak::upgrade)
                .is_some_and(|h| Rc::ptr_eq(&h, &self.0))
        })
    }

    /// Tracked read of one property.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.get_with(&key.into(), &self.receiver())
    }

    /// Write one property. Readonly handles accept and ignore the write.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        self.set_with(key.into(), value.into(), &self.receiver())
    }

    /// Tracked enumeration of the own keys.
    pub fn keys(&self) -> Vec<Key> {
        self.own_keys()
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.id())
            .field("flavor", &self.flavor())
            .field("target", &self.raw_target().id())
            .field("kind", &self.kind())
            .finish()
    }
}

fn create_observable(target: Value, flavor: Flavor) -> Value {
    let raw = match &target {
        Value::Object(t) => t.clone(),
        Value::Observable(o) => {
            // Only a readonly view of a mutable handle adds a layer.
            if !(flavor.is_readonly() && !o.flavor().is_readonly()) {
                return target;
            }
            o.raw_target().clone()
        }
        other => {
            warn!(
                found = other.type_name(),
                "value cannot be made observable, returned unchanged"
            );
            return target;
        }
    };

    let Some(wrapped_id) = target.object_id() else {
        return target;
    };
    let key = (flavor, wrapped_id);
    if let Some(existing) = HANDLES.with(|handles| handles.borrow().get(&key).and_then(Weak::upgrade)) {
        return Value::Observable(Observable(existing));
    }

    if raw.is_marked_raw() || raw.is_frozen() {
        debug!(object = %raw.id(), "target opted out of observation");
        return target;
    }

    let inner = Rc::new(ObservableInner {
        id: ObjectId::next(),
        flavor,
        target,
        raw,
        wrapped_id,
    });
    HANDLES.with(|handles| handles.borrow_mut().insert(key, Rc::downgrade(&inner)));
    Value::Observable(Observable(inner))
}

/// Deeply observable view of `target`.
///
/// Non-structured values, frozen targets and targets passed to [`mark_raw`]
/// are returned unchanged.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(json!({"count": 0}));
/// effect({
///     let state = state.clone();
///     move || println!("count: {:?}", state.get("count"))
/// });
/// state.set("count", 1); // prints "count: 1"
/// ```
pub fn reactive(target: impl Into<Value>) -> Value {
    create_observable(target.into(), Flavor::Reactive)
}

/// Observable view that tracks only the root level.
pub fn shallow_reactive(target: impl Into<Value>) -> Value {
    create_observable(target.into(), Flavor::ShallowReactive)
}

/// Read-only view of `target`. Reads are tracked, writes are ignored.
pub fn readonly(target: impl Into<Value>) -> Value {
    create_observable(target.into(), Flavor::Readonly)
}

/// Read-only view that does not wrap nested values.
pub fn shallow_readonly(target: impl Into<Value>) -> Value {
    create_observable(target.into(), Flavor::ShallowReadonly)
}

/// [`reactive`] for structured values, identity for everything else.
pub fn to_reactive(value: Value) -> Value {
    if value.is_structured() {
        reactive(value)
    } else {
        value
    }
}

/// [`readonly`] for structured values, identity for everything else.
pub fn to_readonly(value: Value) -> Value {
    if value.is_structured() {
        readonly(value)
    } else {
        value
    }
}

/// Whether `value` is a mutable observable handle, or a readonly view of one.
pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Observable(o) if o.flavor().is_readonly() => is_reactive(o.wrapped()),
        Value::Observable(_) => true,
        _ => false,
    }
}

pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Observable(o) if o.flavor().is_readonly())
}

pub fn is_shallow(value: &Value) -> bool {
    matches!(value, Value::Observable(o) if o.flavor().is_shallow())
}

/// Whether `value` is any kind of observable handle.
pub fn is_proxy(value: &Value) -> bool {
    matches!(value, Value::Observable(_))
}

/// Strip every observable layer, returning the innermost raw value.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Observable(o) => Value::Object(o.raw_target().clone()),
        other => other.clone(),
    }
}

/// Opt a structured value out of observation for good.
pub fn mark_raw(value: Value) -> Value {
    if let Value::Object(target) = &value {
        target.mark_skip();
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapping_is_stable() {
        let raw = Value::from(json!({"a": 1}));
        let first = reactive(raw.clone());
        let second = reactive(raw.clone());
        assert_eq!(first, second);
        assert_eq!(reactive(first.clone()), first);
        assert_ne!(first, raw);
    }

    #[test]
    fn flavours_are_distinct_handles() {
        let raw = Value::from(json!({"a": 1}));
        let mutable = reactive(raw.clone());
        let view = readonly(raw.clone());
        assert_ne!(mutable, view);
        assert!(is_reactive(&mutable));
        assert!(!is_reactive(&view));
        assert!(is_readonly(&view));
        assert!(is_proxy(&view));
        assert_eq!(readonly(view.clone()), view);
    }

    #[test]
    fn readonly_over_reactive_adds_a_layer() {
        let state = reactive(json!({"a": 1}));
        let view = readonly(state.clone());
        assert_ne!(view, state);
        assert!(is_readonly(&view));
        assert!(is_reactive(&view));
        assert_eq!(to_raw(&view), to_raw(&state));
        // a mutable wrap of a readonly view is the view itself
        assert_eq!(reactive(view.clone()), view);
    }

    #[test]
    fn invalid_targets_are_returned_unchanged() {
        assert_eq!(reactive(1), Value::from(1));
        assert_eq!(reactive("text"), Value::from("text"));

        let opted_out = mark_raw(Value::from(json!({})));
        assert_eq!(reactive(opted_out.clone()), opted_out);

        let frozen = Target::record();
        frozen.freeze();
        let frozen = Value::from(frozen);
        assert_eq!(readonly(frozen.clone()), frozen);
    }

    #[test]
    fn to_raw_strips_every_layer() {
        let raw = Value::from(json!({"a": 1}));
        let layered = readonly(reactive(raw.clone()));
        assert_eq!(to_raw(&layered), raw);
        assert_eq!(to_raw(&raw), raw);
        assert_eq!(to_raw(&Value::from(2)), Value::from(2));
    }

    #[test]
    fn dropped_handles_leave_the_identity_map() {
        let target = Target::record();
        let key = {
            let handle = reactive(target.clone());
            let observable = handle.as_observable().cloned().unwrap();
            assert!(observable.is_canonical());
            (observable.flavor(), observable.0.wrapped_id)
        };
        assert!(HANDLES.with(|handles| !handles.borrow().contains_key(&key)));
    }
}
