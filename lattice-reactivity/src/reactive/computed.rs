//! Computed Implementation
//!
//! A computed value is a cached derivation that recomputes only when read
//! after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside an effect, so every read it performs is
//!    tracked. It does not run at construction; the first read runs it.
//!
//! 2. Reading `value()` subscribes the reader to the computed's own dep,
//!    then recomputes only if the cached value is dirty.
//!
//! 3. When an upstream dependency changes, the effect's scheduler does not
//!    recompute. It marks the cache dirty and, only on the clean -> dirty
//!    edge, notifies the computed's own subscribers.
//!
//! # Why This Matters
//!
//! - A source changes several times in a row
//! - Each change reaches the computed
//! - Only the first one propagates; nothing recomputes until someone reads
//!
//! Computed effects are notified ahead of plain effects, so an effect that
//! reads both a source and a computed derived from it never observes a
//! stale cache.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::boxed::{track_ref_value, trigger_ref_value, BoxedValue, Ref};
use super::effect::ReactiveEffect;
use super::runtime::Dep;
use crate::value::{ObjectId, Value};

struct ComputedInner {
    id: ObjectId,
    dep: Dep,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    effect: ReactiveEffect,
    setter: Option<Box<dyn Fn(Value)>>,
}

impl BoxedValue for ComputedInner {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn get(&self) -> Value {
        track_ref_value(&self.dep);
        if self.dirty.replace(false) {
            let value = self.effect.run();
            *self.value.borrow_mut() = value;
        }
        self.value.borrow().clone()
    }

    fn set(&self, value: Value) {
        match &self.setter {
            Some(setter) => setter(value),
            None => warn!(computed = %self.id, "write to a computed value without a setter ignored"),
        }
    }

    fn dep(&self) -> Option<&Dep> {
        Some(&self.dep)
    }
}

impl Drop for ComputedInner {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// A cached derived value.
///
/// Cloning yields another handle to the same cache. The underlying effect
/// is stopped once every handle (including `Ref`s made from it) is gone.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(json!({"a": 1, "b": 2}));
/// let sum = computed({
///     let state = state.clone();
///     move || Value::from(state.get("a").as_f64().unwrap_or(0.0) + state.get("b").as_f64().unwrap_or(0.0))
/// });
/// assert_eq!(sum.value(), Value::from(3));
/// ```
#[derive(Clone)]
pub struct Computed(Rc<ComputedInner>);

impl Computed {
    fn new(getter: Box<dyn Fn() -> Value>, setter: Option<Box<dyn Fn(Value)>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner>| {
            let weak = weak.clone();
            let effect = ReactiveEffect::build(
                getter,
                Some(Rc::new(move |_: &ReactiveEffect| {
                    if let Some(inner) = weak.upgrade() {
                        if !inner.dirty.replace(true) {
                            trigger_ref_value(&inner.dep);
                        }
                    }
                })),
                true,
            );
            ComputedInner {
                id: ObjectId::next(),
                dep: Dep::new(),
                value: RefCell::new(Value::Undefined),
                dirty: Cell::new(true),
                effect,
                setter,
            }
        });
        Self(inner)
    }

    /// Current value, recomputed first if a dependency changed.
    pub fn value(&self) -> Value {
        self.0.get()
    }

    /// Forward a write to the setter. Without one, the write is ignored.
    pub fn set_value(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    /// Whether the computed was built without a setter.
    pub fn is_readonly(&self) -> bool {
        self.0.setter.is_none()
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// The effect running the getter.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.0.effect
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("dirty", &self.is_dirty())
            .field("readonly", &self.is_readonly())
            .finish()
    }
}

impl From<Computed> for Ref {
    fn from(computed: Computed) -> Self {
        Ref::from_boxed(computed.0)
    }
}

impl From<Computed> for Value {
    fn from(computed: Computed) -> Self {
        Value::Ref(Ref::from(computed))
    }
}

/// Derive a readonly value from `getter`.
pub fn computed<F>(getter: F) -> Computed
where
    F: Fn() -> Value + 'static,
{
    Computed::new(Box::new(getter), None)
}

/// Derive a value that forwards writes to `setter`.
pub fn writable_computed<G, S>(getter: G, setter: S) -> Computed
where
    G: Fn() -> Value + 'static,
    S: Fn(Value) + 'static,
{
    Computed::new(Box::new(getter), Some(Box::new(setter)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, effect_with, make_ref, EffectOptions};

    fn counter() -> Rc<Cell<i32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn computed_is_lazy_and_cached() {
        let source = make_ref(2);
        let runs = counter();
        let (source_clone, runs_clone) = (source.clone(), runs.clone());

        let doubled = computed(move || {
            runs_clone.set(runs_clone.get() + 1);
            Value::from(source_clone.get().as_f64().unwrap_or(0.0) * 2.0)
        });
        assert_eq!(runs.get(), 0);

        assert_eq!(doubled.value(), Value::from(4));
        assert_eq!(doubled.value(), Value::from(4));
        assert_eq!(runs.get(), 1);

        source.set(5);
        assert!(doubled.is_dirty());
        assert_eq!(runs.get(), 1);

        assert_eq!(doubled.value(), Value::from(10));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn dependents_are_notified_once_per_dirty_edge() {
        let source = make_ref(1);
        let source_clone = source.clone();
        let derived = computed(move || source_clone.get());

        let runs = counter();
        let (derived_clone, runs_clone) = (derived.clone(), runs.clone());
        let _runner = effect(move || {
            derived_clone.value();
            runs_clone.set(runs_clone.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        source.set(2);
        assert_eq!(runs.get(), 2);
        assert_eq!(derived.value(), Value::from(2));
    }

    #[test]
    fn dirty_computed_does_not_renotify() {
        let source = make_ref(1);
        let source_clone = source.clone();
        let derived = computed(move || source_clone.get());

        // Subscribes on creation and never re-runs, so the cache stays dirty.
        let notified = counter();
        let (derived_clone, notified_clone) = (derived.clone(), notified.clone());
        let _runner = effect_with(
            move || {
                derived_clone.value();
            },
            EffectOptions::new().scheduler(move |_| notified_clone.set(notified_clone.get() + 1)),
        );

        source.set(2);
        assert_eq!(notified.get(), 1);
        source.set(3);
        assert_eq!(notified.get(), 1);

        assert_eq!(derived.value(), Value::from(3));
        source.set(4);
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn effect_sees_fresh_computed() {
        let source = make_ref(1);
        let source_clone = source.clone();
        let plus_one = computed(move || Value::from(source_clone.get().as_f64().unwrap_or(0.0) + 1.0));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (source_clone, plus_one_clone, seen_clone) = (source.clone(), plus_one.clone(), seen.clone());
        let _runner = effect(move || {
            let a = source_clone.get().as_f64().unwrap_or(0.0);
            let b = plus_one_clone.value().as_f64().unwrap_or(0.0);
            seen_clone.borrow_mut().push(b - a);
        });

        source.set(10);
        assert!(seen.borrow().iter().all(|diff| *diff == 1.0));
    }

    #[test]
    fn writable_computed_forwards_writes() {
        let source = make_ref(1);
        let (get_source, set_source) = (source.clone(), source.clone());
        let mirror = writable_computed(move || get_source.get(), move |v| set_source.set(v));

        assert!(!mirror.is_readonly());
        mirror.set_value(7);
        assert_eq!(source.get(), Value::from(7));
        assert_eq!(mirror.value(), Value::from(7));
    }

    #[test]
    fn readonly_computed_ignores_writes() {
        let fixed = computed(|| Value::from("fixed"));
        assert!(fixed.is_readonly());
        fixed.set_value("other");
        assert_eq!(fixed.value(), Value::from("fixed"));
    }

    #[test]
    fn computed_as_ref() {
        let source = make_ref(3);
        let source_clone = source.clone();
        let boxed = Ref::from(computed(move || source_clone.get()));
        assert_eq!(boxed.get(), Value::from(3));
        source.set(4);
        assert_eq!(boxed.get(), Value::from(4));
    }

    #[test]
    fn dropping_the_last_handle_stops_the_effect() {
        let source = make_ref(1);
        let source_clone = source.clone();
        let derived = computed(move || source_clone.get());
        derived.value();
        let effect = derived.effect().clone();
        assert!(effect.is_active());
        assert_eq!(source.subscriber_count(), 1);

        drop(derived);
        assert!(!effect.is_active());
        assert_eq!(source.subscriber_count(), 0);
    }
}
