//! Watchers
//!
//! A watcher runs a callback with `(new, old)` whenever its source changes.
//!
//! # How It Works
//!
//! The source is turned into a getter and run inside an effect whose
//! scheduler is the watch job. When a dependency of the getter changes, the
//! job:
//!
//! 1. runs the cleanup the previous callback registered, if any,
//! 2. re-runs the effect to obtain the new value,
//! 3. calls the callback with the new and the previous value,
//! 4. keeps the new value as the next "previous".
//!
//! Watching an observable handle directly watches it deeply. Deep watching
//! walks the whole value on every run so that every nested property ends up
//! as a dependency.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::boxed::Ref;
use super::computed::Computed;
use super::effect::ReactiveEffect;
use crate::observable::{is_reactive, Observable};
use crate::value::{ObjectId, Value};

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// A box; its value is read.
    Ref(Ref),
    /// An observable handle, always watched deeply.
    Observable(Observable),
    /// An arbitrary getter.
    Getter(Rc<dyn Fn() -> Value>),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }

    /// Classify a dynamic value.
    ///
    /// Anything other than a box or a reactive handle cannot change and is
    /// watched as a getter that always yields `Undefined`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Ref(r) => WatchSource::Ref(r),
            Value::Observable(o) if is_reactive(&Value::Observable(o.clone())) => {
                WatchSource::Observable(o)
            }
            other => {
                warn!(found = other.type_name(), "invalid watch source, nothing will be observed");
                WatchSource::getter(|| Value::Undefined)
            }
        }
    }
}

impl From<Ref> for WatchSource {
    fn from(r: Ref) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<Computed> for WatchSource {
    fn from(c: Computed) -> Self {
        WatchSource::Ref(Ref::from(c))
    }
}

impl From<Observable> for WatchSource {
    fn from(o: Observable) -> Self {
        WatchSource::Observable(o)
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        WatchSource::from_value(value)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            WatchSource::Observable(o) => f.debug_tuple("Observable").field(o).finish(),
            WatchSource::Getter(_) => f.write_str("Getter"),
        }
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Call the callback once at setup, with the current value as both
    /// arguments.
    pub immediate: bool,
    /// Track every nested property of the value.
    pub deep: bool,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }
}

type Cleanup = Box<dyn FnOnce()>;

/// Registrar passed to watch callbacks.
///
/// A callback registers the teardown for the work it started; the watcher
/// runs it before the next callback, or when the watcher is stopped.
#[derive(Clone, Default)]
pub struct OnCleanup(Rc<RefCell<Option<Cleanup>>>);

impl OnCleanup {
    /// Register `f`, replacing any earlier registration.
    pub fn register(&self, f: impl FnOnce() + 'static) {
        *self.0.borrow_mut() = Some(Box::new(f));
    }

    fn run(&self) {
        let pending = self.0.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.0.borrow().is_some())
            .finish()
    }
}

type Callback = Box<dyn Fn(&Value, &Value, &OnCleanup)>;

struct WatchJob {
    callback: Callback,
    old: RefCell<Value>,
    cleanup: OnCleanup,
}

impl WatchJob {
    fn run(&self, effect: &ReactiveEffect) {
        self.cleanup.run();
        let new = effect.run();
        let old = self.old.replace(new.clone());
        (self.callback)(&new, &old, &self.cleanup);
    }
}

/// Handle to a running watcher.
///
/// The handle owns the watcher: once every clone is dropped the watcher is
/// gone. A cleanup still pending at that point is discarded without running;
/// call [`stop`](WatchHandle::stop) to run it.
#[derive(Clone, Debug)]
#[must_use = "dropping the handle ends the watcher"]
pub struct WatchHandle {
    effect: ReactiveEffect,
    cleanup: OnCleanup,
}

impl WatchHandle {
    /// Stop watching and run any pending cleanup.
    pub fn stop(&self) {
        self.effect.stop();
        self.cleanup.run();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }
}

/// Call `callback(new, old, on_cleanup)` whenever `source` changes.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(json!({"x": 1}));
/// let handle = watch(
///     WatchSource::getter({
///         let state = state.clone();
///         move || state.get("x")
///     }),
///     |new, old, _| println!("x: {:?} -> {:?}", old, new),
///     WatchOptions::default(),
/// );
/// state.set("x", 5); // prints "x: 1 -> 5"
/// handle.stop();
/// ```
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    S: Into<WatchSource>,
    F: Fn(&Value, &Value, &OnCleanup) + 'static,
{
    let mut deep = options.deep;
    let getter: Box<dyn Fn() -> Value> = match source.into() {
        WatchSource::Ref(r) => Box::new(move || r.get()),
        WatchSource::Observable(o) => {
            deep = true;
            Box::new(move || Value::Observable(o.clone()))
        }
        WatchSource::Getter(f) => Box::new(move || f()),
    };
    let getter: Box<dyn Fn() -> Value> = if deep {
        Box::new(move || {
            let value = getter();
            traverse(&value, &mut HashSet::new());
            value
        })
    } else {
        getter
    };

    let cleanup = OnCleanup::default();
    let job = Rc::new(WatchJob {
        callback: Box::new(callback),
        old: RefCell::new(Value::Undefined),
        cleanup: cleanup.clone(),
    });
    let scheduled = Rc::clone(&job);
    let effect = ReactiveEffect::build(
        getter,
        Some(Rc::new(move |effect: &ReactiveEffect| scheduled.run(effect))),
        false,
    );

    let initial = effect.run();
    *job.old.borrow_mut() = initial.clone();
    if options.immediate {
        (job.callback)(&initial, &initial, &job.cleanup);
    }

    WatchHandle { effect, cleanup }
}

/// Read every property reachable from `value`, once per structured value.
///
/// Inside an effect this subscribes it to the whole graph. `seen` guards
/// against cycles.
pub fn traverse(value: &Value, seen: &mut HashSet<ObjectId>) {
    let Some(id) = value.object_id() else {
        return;
    };
    if !seen.insert(id) {
        return;
    }
    match value {
        Value::Ref(r) => traverse(&r.get(), seen),
        Value::Object(_) | Value::Observable(_) => {
            for key in value.keys() {
                traverse(&value.get(&key), seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::reactive;
    use crate::reactive::make_ref;
    use serde_json::json;
    use std::cell::Cell;

    type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Calls, impl Fn(&Value, &Value, &OnCleanup) + 'static) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let calls_clone = calls.clone();
        (calls, move |new: &Value, old: &Value, _: &OnCleanup| {
            calls_clone.borrow_mut().push((new.clone(), old.clone()))
        })
    }

    #[test]
    fn watch_ref_reports_new_and_old() {
        let count = make_ref(1);
        let (calls, callback) = recorder();
        let _handle = watch(count.clone(), callback, WatchOptions::default());
        assert!(calls.borrow().is_empty());

        count.set(2);
        count.set(3);
        assert_eq!(
            *calls.borrow(),
            vec![
                (Value::from(2), Value::from(1)),
                (Value::from(3), Value::from(2))
            ]
        );
    }

    #[test]
    fn immediate_calls_with_current_value_twice() {
        let state = reactive(json!({"x": 1}));
        let (calls, callback) = recorder();
        let state_clone = state.clone();
        let _handle = watch(
            WatchSource::getter(move || state_clone.get("x")),
            callback,
            WatchOptions::new().immediate(true),
        );
        assert_eq!(*calls.borrow(), vec![(Value::from(1), Value::from(1))]);

        state.set("x", 5);
        assert_eq!(calls.borrow().len(), 2);
        assert_eq!(calls.borrow()[1], (Value::from(5), Value::from(1)));
    }

    #[test]
    fn watching_a_handle_is_deep() {
        let state = reactive(json!({"nested": {"list": [1, 2]}}));
        let (calls, callback) = recorder();
        let _handle = watch(state.clone(), callback, WatchOptions::default());

        state.get("nested").get("list").set(0usize, 10);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0].0, state);
    }

    #[test]
    fn deep_option_applies_to_getters() {
        let state = reactive(json!({"inner": {"x": 1}}));
        let (shallow_calls, shallow_cb) = recorder();
        let (deep_calls, deep_cb) = recorder();
        let (a, b) = (state.clone(), state.clone());
        let _shallow = watch(
            WatchSource::getter(move || a.get("inner")),
            shallow_cb,
            WatchOptions::new(),
        );
        let _deep = watch(
            WatchSource::getter(move || b.get("inner")),
            deep_cb,
            WatchOptions::new().deep(true),
        );

        state.get("inner").set("x", 2);
        assert_eq!(shallow_calls.borrow().len(), 0);
        assert_eq!(deep_calls.borrow().len(), 1);
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let count = make_ref(0);
        let cleanups = Rc::new(Cell::new(0));
        let cleanups_clone = cleanups.clone();
        let handle = watch(
            count.clone(),
            move |_, _, on_cleanup| {
                let cleanups = cleanups_clone.clone();
                on_cleanup.register(move || cleanups.set(cleanups.get() + 1));
            },
            WatchOptions::default(),
        );

        count.set(1);
        assert_eq!(cleanups.get(), 0);
        count.set(2);
        assert_eq!(cleanups.get(), 1);

        handle.stop();
        assert_eq!(cleanups.get(), 2);
        assert!(!handle.is_active());
        count.set(3);
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn dropping_the_handle_ends_the_watcher() {
        let count = make_ref(0);
        let (calls, callback) = recorder();
        let handle = watch(count.clone(), callback, WatchOptions::default());

        count.set(1);
        drop(handle);
        count.set(2);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn invalid_source_never_fires() {
        let (calls, callback) = recorder();
        let handle = watch(Value::from(3), callback, WatchOptions::new().immediate(true));
        assert_eq!(*calls.borrow(), vec![(Value::Undefined, Value::Undefined)]);
        assert_eq!(handle.effect().dependency_count(), 0);
    }

    #[test]
    fn traverse_survives_cycles() {
        let state = reactive(json!({"a": {}}));
        state.get("a").set("back", state.clone());

        let mut seen = HashSet::new();
        traverse(&state, &mut seen);
        assert_eq!(seen.len(), 2);

        // break the cycle so both targets can be dropped
        state.get("a").delete("back");
    }
}
