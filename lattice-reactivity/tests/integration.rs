//! Integration Tests for the Reactivity Core
//!
//! These tests verify that observable handles, effects, computed values,
//! refs and watchers work together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lattice_reactivity::{
    computed, effect, effect_with, make_ref, reactive, readonly, stop, to_json, to_raw, to_refs,
    unref, watch, EffectOptions, Observable, ReactiveEffect, Value, WatchOptions, WatchSource,
};
use serde_json::json;

fn counter() -> Rc<Cell<i32>> {
    Rc::new(Cell::new(0))
}

fn as_number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

/// Test that wrapping the same value always yields the same handle.
#[test]
fn wrapping_is_identity_stable() {
    let raw = Value::from(json!({"a": {"b": 1}}));
    let state = reactive(raw.clone());

    assert_eq!(reactive(raw), state);
    assert_eq!(reactive(state.clone()), state);
    assert_eq!(state.get("a"), state.get("a"));
}

/// An effect reading a key twice is still notified once per write.
#[test]
fn subscription_is_idempotent() {
    let state = reactive(json!({"a": 1}));
    let runs = counter();

    let (state_clone, runs_clone) = (state.clone(), runs.clone());
    let _runner = effect(move || {
        state_clone.get("a");
        state_clone.get("a");
        runs_clone.set(runs_clone.get() + 1);
    });

    state.set("a", 2);
    assert_eq!(runs.get(), 2);
}

/// Switching branches drops the subscription to the branch not taken.
#[test]
fn branch_switching_drops_stale_dependencies() {
    let state = reactive(json!({"flag": false, "x": 1, "y": 1}));
    let runs = counter();

    let (state_clone, runs_clone) = (state.clone(), runs.clone());
    let _runner = effect(move || {
        if state_clone.get("flag").is_truthy() {
            state_clone.get("x");
        } else {
            state_clone.get("y");
        }
        runs_clone.set(runs_clone.get() + 1);
    });

    state.set("x", 2);
    assert_eq!(runs.get(), 1);
    state.set("y", 2);
    assert_eq!(runs.get(), 2);

    state.set("flag", true);
    assert_eq!(runs.get(), 3);

    state.set("y", 3);
    assert_eq!(runs.get(), 3);
    state.set("x", 3);
    assert_eq!(runs.get(), 4);
}

/// Identical values, NaN over NaN, do not notify; +0 over -0 does.
#[test]
fn change_detection() {
    let state = reactive(json!({"v": null}));
    let runs = counter();

    let (state_clone, runs_clone) = (state.clone(), runs.clone());
    let _runner = effect(move || {
        state_clone.get("v");
        runs_clone.set(runs_clone.get() + 1);
    });

    let child = Value::from(json!({}));
    state.set("v", child.clone());
    state.set("v", child);
    assert_eq!(runs.get(), 2);

    state.set("v", f64::NAN);
    state.set("v", f64::NAN);
    assert_eq!(runs.get(), 3);

    state.set("v", -0.0);
    state.set("v", 0.0);
    assert_eq!(runs.get(), 5);
}

/// Test that a computed value recomputes lazily, once per change.
#[test]
fn computed_is_lazy() {
    let state = reactive(json!({"a": 1, "b": 2}));
    let calls = counter();

    let (state_clone, calls_clone) = (state.clone(), calls.clone());
    let sum = computed(move || {
        calls_clone.set(calls_clone.get() + 1);
        Value::from(as_number(&state_clone.get("a")) + as_number(&state_clone.get("b")))
    });

    assert_eq!(sum.value(), Value::from(3));
    assert_eq!(sum.value(), Value::from(3));
    assert_eq!(calls.get(), 1);

    state.set("a", 10);
    state.set("b", 20);
    assert_eq!(calls.get(), 1);

    assert_eq!(sum.value(), Value::from(30));
    assert_eq!(calls.get(), 2);
}

/// Adding and deleting keys notifies enumeration; overwriting does not.
#[test]
fn keyed_collection_classification() {
    let state = reactive(json!({"a": 1}));
    let key_reads = counter();
    let enumerations = counter();

    let (state_clone, key_clone) = (state.clone(), key_reads.clone());
    let _reader = effect(move || {
        state_clone.get("b");
        key_clone.set(key_clone.get() + 1);
    });
    let (state_clone, enum_clone) = (state.clone(), enumerations.clone());
    let _enumerator = effect(move || {
        state_clone.keys();
        enum_clone.set(enum_clone.get() + 1);
    });

    state.set("b", 1);
    assert_eq!((key_reads.get(), enumerations.get()), (2, 2));

    state.set("b", 2);
    assert_eq!((key_reads.get(), enumerations.get()), (3, 2));

    state.delete("b");
    assert_eq!((key_reads.get(), enumerations.get()), (4, 3));
}

/// Appending notifies length readers, and search sees through handles.
#[test]
fn ordered_sequence_semantics() {
    let list = reactive(json!([{"id": 1}]));
    let observable: Observable = list.as_observable().cloned().unwrap();
    let length_reads = counter();

    let (list_clone, runs_clone) = (list.clone(), length_reads.clone());
    let _runner = effect(move || {
        list_clone.get("length");
        runs_clone.set(runs_clone.get() + 1);
    });

    observable.push([json!({"id": 2})]).unwrap();
    assert_eq!(length_reads.get(), 2);

    let first_handle = list.get(0usize);
    let first_raw = to_raw(&first_handle);
    assert!(observable.includes(&first_handle).unwrap());
    assert!(observable.includes(&first_raw).unwrap());
    assert_eq!(observable.index_of(&first_handle).unwrap(), Some(0));
}

/// Scenario: an effect on a counter.
#[test]
fn scenario_counter_effect() {
    let state = reactive(json!({"count": 0}));
    let runs = counter();

    let (state_clone, runs_clone) = (state.clone(), runs.clone());
    let _runner = effect(move || {
        state_clone.get("count");
        runs_clone.set(runs_clone.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    state.set("count", 1);
    assert_eq!(runs.get(), 2);
    state.set("count", 1);
    assert_eq!(runs.get(), 2);
}

/// Scenario: a derived sum.
#[test]
fn scenario_derived_sum() {
    let state = reactive(json!({"a": 1, "b": 2}));
    let calls = counter();

    let (state_clone, calls_clone) = (state.clone(), calls.clone());
    let c = computed(move || {
        calls_clone.set(calls_clone.get() + 1);
        Value::from(as_number(&state_clone.get("a")) + as_number(&state_clone.get("b")))
    });

    c.value();
    c.value();
    assert_eq!(calls.get(), 1);

    state.set("a", 5);
    assert_eq!(c.value(), Value::from(7));
    assert_eq!(calls.get(), 2);
}

/// Scenario: an immediate watcher.
#[test]
fn scenario_immediate_watch() {
    let state = reactive(json!({"x": 1}));
    let calls: Rc<RefCell<Vec<(Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));

    let (state_clone, calls_clone) = (state.clone(), calls.clone());
    let _handle = watch(
        WatchSource::getter(move || state_clone.get("x")),
        move |new, old, _| calls_clone.borrow_mut().push((new.clone(), old.clone())),
        WatchOptions::new().immediate(true),
    );
    assert_eq!(*calls.borrow(), vec![(Value::from(1), Value::from(1))]);

    state.set("x", 5);
    assert_eq!(
        *calls.borrow(),
        vec![
            (Value::from(1), Value::from(1)),
            (Value::from(5), Value::from(1))
        ]
    );
}

/// Test that nested effects restore the outer effect as the active subscriber.
#[test]
fn nested_effects_track_independently() {
    let state = reactive(json!({"outer": 0, "inner": 0}));
    let outer_runs = counter();
    let inner_runs = counter();

    let (state_clone, outer_clone, inner_clone) =
        (state.clone(), outer_runs.clone(), inner_runs.clone());
    let inner_effects: Rc<RefCell<Vec<ReactiveEffect>>> = Rc::new(RefCell::new(Vec::new()));
    let inner_effects_clone = inner_effects.clone();
    let _outer = effect(move || {
        outer_clone.set(outer_clone.get() + 1);
        let (state, inner_runs) = (state_clone.clone(), inner_clone.clone());
        let runner = effect(move || {
            state.get("inner");
            inner_runs.set(inner_runs.get() + 1);
        });
        inner_effects_clone.borrow_mut().push(runner.effect().clone());
        state_clone.get("outer");
    });

    state.set("inner", 1);
    assert_eq!(outer_runs.get(), 1);
    assert_eq!(inner_runs.get(), 2);

    state.set("outer", 1);
    assert_eq!(outer_runs.get(), 2);

    for inner in inner_effects.borrow().iter() {
        inner.stop();
    }
}

/// An effect that writes what it reads does not re-trigger itself.
#[test]
fn self_writes_do_not_recurse() {
    let state = reactive(json!({"n": 0}));
    let state_clone = state.clone();
    let _runner = effect(move || {
        let n = as_number(&state_clone.get("n"));
        state_clone.set("n", n + 1.0);
    });
    assert_eq!(state.get("n"), Value::from(1));

    state.set("n", 10);
    assert_eq!(state.get("n"), Value::from(11));
}

/// Test that a scheduler can defer re-runs.
#[test]
fn scheduler_defers_reruns() {
    let state = reactive(json!({"n": 0}));
    let queue: Rc<RefCell<Vec<ReactiveEffect>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (state_clone, seen_clone, queue_clone) = (state.clone(), seen.clone(), queue.clone());
    let runner = effect_with(
        move || seen_clone.borrow_mut().push(state_clone.get("n")),
        EffectOptions::new().scheduler(move |effect| queue_clone.borrow_mut().push(effect.clone())),
    );

    state.set("n", 1);
    state.set("n", 2);
    assert_eq!(seen.borrow().len(), 1);

    let pending: Vec<ReactiveEffect> = queue.borrow_mut().drain(..).collect();
    assert_eq!(pending.len(), 2);
    pending[0].run();
    assert_eq!(*seen.borrow().last().unwrap(), Value::from(2));

    stop(&runner);
}

/// Readonly views reject writes but still follow the data underneath.
#[test]
fn readonly_views_follow_their_source() {
    let state = reactive(json!({"user": {"name": "ada"}}));
    let view = readonly(state.clone());
    let names = Rc::new(RefCell::new(Vec::new()));

    let (view_clone, names_clone) = (view.clone(), names.clone());
    let _runner = effect(move || {
        names_clone
            .borrow_mut()
            .push(view_clone.get("user").get("name"));
    });

    view.get("user").set("name", "eve");
    state.get("user").set("name", "grace");
    assert_eq!(*names.borrow(), vec![Value::from("ada"), Value::from("grace")]);
}

/// Field refs stay connected to the structure they came from.
#[test]
fn field_refs_round_trip() {
    let state = reactive(json!({"x": 1, "y": 2}));
    let refs = to_refs(&state);
    let x = refs[0].clone();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (x_clone, seen_clone) = (x.clone(), seen.clone());
    let _runner = effect(move || seen_clone.borrow_mut().push(x_clone.get()));

    state.set("x", 5);
    x.set(6);
    assert_eq!(state.get("x"), Value::from(6));
    assert_eq!(
        *seen.borrow(),
        vec![Value::from(1), Value::from(5), Value::from(6)]
    );
    assert_eq!(unref(&Value::from(x)), Value::from(6));
}

/// Refs stored in a record behave like plain fields.
#[test]
fn refs_inside_records_unwrap() {
    let count = make_ref(1);
    let state = reactive(json!({}));
    state.set("count", count.clone());

    let runs = counter();
    let (state_clone, runs_clone) = (state.clone(), runs.clone());
    let _runner = effect(move || {
        state_clone.get("count");
        runs_clone.set(runs_clone.get() + 1);
    });

    count.set(2);
    assert_eq!(runs.get(), 2);
    state.set("count", 3);
    assert_eq!(count.get(), Value::from(3));
    assert_eq!(runs.get(), 3);
}

/// Test that snapshots do not subscribe the running effect.
#[test]
fn snapshots_are_untracked() {
    let state = reactive(json!({"items": [1, 2], "meta": {"ok": true}}));
    let runs = counter();

    let (state_clone, runs_clone) = (state.clone(), runs.clone());
    let _runner = effect(move || {
        to_json(&state_clone).unwrap();
        runs_clone.set(runs_clone.get() + 1);
    });

    state.set("meta", json!({"ok": false}));
    assert_eq!(runs.get(), 1);
    assert_eq!(
        to_json(&state).unwrap(),
        json!({"items": [1, 2], "meta": {"ok": false}})
    );
}
