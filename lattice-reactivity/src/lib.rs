//! Lattice Reactivity
//!
//! This crate provides the fine-grained reactivity core of the Lattice
//! framework. It implements:
//!
//! - Observable handles over dynamically shaped data (records, sequences,
//!   maps and sets)
//! - Automatic dependency tracking between reads and the effects that
//!   performed them
//! - Computed values, boxed values (refs) and watchers built on top
//!
//! Observation is in-process, single-threaded and synchronous: every write
//! re-runs the affected effects before it returns.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic data model (`Value`, `Key`, `Target`)
//! - `observable`: tracking handles and their property traps
//! - `reactive`: effects, the dependency store, computed values, refs and
//!   watchers
//! - `error`: the error type for operations a value cannot perform
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_reactivity::{computed, effect, reactive, Value};
//! use serde_json::json;
//!
//! let state = reactive(json!({"count": 0}));
//!
//! // A derived value
//! let doubled = computed({
//!     let state = state.clone();
//!     move || Value::from(state.get("count").as_f64().unwrap_or(0.0) * 2.0)
//! });
//!
//! // An effect, alive for as long as its runner is
//! let _runner = effect({
//!     let state = state.clone();
//!     move || println!("count: {:?}, doubled: {:?}", state.get("count"), doubled.value())
//! });
//!
//! // Update the state
//! state.set("count", 5);
//! // Effect automatically runs, prints: "count: 5.0, doubled: 10.0"
//! ```

pub mod error;
pub mod observable;
pub mod reactive;
pub mod value;

pub use error::{ReactiveError, Result};
pub use observable::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly, Flavor, Observable,
};
pub use reactive::{
    computed, effect, effect_with, is_ref, make_ref, shallow_ref, stop, to_ref, to_refs,
    trigger_ref, unref, untracked, watch, writable_computed, Computed, EffectOptions,
    EffectRunner, OnCleanup, ReactiveEffect, Ref, WatchHandle, WatchOptions, WatchSource,
};
pub use value::{has_changed, to_json, Key, Symbol, Target, TargetKind, Traps, Value};
