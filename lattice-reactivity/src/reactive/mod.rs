//! Reactive Primitives
//!
//! This module implements the dependency-tracking core: effects, computed
//! values, boxed values and watchers, plus the runtime that connects reads
//! to writes.
//!
//! # Concepts
//!
//! ## Effects
//!
//! An effect is a computation that re-runs whenever data it read changes.
//! Every other primitive here is built on it.
//!
//! ## Computed Values
//!
//! A computed value caches the result of a getter and recomputes only when
//! read after a dependency changed.
//!
//! ## Refs
//!
//! A ref is a single observable cell, for values that are not structured
//! or that need to be replaced wholesale.
//!
//! ## Watchers
//!
//! A watcher calls back with the new and previous value of a source
//! whenever it changes.
//!
//! # Implementation Notes
//!
//! Tracking is automatic: the running effect and the tracking-enabled flag
//! live in thread-local stacks (see [`ReactiveContext`]), and every tracked
//! read consults them. Each thread is an independent reactive world.

mod boxed;
mod computed;
mod context;
mod effect;
mod runtime;
mod subscriber;
mod watch;

pub use boxed::{is_ref, make_ref, shallow_ref, to_ref, to_refs, trigger_ref, unref, Ref};
pub use computed::{computed, writable_computed, Computed};
pub use context::{
    enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked, ReactiveContext,
    TrackingPause,
};
pub use effect::{
    effect, effect_with, stop, EffectOptions, EffectRunner, EffectState, ReactiveEffect,
    Scheduler,
};
pub use runtime::{Dep, DepKey, Runtime, TrackOp, TriggerOp};
pub use subscriber::SubscriberId;
pub use watch::{traverse, watch, OnCleanup, WatchHandle, WatchOptions, WatchSource};
