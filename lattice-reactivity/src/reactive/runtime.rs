//! Reactive Runtime
//!
//! The runtime owns the dependency store and implements the two primitives
//! everything else is built from: [`Runtime::track`] and [`Runtime::trigger`].
//!
//! # How It Works
//!
//! 1. The store maps a target's identity to a table of `DepKey -> Dep`.
//!    Entries are created lazily on the first tracked read.
//!
//! 2. When an effect reads a property while tracking is enabled, the effect
//!    is added to that property's [`Dep`] and the dep is recorded on the
//!    effect, so the effect can unsubscribe itself before its next run.
//!
//! 3. When a property is written, the runtime resolves which deps are
//!    affected (the key itself, plus iteration markers or the sequence
//!    length depending on the kind of change), snapshots their subscribers
//!    into one deduplicated list, and notifies each once.
//!
//! # Ownership
//!
//! The store does not keep targets alive: it is keyed by [`ObjectId`] and a
//! target's entry is removed when the target itself is dropped. Deps and
//! effects only refer to each other weakly, so a subscribed effect does not
//! keep the data it read alive, and a dropped effect leaves its deps.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::context::{is_tracking, ReactiveContext};
use super::effect::{ReactiveEffect, WeakEffect};
use super::subscriber::SubscriberId;
use crate::value::{Key, ObjectId, Target, TargetKind, Value};

/// Which slot of a target a dependency refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// An ordinary property (including a sequence's `length`).
    Key(Key),
    /// Enumeration of the target's keys or values.
    Iterate,
    /// Enumeration of a map's keys only.
    MapKeyIterate,
}

impl From<Key> for DepKey {
    fn from(key: Key) -> Self {
        DepKey::Key(key)
    }
}

/// Kind of read being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of write being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing key received a different value.
    Set,
    /// A key that did not exist was created.
    Add,
    /// An existing key was removed.
    Delete,
    /// Every entry of a collection was removed.
    Clear,
}

pub(crate) struct DepInner {
    subscribers: RefCell<IndexMap<SubscriberId, WeakEffect>>,
}

/// The set of effects subscribed to one (target, key) slot, or to a boxed value.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

/// Non-owning reference from an effect back to a dep it is subscribed to.
#[derive(Clone)]
pub(crate) struct WeakDep(Weak<DepInner>);

impl WeakDep {
    pub(crate) fn upgrade(&self) -> Option<Dep> {
        self.0.upgrade().map(Dep)
    }
}

impl Dep {
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            subscribers: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.0.subscribers.borrow().contains_key(&id)
    }

    /// Returns true if the effect was not already subscribed.
    fn add(&self, effect: &ReactiveEffect) -> bool {
        let mut subscribers = self.0.subscribers.borrow_mut();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), effect.downgrade());
        true
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        // An effect dropped mid-snapshot leaves a dead entry; snapshots skip it.
        if let Ok(mut subscribers) = self.0.subscribers.try_borrow_mut() {
            subscribers.shift_remove(&id);
        }
    }

    pub(crate) fn downgrade(&self) -> WeakDep {
        WeakDep(Rc::downgrade(&self.0))
    }

    fn snapshot(&self) -> Vec<ReactiveEffect> {
        self.0
            .subscribers
            .borrow()
            .values()
            .filter_map(WeakEffect::upgrade)
            .collect()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep").field("subscribers", &self.len()).finish()
    }
}

type DepsMap = HashMap<DepKey, Dep>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<ObjectId, DepsMap>> = RefCell::new(HashMap::new());
}

/// The dependency store and its track/trigger protocol.
pub struct Runtime;

impl Runtime {
    /// Record that the active effect read `key` on `target`.
    ///
    /// Does nothing when no effect is running or tracking is paused.
    pub fn track(target: &Target, op: TrackOp, key: DepKey) {
        if !is_tracking() {
            return;
        }
        let Some(effect) = ReactiveContext::current_effect() else {
            return;
        };
        trace!(object = %target.id(), ?op, ?key, subscriber = %effect.id(), "track");
        let dep = TARGET_MAP.with(|map| {
            map.borrow_mut()
                .entry(target.id())
                .or_default()
                .entry(key)
                .or_default()
                .clone()
        });
        Self::track_effect(&dep, &effect);
    }

    /// Record that the active effect read a boxed value owning `dep`.
    pub fn track_dep(dep: &Dep) {
        if !is_tracking() {
            return;
        }
        if let Some(effect) = ReactiveContext::current_effect() {
            Self::track_effect(dep, &effect);
        }
    }

    fn track_effect(dep: &Dep, effect: &ReactiveEffect) {
        if dep.add(effect) {
            effect.record_dep(dep);
        }
    }

    /// Propagate a write on `target`.
    ///
    /// `new_value` is only consulted for `length` writes on sequences, where
    /// it decides which index deps fell out of bounds.
    pub fn trigger(target: &Target, op: TriggerOp, key: Option<&Key>, new_value: Option<&Value>) {
        let deps = TARGET_MAP.with(|map| {
            let map = map.borrow();
            match map.get(&target.id()) {
                Some(deps_map) => Self::resolve(deps_map, target.kind(), op, key, new_value),
                None => SmallVec::new(),
            }
        });
        if deps.is_empty() {
            return;
        }
        trace!(object = %target.id(), ?op, ?key, deps = deps.len(), "trigger");

        let mut effects: IndexMap<SubscriberId, ReactiveEffect> = IndexMap::new();
        for dep in &deps {
            for effect in dep.snapshot() {
                effects.entry(effect.id()).or_insert(effect);
            }
        }
        Self::run_effects(effects.into_values().collect());
    }

    /// Notify every subscriber of a boxed value's dep.
    pub fn trigger_dep(dep: &Dep) {
        Self::run_effects(dep.snapshot());
    }

    fn resolve(
        deps_map: &DepsMap,
        kind: TargetKind,
        op: TriggerOp,
        key: Option<&Key>,
        new_value: Option<&Value>,
    ) -> SmallVec<[Dep; 4]> {
        let mut deps: SmallVec<[Dep; 4]> = SmallVec::new();

        if op == TriggerOp::Clear {
            for dep in deps_map.values() {
                deps.push(dep.clone());
            }
            return deps;
        }

        let is_sequence = kind == TargetKind::Sequence;
        if is_sequence && key.is_some_and(Key::is_length) {
            let new_len = new_value
                .and_then(Value::as_f64)
                .map(|n| n as usize)
                .unwrap_or(0);
            for (dep_key, dep) in deps_map {
                let affected = match dep_key {
                    DepKey::Key(k) if k.is_length() => true,
                    DepKey::Key(Key::Index(i)) => *i >= new_len,
                    _ => false,
                };
                if affected {
                    deps.push(dep.clone());
                }
            }
            return deps;
        }

        let mut push = |dep_key: &DepKey| {
            if let Some(dep) = deps_map.get(dep_key) {
                deps.push(dep.clone());
            }
        };
        if let Some(key) = key {
            push(&DepKey::Key(key.clone()));
        }
        let is_map = kind == TargetKind::Map;
        match op {
            TriggerOp::Add => {
                if !is_sequence {
                    push(&DepKey::Iterate);
                    if is_map {
                        push(&DepKey::MapKeyIterate);
                    }
                } else if key.and_then(Key::as_index).is_some() {
                    push(&DepKey::Key(Key::length()));
                }
            }
            TriggerOp::Delete => {
                if !is_sequence {
                    push(&DepKey::Iterate);
                    if is_map {
                        push(&DepKey::MapKeyIterate);
                    }
                }
            }
            TriggerOp::Set => {
                if is_map {
                    push(&DepKey::Iterate);
                }
            }
            TriggerOp::Clear => {}
        }
        deps
    }

    fn run_effects(effects: Vec<ReactiveEffect>) {
        let current = ReactiveContext::current_subscriber();
        // Computed values are marked dirty before any effect that might read
        // them re-runs.
        let (computed, plain): (Vec<_>, Vec<_>) =
            effects.into_iter().partition(ReactiveEffect::is_computed);
        for effect in computed.into_iter().chain(plain) {
            if Some(effect.id()) == current {
                continue;
            }
            effect.notify();
        }
    }

    /// Drop the dependency table of a target that no longer exists.
    pub(crate) fn forget_target(id: ObjectId) {
        // The store may already be gone during thread teardown.
        let _ = TARGET_MAP.try_with(|map| {
            if let Ok(mut map) = map.try_borrow_mut() {
                map.remove(&id);
            }
        });
    }

    /// Number of effects subscribed to `key` on `target`.
    pub fn subscriber_count(target: &Target, key: &DepKey) -> usize {
        TARGET_MAP.with(|map| {
            map.borrow()
                .get(&target.id())
                .and_then(|deps| deps.get(key))
                .map(Dep::len)
                .unwrap_or(0)
        })
    }

    /// Whether the store holds a dependency table for `target`.
    pub fn has_deps(target: &Target) -> bool {
        TARGET_MAP.with(|map| map.borrow().contains_key(&target.id()))
    }
}
