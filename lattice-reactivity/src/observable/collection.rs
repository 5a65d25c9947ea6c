//! Map and set helpers, plus whole-value reads shared by every kind.
//!
//! Membership, lookup and removal on maps and sets go through the ordinary
//! traps. What is added here is the part that has no property equivalent:
//! set insertion, clearing, and tracked enumeration of values.

use tracing::debug;

use super::{reactive, readonly, Observable};
use crate::error::{ReactiveError, Result};
use crate::reactive::{DepKey, Runtime, TrackOp, TriggerOp};
use crate::value::{Key, TargetKind, Traps, Value};

impl Observable {
    fn require_collection(&self, method: &'static str) -> Result<()> {
        let kind = self.kind();
        if kind.is_collection() {
            Ok(())
        } else {
            Err(ReactiveError::NotACollection {
                method,
                found: kind.name(),
            })
        }
    }

    fn wrap_nested(&self, value: Value) -> Value {
        if self.flavor().is_shallow() || !value.is_structured() {
            value
        } else if self.flavor().is_readonly() {
            readonly(value)
        } else {
            reactive(value)
        }
    }

    /// Insert `key` into a set. Returns whether it was newly added.
    pub fn add(&self, key: impl Into<Key>) -> Result<bool> {
        if self.kind() != TargetKind::Set {
            return Err(ReactiveError::NotACollection {
                method: "add",
                found: self.kind().name(),
            });
        }
        let key = key.into();
        if self.flavor().is_readonly() {
            debug!(object = %self.raw_target().id(), %key, "add through readonly handle ignored");
            return Ok(false);
        }
        let target = self.raw_target();
        if target.has_own(&key) {
            return Ok(false);
        }
        target.set_with(key.clone(), Value::Bool(true), &Value::Object(target.clone()));
        Runtime::trigger(target, TriggerOp::Add, Some(&key), None);
        Ok(true)
    }

    /// Remove every entry of a map or set.
    pub fn clear(&self) -> Result<()> {
        self.require_collection("clear")?;
        if self.flavor().is_readonly() {
            debug!(object = %self.raw_target().id(), "clear through readonly handle ignored");
            return Ok(());
        }
        let target = self.raw_target();
        let had_entries = !target.is_empty();
        target.clear_collection();
        if had_entries {
            Runtime::trigger(target, TriggerOp::Clear, None, None);
        }
        Ok(())
    }

    /// Tracked entry count.
    ///
    /// For sequences this reads the length; for everything else it depends
    /// on the target's shape.
    pub fn len(&self) -> usize {
        let target = self.raw_target();
        match self.kind() {
            TargetKind::Sequence => {
                Runtime::track(target, TrackOp::Get, DepKey::Key(Key::length()));
            }
            _ => Runtime::track(target, TrackOp::Iterate, DepKey::Iterate),
        }
        target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked snapshot of the values, wrapped like property reads.
    ///
    /// Set members are returned as their keys.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Tracked snapshot of `(key, value)` pairs in iteration order.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        let target = self.raw_target();
        match self.kind() {
            TargetKind::Record | TargetKind::Sequence => {
                let receiver = Value::Observable(self.clone());
                self.own_keys()
                    .into_iter()
                    .map(|key| {
                        let value = self.get_with(&key, &receiver);
                        (key, value)
                    })
                    .collect()
            }
            TargetKind::Map => {
                Runtime::track(target, TrackOp::Iterate, DepKey::Iterate);
                let receiver = Value::Object(target.clone());
                target
                    .own_keys()
                    .into_iter()
                    .map(|key| {
                        let value = self.wrap_nested(target.get_with(&key, &receiver));
                        (key, value)
                    })
                    .collect()
            }
            TargetKind::Set => {
                Runtime::track(target, TrackOp::Iterate, DepKey::Iterate);
                target
                    .own_keys()
                    .into_iter()
                    .map(|key| {
                        let value = Value::from(&key);
                        (key, value)
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::reactive::effect;
    use crate::value::Target;

    fn observe(target: Target) -> Observable {
        reactive(target).as_observable().cloned().unwrap()
    }

    fn count_runs(read: impl Fn() + 'static) -> (Rc<Cell<i32>>, crate::reactive::EffectRunner) {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let runner = effect(move || {
            read();
            runs_clone.set(runs_clone.get() + 1);
        });
        (runs, runner)
    }

    #[test]
    fn map_value_writes_notify_iteration_but_not_key_enumeration() {
        let map = observe(Target::map().with("a", 1));
        let (values_clone, keys_clone) = (map.clone(), map.clone());
        let (value_runs, _values) = count_runs(move || {
            values_clone.values();
        });
        let (key_runs, _keys) = count_runs(move || {
            keys_clone.keys();
        });

        map.set("a", 2);
        assert_eq!((value_runs.get(), key_runs.get()), (2, 1));

        map.set("b", 1);
        assert_eq!((value_runs.get(), key_runs.get()), (3, 2));

        map.delete(&Key::from("a"));
        assert_eq!((value_runs.get(), key_runs.get()), (4, 3));
    }

    #[test]
    fn set_add_is_idempotent() {
        let set = observe(Target::set(["a"]));
        let set_clone = set.clone();
        let (runs, _runner) = count_runs(move || {
            set_clone.len();
        });

        assert!(!set.add("a").unwrap());
        assert_eq!(runs.get(), 1);
        assert!(set.add("b").unwrap());
        assert_eq!(runs.get(), 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn set_membership_is_tracked_per_key() {
        let set = observe(Target::set(Vec::<Key>::new()));
        let set_clone = set.clone();
        let (runs, _runner) = count_runs(move || {
            set_clone.has(&Key::from("x"));
        });

        set.add("y").unwrap();
        assert_eq!(runs.get(), 1);
        set.add("x").unwrap();
        assert_eq!(runs.get(), 2);
        set.delete(&Key::from("x"));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn clear_notifies_every_reader() {
        let map = observe(Target::map().with("a", 1).with("b", 2));
        let map_clone = map.clone();
        let (runs, _runner) = count_runs(move || {
            map_clone.get("a");
        });

        map.clear().unwrap();
        assert_eq!(runs.get(), 2);
        assert!(map.is_empty());

        // clearing an empty collection changes nothing
        map.clear().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn collection_methods_reject_other_kinds() {
        let record = observe(Target::record());
        assert!(matches!(
            record.clear(),
            Err(ReactiveError::NotACollection { method: "clear", .. })
        ));
        assert!(observe(Target::map()).add("k").is_err());
    }

    #[test]
    fn readonly_collections_ignore_mutation() {
        let raw = Target::set(["a"]);
        let view = readonly(raw.clone()).as_observable().cloned().unwrap();
        assert!(!view.add("b").unwrap());
        view.clear().unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn map_values_are_wrapped() {
        let map = observe(Target::map().with("inner", Target::record()));
        let values = map.values();
        assert!(crate::observable::is_reactive(&values[0]));
    }
}
