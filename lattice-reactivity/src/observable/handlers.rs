//! Property traps for observable handles.
//!
//! Reads record a dependency on the innermost raw target before delegating,
//! writes delegate first and then trigger based on whether the key existed
//! and whether the value changed.

use tracing::debug;

use super::{is_readonly, is_shallow, readonly, reactive, to_raw, Observable};
use crate::reactive::{DepKey, Runtime, TrackOp, TriggerOp};
use crate::value::{has_changed, Key, ReactiveFlag, TargetKind, Traps, Value};

impl Observable {
    /// Read from whatever this handle wraps, without tracking here.
    fn read_wrapped(&self, key: &Key, receiver: &Value) -> Value {
        match self.wrapped() {
            Value::Observable(inner) => inner.get_with(key, receiver),
            _ => self.raw_target().get_with(key, receiver),
        }
    }

    fn flag(&self, flag: ReactiveFlag, receiver: &Value) -> Value {
        let flavor = self.flavor();
        match flag {
            ReactiveFlag::IsReactive => Value::Bool(!flavor.is_readonly()),
            ReactiveFlag::IsReadonly => Value::Bool(flavor.is_readonly()),
            ReactiveFlag::IsShallow => Value::Bool(flavor.is_shallow()),
            ReactiveFlag::Skip => Value::Bool(self.raw_target().is_marked_raw()),
            ReactiveFlag::Raw => {
                // Only the canonical handle, queried directly, gives out what
                // it wraps.
                let direct = matches!(receiver, Value::Observable(o) if o.ptr_eq(self));
                if direct && self.is_canonical() {
                    self.wrapped().clone()
                } else {
                    Value::Undefined
                }
            }
        }
    }

    fn iterate_key(&self) -> DepKey {
        match self.kind() {
            TargetKind::Sequence => DepKey::Key(Key::length()),
            TargetKind::Map => DepKey::MapKeyIterate,
            TargetKind::Record | TargetKind::Set => DepKey::Iterate,
        }
    }
}

impl Traps for Observable {
    fn get_with(&self, key: &Key, receiver: &Value) -> Value {
        if let Some(flag) = ReactiveFlag::from_key(key) {
            return self.flag(flag, receiver);
        }

        let result = self.read_wrapped(key, receiver);

        if key.is_builtin_symbol() || key.is_non_trackable() {
            return result;
        }
        let op = match self.kind() {
            TargetKind::Set => TrackOp::Has,
            _ => TrackOp::Get,
        };
        Runtime::track(self.raw_target(), op, DepKey::Key(key.clone()));

        if self.flavor().is_shallow() {
            return result;
        }

        match result {
            // Boxed values stored in records unwrap on read; sequence
            // elements are handed out as the box itself.
            Value::Ref(boxed) => {
                if self.kind() == TargetKind::Sequence && key.as_index().is_some() {
                    Value::Ref(boxed)
                } else {
                    boxed.get()
                }
            }
            nested if nested.is_structured() => {
                if self.flavor().is_readonly() {
                    readonly(nested)
                } else {
                    reactive(nested)
                }
            }
            other => other,
        }
    }

    fn set_with(&self, key: Key, value: Value, receiver: &Value) -> bool {
        if self.flavor().is_readonly() {
            debug!(object = %self.raw_target().id(), %key, "write through readonly handle ignored");
            return true;
        }

        let target = self.raw_target();
        let raw_receiver = Value::Object(target.clone());
        let mut old = target.get_with(&key, &raw_receiver);
        let mut value = value;

        if !self.flavor().is_shallow() {
            if !is_shallow(&value) && !is_readonly(&value) {
                old = to_raw(&old);
                value = to_raw(&value);
            }
            if let Value::Ref(boxed) = &old {
                if target.kind() == TargetKind::Record && !matches!(value, Value::Ref(_)) {
                    boxed.set(value);
                    return true;
                }
            }
        }

        let had_key = target.has_own(&key);
        let stored = value.clone();
        let accepted = target.set_with(key.clone(), value, receiver);

        // A write that reached this target through some other handle is
        // that handle's to report.
        let own_write = to_raw(receiver)
            .as_target()
            .is_some_and(|r| r.ptr_eq(target));
        if !accepted || !own_write {
            return accepted;
        }

        if !had_key {
            Runtime::trigger(target, TriggerOp::Add, Some(&key), Some(&stored));
        } else if target.kind() != TargetKind::Set && has_changed(&stored, &old) {
            Runtime::trigger(target, TriggerOp::Set, Some(&key), Some(&stored));
        }
        accepted
    }

    fn has(&self, key: &Key) -> bool {
        let result = match self.wrapped() {
            Value::Observable(inner) => inner.has(key),
            _ => self.raw_target().has(key),
        };
        if !key.is_builtin_symbol() {
            Runtime::track(self.raw_target(), TrackOp::Has, DepKey::Key(key.clone()));
        }
        result
    }

    fn delete(&self, key: &Key) -> bool {
        if self.flavor().is_readonly() {
            debug!(object = %self.raw_target().id(), %key, "delete through readonly handle ignored");
            return true;
        }

        let target = self.raw_target();
        let had_key = target.has_own(key);
        let deleted = target.delete(key);
        if had_key && deleted {
            Runtime::trigger(target, TriggerOp::Delete, Some(key), None);
        }
        deleted
    }

    fn own_keys(&self) -> Vec<Key> {
        Runtime::track(self.raw_target(), TrackOp::Iterate, self.iterate_key());
        match self.wrapped() {
            Value::Observable(inner) => inner.own_keys(),
            _ => self.raw_target().own_keys(),
        }
    }
}
