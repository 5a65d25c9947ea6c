//! Sequence instrumentation.
//!
//! Search methods depend on every slot, so they track the length and each
//! index before searching the raw elements. A miss is retried with every
//! observable layer stripped from both sides, which finds an element stored
//! raw when searching with its handle and the reverse.
//!
//! Length-changing methods run with tracking paused: the reads they perform
//! are bookkeeping, not dependencies of whichever effect called them. Their
//! writes still go through the traps so the usual triggers fire.

use super::{to_raw, Observable};
use crate::error::{ReactiveError, Result};
use crate::reactive::{DepKey, Runtime, TrackOp, TrackingPause};
use crate::value::{same_value_zero, strict_equals, Key, TargetKind, Traps, Value};

impl Observable {
    fn require_sequence(&self, method: &'static str) -> Result<()> {
        match self.kind() {
            TargetKind::Sequence => Ok(()),
            other => Err(ReactiveError::NotASequence {
                method,
                found: other.name(),
            }),
        }
    }

    fn track_every_slot(&self) -> Vec<Value> {
        let target = self.raw_target();
        let items = target.raw_values();
        Runtime::track(target, TrackOp::Get, DepKey::Key(Key::length()));
        for index in 0..items.len() {
            Runtime::track(target, TrackOp::Get, DepKey::Key(Key::Index(index)));
        }
        items
    }

    fn search<'a, I>(items: I, needle: &Value, eq: fn(&Value, &Value) -> bool) -> Option<usize>
    where
        I: Iterator<Item = (usize, &'a Value)> + Clone,
    {
        let found = items.clone().find(|(_, item)| eq(item, needle));
        if let Some((index, _)) = found {
            return Some(index);
        }
        let needle = to_raw(needle);
        items
            .into_iter()
            .find(|(_, item)| eq(&to_raw(item), &needle))
            .map(|(index, _)| index)
    }

    /// Whether any element equals `needle` (NaN matches NaN).
    pub fn includes(&self, needle: &Value) -> Result<bool> {
        self.require_sequence("includes")?;
        let items = self.track_every_slot();
        Ok(Self::search(items.iter().enumerate(), needle, same_value_zero).is_some())
    }

    /// Position of the first element strictly equal to `needle`.
    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        self.require_sequence("index_of")?;
        let items = self.track_every_slot();
        Ok(Self::search(items.iter().enumerate(), needle, strict_equals))
    }

    /// Position of the last element strictly equal to `needle`.
    pub fn last_index_of(&self, needle: &Value) -> Result<Option<usize>> {
        self.require_sequence("last_index_of")?;
        let items = self.track_every_slot();
        Ok(Self::search(items.iter().enumerate().rev(), needle, strict_equals))
    }

    fn raw_len(&self) -> usize {
        self.raw_target().len()
    }

    fn write(&self, key: impl Into<Key>, value: Value) {
        self.set_with(key.into(), value, &Value::Observable(self.clone()));
    }

    fn read(&self, index: usize) -> Value {
        self.get_with(&Key::Index(index), &Value::Observable(self.clone()))
    }

    fn truncate_to(&self, len: usize) {
        self.write(Key::length(), Value::from(len));
    }

    /// Append values and return the new length.
    pub fn push<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.require_sequence("push")?;
        let _pause = TrackingPause::new();
        let mut len = self.raw_len();
        for value in values {
            self.write(len, value.into());
            len += 1;
        }
        Ok(self.raw_len())
    }

    /// Remove and return the last element, or `Undefined` when empty.
    pub fn pop(&self) -> Result<Value> {
        self.require_sequence("pop")?;
        let _pause = TrackingPause::new();
        let len = self.raw_len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let last = self.read(len - 1);
        self.delete(&Key::Index(len - 1));
        self.truncate_to(len - 1);
        Ok(last)
    }

    /// Remove and return the first element, or `Undefined` when empty.
    pub fn shift(&self) -> Result<Value> {
        self.require_sequence("shift")?;
        let _pause = TrackingPause::new();
        let len = self.raw_len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let first = self.read(0);
        for index in 1..len {
            let moved = self.read(index);
            self.write(index - 1, moved);
        }
        self.delete(&Key::Index(len - 1));
        self.truncate_to(len - 1);
        Ok(first)
    }

    /// Prepend values and return the new length.
    pub fn unshift<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.require_sequence("unshift")?;
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let _pause = TrackingPause::new();
        let len = self.raw_len();
        let count = values.len();
        if count > 0 {
            for index in (0..len).rev() {
                let moved = self.read(index);
                self.write(index + count, moved);
            }
            for (index, value) in values.into_iter().enumerate() {
                self.write(index, value);
            }
        }
        Ok(self.raw_len())
    }

    /// Remove `delete_count` elements at `start`, insert `items` in their
    /// place, and return the removed elements.
    ///
    /// `start` past the end is clamped to the length, and so is
    /// `delete_count`.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.require_sequence("splice")?;
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let _pause = TrackingPause::new();
        let len = self.raw_len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let insert_count = items.len();

        let removed: Vec<Value> = (start..start + delete_count).map(|i| self.read(i)).collect();

        if insert_count < delete_count {
            for index in start + delete_count..len {
                let moved = self.read(index);
                self.write(index - delete_count + insert_count, moved);
            }
            let new_len = len - delete_count + insert_count;
            for index in (new_len..len).rev() {
                self.delete(&Key::Index(index));
            }
            self.truncate_to(new_len);
        } else if insert_count > delete_count {
            for index in (start + delete_count..len).rev() {
                let moved = self.read(index);
                self.write(index + insert_count - delete_count, moved);
            }
        }
        for (offset, item) in items.into_iter().enumerate() {
            self.write(start + offset, item);
        }
        Ok(removed)
    }
}
