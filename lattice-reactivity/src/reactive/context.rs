//! Reactive Context
//!
//! The reactive context tracks which effect is currently running and whether
//! reads should be recorded at all.
//!
//! # Implementation
//!
//! Two thread-local cells with explicit save/restore stacks:
//!
//! - the effect stack. Entering an effect pushes it; the guard pops it when
//!   dropped, so the enclosing effect becomes current again even if the
//!   effect body panics. Schedulers can start runs outside the direct call
//!   chain, which is why this is an explicit stack and not inferred from
//!   the Rust call stack.
//! - the tracking-enabled flag. [`pause_tracking`] / [`enable_tracking`] push
//!   the previous state and [`reset_tracking`] pops it, so nested "do raw
//!   work" regions compose across nested effect runs.
//!
//! Keeping both thread-local means each thread is its own reactive world;
//! handles are `!Send` so they never cross over.

use std::cell::{Cell, RefCell};

use super::effect::ReactiveEffect;
use super::SubscriberId;

thread_local! {
    static EFFECT_STACK: RefCell<Vec<ReactiveEffect>> = const { RefCell::new(Vec::new()) };
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
    static TRACK_STACK: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the running effect when dropped.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Make `effect` the active subscriber until the guard drops.
    ///
    /// Tracking is re-enabled for the duration of the run (an effect started
    /// from inside a paused region still collects its own dependencies) and
    /// the previous state is restored afterwards.
    pub(crate) fn enter(effect: ReactiveEffect) -> Self {
        let subscriber_id = effect.id();
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
        enable_tracking();
        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        EFFECT_STACK.with(|stack| stack.borrow().last().map(ReactiveEffect::id))
    }

    pub(crate) fn current_effect() -> Option<ReactiveEffect> {
        EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Whether the subscriber is anywhere on the active chain.
    pub fn is_running(id: SubscriberId) -> bool {
        EFFECT_STACK.with(|stack| stack.borrow().iter().any(|e| e.id() == id))
    }

    /// Number of nested effect runs on this thread.
    pub fn depth() -> usize {
        EFFECT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = EFFECT_STACK.with(|stack| stack.borrow_mut().pop());
        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                effect.id()
            );
        }
        reset_tracking();
    }
}

/// Whether a read right now would be recorded.
pub fn is_tracking() -> bool {
    SHOULD_TRACK.with(Cell::get) && ReactiveContext::is_active()
}

/// Stop recording reads until the matching [`reset_tracking`].
pub fn pause_tracking() {
    let previous = SHOULD_TRACK.with(|flag| flag.replace(false));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(previous));
}

/// Record reads until the matching [`reset_tracking`].
pub fn enable_tracking() {
    let previous = SHOULD_TRACK.with(|flag| flag.replace(true));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(previous));
}

/// Restore the tracking state saved by the last pause/enable.
pub fn reset_tracking() {
    let previous = TRACK_STACK.with(|stack| stack.borrow_mut().pop());
    SHOULD_TRACK.with(|flag| flag.set(previous.unwrap_or(true)));
}

/// Pauses tracking for its lifetime.
pub struct TrackingPause {
    _private: (),
}

impl TrackingPause {
    pub fn new() -> Self {
        pause_tracking();
        Self { _private: () }
    }
}

impl Default for TrackingPause {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without recording any reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _pause = TrackingPause::new();
    f()
}
