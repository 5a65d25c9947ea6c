//! Effect Implementation
//!
//! An effect is a computation that re-runs whenever data it read changes.
//! It is the single subscriber type of the runtime: computed values and
//! watchers are effects with a custom scheduler.
//!
//! # How Effects Work
//!
//! 1. `run()` unsubscribes the effect from every dep it currently holds,
//!    pushes it as the active subscriber, and executes its function. Every
//!    tracked read during the function subscribes it afresh. This is what
//!    drops stale subscriptions when a conditional takes another branch.
//!
//! 2. When a dep it holds is triggered, the effect is notified: if it has a
//!    scheduler the scheduler is called, otherwise it re-runs in place.
//!
//! 3. `stop()` unsubscribes it for good. A stopped effect still executes
//!    its function when run explicitly; it just no longer tracks anything.
//!
//! # Ownership
//!
//! Deps only hold effects weakly. An effect lives as long as something owns
//! a handle to it ([`EffectRunner`], a watch handle, a computed value), and
//! dropping the last handle unsubscribes it from every dep it held.
//!
//! # Lifecycle
//!
//! `Created -> Running -> Idle -> (Running -> Idle)* -> Stopped`.
//! Stopping an effect from inside its own run is deferred until the run
//! returns, since an effect cannot safely unsubscribe mid-execution.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::runtime::{Dep, WeakDep};
use super::subscriber::SubscriberId;
use crate::value::Value;

/// Alternate invocation used instead of re-running on notification.
pub type Scheduler = Rc<dyn Fn(&ReactiveEffect)>;

/// Observable lifecycle state of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Never run.
    Created,
    /// Its function is executing.
    Running,
    /// Finished a run, still subscribed.
    Idle,
    /// Terminal. No longer tracks or gets notified.
    Stopped,
}

pub(crate) struct EffectInner {
    id: SubscriberId,
    func: Box<dyn Fn() -> Value>,
    scheduler: Option<Scheduler>,
    /// Backs a computed value; notified ahead of plain effects.
    computed: bool,
    active: Cell<bool>,
    running: Cell<bool>,
    defer_stop: Cell<bool>,
    run_count: Cell<usize>,
    deps: RefCell<SmallVec<[WeakDep; 4]>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().iter().filter_map(WeakDep::upgrade) {
            dep.remove(self.id);
        }
    }
}

/// A tracked, re-runnable computation.
///
/// Cloning creates another handle to the same effect.
#[derive(Clone)]
pub struct ReactiveEffect(Rc<EffectInner>);

/// Non-owning reference from a dep to a subscribed effect.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub(crate) fn upgrade(&self) -> Option<ReactiveEffect> {
        self.0.upgrade().map(ReactiveEffect)
    }
}

impl ReactiveEffect {
    /// Create an effect without running it.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Self::build(Box::new(func), None, false)
    }

    /// Create an effect whose notifications go to `scheduler`.
    pub fn with_scheduler<F, S>(func: F, scheduler: S) -> Self
    where
        F: Fn() -> Value + 'static,
        S: Fn(&ReactiveEffect) + 'static,
    {
        Self::build(Box::new(func), Some(Rc::new(scheduler)), false)
    }

    pub(crate) fn build(
        func: Box<dyn Fn() -> Value>,
        scheduler: Option<Scheduler>,
        computed: bool,
    ) -> Self {
        Self(Rc::new(EffectInner {
            id: SubscriberId::new(),
            func,
            scheduler,
            computed,
            active: Cell::new(true),
            running: Cell::new(false),
            defer_stop: Cell::new(false),
            run_count: Cell::new(0),
            deps: RefCell::new(SmallVec::new()),
            on_stop: RefCell::new(None),
        }))
    }

    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &ReactiveEffect) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Execute the function, collecting a fresh set of dependencies.
    ///
    /// Re-entering an effect that is already on the active chain returns
    /// `Undefined` without running it again.
    pub fn run(&self) -> Value {
        if !self.0.active.get() {
            return (self.0.func)();
        }
        if ReactiveContext::is_running(self.id()) {
            trace!(subscriber = %self.id(), "recursive run skipped");
            return Value::Undefined;
        }

        self.cleanup();
        let _guard = RunGuard::enter(self);
        self.0.run_count.set(self.0.run_count.get() + 1);
        (self.0.func)()
    }

    /// Unsubscribe permanently. Idempotent.
    pub fn stop(&self) {
        if self.0.running.get() {
            self.0.defer_stop.set(true);
            return;
        }
        if self.0.active.replace(false) {
            self.cleanup();
            let on_stop = self.0.on_stop.borrow_mut().take();
            if let Some(on_stop) = on_stop {
                on_stop();
            }
            debug!(subscriber = %self.id(), "effect stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn state(&self) -> EffectState {
        if !self.0.active.get() {
            EffectState::Stopped
        } else if self.0.running.get() {
            EffectState::Running
        } else if self.0.run_count.get() > 0 {
            EffectState::Idle
        } else {
            EffectState::Created
        }
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.0.run_count.get()
    }

    /// Number of live deps this effect is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.0
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.upgrade().is_some())
            .count()
    }

    pub(crate) fn set_on_stop(&self, on_stop: Box<dyn FnOnce()>) {
        *self.0.on_stop.borrow_mut() = Some(on_stop);
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.0.computed
    }

    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Rc::downgrade(&self.0))
    }

    pub(crate) fn record_dep(&self, dep: &Dep) {
        self.0.deps.borrow_mut().push(dep.downgrade());
    }

    /// React to a triggered dependency.
    pub(crate) fn notify(&self) {
        match &self.0.scheduler {
            Some(scheduler) => scheduler(self),
            None => {
                self.run();
            }
        }
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.0.deps.borrow_mut());
        for dep in deps.iter().filter_map(WeakDep::upgrade) {
            dep.remove(self.id());
        }
    }
}

/// Marks the effect running and active for the duration of a run.
struct RunGuard<'a> {
    effect: &'a ReactiveEffect,
    context: Option<ReactiveContext>,
}

impl<'a> RunGuard<'a> {
    fn enter(effect: &'a ReactiveEffect) -> Self {
        effect.0.running.set(true);
        Self {
            effect,
            context: Some(ReactiveContext::enter(effect.clone())),
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        drop(self.context.take());
        self.effect.0.running.set(false);
        if self.effect.0.defer_stop.replace(false) {
            self.effect.stop();
        }
    }
}

impl fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Options for [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    lazy: bool,
    scheduler: Option<Scheduler>,
    on_stop: Option<Box<dyn FnOnce()>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run on creation; the first run happens through the runner.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Call `scheduler` instead of re-running when a dependency changes.
    pub fn scheduler(mut self, scheduler: impl Fn(&ReactiveEffect) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Teardown hook invoked once when the effect is stopped.
    pub fn on_stop(mut self, on_stop: impl FnOnce() + 'static) -> Self {
        self.on_stop = Some(Box::new(on_stop));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// Handle returned by [`effect`]: re-runs the effect and exposes it for `stop()`.
///
/// The runner owns the effect. Once every clone of it (and of the
/// [`ReactiveEffect`] it exposes) is dropped, the effect is gone and no
/// longer re-runs. Dropping does not call the `on_stop` hook.
#[derive(Clone, Debug)]
#[must_use = "dropping the runner ends the effect"]
pub struct EffectRunner {
    effect: ReactiveEffect,
}

impl EffectRunner {
    pub fn run(&self) -> Value {
        self.effect.run()
    }

    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }

    pub fn stop(&self) {
        self.effect.stop();
    }
}

/// Run `func` now and again whenever anything it read changes.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(json!({"count": 0}));
/// let runner = effect(move || println!("count is {:?}", state.get("count")));
/// ```
pub fn effect<F>(func: F) -> EffectRunner
where
    F: Fn() + 'static,
{
    effect_with(func, EffectOptions::default())
}

/// [`effect`] with explicit options.
pub fn effect_with<F>(func: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() + 'static,
{
    let EffectOptions {
        lazy,
        scheduler,
        on_stop,
    } = options;
    let effect = ReactiveEffect::build(
        Box::new(move || {
            func();
            Value::Undefined
        }),
        scheduler,
        false,
    );
    if let Some(on_stop) = on_stop {
        effect.set_on_stop(on_stop);
    }
    if !lazy {
        effect.run();
    }
    EffectRunner { effect }
}

/// Stop the effect behind a runner.
pub fn stop(runner: &EffectRunner) {
    runner.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
