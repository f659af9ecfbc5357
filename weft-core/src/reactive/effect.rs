//! Effect Implementation
//!
//! An Effect is a re-runnable unit of work whose reads are tracked.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless it is lazy).
//!
//! 2. Before every run the effect drops the subscriptions it collected last
//!    time, so the dependency graph only reflects its most recent run.
//!
//! 3. While running, the effect sits on top of the runtime's active-effect
//!    stack and every tracked read subscribes it.
//!
//! 4. When a dependency changes the effect is notified. Without a scheduler
//!    it re-runs synchronously; with one, the scheduler decides (component
//!    render effects queue themselves for the next flush, computed values
//!    just mark themselves dirty).
//!
//! # Lifetime
//!
//! The runtime only holds effects weakly. Dropping the last [`Effect`] handle
//! unregisters it and removes its subscriptions. [`Effect::stop`] does the
//! same eagerly while handles are still around.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use super::context::ActiveFrame;
use super::runtime::{Runtime, RuntimeInner};
use super::EffectId;

/// Callback that receives an effect's change notifications instead of the
/// effect re-running itself.
pub type SchedulerFn = Arc<dyn Fn(&Effect) + Send + Sync>;

/// How an effect is created.
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,

    /// Route notifications through this callback.
    pub scheduler: Option<SchedulerFn>,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    pub fn with_scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

pub(crate) struct EffectInner {
    id: EffectId,
    runtime: Weak<RuntimeInner>,
    run: Box<dyn Fn() + Send + Sync>,
    scheduler: Option<SchedulerFn>,

    /// Cleared by `stop`; a stopped effect never runs again.
    active: AtomicBool,

    /// Set while the function executes.
    running: AtomicBool,

    run_count: AtomicUsize,
}

impl EffectInner {
    pub(super) fn new(
        runtime: Weak<RuntimeInner>,
        run: Box<dyn Fn() + Send + Sync>,
        scheduler: Option<SchedulerFn>,
    ) -> Self {
        Self {
            id: EffectId::new(),
            runtime,
            run,
            scheduler,
            active: AtomicBool::new(true),
            running: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        }
    }

    pub(super) fn id(&self) -> EffectId {
        self.id
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        runtime.effects.lock().remove(&self.id);
        runtime.graph.lock().clear_effect(self.id);
        trace!(effect_id = self.id.raw(), "effect dropped");
    }
}

/// Resets the running flag on every exit path.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a registered effect. Clones share the same effect.
///
/// # Example
///
/// ```rust,ignore
/// let state = rt.reactive(ObjectRef::from_entries([("count", 0)]));
///
/// let effect = rt.effect({
///     let state = state.clone();
///     move || println!("count is {}", state.get("count"))
/// });
///
/// state.set("count", 5); // prints "count is 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    pub(super) fn from_inner(inner: Arc<EffectInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Run the effect now, re-collecting its dependencies.
    ///
    /// Does nothing if the effect is stopped or already running.
    pub fn run(&self) {
        if !self.is_active() {
            return;
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!(
                effect_id = self.inner.id.raw(),
                "effect re-entered while running; skipped"
            );
            return;
        }
        let _running = RunningGuard(&self.inner.running);

        let Some(runtime) = self.inner.runtime.upgrade() else {
            return;
        };
        runtime.graph.lock().clear_effect(self.inner.id);

        {
            let _frame = ActiveFrame::enter(&runtime.stack, Some(self.inner.id));
            (self.inner.run)();
        }

        let runs = self.inner.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(effect_id = self.inner.id.raw(), runs, "effect ran");
    }

    /// Deliver a change notification: hand it to the scheduler if there is
    /// one, otherwise re-run.
    pub(crate) fn notify(&self) {
        if !self.is_active() {
            return;
        }
        match &self.inner.scheduler {
            Some(scheduler) => scheduler(self),
            None => self.run(),
        }
    }

    /// Stop the effect: it drops its subscriptions, leaves the job queue and
    /// never runs again.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.graph.lock().clear_effect(self.inner.id);
            let queued = runtime.jobs.remove(self.inner.id);
            drop(queued);
        }
        debug!(effect_id = self.inner.id.raw(), "effect stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of (target, field) pairs this effect is subscribed to.
    pub fn dependency_count(&self) -> usize {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return 0;
        };
        let count = runtime.graph.lock().dependency_count(self.inner.id);
        count
    }

    pub fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_inner)
    }

    pub fn ptr_eq(&self, other: &Effect) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id.raw())
            .field("run_count", &self.run_count())
            .field("active", &self.is_active())
            .field("scheduled", &self.inner.scheduler.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
