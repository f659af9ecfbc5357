//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive objects,
//! refs, computed values and effects. It owns the dependency graph, the effect
//! registry, the active-effect stack, the wrapper cache and the job queue.
//!
//! # How It Works
//!
//! 1. When an effect runs it is pushed onto the runtime's active-effect stack.
//!
//! 2. A tracked read (through a [`Reactive`], [`Ref`] or [`Computed`]) calls
//!    [`Runtime::track`], which subscribes the top-of-stack effect to the
//!    field that was read.
//!
//! 3. A write that changes a field calls [`Runtime::trigger`], which notifies
//!    every subscriber in subscription order:
//!    a. effects without a scheduler re-run synchronously
//!    b. effects with a scheduler hand the notification to it
//!    c. component render effects use [`Runtime::queue_job`], so they run
//!    once at the next flush no matter how often they were notified
//!
//! # Multiple Runtimes
//!
//! Nothing here is process-wide. Every runtime is an explicitly constructed
//! handle, so independent runtimes coexist and are torn down by dropping them.
//! Clones of a [`Runtime`] share the same state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, debug_span, error, trace, warn};

use super::computed::Computed;
use super::context::{ActiveFrame, EffectStack};
use super::effect::{Effect, EffectInner, EffectOptions};
use super::reference::Ref;
use super::wrapper::{Field, IntoTarget, Reactive, ReactiveInner, Trackable};
use super::{EffectId, Key, TargetId, Value};
use crate::config::{FlushMode, RuntimeConfig};
use crate::error::{Error, Result};
use crate::graph::{DepGraph, Enqueued, JobQueue};

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) graph: Mutex<DepGraph>,

    /// Live effects, held weakly.
    pub(crate) effects: Mutex<HashMap<EffectId, Weak<EffectInner>>>,

    pub(crate) stack: EffectStack,

    /// Raw object -> its one wrapper.
    pub(crate) wrappers: DashMap<TargetId, Weak<ReactiveInner>>,

    pub(crate) jobs: JobQueue,
}

/// A reactive runtime. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning runtime handle.
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(Runtime::from_inner)
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Clears the flushing flag on every exit path of a flush.
struct FlushGuard<'a>(&'a JobQueue);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_flush();
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(flush = ?config.flush, max_flush_passes = config.max_flush_passes, "runtime created");
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                graph: Mutex::new(DepGraph::new()),
                effects: Mutex::new(HashMap::new()),
                stack: EffectStack::new(),
                wrappers: DashMap::new(),
                jobs: JobQueue::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- Effects ----

    /// Create an effect and run it once.
    pub fn effect<F>(&self, f: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.effect_with(f, EffectOptions::default())
    }

    pub fn effect_with<F>(&self, f: F, options: EffectOptions) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner::new(
            Arc::downgrade(&self.inner),
            Box::new(f),
            options.scheduler,
        ));
        self.inner
            .effects
            .lock()
            .insert(inner.id(), Arc::downgrade(&inner));

        let effect = Effect::from_inner(inner);
        debug!(effect_id = effect.id().raw(), lazy = options.lazy, "effect created");

        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// The innermost running effect, if tracking is active.
    pub fn active_effect(&self) -> Option<EffectId> {
        self.inner.stack.current()
    }

    /// Run `f` without subscribing the active effect to anything it reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = ActiveFrame::enter(&self.inner.stack, None);
        f()
    }

    // ---- Reactive data ----

    /// The wrapper of an object. Wrapping is idempotent: the same object (or
    /// a wrapper of it) always yields the same wrapper while it is alive.
    pub fn reactive(&self, target: impl IntoTarget) -> Reactive {
        let object = target.into_target();
        let mut slot = self.inner.wrappers.entry(object.id()).or_default();
        if let Some(existing) = slot.upgrade() {
            return Reactive::from_inner(existing);
        }

        let inner = Arc::new(ReactiveInner::new(object, Arc::downgrade(&self.inner)));
        *slot = Arc::downgrade(&inner);
        trace!(target_id = inner.target().id().raw(), "wrapped object");
        Reactive::from_inner(inner)
    }

    /// Objects come back wrapped, everything else as is.
    pub fn reactive_value(&self, value: Value) -> Field {
        match value {
            Value::Object(object) => Field::Reactive(self.reactive(object)),
            other => Field::Value(other),
        }
    }

    pub fn create_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::new(value.into(), Arc::downgrade(&self.inner))
    }

    /// A read-only computed value; writes are ignored with a warning.
    pub fn computed<T, G>(&self, getter: G) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        G: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, Box::new(getter), None)
    }

    pub fn computed_with_setter<T, G, S>(&self, getter: G, setter: S) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Computed::new(self, Box::new(getter), Some(Box::new(setter)))
    }

    // ---- Tracking ----

    /// Subscribe the active effect to `target.key`.
    pub fn track(&self, target: &impl Trackable, key: impl Into<Key>) {
        let key = key.into().normalize(target.is_list());
        self.track_id(target.target_id(), || target.liveness(), key);
    }

    /// Notify every subscriber of `target.key`.
    pub fn trigger(&self, target: &impl Trackable, key: impl Into<Key>) {
        let key = key.into().normalize(target.is_list());
        self.trigger_id(target.target_id(), &key);
    }

    pub(crate) fn track_id<F>(&self, target: TargetId, alive: F, key: Key)
    where
        F: FnOnce() -> Weak<dyn Any + Send + Sync>,
    {
        let Some(effect) = self.inner.stack.current() else {
            return;
        };
        let added = self
            .inner
            .graph
            .lock()
            .subscribe(target, alive, key.clone(), effect);
        if added {
            trace!(target_id = target.raw(), %key, effect_id = effect.raw(), "track");
        }
    }

    pub(crate) fn trigger_id(&self, target: TargetId, key: &Key) {
        let subscribers = self.inner.graph.lock().subscribers(target, key);
        if subscribers.is_empty() {
            return;
        }

        // An effect never re-triggers itself.
        let current = self.inner.stack.current();
        let effects: SmallVec<[Effect; 8]> = {
            let registry = self.inner.effects.lock();
            subscribers
                .iter()
                .filter(|id| Some(**id) != current)
                .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
                .map(Effect::from_inner)
                .collect()
        };

        trace!(target_id = target.raw(), %key, subscribers = effects.len(), "trigger");
        for effect in &effects {
            effect.notify();
        }
    }

    // ---- Scheduling ----

    /// Queue an effect for the next flush. Queuing twice before the flush is
    /// a no-op.
    pub fn queue_job(&self, effect: &Effect) {
        match self.inner.jobs.push(effect) {
            Enqueued::RequestFlush => {
                trace!(effect_id = effect.id().raw(), "job queued; flush requested");
                self.request_flush();
            }
            Enqueued::Queued => trace!(effect_id = effect.id().raw(), "job queued"),
            Enqueued::Duplicate => trace!(effect_id = effect.id().raw(), "job already queued"),
        }
    }

    /// Drop a queued job. Returns whether it was queued.
    pub fn invalidate_job(&self, id: EffectId) -> bool {
        let removed = self.inner.jobs.remove(id);
        removed.is_some()
    }

    pub fn has_pending_jobs(&self) -> bool {
        self.inner.jobs.len() > 0
    }

    fn request_flush(&self) {
        match self.inner.config.flush {
            FlushMode::Manual => {}
            FlushMode::Tokio => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let runtime = self.downgrade();
                    handle.spawn(async move {
                        let Some(runtime) = runtime.upgrade() else {
                            return;
                        };
                        if let Err(err) = runtime.flush_jobs() {
                            error!(%err, "scheduled flush failed");
                        }
                    });
                }
                Err(_) => {
                    warn!("no tokio runtime to schedule a flush on; jobs wait for an explicit flush");
                }
            },
        }
    }

    /// Run every queued job in enqueue order, then whatever those jobs
    /// queued, until the queue is empty. Returns how many jobs ran.
    ///
    /// Calling this while a flush is running returns `Ok(0)`; the running
    /// flush picks up the new jobs.
    pub fn flush_jobs(&self) -> Result<usize> {
        if !self.inner.jobs.begin_flush() {
            trace!("flush already running");
            return Ok(0);
        }
        let _flushing = FlushGuard(&self.inner.jobs);

        let span = debug_span!("flush");
        let _enter = span.enter();

        let max_passes = self.inner.config.max_flush_passes;
        let mut ran = 0;
        let mut passes = 0;
        loop {
            let batch = self.inner.jobs.take_batch();
            if batch.is_empty() {
                break;
            }
            passes += 1;
            if passes > max_passes {
                warn!(max_passes, pending = batch.len(), "flush did not settle; dropping jobs");
                return Err(Error::FlushOverflow(max_passes));
            }
            for job in &batch {
                job.run();
                ran += 1;
            }
        }

        if ran > 0 {
            debug!(jobs = ran, passes, "flush complete");
        }
        Ok(ran)
    }

    /// Resolve once the pending (or an in-flight) flush has completed.
    pub async fn next_tick(&self) -> Result<()> {
        if self.inner.config.flush == FlushMode::Tokio {
            tokio::task::yield_now().await;
            while self.inner.jobs.is_flushing() {
                tokio::task::yield_now().await;
            }
        }
        if self.has_pending_jobs() {
            self.flush_jobs()?;
        }
        Ok(())
    }

    // ---- Housekeeping ----

    /// Drop graph records of dead targets, dead wrapper cache entries and
    /// dead effect registrations.
    pub fn collect_garbage(&self) -> usize {
        let targets = self.inner.graph.lock().prune();

        let wrappers_before = self.inner.wrappers.len();
        self.inner.wrappers.retain(|_, wrapper| wrapper.strong_count() > 0);
        let wrappers = wrappers_before - self.inner.wrappers.len();

        let effects = {
            let mut registry = self.inner.effects.lock();
            let before = registry.len();
            registry.retain(|_, effect| effect.strong_count() > 0);
            before - registry.len()
        };

        let collected = targets + wrappers + effects;
        if collected > 0 {
            debug!(targets, wrappers, effects, "collected garbage");
        }
        collected
    }

    /// Number of live effects.
    pub fn effect_count(&self) -> usize {
        self.inner
            .effects
            .lock()
            .values()
            .filter(|effect| effect.strong_count() > 0)
            .count()
    }

    /// Number of live wrappers in the cache.
    pub fn wrapper_count(&self) -> usize {
        self.inner
            .wrappers
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    pub fn subscriber_count(&self, target: &impl Trackable, key: impl Into<Key>) -> usize {
        let key = key.into().normalize(target.is_list());
        self.inner.graph.lock().subscriber_count(target.target_id(), &key)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("flush", &self.inner.config.flush)
            .field("effects", &self.effect_count())
            .field("pending_jobs", &self.inner.jobs.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ObjectRef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(rt: &Runtime, counter: &Arc<AtomicUsize>) -> Effect {
        let counter = counter.clone();
        rt.effect_with(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::lazy(),
        )
    }

    #[test]
    fn effect_writing_what_it_reads_runs_once_per_change() {
        let rt = Runtime::new();
        let state = rt.reactive(ObjectRef::from_entries([("count", 0)]));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let effect = rt.effect({
            let state = state.clone();
            let seen = seen.clone();
            move || {
                let count = state.get_value("count").as_f64().unwrap_or(0.0);
                seen.lock().push(count);
                state.set("count", count + 1.0);
            }
        });

        assert_eq!(effect.run_count(), 1);
        assert_eq!(state.get_value("count"), Value::from(1));

        state.set("count", 5);
        assert_eq!(effect.run_count(), 2);
        assert_eq!(state.get_value("count"), Value::from(6));
        assert_eq!(*seen.lock(), vec![0.0, 5.0]);

        assert!(rt.active_effect().is_none());
        assert!(!rt.has_pending_jobs());
        // Still subscribed after writing its own dependency
        assert_eq!(rt.subscriber_count(&state, "count"), 1);
    }

    #[test]
    fn reads_outside_effects_are_not_tracked() {
        let rt = Runtime::new();
        let state = rt.reactive(ObjectRef::from_entries([("count", 0)]));

        state.get("count");
        assert_eq!(rt.subscriber_count(&state, "count"), 0);
        assert!(rt.active_effect().is_none());
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let rt = Runtime::new();
        let state = rt.reactive(ObjectRef::from_entries([("a", 0), ("b", 0)]));

        let _effect = rt.effect({
            let rt = rt.clone();
            let state = state.clone();
            move || {
                state.get("a");
                rt.untracked(|| state.get("b"));
            }
        });

        assert_eq!(rt.subscriber_count(&state, "a"), 1);
        assert_eq!(rt.subscriber_count(&state, "b"), 0);
    }

    #[test]
    fn manual_track_and_trigger() {
        let rt = Runtime::new();
        let object = ObjectRef::map();
        let runs = Arc::new(AtomicUsize::new(0));

        let _effect = rt.effect({
            let rt = rt.clone();
            let object = object.clone();
            let runs = runs.clone();
            move || {
                rt.track(&object, "anything");
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        rt.trigger(&object, "anything");
        rt.trigger(&object, "something-else");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn queued_jobs_are_deduplicated() {
        let rt = Runtime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let job = counting_job(&rt, &counter);

        rt.queue_job(&job);
        rt.queue_job(&job);
        rt.queue_job(&job);
        assert!(rt.has_pending_jobs());

        assert_eq!(rt.flush_jobs().unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!rt.has_pending_jobs());
    }

    #[test]
    fn jobs_queued_during_a_flush_run_in_the_same_flush() {
        let rt = Runtime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let second = counting_job(&rt, &counter);

        let first = rt.effect_with(
            {
                let rt = rt.clone();
                let second = second.clone();
                move || rt.queue_job(&second)
            },
            EffectOptions::lazy(),
        );

        rt.queue_job(&first);
        assert_eq!(rt.flush_jobs().unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runaway_flush_overflows() {
        let rt = Runtime::with_config(RuntimeConfig::default().with_max_flush_passes(3));
        let slot: Arc<Mutex<Option<Effect>>> = Arc::new(Mutex::new(None));

        let job = rt.effect_with(
            {
                let rt = rt.clone();
                let slot = slot.clone();
                move || {
                    let me = slot.lock().clone();
                    if let Some(me) = me {
                        rt.queue_job(&me);
                    }
                }
            },
            EffectOptions::lazy(),
        );
        *slot.lock() = Some(job.clone());

        rt.queue_job(&job);
        assert!(matches!(rt.flush_jobs(), Err(Error::FlushOverflow(3))));
        assert!(!rt.has_pending_jobs());

        // Break the cycle so the effect can be dropped
        slot.lock().take();
    }

    #[test]
    fn invalidated_jobs_do_not_run() {
        let rt = Runtime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let job = counting_job(&rt, &counter);

        rt.queue_job(&job);
        assert!(rt.invalidate_job(job.id()));
        assert!(!rt.invalidate_job(job.id()));

        assert_eq!(rt.flush_jobs().unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn garbage_collection_drops_dead_entries() {
        let rt = Runtime::new();
        let state = rt.reactive(ObjectRef::from_entries([("count", 0)]));
        let effect = rt.effect({
            let state = state.clone();
            move || {
                state.get("count");
            }
        });
        assert_eq!(rt.wrapper_count(), 1);

        drop(effect);
        drop(state);
        assert_eq!(rt.wrapper_count(), 0);
        assert!(rt.collect_garbage() > 0);
        assert_eq!(rt.collect_garbage(), 0);
    }

    #[test]
    fn runtimes_are_independent() {
        let a = Runtime::new();
        let b = Runtime::new();
        let object = ObjectRef::from_entries([("count", 0)]);
        let runs = Arc::new(AtomicUsize::new(0));

        let in_a = a.reactive(&object);
        let in_b = b.reactive(&object);
        assert!(!in_a.ptr_eq(&in_b));

        let _effect = a.effect({
            let in_a = in_a.clone();
            let runs = runs.clone();
            move || {
                in_a.get("count");
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Writes through the other runtime's wrapper are not observed
        in_b.set("count", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        in_a.set("count", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn next_tick_flushes_in_manual_mode() {
        let rt = Runtime::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let job = counting_job(&rt, &counter);

        rt.queue_job(&job);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        rt.next_tick().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tokio_mode_flushes_without_being_asked() {
        let rt = Runtime::with_config(RuntimeConfig::default().with_flush(FlushMode::Tokio));
        let counter = Arc::new(AtomicUsize::new(0));
        let job = counting_job(&rt, &counter);

        rt.queue_job(&job);
        rt.queue_job(&job);
        rt.next_tick().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!rt.has_pending_jobs());
    }
}
