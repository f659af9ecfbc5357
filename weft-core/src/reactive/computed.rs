//! Computed Implementation
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when read after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. A computed owns a lazy effect wrapping its getter. The effect's
//!    scheduler does not re-run anything; it marks the cache dirty and, if the
//!    cache was clean, triggers the computed's own `"value"` field.
//!
//! 2. Reading a dirty computed runs the effect, which recomputes the value
//!    and re-collects the getter's dependencies.
//!
//! 3. Every read subscribes the reading effect to `"value"`, so effects that
//!    depend on the derived value are notified when its inputs change.
//!
//! Several upstream changes in a row only notify downstream once: after the
//! first, the cache is already dirty until somebody reads it.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, WeakRuntime};
use super::wrapper::Trackable;
use super::{Key, TargetId};

pub(super) type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
pub(super) type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

struct ComputedInner<T> {
    id: TargetId,
    runtime: WeakRuntime,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    cache: Mutex<Option<T>>,
    dirty: AtomicBool,
    effect: Effect,
}

/// A cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.create_ref(2);
/// let doubled = rt.computed({
///     let count = count.clone();
///     move || count.get_value().as_f64().unwrap_or(0.0) * 2.0
/// });
///
/// assert_eq!(doubled.get(), 4.0);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(super) fn new(runtime: &Runtime, getter: Getter<T>, setter: Option<Setter<T>>) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let recompute = {
                let this = this.clone();
                move || {
                    let Some(this) = this.upgrade() else {
                        return;
                    };
                    let value = (this.getter)();
                    *this.cache.lock() = Some(value);
                }
            };

            let invalidate = {
                let this = this.clone();
                move |_: &Effect| {
                    let Some(this) = this.upgrade() else {
                        return;
                    };
                    if this.dirty.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    if let Some(runtime) = this.runtime.upgrade() {
                        runtime.trigger_id(this.id, &Key::value());
                    }
                }
            };

            let effect = runtime.effect_with(
                recompute,
                EffectOptions::lazy().with_scheduler(invalidate),
            );

            ComputedInner {
                id: TargetId::new(),
                runtime: runtime.downgrade(),
                getter,
                setter,
                cache: Mutex::new(None),
                dirty: AtomicBool::new(true),
                effect,
            }
        });

        Self { inner }
    }

    /// The current value, recomputed first if an input changed since the
    /// last read.
    pub fn get(&self) -> T {
        if self.inner.dirty.swap(false, Ordering::SeqCst) {
            self.inner.effect.run();
        }

        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track(self, Key::value());
        }

        let cached = self.inner.cache.lock().clone();
        match cached {
            Some(value) => value,
            // Stopped or orphaned: no cache to serve from.
            None => (self.inner.getter)(),
        }
    }

    /// Write through the setter. Read-only computeds drop the write with a
    /// warning.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => warn!(
                target_id = self.inner.id.raw(),
                "write to a read-only computed value ignored"
            ),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// The effect that recomputes the value.
    pub fn effect(&self) -> &Effect {
        &self.inner.effect
    }

    /// Stop recomputing; the last value keeps being served.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Trackable for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn target_id(&self) -> TargetId {
        self.inner.id
    }

    fn liveness(&self) -> Weak<dyn Any + Send + Sync> {
        let weak: Weak<ComputedInner<T>> = Arc::downgrade(&self.inner);
        weak
    }
}

impl<T> fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id.raw())
            .field("dirty", &self.is_dirty())
            .field("cached", &*self.inner.cache.lock())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ObjectRef, Value};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn number(rt: &Runtime, value: i32) -> crate::reactive::Ref {
        rt.create_ref(value)
    }

    #[test]
    fn computed_computes_on_first_read() {
        let rt = Runtime::new();
        let count = number(&rt, 5);
        let compute_count = Arc::new(AtomicI32::new(0));

        let doubled = rt.computed({
            let count = count.clone();
            let compute_count = compute_count.clone();
            move || {
                compute_count.fetch_add(1, Ordering::SeqCst);
                count.get_value().as_f64().unwrap_or(0.0) * 2.0
            }
        });

        // Lazy: not computed yet
        assert_eq!(compute_count.load(Ordering::SeqCst), 0);
        assert!(doubled.is_dirty());

        assert_eq!(doubled.get(), 10.0);
        assert_eq!(compute_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_caches_until_an_input_changes() {
        let rt = Runtime::new();
        let count = number(&rt, 5);
        let compute_count = Arc::new(AtomicI32::new(0));

        let doubled = rt.computed({
            let count = count.clone();
            let compute_count = compute_count.clone();
            move || {
                compute_count.fetch_add(1, Ordering::SeqCst);
                count.get_value().as_f64().unwrap_or(0.0) * 2.0
            }
        });

        doubled.get();
        doubled.get();
        doubled.get();
        assert_eq!(compute_count.load(Ordering::SeqCst), 1);

        count.set(7);
        // Marked dirty, but nothing recomputed yet
        assert!(doubled.is_dirty());
        assert_eq!(compute_count.load(Ordering::SeqCst), 1);

        assert_eq!(doubled.get(), 14.0);
        assert_eq!(doubled.get(), 14.0);
        assert_eq!(compute_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effects_observe_computed_values() {
        let rt = Runtime::new();
        let state = rt.reactive(ObjectRef::from_entries([("a", 1), ("b", 2)]));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sum = rt.computed({
            let state = state.clone();
            move || {
                state.get("a").as_f64().unwrap_or(0.0) + state.get("b").as_f64().unwrap_or(0.0)
            }
        });

        let _effect = rt.effect({
            let sum = sum.clone();
            let seen = seen.clone();
            move || seen.lock().push(sum.get())
        });

        state.set("a", 10);
        state.set("b", 20);

        assert_eq!(*seen.lock(), vec![3.0, 12.0, 30.0]);
    }

    #[test]
    fn repeated_upstream_changes_notify_once_until_read() {
        let rt = Runtime::new();
        let count = number(&rt, 0);
        let notified = Arc::new(AtomicI32::new(0));

        let plus_one = rt.computed({
            let count = count.clone();
            move || count.get_value().as_f64().unwrap_or(0.0) + 1.0
        });

        // A scheduled observer only counts notifications
        let observer = rt.effect_with(
            {
                let plus_one = plus_one.clone();
                move || {
                    plus_one.get();
                }
            },
            EffectOptions::default().with_scheduler({
                let notified = notified.clone();
                move |_| {
                    notified.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        assert_eq!(observer.run_count(), 1);

        count.set(1);
        count.set(2);
        count.set(3);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        assert_eq!(plus_one.get(), 4.0);
        count.set(4);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn read_only_computed_ignores_writes() {
        let rt = Runtime::new();
        let constant = rt.computed(|| 42);

        constant.set(7);
        assert_eq!(constant.get(), 42);
    }

    #[test]
    fn writable_computed_forwards_to_setter() {
        let rt = Runtime::new();
        let celsius = rt.create_ref(0);

        let fahrenheit = rt.computed_with_setter(
            {
                let celsius = celsius.clone();
                move || celsius.get_value().as_f64().unwrap_or(0.0) * 9.0 / 5.0 + 32.0
            },
            {
                let celsius = celsius.clone();
                move |f: f64| {
                    celsius.set((f - 32.0) * 5.0 / 9.0);
                }
            },
        );

        assert_eq!(fahrenheit.get(), 32.0);
        fahrenheit.set(212.0);
        assert_eq!(celsius.peek(), Value::from(100));
        assert_eq!(fahrenheit.get(), 212.0);
    }

    #[test]
    fn computed_values_can_be_strings() {
        let rt = Runtime::new();
        let name = rt.create_ref("weft");

        let greeting = rt.computed({
            let name = name.clone();
            move || format!("hello, {}", name.get_value())
        });

        assert_eq!(greeting.get(), "hello, weft");
        name.set("world");
        assert_eq!(greeting.get(), "hello, world");
    }
}
