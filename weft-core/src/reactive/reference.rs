//! Ref Implementation
//!
//! A Ref is a single reactive cell. It is tracked and triggered under the
//! `"value"` pseudo-field, the same one computed values use, so code reading
//! either looks the same.
//!
//! Objects stored in a ref come back wrapped, like nested fields of a
//! [`Reactive`](crate::Reactive).

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use super::runtime::{Runtime, RuntimeInner};
use super::wrapper::{Field, Trackable};
use super::{has_changed, Key, TargetId, Value};

struct RefInner {
    id: TargetId,
    value: RwLock<Value>,
    runtime: Weak<RuntimeInner>,
}

/// A reactive cell holding one [`Value`].
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.create_ref(0);
///
/// // Tracked read
/// let value = count.get_value();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefInner>,
}

impl Ref {
    pub(super) fn new(value: Value, runtime: Weak<RuntimeInner>) -> Self {
        Self {
            inner: Arc::new(RefInner {
                id: TargetId::new(),
                value: RwLock::new(value),
                runtime,
            }),
        }
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_inner)
    }

    /// Tracked read; objects come back wrapped.
    pub fn get(&self) -> Field {
        let value = self.get_value();
        match self.runtime() {
            Some(runtime) => runtime.reactive_value(value),
            None => Field::Value(value),
        }
    }

    /// Tracked read of the plain value.
    pub fn get_value(&self) -> Value {
        if let Some(runtime) = self.runtime() {
            runtime.track(self, Key::value());
        }
        self.inner.value.read().clone()
    }

    /// Untracked read.
    pub fn peek(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Replace the value. Subscribers are notified only if it changed.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut slot = self.inner.value.write();
            if !has_changed(&slot, &value) {
                return false;
            }
            *slot = value;
        }

        trace!(target_id = self.inner.id.raw(), "ref updated");
        if let Some(runtime) = self.runtime() {
            runtime.trigger(self, Key::value());
        }
        true
    }

    /// Set the value from the current one.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.peek());
        self.set(next)
    }
}

impl Trackable for Ref {
    fn target_id(&self) -> TargetId {
        self.inner.id
    }

    fn liveness(&self) -> Weak<dyn Any + Send + Sync> {
        let weak: Weak<RefInner> = Arc::downgrade(&self.inner);
        weak
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.inner.id.raw())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ObjectRef;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn ref_get_set() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        assert_eq!(count.get_value(), Value::from(0));

        assert!(count.set(5));
        assert_eq!(count.get_value(), Value::from(5));
    }

    #[test]
    fn ref_update() {
        let rt = Runtime::new();
        let count = rt.create_ref(10);

        count.update(|v| Value::from(v.as_f64().unwrap_or(0.0) + 5.0));
        assert_eq!(count.peek(), Value::from(15));
    }

    #[test]
    fn ref_notifies_only_on_change() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let runs = Arc::new(AtomicI32::new(0));

        let _effect = rt.effect({
            let count = count.clone();
            let runs = runs.clone();
            move || {
                count.get();
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        count.set(0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        count.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn objects_in_refs_come_back_wrapped() {
        let rt = Runtime::new();
        let object = ObjectRef::from_entries([("a", 1)]);
        let cell = rt.create_ref(&object);

        let field = cell.get();
        let wrapped = field.as_reactive().unwrap();
        assert!(wrapped.raw().ptr_eq(&object));
        assert!(wrapped.ptr_eq(&rt.reactive(&object)));
    }

    #[test]
    fn peek_does_not_track() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);

        let _effect = rt.effect({
            let count = count.clone();
            move || {
                count.peek();
            }
        });

        assert_eq!(rt.subscriber_count(&count, Key::value()), 0);
    }
}
