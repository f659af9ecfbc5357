//! Reactive Wrapper
//!
//! A [`Reactive`] wraps a plain [`ObjectRef`] and routes every access through
//! the dependency graph: reads call `track`, writes that change something call
//! `trigger`. There is at most one wrapper per object and runtime; the
//! runtime's wrapper cache hands out the existing one.
//!
//! Reading a field that holds an object returns that object's wrapper, created
//! on first access, so nested reads are tracked at the exact field visited.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::warn;

use super::runtime::{Runtime, RuntimeInner};
use super::{Key, ObjectRef, TargetId, Value};

/// Something whose fields can be tracked and triggered.
pub trait Trackable {
    fn target_id(&self) -> TargetId;

    /// Dead once the tracked thing is gone; the graph drops its records then.
    fn liveness(&self) -> Weak<dyn Any + Send + Sync>;

    /// Lists address fields by index.
    fn is_list(&self) -> bool {
        false
    }
}

impl Trackable for ObjectRef {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn liveness(&self) -> Weak<dyn Any + Send + Sync> {
        ObjectRef::liveness(self)
    }

    fn is_list(&self) -> bool {
        ObjectRef::is_list(self)
    }
}

/// Things [`Runtime::reactive`] accepts.
pub trait IntoTarget {
    fn into_target(self) -> ObjectRef;
}

impl IntoTarget for ObjectRef {
    fn into_target(self) -> ObjectRef {
        self
    }
}

impl IntoTarget for &ObjectRef {
    fn into_target(self) -> ObjectRef {
        self.clone()
    }
}

impl IntoTarget for Reactive {
    fn into_target(self) -> ObjectRef {
        self.inner.target.clone()
    }
}

impl IntoTarget for &Reactive {
    fn into_target(self) -> ObjectRef {
        self.inner.target.clone()
    }
}

pub(crate) struct ReactiveInner {
    target: ObjectRef,
    runtime: Weak<RuntimeInner>,
}

impl ReactiveInner {
    pub(super) fn new(target: ObjectRef, runtime: Weak<RuntimeInner>) -> Self {
        Self { target, runtime }
    }

    pub(super) fn target(&self) -> &ObjectRef {
        &self.target
    }
}

/// Tracked view of a plain object.
///
/// # Example
///
/// ```rust,ignore
/// let state = rt.reactive(ObjectRef::from_entries([("count", 0)]));
///
/// // Tracked read
/// let count = state.get("count");
///
/// // Write; notifies subscribers if the value changed
/// state.set("count", 1);
/// ```
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ReactiveInner>,
}

impl Reactive {
    pub(super) fn from_inner(inner: Arc<ReactiveInner>) -> Self {
        Self { inner }
    }

    pub fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_inner)
    }

    /// The wrapped object. Access through it is untracked.
    pub fn raw(&self) -> &ObjectRef {
        &self.inner.target
    }

    pub fn id(&self) -> TargetId {
        self.inner.target.id()
    }

    pub fn is_list(&self) -> bool {
        self.inner.target.is_list()
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn normalize(&self, key: impl Into<Key>) -> Key {
        key.into().normalize(self.inner.target.is_list())
    }

    fn track(&self, runtime: &Runtime, key: Key) {
        let target = &self.inner.target;
        runtime.track_id(target.id(), || target.liveness(), key);
    }

    /// Tracked read. Objects come back as their wrappers.
    pub fn get(&self, key: impl Into<Key>) -> Field {
        let key = self.normalize(key);
        let value = self.inner.target.read_key(&key);
        match self.runtime() {
            Some(runtime) => {
                self.track(&runtime, key);
                runtime.reactive_value(value)
            }
            None => Field::Value(value),
        }
    }

    /// Tracked read of the plain value.
    pub fn get_value(&self, key: impl Into<Key>) -> Value {
        let key = self.normalize(key);
        if let Some(runtime) = self.runtime() {
            self.track(&runtime, key.clone());
        }
        self.inner.target.read_key(&key)
    }

    /// Write a field. Subscribers are notified only if the value changed
    /// (NaN-aware). Returns whether it changed.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = self.normalize(key);
        let Some(write) = self.inner.target.write_key(&key, value.into()) else {
            return false;
        };
        let Some(runtime) = self.runtime() else {
            return true;
        };

        let id = self.id();
        runtime.trigger_id(id, &key);
        if key != Key::Length && write.new_len != write.old_len {
            runtime.trigger_id(id, &Key::Length);
        }
        // Truncation empties the dropped positions.
        for index in write.new_len..write.old_len {
            runtime.trigger_id(id, &Key::Index(index));
        }
        true
    }

    /// Tracked size.
    pub fn len(&self) -> usize {
        if let Some(runtime) = self.runtime() {
            self.track(&runtime, Key::Length);
        }
        self.inner.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to a list.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        if !self.inner.target.is_list() {
            warn!(target_id = self.id().raw(), "push on a map ignored");
            return false;
        }
        let len = self.inner.target.len();
        self.set(Key::Index(len), value)
    }

    /// Keys in order. Subscribes to the size, so adding or removing entries
    /// notifies.
    pub fn keys(&self) -> Vec<Key> {
        if let Some(runtime) = self.runtime() {
            self.track(&runtime, Key::Length);
        }
        self.inner.target.keys()
    }

    /// Every field, tracked individually.
    pub fn items(&self) -> Vec<Field> {
        self.keys().into_iter().map(|key| self.get(key)).collect()
    }

    /// Every field with its key, tracked individually.
    pub fn entries(&self) -> Vec<(Key, Field)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let field = self.get(key.clone());
                (key, field)
            })
            .collect()
    }
}

impl Trackable for Reactive {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn liveness(&self) -> Weak<dyn Any + Send + Sync> {
        self.inner.target.liveness()
    }

    fn is_list(&self) -> bool {
        self.inner.target.is_list()
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Reactive {}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        Value::Object(reactive.inner.target.clone())
    }
}

impl From<&Reactive> for Value {
    fn from(reactive: &Reactive) -> Self {
        Value::Object(reactive.inner.target.clone())
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reactive").field(&self.inner.target).finish()
    }
}

/// Result of a tracked read: a plain value or a nested wrapper.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Value(Value),
    Reactive(Reactive),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Value(Value::Null))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Field::Value(value) => value.as_f64(),
            Field::Reactive(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Field::Value(value) => value.as_bool(),
            Field::Reactive(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Value(value) => value.as_str(),
            Field::Reactive(_) => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Field::Reactive(reactive) => Some(reactive),
            Field::Value(_) => None,
        }
    }

    pub fn into_reactive(self) -> Option<Reactive> {
        match self {
            Field::Reactive(reactive) => Some(reactive),
            Field::Value(_) => None,
        }
    }

    /// The plain value; wrappers unwrap to their object.
    pub fn into_value(self) -> Value {
        match self {
            Field::Value(value) => value,
            Field::Reactive(reactive) => reactive.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        self.clone().into_value()
    }
}

impl From<Field> for Value {
    fn from(field: Field) -> Self {
        field.into_value()
    }
}

impl From<&Field> for Value {
    fn from(field: &Field) -> Self {
        field.to_value()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(value) => fmt::Display::fmt(value, f),
            Field::Reactive(reactive) => {
                fmt::Display::fmt(&Value::Object(reactive.raw().clone()), f)
            }
        }
    }
}
