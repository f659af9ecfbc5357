//! Plain state values.
//!
//! State handed to the runtime is dynamic: a [`Value`] is a scalar, a
//! callback, or a reference to an [`ObjectRef`], an identity-bearing map or
//! list. Objects are plain data here; tracking only happens when they are
//! accessed through a [`Reactive`](super::Reactive) wrapper.
//!
//! # Equality
//!
//! Values compare with "same value" semantics: numbers by value with NaN
//! equal to NaN, objects and callbacks by identity. A write only counts as a
//! change when the old and new values differ under this relation.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tracing::warn;

use super::id::TargetId;

/// Nesting depth past which `Display` stops descending into lists.
const DISPLAY_DEPTH: usize = 8;

/// A field address inside an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named field of a map (or of a ref/computed cell).
    Name(Arc<str>),
    /// A position inside a list.
    Index(usize),
    /// The number of entries of a map or list.
    Length,
}

impl Key {
    /// The pseudo-field refs and computeds are tracked under.
    pub fn value() -> Self {
        Key::Name(Arc::from("value"))
    }

    /// Map a key onto the shape of the object it addresses: numeric names and
    /// `"length"` address list positions and size, indices on maps become
    /// names.
    pub(crate) fn normalize(self, is_list: bool) -> Self {
        match self {
            Key::Name(name) if is_list => {
                if &*name == "length" {
                    Key::Length
                } else if let Ok(index) = name.parse::<usize>() {
                    Key::Index(index)
                } else {
                    Key::Name(name)
                }
            }
            Key::Index(index) if !is_list => Key::Name(Arc::from(index.to_string())),
            other => other,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
            Key::Length => f.write_str("length"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(Arc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Arc::from(name))
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<&Arc<str>> for Key {
    fn from(name: &Arc<str>) -> Self {
        Key::Name(Arc::clone(name))
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// A function value, typically an event handler.
///
/// Callbacks compare by identity, so re-rendering with the same handler does
/// not rebind the host listener.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&Value) + Send + Sync>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback with an argument (an event payload for handlers).
    pub fn call(&self, arg: &Value) {
        (self.0)(arg);
    }

    pub fn ptr_eq(&self, other: &Callback) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// A dynamic state value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Object(ObjectRef),
    Callback(Callback),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Value::Callback(callback) => Some(callback),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(object) if object.is_list() => "list",
            Value::Object(_) => "map",
            Value::Callback(_) => "callback",
        }
    }

    /// Same-value comparison: NaN equals NaN, objects and callbacks compare by
    /// identity.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Callback(a), Value::Callback(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Snapshot as JSON. Callbacks and cyclic references become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = Vec::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut Vec<TargetId>) -> serde_json::Value {
        match self {
            Value::Null | Value::Callback(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(object) => {
                if path.contains(&object.id()) {
                    return serde_json::Value::Null;
                }
                path.push(object.id());
                let data = object.snapshot();
                let json = match data {
                    TargetData::Map(map) => serde_json::Value::Object(
                        map.iter()
                            .map(|(k, v)| (k.to_string(), v.to_json_inner(path)))
                            .collect(),
                    ),
                    TargetData::List(items) => serde_json::Value::Array(
                        items.iter().map(|v| v.to_json_inner(path)).collect(),
                    ),
                };
                path.pop();
                json
            }
        }
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::String(s) => f.write_str(s),
            Value::Object(object) if object.is_list() => {
                if depth >= DISPLAY_DEPTH {
                    return Ok(());
                }
                let TargetData::List(items) = object.snapshot() else {
                    return Ok(());
                };
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    item.fmt_depth(f, depth + 1)?;
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Callback(_) => f.write_str("[function]"),
        }
    }
}

/// True when a write of `new` over `old` is an actual change.
pub fn has_changed(old: &Value, new: &Value) -> bool {
    !old.same_value(new)
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(object) => fmt::Debug::fmt(object, f),
            Value::Callback(callback) => fmt::Debug::fmt(callback, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f32, i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl From<&ObjectRef> for Value {
    fn from(object: &ObjectRef) -> Self {
        Value::Object(object.clone())
    }
}

impl From<Callback> for Value {
    fn from(callback: Callback) -> Self {
        Value::Callback(callback)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Object(ObjectRef::from_values(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => Value::Object(ObjectRef::from_entries(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

/// Storage behind an [`ObjectRef`].
#[derive(Clone)]
pub(crate) enum TargetData {
    Map(IndexMap<Arc<str>, Value>),
    List(Vec<Value>),
}

impl TargetData {
    fn kind(&self) -> &'static str {
        match self {
            TargetData::Map(_) => "map",
            TargetData::List(_) => "list",
        }
    }

    fn len(&self) -> usize {
        match self {
            TargetData::Map(map) => map.len(),
            TargetData::List(items) => items.len(),
        }
    }
}

pub(crate) struct Target {
    id: TargetId,
    data: RwLock<TargetData>,
}

/// Outcome of a raw write that changed something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Write {
    pub old_len: usize,
    pub new_len: usize,
}

/// A shared plain object: an insertion-ordered map or a list.
///
/// Cloning shares the same object. Access through `ObjectRef` is untracked;
/// wrap it with [`Runtime::reactive`](crate::Runtime::reactive) to observe it.
#[derive(Clone)]
pub struct ObjectRef(Arc<Target>);

impl ObjectRef {
    fn with_data(data: TargetData) -> Self {
        Self(Arc::new(Target {
            id: TargetId::new(),
            data: RwLock::new(data),
        }))
    }

    /// An empty map.
    pub fn map() -> Self {
        Self::with_data(TargetData::Map(IndexMap::new()))
    }

    /// An empty list.
    pub fn list() -> Self {
        Self::with_data(TargetData::List(Vec::new()))
    }

    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::with_data(TargetData::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn from_values<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::with_data(TargetData::List(values.into_iter().map(Into::into).collect()))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn is_list(&self) -> bool {
        matches!(*self.0.data.read(), TargetData::List(_))
    }

    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Untracked read.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into().normalize(self.is_list());
        self.read_key(&key)
    }

    /// Untracked write. Returns whether anything changed; nobody is notified.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into().normalize(self.is_list());
        self.write_key(&key, value.into()).is_some()
    }

    /// Keys in order: names for maps, indices for lists.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.0.data.read() {
            TargetData::Map(map) => map.keys().cloned().map(Key::Name).collect(),
            TargetData::List(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    pub(crate) fn snapshot(&self) -> TargetData {
        self.0.data.read().clone()
    }

    pub(crate) fn read_key(&self, key: &Key) -> Value {
        let data = self.0.data.read();
        match (&*data, key) {
            (TargetData::Map(map), Key::Name(name)) => map.get(name).cloned().unwrap_or_default(),
            (TargetData::List(items), Key::Index(index)) => {
                items.get(*index).cloned().unwrap_or_default()
            }
            (data, Key::Length) => Value::Number(data.len() as f64),
            _ => Value::Null,
        }
    }

    /// Apply a write, returning `None` when nothing changed.
    pub(crate) fn write_key(&self, key: &Key, value: Value) -> Option<Write> {
        let mut data = self.0.data.write();
        match (&mut *data, key) {
            (TargetData::Map(map), Key::Name(name)) => {
                let old_len = map.len();
                match map.get_mut(name) {
                    Some(slot) => {
                        if !has_changed(slot, &value) {
                            return None;
                        }
                        *slot = value;
                    }
                    // Null over a missing key reads the same before and after.
                    None if value.is_null() => return None,
                    None => {
                        map.insert(Arc::clone(name), value);
                    }
                }
                Some(Write {
                    old_len,
                    new_len: map.len(),
                })
            }
            (TargetData::List(items), Key::Index(index)) => {
                let old_len = items.len();
                let index = *index;
                if index < old_len {
                    if !has_changed(&items[index], &value) {
                        return None;
                    }
                    items[index] = value;
                } else {
                    grow(self.0.id, items, index.saturating_add(1))?;
                    items.resize(index, Value::Null);
                    items.push(value);
                }
                Some(Write {
                    old_len,
                    new_len: items.len(),
                })
            }
            (TargetData::List(items), Key::Length) => {
                let old_len = items.len();
                let new_len = match value.as_f64() {
                    Some(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                    _ => {
                        warn!(target_id = self.0.id.raw(), value = %value, "ignoring invalid list length");
                        return None;
                    }
                };
                if new_len == old_len {
                    return None;
                }
                grow(self.0.id, items, new_len)?;
                items.resize(new_len, Value::Null);
                Some(Write { old_len, new_len })
            }
            (data, key) => {
                warn!(
                    target_id = self.0.id.raw(),
                    kind = data.kind(),
                    %key,
                    "ignoring write to a key this object cannot hold"
                );
                None
            }
        }
    }

    pub(crate) fn liveness(&self) -> Weak<dyn Any + Send + Sync> {
        let weak: Weak<Target> = Arc::downgrade(&self.0);
        weak
    }
}

/// Longest list a write may produce, matching the JS array length limit.
pub(crate) const MAX_LIST_LEN: usize = u32::MAX as usize;

/// Reserve room for a list to reach `len` items. Lengths past
/// [`MAX_LIST_LEN`] or allocations that fail are refused.
fn grow(target: TargetId, items: &mut Vec<Value>, len: usize) -> Option<()> {
    if len > MAX_LIST_LEN {
        warn!(target_id = target.raw(), len, "ignoring list growth past the length limit");
        return None;
    }
    let additional = len.saturating_sub(items.len());
    if let Err(err) = items.try_reserve(additional) {
        warn!(target_id = target.raw(), len, error = %err, "ignoring list growth");
        return None;
    }
    Some(())
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.data.read();
        f.debug_struct("ObjectRef")
            .field("id", &self.0.id.raw())
            .field("kind", &data.kind())
            .field("len", &data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_is_the_same_value_as_nan() {
        assert!(!has_changed(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(has_changed(&Value::Number(f64::NAN), &Value::Number(1.0)));
        assert!(!has_changed(&Value::from(2), &Value::from(2.0)));
        assert!(has_changed(&Value::from("1"), &Value::from(1)));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = ObjectRef::from_entries([("x", 1)]);
        let b = ObjectRef::from_entries([("x", 1)]);
        assert_eq!(Value::from(&a), Value::from(a.clone()));
        assert_ne!(Value::from(&a), Value::from(&b));
    }

    #[test]
    fn keys_normalize_to_the_object_shape() {
        assert_eq!(Key::from("2").normalize(true), Key::Index(2));
        assert_eq!(Key::from("length").normalize(true), Key::Length);
        assert_eq!(Key::from("length").normalize(false), Key::from("length"));
        assert_eq!(Key::Index(3).normalize(false), Key::from("3"));
    }

    #[test]
    fn writing_past_the_end_grows_the_list() {
        let list = ObjectRef::from_values([1, 2]);
        let write = list.write_key(&Key::Index(4), Value::from(5)).unwrap();
        assert_eq!(write, Write { old_len: 2, new_len: 5 });
        assert!(list.get(3).is_null());
        assert_eq!(list.get(4), Value::from(5));
    }

    #[test]
    fn writing_length_truncates() {
        let list = ObjectRef::from_values(["a", "b", "c"]);
        assert!(list.set("length", 1));
        assert_eq!(list.len(), 1);
        assert!(!list.set("length", 1));
    }

    #[test]
    fn unchanged_writes_report_nothing() {
        let map = ObjectRef::from_entries([("n", f64::NAN)]);
        assert!(!map.set("n", f64::NAN));
        assert!(map.set("n", 1));
    }

    #[test]
    fn oversized_list_growth_is_refused() {
        let list = ObjectRef::from_values([1, 2]);
        assert!(list.write_key(&Key::Index(usize::MAX), Value::from(3)).is_none());
        assert!(list.write_key(&Key::Index(MAX_LIST_LEN), Value::from(3)).is_none());
        assert!(!list.set("length", 1e300));
        assert!(!list.set("length", (MAX_LIST_LEN as f64) + 1.0));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1), Value::from(2));
    }

    #[test]
    fn null_over_a_missing_key_is_not_a_write() {
        let map = ObjectRef::from_entries([("a", 1)]);
        assert!(map.write_key(&Key::from("b"), Value::Null).is_none());
        assert_eq!(map.len(), 1);

        // An existing key still changes to null
        assert!(map.set("a", Value::Null));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn names_on_lists_are_rejected() {
        let list = ObjectRef::list();
        assert!(!list.set("title", "x"));
        assert!(list.is_empty());
    }

    #[test]
    fn json_round_trips_through_values() {
        let source = json!({ "name": "weft", "tags": ["a", "b"], "nested": { "n": 1.5 } });
        let value = Value::from(source.clone());
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn cyclic_objects_serialize_as_null() {
        let map = ObjectRef::map();
        map.set("me", &map);
        assert_eq!(Value::from(&map).to_json(), json!({ "me": null }));
    }

    #[test]
    fn display_matches_template_output() {
        assert_eq!(Value::from(3.0).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(ObjectRef::from_values([1, 2])).to_string(), "1,2");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
    }
}
