//! Reactive Primitives
//!
//! This module implements the reactive system: reactive objects, refs,
//! computed values and effects. These primitives drive every re-render.
//!
//! # Concepts
//!
//! ## Reactive objects
//!
//! A [`Reactive`] wraps a plain [`ObjectRef`] (a map or a list of
//! [`Value`]s). Reading a field inside an effect subscribes that effect to
//! the field; writing a different value notifies the subscribers.
//!
//! ## Refs
//!
//! A [`Ref`] is a single reactive cell, tracked under the `"value"` field.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed, and is itself
//! observable.
//!
//! ## Effects
//!
//! An [`Effect`] is a re-runnable computation that runs again whenever a
//! field it read changes, or hands the notification to its scheduler.
//!
//! # Implementation Notes
//!
//! All state lives in a [`Runtime`]. The runtime keeps a stack of running
//! effects; a tracked read subscribes whichever effect is on top. This
//! approach (automatic dependency tracking, or "transparent reactivity") is
//! the one used by Vue 3, SolidJS and Leptos.

mod computed;
mod context;
mod effect;
mod id;
mod reference;
mod runtime;
mod value;
mod wrapper;

pub use computed::Computed;
pub use effect::{Effect, EffectOptions, SchedulerFn};
pub use id::{EffectId, TargetId};
pub use reference::Ref;
pub use runtime::{Runtime, WeakRuntime};
pub use value::{has_changed, Callback, Key, ObjectRef, Value};
pub use wrapper::{Field, IntoTarget, Reactive, Trackable};

pub(crate) use runtime::RuntimeInner;
