//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive UI library.
//! It implements:
//!
//! - Reactive primitives (reactive objects, refs, computed values, effects)
//! - A batched update scheduler
//! - Virtual nodes and a keyed reconciler
//! - Components with props, setup bindings and templates
//!
//! Nothing is global: every piece of state hangs off a [`Runtime`], and
//! every host tree is reached through a [`HostAdapter`].
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives and dependency tracking
//! - `graph`: Dependency graph and job queue behind the runtime
//! - `render`: Virtual nodes, reconciliation, components and hosts
//! - `config`: Runtime configuration
//! - `error`: The crate-wide error type
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft_core::{h, ComponentDef, HeadlessHost, ObjectRef, Renderer, Runtime};
//!
//! let rt = Runtime::new();
//! let host = Arc::new(HeadlessHost::new());
//! let root = host.create_container("div");
//! let renderer = Renderer::new(host.clone(), rt.clone());
//!
//! let state = rt.reactive(ObjectRef::from_entries([("count", 0)]));
//!
//! let counter = ComponentDef::builder("counter")
//!     .render({
//!         let state = state.clone();
//!         move |_| h("span", None, state.get_value("count"))
//!     })
//!     .build();
//!
//! renderer.render(Some(h(&counter, None, ())), root)?;
//!
//! state.set("count", 1);
//! rt.flush_jobs()?;
//! assert_eq!(host.text_content(root), "1");
//! ```

pub mod config;
pub mod error;
mod graph;
pub mod reactive;
pub mod render;

pub use config::{FlushMode, RuntimeConfig};
pub use error::{Error, Result};
pub use reactive::{
    has_changed, Callback, Computed, Effect, EffectOptions, Field, Key, ObjectRef, Reactive, Ref,
    Runtime, Value,
};
pub use render::{
    create_app, fragment, h, text, App, Bindings, Children, Component, ComponentDef, HeadlessHost,
    HostAdapter, HostNode, MountTarget, Props, Renderer, TemplateCompiler, VNode, VNodeType,
};
