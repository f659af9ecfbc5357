//! Rendering
//!
//! Turns virtual node trees into host trees and keeps them in sync.
//!
//! # Concepts
//!
//! ## Virtual nodes
//!
//! A [`VNode`] describes an element, a text node, a fragment or a component.
//! Build them with [`h`], [`text`] and [`fragment`].
//!
//! ## Hosts
//!
//! The [`Renderer`] never owns real nodes. It drives a [`HostAdapter`], which
//! creates, inserts and removes them. [`HeadlessHost`] is an in-memory host
//! that records every operation.
//!
//! ## Components
//!
//! A [`ComponentDef`] renders a subtree from its props and setup bindings.
//! Each mounted component re-renders in a scheduler job when state it read
//! changes, and synchronously when its parent re-renders.
//!
//! ## Apps
//!
//! [`create_app`] binds a root component to a renderer and mounts it into a
//! container or a selector.

mod app;
mod component;
mod headless;
mod helpers;
mod host;
mod keyed;
mod props;
mod renderer;
mod vnode;

pub use app::{create_app, App, MountTarget};
pub use component::{
    render_fn, Binding, Bindings, Component, ComponentBuilder, ComponentDef, ComponentInstance,
    RenderContext, RenderFn, SetupContext, SetupFn, TemplateCompiler,
};
pub use headless::{HeadlessHost, HostOp};
pub use helpers::{camelize, capitalize, render_entries, render_list, render_range};
pub use host::{HostAdapter, HostNode};
pub use keyed::longest_increasing_subsequence;
pub use props::{patch_prop, patch_props};
pub use renderer::Renderer;
pub use vnode::{fragment, h, normalize, text, Children, Props, Rendered, ShapeFlags, VKey, VNode, VNodeType};
