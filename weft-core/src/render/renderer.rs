//! Renderer
//!
//! Reconciles virtual node trees into a host tree through a [`HostAdapter`].
//!
//! # How Patching Works
//!
//! `patch(prev, next)` walks both trees together. A node whose type differs
//! from its predecessor is never patched in place: the old node is unmounted
//! and the new one mounted where it was. Otherwise the host node is reused and
//! only the differences are applied:
//!
//! - text nodes rewrite their content when it changed
//! - fragments diff their children between two marker nodes
//! - elements diff their props, then their children
//! - components hand the new node to their instance and re-render it
//!
//! Children are diffed by shape. Two non-empty node lists use the keyed diff
//! (see `keyed.rs`) when both first children carry a key, and the positional
//! diff otherwise.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::app::App;
use super::component::{
    Component, ComponentDef, ComponentInstance, Registry, RenderContext, RenderFn,
    TemplateCompiler,
};
use super::host::{HostAdapter, HostNode};
use super::props::patch_props;
use super::vnode::{normalize, Children, VNode, VNodeType};
use crate::error::{Error, Result};
use crate::reactive::{Effect, EffectOptions, Runtime};

pub(crate) struct RendererInner<H: HostAdapter> {
    host: Arc<H>,
    runtime: Runtime,
    compiler: RwLock<Option<Arc<dyn TemplateCompiler>>>,
    components: Registry,
    roots: Mutex<HashMap<HostNode, VNode>>,
}

/// Mounts and updates virtual trees on one host. Clones share state.
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(HeadlessHost::new());
/// let root = host.create_container("div");
/// let renderer = Renderer::new(host.clone(), Runtime::new());
///
/// renderer.render(Some(h("ul", None, vec![h("li", None, "a")])), root)?;
/// renderer.render(None, root)?;
/// ```
pub struct Renderer<H: HostAdapter> {
    inner: Arc<RendererInner<H>>,
}

impl<H: HostAdapter> Clone for Renderer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: HostAdapter> Renderer<H> {
    pub fn new(host: Arc<H>, runtime: Runtime) -> Self {
        Self {
            inner: Arc::new(RendererInner {
                host,
                runtime,
                compiler: RwLock::new(None),
                components: Registry::default(),
                roots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn with_compiler(self, compiler: impl TemplateCompiler + 'static) -> Self {
        self.set_compiler(compiler);
        self
    }

    pub fn set_compiler(&self, compiler: impl TemplateCompiler + 'static) {
        *self.inner.compiler.write() = Some(Arc::new(compiler));
    }

    pub fn has_compiler(&self) -> bool {
        self.inner.compiler.read().is_some()
    }

    pub fn host(&self) -> &Arc<H> {
        &self.inner.host
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Make a component resolvable by name from every render context.
    pub fn register_component(&self, name: impl Into<Arc<str>>, component: Component) {
        self.inner.components.write().insert(name.into(), component);
    }

    /// A globally registered component.
    pub fn resolve_component(&self, name: &str) -> Option<Component> {
        let registry = self.inner.components.read();
        let found = registry.get(name).cloned();
        found
    }

    /// Start an application rooted at `root`.
    pub fn create_app(&self, root: Component) -> App<H> {
        App::new(self.clone(), root)
    }

    /// The tree currently rendered into `container`.
    pub fn root(&self, container: HostNode) -> Option<VNode> {
        self.inner.roots.lock().get(&container).cloned()
    }

    /// Render `vnode` into `container`, diffing against what was rendered
    /// there before. `None` unmounts.
    pub fn render(&self, vnode: Option<VNode>, container: HostNode) -> Result<()> {
        let prev = self.root(container);

        let result = match (prev.as_ref(), vnode) {
            (Some(prev), None) => {
                self.unmount(prev, container, true);
                let removed = self.inner.roots.lock().remove(&container);
                drop(removed);
                debug!(container = container.raw(), "root unmounted");
                Ok(())
            }
            (prev, Some(next)) => {
                let patched = self.patch(prev, &next, container, None);
                if patched.is_ok() {
                    let replaced = self.inner.roots.lock().insert(container, next);
                    drop(replaced);
                }
                patched
            }
            (None, None) => Ok(()),
        };

        drop(prev);
        self.inner.runtime.collect_garbage();
        result
    }

    // ---- Patching ----

    pub(crate) fn patch(
        &self,
        prev: Option<&VNode>,
        next: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        next.validate()?;

        let mut prev = prev;
        let mut anchor = anchor;
        if let Some(old) = prev {
            if old.ptr_eq(next) {
                return Ok(());
            }
            if !old.ty().is_same(next.ty()) {
                anchor = self
                    .last_host(old)
                    .and_then(|last| self.inner.host.next_sibling(last));
                self.unmount(old, container, true);
                prev = None;
            }
        }

        match next.ty() {
            VNodeType::Text => self.process_text(prev, next, container, anchor),
            VNodeType::Fragment => self.process_fragment(prev, next, container, anchor),
            VNodeType::Element(tag) => self.process_element(prev, next, tag, container, anchor),
            VNodeType::Component(def) => self.process_component(prev, next, def, container, anchor),
        }
    }

    fn mounted_el(prev: &VNode) -> Result<HostNode> {
        prev.el()
            .ok_or_else(|| Error::invalid(format!("patching unmounted node {:?}", prev.ty())))
    }

    fn process_text(
        &self,
        prev: Option<&VNode>,
        next: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        let host = &self.inner.host;
        let content = next.text().unwrap_or_default();
        match prev {
            None => {
                let el = host.create_text(content);
                host.insert_before(container, el, anchor);
                next.set_el(Some(el));
            }
            Some(prev) => {
                let el = Self::mounted_el(prev)?;
                next.set_el(Some(el));
                if prev.text().unwrap_or_default() != content {
                    host.set_text(el, content);
                }
            }
        }
        Ok(())
    }

    fn process_fragment(
        &self,
        prev: Option<&VNode>,
        next: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        let host = &self.inner.host;
        match prev {
            None => {
                let start = host.create_marker();
                let end = host.create_marker();
                host.insert_before(container, start, anchor);
                host.insert_before(container, end, anchor);
                next.set_el(Some(start));
                next.set_anchor(Some(end));
                self.mount_children(next.child_nodes(), container, Some(end))
            }
            Some(prev) => {
                let start = Self::mounted_el(prev)?;
                let end = prev
                    .anchor()
                    .ok_or_else(|| Error::invalid("fragment without an end marker"))?;
                next.set_el(Some(start));
                next.set_anchor(Some(end));
                self.patch_children(prev, next, container, Some(end))
            }
        }
    }

    fn process_element(
        &self,
        prev: Option<&VNode>,
        next: &VNode,
        tag: &str,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        let host = &self.inner.host;
        match prev {
            None => {
                let el = host.create_element(tag);
                next.set_el(Some(el));
                patch_props(host.as_ref(), el, None, next.props());
                match next.children() {
                    Children::Text(content) => host.set_text(el, content),
                    Children::Nodes(children) => self.mount_children(children, el, None)?,
                    Children::None => {}
                }
                host.insert_before(container, el, anchor);
                trace!(tag, node = el.raw(), "element mounted");
            }
            Some(prev) => {
                let el = Self::mounted_el(prev)?;
                next.set_el(Some(el));
                patch_props(host.as_ref(), el, prev.props(), next.props());
                self.patch_children(prev, next, el, None)?;
            }
        }
        Ok(())
    }

    fn process_component(
        &self,
        prev: Option<&VNode>,
        next: &VNode,
        def: &Component,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        match prev {
            None => self.mount_component(next, def, container, anchor),
            Some(prev) => {
                let instance = prev.component().ok_or_else(|| {
                    Error::invalid(format!("component `{}` was never mounted", def.name()))
                })?;
                next.set_el(prev.el());
                next.set_component(Arc::clone(&instance));
                instance.state.lock().next = Some(next.clone());
                instance.run_sync()
            }
        }
    }

    pub(crate) fn mount_children(
        &self,
        children: &[VNode],
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        for child in children {
            self.patch(None, child, container, anchor)?;
        }
        Ok(())
    }

    fn patch_children(
        &self,
        prev: &VNode,
        next: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        let host = &self.inner.host;
        match (prev.children(), next.children()) {
            (old, Children::Text(content)) => {
                if let Children::Nodes(old) = old {
                    self.unmount_children(old, container);
                }
                if prev.text() != Some(&**content) {
                    host.set_text(container, content);
                }
                Ok(())
            }
            (Children::Text(_), Children::Nodes(new)) => {
                host.set_text(container, "");
                self.mount_children(new, container, anchor)
            }
            (Children::Text(_), Children::None) => {
                host.set_text(container, "");
                Ok(())
            }
            (Children::Nodes(old), Children::Nodes(new)) => {
                let keyed = matches!(
                    (old.first(), new.first()),
                    (Some(a), Some(b)) if a.key().is_some() && b.key().is_some()
                );
                if keyed {
                    self.patch_keyed_children(old, new, container, anchor)
                } else {
                    self.patch_unkeyed_children(old, new, container, anchor)
                }
            }
            (Children::Nodes(old), Children::None) => {
                self.unmount_children(old, container);
                Ok(())
            }
            (Children::None, Children::Nodes(new)) => self.mount_children(new, container, anchor),
            (Children::None, Children::None) => Ok(()),
        }
    }

    // ---- Components ----

    fn mount_component(
        &self,
        vnode: &VNode,
        def: &Component,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        let render = self.resolve_render(def)?;
        let runtime = &self.inner.runtime;
        let instance = ComponentInstance::create(
            Arc::clone(def),
            render,
            vnode,
            runtime,
            Arc::clone(&self.inner.components),
            container,
            anchor,
        );
        vnode.set_component(Arc::clone(&instance));

        let job = {
            let renderer: Weak<RendererInner<H>> = Arc::downgrade(&self.inner);
            let instance = Arc::downgrade(&instance);
            move || {
                let (Some(inner), Some(instance)) = (renderer.upgrade(), instance.upgrade()) else {
                    return;
                };
                let renderer = Renderer { inner };
                if let Err(err) = renderer.render_component(&instance) {
                    instance.record_error(err);
                }
            }
        };
        let queue = {
            let runtime = runtime.downgrade();
            move |effect: &Effect| {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.queue_job(effect);
                }
            }
        };

        let effect = runtime.effect_with(job, EffectOptions::lazy().with_scheduler(queue));
        instance.install_effect(effect);
        debug!(component = %def.name(), "component mounted");
        instance.run_sync()
    }

    /// The render function of a definition, compiling its template on first
    /// use.
    fn resolve_render(&self, def: &ComponentDef) -> Result<RenderFn> {
        if let Some(render) = def.known_render() {
            return Ok(render);
        }
        let Some(template) = def.template() else {
            return Err(Error::MissingRender(def.name().to_owned()));
        };
        let compiler = self.inner.compiler.read().clone();
        let Some(compiler) = compiler else {
            return Err(Error::NoCompiler(def.name().to_owned()));
        };

        let source = if template.starts_with('#') {
            let host = &self.inner.host;
            host.query_selector(template)
                .and_then(|node| host.inner_markup(node))
                .ok_or_else(|| Error::Parse {
                    offset: 0,
                    message: format!("template `{template}` not found"),
                })?
        } else {
            template.to_owned()
        };

        let compiled = compiler.compile(&source)?;
        debug!(component = %def.name(), "template compiled");
        Ok(def.store_compiled(compiled))
    }

    /// One run of a component's render effect.
    fn render_component(&self, instance: &Arc<ComponentInstance>) -> Result<()> {
        let pending = instance.state.lock().next.take();
        if let Some(next) = &pending {
            instance.update_props(next.props());
            instance.state.lock().owner = next.downgrade();
        }

        let rendered = {
            let ctx = RenderContext::new(instance);
            (instance.render_fn())(&ctx)?
        };
        let mut subtree = normalize(rendered);
        let attrs = instance.attrs();
        if !attrs.is_empty() {
            subtree = subtree.with_merged_props(&attrs);
        }

        let (prev, container, anchor) = {
            let state = instance.state.lock();
            let anchor = if state.mounted { None } else { state.anchor };
            (state.subtree.clone(), state.container, anchor)
        };
        self.patch(prev.as_ref(), &subtree, container, anchor)?;

        let owner = instance.state.lock().owner.upgrade();
        if let Some(owner) = owner {
            owner.set_el(self.first_host(&subtree));
        }

        let replaced = {
            let mut state = instance.state.lock();
            state.mounted = true;
            state.subtree.replace(subtree)
        };
        drop(replaced);
        drop(prev);
        trace!(component = %instance.name(), "component rendered");
        Ok(())
    }

    // ---- Unmounting and moving ----

    /// Tear down `vnode`. Host nodes are removed only when `remove` is set;
    /// descendants of a removed node are walked for component bookkeeping
    /// only.
    pub(crate) fn unmount(&self, vnode: &VNode, container: HostNode, remove: bool) {
        let host = &self.inner.host;
        match vnode.ty() {
            VNodeType::Component(def) => {
                let Some(instance) = vnode.component() else {
                    return;
                };
                instance.stop();
                if let Some(subtree) = instance.subtree() {
                    self.unmount(&subtree, container, remove);
                }
                debug!(component = %def.name(), "component unmounted");
            }
            VNodeType::Fragment => {
                if remove {
                    if let (Some(start), Some(end)) = (vnode.el(), vnode.anchor()) {
                        for node in self.host_range(start, end) {
                            host.remove_child(container, node);
                        }
                    }
                }
                for child in vnode.child_nodes() {
                    self.unmount(child, container, false);
                }
            }
            VNodeType::Element(_) => {
                if remove {
                    if let Some(el) = vnode.el() {
                        host.remove_child(container, el);
                    }
                }
                if let Some(el) = vnode.el() {
                    for child in vnode.child_nodes() {
                        self.unmount(child, el, false);
                    }
                }
            }
            VNodeType::Text => {
                if remove {
                    if let Some(el) = vnode.el() {
                        host.remove_child(container, el);
                    }
                }
            }
        }
    }

    fn unmount_children(&self, children: &[VNode], container: HostNode) {
        for child in children {
            self.unmount(child, container, true);
        }
    }

    /// Host nodes from `start` to `end` inclusive, following siblings.
    fn host_range(&self, start: HostNode, end: HostNode) -> Vec<HostNode> {
        let mut range = Vec::new();
        let mut cursor = Some(start);
        while let Some(node) = cursor {
            range.push(node);
            if node == end {
                break;
            }
            cursor = self.inner.host.next_sibling(node);
        }
        range
    }

    /// Relocate every host node of `vnode` before `anchor`.
    pub(crate) fn move_vnode(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = &self.inner.host;
        match vnode.ty() {
            VNodeType::Component(_) => {
                if let Some(subtree) = vnode.component().and_then(|instance| instance.subtree()) {
                    self.move_vnode(&subtree, container, anchor);
                }
            }
            VNodeType::Fragment => {
                if let (Some(start), Some(end)) = (vnode.el(), vnode.anchor()) {
                    for node in self.host_range(start, end) {
                        host.insert_before(container, node, anchor);
                    }
                }
            }
            _ => {
                if let Some(el) = vnode.el() {
                    host.insert_before(container, el, anchor);
                }
            }
        }
    }

    /// The first host node `vnode` occupies.
    pub(crate) fn first_host(&self, vnode: &VNode) -> Option<HostNode> {
        match vnode.ty() {
            VNodeType::Component(_) => vnode
                .component()
                .and_then(|instance| instance.subtree())
                .and_then(|subtree| self.first_host(&subtree))
                .or_else(|| vnode.el()),
            _ => vnode.el(),
        }
    }

    /// The last host node `vnode` occupies.
    pub(crate) fn last_host(&self, vnode: &VNode) -> Option<HostNode> {
        match vnode.ty() {
            VNodeType::Component(_) => vnode
                .component()
                .and_then(|instance| instance.subtree())
                .and_then(|subtree| self.last_host(&subtree)),
            VNodeType::Fragment => vnode.anchor(),
            _ => vnode.el(),
        }
    }

    /// Registered component names, for diagnostics.
    pub fn component_names(&self) -> Vec<Arc<str>> {
        self.inner.components.read().keys().cloned().collect()
    }
}

impl<H: HostAdapter> fmt::Debug for Renderer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.inner.roots.lock().len())
            .field("components", &self.inner.components.read().len())
            .field("compiler", &self.has_compiler())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
