//! Components
//!
//! A component definition ([`ComponentDef`]) declares its prop names, an
//! optional setup function and either a render function or a template.
//! Mounting a component node creates a [`ComponentInstance`].
//!
//! # How Instances Work
//!
//! 1. The node's props are split into declared props and everything else
//!    ("attrs"). Declared props go into one reactive object per instance.
//!
//! 2. Setup runs once, untracked, with the reactive props and the attrs. It
//!    returns named [`Bindings`] for the render function to read.
//!
//! 3. Rendering runs inside a lazy effect whose scheduler queues it on the
//!    runtime. State changes therefore re-render once per flush, not once per
//!    write.
//!
//! 4. A parent re-render hands the instance its new node, invalidates any
//!    queued job and re-renders synchronously. Props are updated field by
//!    field, so only changed props notify.
//!
//! Attrs fall through onto the root of the rendered subtree.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{error, warn};

use super::helpers::{camelize, capitalize};
use super::host::HostNode;
use super::vnode::{Props, Rendered, VNode, WeakVNode};
use crate::error::{Error, Result};
use crate::reactive::{Callback, Computed, Effect, Field, ObjectRef, Reactive, Ref, Runtime, Value};

/// A shared component definition. Component nodes compare by definition
/// identity.
pub type Component = Arc<ComponentDef>;

/// Render function of a component.
pub type RenderFn = Arc<dyn Fn(&RenderContext<'_>) -> Result<Rendered> + Send + Sync>;

/// Setup function of a component.
pub type SetupFn = Arc<dyn Fn(&Reactive, &SetupContext) -> Bindings + Send + Sync>;

pub(crate) type Registry = Arc<RwLock<IndexMap<Arc<str>, Component>>>;

/// Box a closure as a [`RenderFn`].
pub fn render_fn<F>(render: F) -> RenderFn
where
    F: Fn(&RenderContext<'_>) -> Result<Rendered> + Send + Sync + 'static,
{
    Arc::new(render)
}

/// Turns template source into a render function.
///
/// No compiler ships with the crate; install one on the renderer to use
/// template components.
pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<RenderFn>;
}

/// Something a setup function exposes to its render function.
pub trait Binding: Send + Sync {
    /// Current value. Reads through reactive sources are tracked.
    fn get(&self) -> Field;
}

impl Binding for Value {
    fn get(&self) -> Field {
        Field::Value(self.clone())
    }
}

impl Binding for Reactive {
    fn get(&self) -> Field {
        Field::Reactive(self.clone())
    }
}

impl Binding for Ref {
    fn get(&self) -> Field {
        Ref::get(self)
    }
}

impl Binding for Callback {
    fn get(&self) -> Field {
        Field::Value(Value::Callback(self.clone()))
    }
}

impl<T> Binding for Computed<T>
where
    T: Clone + Send + Sync + Into<Value> + 'static,
{
    fn get(&self) -> Field {
        Field::Value(Computed::get(self).into())
    }
}

/// Named values returned by setup.
#[derive(Clone, Default)]
pub struct Bindings(IndexMap<Arc<str>, Arc<dyn Binding>>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<Arc<str>>, binding: impl Binding + 'static) -> Self {
        self.insert(name, binding);
        self
    }

    pub fn insert(&mut self, name: impl Into<Arc<str>>, binding: impl Binding + 'static) {
        self.0.insert(name.into(), Arc::new(binding));
    }

    pub fn get(&self, name: &str) -> Option<Field> {
        self.0.get(name).map(|binding| binding.get())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// What setup receives besides the props.
#[derive(Debug, Clone)]
pub struct SetupContext {
    pub attrs: Props,
    pub runtime: Runtime,
}

/// A component definition.
#[derive(Clone)]
pub struct ComponentDef {
    name: Arc<str>,
    props: Vec<Arc<str>>,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
    template: Option<Arc<str>>,
    components: IndexMap<Arc<str>, Component>,
    compiled: OnceLock<RenderFn>,
}

impl ComponentDef {
    pub fn builder(name: impl Into<Arc<str>>) -> ComponentBuilder {
        ComponentBuilder {
            def: ComponentDef {
                name: name.into(),
                props: Vec::new(),
                setup: None,
                render: None,
                template: None,
                components: IndexMap::new(),
                compiled: OnceLock::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared prop names.
    pub fn prop_names(&self) -> &[Arc<str>] {
        &self.props
    }

    pub fn declares(&self, prop: &str) -> bool {
        self.props.iter().any(|name| &**name == prop)
    }

    pub fn has_render(&self) -> bool {
        self.render.is_some()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Components registered locally on this definition.
    pub fn components(&self) -> &IndexMap<Arc<str>, Component> {
        &self.components
    }

    /// The render function, if already known without compiling.
    pub(crate) fn known_render(&self) -> Option<RenderFn> {
        self.render.clone().or_else(|| self.compiled.get().cloned())
    }

    /// Cache a compiled render function. The first one stored wins.
    pub(crate) fn store_compiled(&self, render: RenderFn) -> RenderFn {
        Arc::clone(self.compiled.get_or_init(|| render))
    }

    /// A copy of this definition using `template`, with nothing compiled.
    pub(crate) fn with_template(&self, template: impl Into<Arc<str>>) -> Component {
        Arc::new(ComponentDef {
            template: Some(template.into()),
            compiled: OnceLock::new(),
            ..self.clone()
        })
    }

    /// Look up a local component by name or its camelized and capitalized
    /// forms.
    pub(crate) fn local_component(&self, name: &str) -> Option<Component> {
        lookup(&self.components, name)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("setup", &self.setup.is_some())
            .field("render", &self.render.is_some())
            .field("template", &self.template)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`ComponentDef`].
pub struct ComponentBuilder {
    def: ComponentDef,
}

impl ComponentBuilder {
    /// Declare prop names.
    pub fn props<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.def.props.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&Reactive, &SetupContext) -> Bindings + Send + Sync + 'static,
    {
        self.def.setup = Some(Arc::new(setup));
        self
    }

    /// An infallible render function.
    pub fn render<F, R>(mut self, render: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> R + Send + Sync + 'static,
        R: Into<Rendered>,
    {
        self.def.render = Some(render_fn(move |ctx| Ok(render(ctx).into())));
        self
    }

    pub fn try_render<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> Result<Rendered> + Send + Sync + 'static,
    {
        self.def.render = Some(render_fn(render));
        self
    }

    /// Template source, or `#id` to read it from a host node.
    pub fn template(mut self, template: impl Into<Arc<str>>) -> Self {
        self.def.template = Some(template.into());
        self
    }

    /// Register a child component under its own name.
    pub fn component(mut self, component: Component) -> Self {
        self.def
            .components
            .insert(Arc::clone(&component.name), component);
        self
    }

    pub fn build(self) -> Component {
        Arc::new(self.def)
    }
}

fn lookup(registry: &IndexMap<Arc<str>, Component>, name: &str) -> Option<Component> {
    if let Some(found) = registry.get(name) {
        return Some(Arc::clone(found));
    }
    let camel = camelize(name);
    if let Some(found) = registry.get(camel.as_str()) {
        return Some(Arc::clone(found));
    }
    registry.get(capitalize(&camel).as_str()).cloned()
}

/// What a render function sees.
pub struct RenderContext<'a> {
    instance: &'a ComponentInstance,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(instance: &'a ComponentInstance) -> Self {
        Self { instance }
    }

    /// A setup binding, else a declared prop (tracked), else null.
    pub fn get(&self, name: &str) -> Field {
        if let Some(field) = self.instance.bindings.get(name) {
            return field;
        }
        if self.instance.def.declares(name) {
            return self.instance.props.get(name);
        }
        Field::Value(Value::Null)
    }

    /// Like [`get`](Self::get), unwrapped to a plain value.
    pub fn value(&self, name: &str) -> Value {
        self.get(name).into_value()
    }

    pub fn props(&self) -> &Reactive {
        &self.instance.props
    }

    /// Props not declared by the component.
    pub fn attrs(&self) -> Props {
        self.instance.attrs.lock().clone()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.instance.runtime
    }

    /// A component by name: local components first, then the renderer's
    /// registry.
    pub fn resolve_component(&self, name: &str) -> Option<Component> {
        if let Some(local) = self.instance.def.local_component(name) {
            return Some(local);
        }
        let registry = self.instance.registry.read();
        lookup(&registry, name)
    }
}

pub(crate) struct InstanceState {
    pub subtree: Option<VNode>,
    /// The node currently representing this instance in its parent tree.
    pub owner: WeakVNode,
    /// A node handed down by a parent re-render, not yet consumed.
    pub next: Option<VNode>,
    pub mounted: bool,
    pub container: HostNode,
    pub anchor: Option<HostNode>,
}

/// A mounted component.
pub struct ComponentInstance {
    def: Component,
    render: RenderFn,
    runtime: Runtime,
    props: Reactive,
    attrs: Mutex<Props>,
    bindings: Bindings,
    registry: Registry,
    pub(crate) state: Mutex<InstanceState>,
    effect: OnceLock<Effect>,
    error: Mutex<Option<Error>>,
    sync: AtomicBool,
}

/// Split raw node props into declared prop values and attrs.
fn partition(def: &ComponentDef, raw: Option<&Props>) -> (Vec<(Arc<str>, Value)>, Props) {
    let declared = def
        .props
        .iter()
        .map(|name| {
            let value = raw.and_then(|raw| raw.get(name)).cloned().unwrap_or_default();
            (Arc::clone(name), value)
        })
        .collect();

    let attrs = raw
        .map(|raw| {
            raw.iter()
                .filter(|(name, _)| &***name != "key" && !def.declares(name))
                .map(|(name, value)| (Arc::clone(name), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    (declared, attrs)
}

impl ComponentInstance {
    /// Build an instance for `vnode` and run setup.
    pub(crate) fn create(
        def: Component,
        render: RenderFn,
        vnode: &VNode,
        runtime: &Runtime,
        registry: Registry,
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Arc<Self> {
        let (declared, attrs) = partition(&def, vnode.props());
        let props = runtime.reactive(ObjectRef::from_entries(declared));

        let bindings = match &def.setup {
            Some(setup) => {
                let ctx = SetupContext {
                    attrs: attrs.clone(),
                    runtime: runtime.clone(),
                };
                runtime.untracked(|| setup(&props, &ctx))
            }
            None => Bindings::new(),
        };

        Arc::new(Self {
            def,
            render,
            runtime: runtime.clone(),
            props,
            attrs: Mutex::new(attrs),
            bindings,
            registry,
            state: Mutex::new(InstanceState {
                subtree: None,
                owner: vnode.downgrade(),
                next: None,
                mounted: false,
                container,
                anchor,
            }),
            effect: OnceLock::new(),
            error: Mutex::new(None),
            sync: AtomicBool::new(false),
        })
    }

    pub fn def(&self) -> &Component {
        &self.def
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// The reactive declared props.
    pub fn props(&self) -> &Reactive {
        &self.props
    }

    pub fn attrs(&self) -> Props {
        self.attrs.lock().clone()
    }

    pub fn subtree(&self) -> Option<VNode> {
        self.state.lock().subtree.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().mounted
    }

    /// The render effect.
    pub fn effect(&self) -> Option<&Effect> {
        self.effect.get()
    }

    /// How many times the instance rendered.
    pub fn render_count(&self) -> usize {
        self.effect.get().map_or(0, Effect::run_count)
    }

    pub(crate) fn render_fn(&self) -> &RenderFn {
        &self.render
    }

    pub(crate) fn install_effect(&self, effect: Effect) {
        if let Err(effect) = self.effect.set(effect) {
            warn!(component = %self.def.name(), effect = ?effect.id(), "render effect already installed");
            effect.stop();
        }
    }

    /// Apply the props of a node handed down by the parent.
    pub(crate) fn update_props(&self, raw: Option<&Props>) {
        let (declared, attrs) = partition(&self.def, raw);
        for (name, value) in declared {
            self.props.set(name, value);
        }
        *self.attrs.lock() = attrs;
    }

    /// Run the render effect now, reporting its error to the caller instead
    /// of logging it.
    pub(crate) fn run_sync(&self) -> Result<()> {
        let Some(effect) = self.effect.get() else {
            return Ok(());
        };
        self.runtime.invalidate_job(effect.id());

        // Errors from an earlier queued render were already logged.
        let stale = self.take_error();
        drop(stale);

        let was_sync = self.sync.swap(true, Ordering::SeqCst);
        effect.run();
        self.sync.store(was_sync, Ordering::SeqCst);

        self.take_error().map_or(Ok(()), Err)
    }

    pub(crate) fn record_error(&self, err: Error) {
        if !self.sync.load(Ordering::SeqCst) {
            error!(component = %self.def.name(), error = %err, "component render failed");
        }
        *self.error.lock() = Some(err);
    }

    /// The last render error, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.error.lock().take()
    }

    /// Stop re-rendering. The subtree is left for the caller to unmount.
    pub(crate) fn stop(&self) {
        if let Some(effect) = self.effect.get() {
            effect.stop();
        }
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.def.name())
            .field("props", &self.props)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    fn counter() -> Component {
        ComponentDef::builder("counter")
            .props(["start"])
            .render(|ctx| ctx.value("start"))
            .build()
    }

    #[test]
    fn render_effect_installs_once() {
        let rt = Runtime::new();
        let def = counter();
        let render = def.known_render().unwrap();
        let vnode = crate::render::vnode::h(&def, props! { "start" => 1 }, ());
        let instance = ComponentInstance::create(
            def,
            render,
            &vnode,
            &rt,
            Registry::default(),
            HostNode::from_raw(1),
            None,
        );

        let first = rt.effect_with(|| {}, crate::reactive::EffectOptions::lazy());
        let second = rt.effect_with(|| {}, crate::reactive::EffectOptions::lazy());
        instance.install_effect(first.clone());
        instance.install_effect(second.clone());

        assert!(instance.effect().unwrap().ptr_eq(&first));
        assert!(first.is_active());
        assert!(!second.is_active());
    }

    #[test]
    fn builder_collects_parts() {
        let child = counter();
        let parent = ComponentDef::builder("app")
            .template("<div></div>")
            .component(child.clone())
            .build();

        assert_eq!(parent.name(), "app");
        assert!(!parent.has_render());
        assert_eq!(parent.template(), Some("<div></div>"));
        assert!(Arc::ptr_eq(&parent.local_component("counter").unwrap(), &child));
        assert!(counter().declares("start"));
        assert!(!counter().declares("other"));
    }

    #[test]
    fn local_lookup_tries_camel_and_capitalized_names() {
        let todo = ComponentDef::builder("TodoItem").build();
        let app = ComponentDef::builder("app").component(todo.clone()).build();

        assert!(Arc::ptr_eq(&app.local_component("todo-item").unwrap(), &todo));
        assert!(Arc::ptr_eq(&app.local_component("todoItem").unwrap(), &todo));
        assert!(app.local_component("missing").is_none());
    }

    #[test]
    fn partition_splits_declared_props_from_attrs() {
        let def = ComponentDef::builder("c").props(["a", "b"]).build();
        let raw = props! { "a" => 1, "key" => 5, "class" => "x" };

        let (declared, attrs) = partition(&def, Some(&raw));
        assert_eq!(declared.len(), 2);
        assert_eq!(declared[0].1, Value::from(1));
        // Absent declared props are null
        assert!(declared[1].1.is_null());

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("class"), Some(&Value::from("x")));
    }

    #[test]
    fn compiled_render_is_cached_once() {
        let def = ComponentDef::builder("t").template("x").build();
        assert!(def.known_render().is_none());

        let first = render_fn(|_| Ok(Rendered::from("a")));
        let second = render_fn(|_| Ok(Rendered::from("b")));

        let stored = def.store_compiled(first.clone());
        assert!(Arc::ptr_eq(&stored, &first));
        let stored = def.store_compiled(second);
        assert!(Arc::ptr_eq(&stored, &first));
    }

    #[test]
    fn bindings_expose_reactive_sources() {
        let rt = Runtime::new();
        let count = rt.create_ref(3);
        let doubled = rt.computed({
            let count = count.clone();
            move || count.get_value().as_f64().unwrap_or(0.0) * 2.0
        });

        let bindings = Bindings::new()
            .with("count", count.clone())
            .with("doubled", doubled)
            .with("label", Value::from("n"));

        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings.get("count").unwrap().as_f64(), Some(3.0));
        assert_eq!(bindings.get("doubled").unwrap().as_f64(), Some(6.0));
        assert_eq!(bindings.get("label").unwrap().as_str(), Some("n"));

        count.set(4);
        assert_eq!(bindings.get("doubled").unwrap().as_f64(), Some(8.0));
        assert!(bindings.get("missing").is_none());
    }
}
