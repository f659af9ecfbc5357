//! Application entry point.
//!
//! An [`App`] mounts a root component into a container. A root component
//! with neither a render function nor a template uses the container's own
//! markup as its template.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::component::Component;
use super::host::{HostAdapter, HostNode};
use super::renderer::Renderer;
use super::vnode::{h, Props};
use crate::error::{Error, Result};

/// Where to mount an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountTarget {
    Node(HostNode),
    /// Resolved through [`HostAdapter::query_selector`].
    Selector(String),
}

impl From<HostNode> for MountTarget {
    fn from(node: HostNode) -> Self {
        MountTarget::Node(node)
    }
}

impl From<&str> for MountTarget {
    fn from(selector: &str) -> Self {
        MountTarget::Selector(selector.to_owned())
    }
}

impl From<String> for MountTarget {
    fn from(selector: String) -> Self {
        MountTarget::Selector(selector)
    }
}

/// A root component bound to a renderer.
pub struct App<H: HostAdapter> {
    renderer: Renderer<H>,
    root: Component,
    props: Option<Props>,
    container: Mutex<Option<HostNode>>,
}

/// Create an application for `root`.
pub fn create_app<H: HostAdapter>(renderer: &Renderer<H>, root: Component) -> App<H> {
    App::new(renderer.clone(), root)
}

impl<H: HostAdapter> App<H> {
    pub(crate) fn new(renderer: Renderer<H>, root: Component) -> Self {
        Self {
            renderer,
            root,
            props: None,
            container: Mutex::new(None),
        }
    }

    /// Props passed to the root component.
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = Some(props);
        self
    }

    pub fn renderer(&self) -> &Renderer<H> {
        &self.renderer
    }

    /// The container the app is mounted in.
    pub fn container(&self) -> Option<HostNode> {
        *self.container.lock()
    }

    /// Mount into `target`, returning the resolved container.
    pub fn mount(&self, target: impl Into<MountTarget>) -> Result<HostNode> {
        let host = self.renderer.host();

        for (name, component) in self.root.components() {
            self.renderer
                .register_component(Arc::clone(name), Arc::clone(component));
        }

        let container = match target.into() {
            MountTarget::Node(node) => node,
            MountTarget::Selector(selector) => host
                .query_selector(&selector)
                .ok_or(Error::ContainerNotFound(selector))?,
        };

        let mut root = Arc::clone(&self.root);
        if !root.has_render() && root.template().is_none() {
            if !self.renderer.has_compiler() {
                return Err(Error::NoCompiler(root.name().to_owned()));
            }
            let markup = host.inner_markup(container).unwrap_or_default();
            root = root.with_template(markup);
            while let Some(child) = host.first_child(container) {
                host.remove_child(container, child);
            }
        }

        self.renderer
            .render(Some(h(&root, self.props.clone(), ())), container)?;
        *self.container.lock() = Some(container);
        debug!(component = %root.name(), container = container.raw(), "app mounted");
        Ok(container)
    }

    /// Unmount from the container it was mounted in.
    pub fn unmount(&self) -> Result<()> {
        let container = self.container.lock().take();
        match container {
            Some(container) => self.renderer.render(None, container),
            None => Ok(()),
        }
    }
}
