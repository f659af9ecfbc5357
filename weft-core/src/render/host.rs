//! Host Tree Seam
//!
//! The reconciler never touches a real tree. Every mutation goes through a
//! [`HostAdapter`], which owns the actual nodes and hands out opaque
//! [`HostNode`] handles. A browser DOM, a terminal UI or the in-memory
//! [`HeadlessHost`](super::HeadlessHost) all plug in here.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::reactive::{Callback, Value};

static NEXT_HOST_NODE: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to a node owned by a host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNode(u64);

impl HostNode {
    /// Allocate a process-unique handle.
    pub fn new() -> Self {
        Self(NEXT_HOST_NODE.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a handle the adapter already numbered itself.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for HostNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Primitive host-tree operations used by the renderer.
///
/// Adapters use interior mutability; the renderer may call them from inside
/// effects and scheduler flushes.
pub trait HostAdapter: Send + Sync + 'static {
    fn create_element(&self, tag: &str) -> HostNode;

    fn create_text(&self, text: &str) -> HostNode;

    /// An empty node used to bracket fragments.
    fn create_marker(&self) -> HostNode;

    /// Insert `node` into `parent` before `anchor`, or at the end when
    /// `anchor` is `None`. A node that already has a parent is moved.
    fn insert_before(&self, parent: HostNode, node: HostNode, anchor: Option<HostNode>);

    fn remove_child(&self, parent: HostNode, node: HostNode);

    fn set_attribute(&self, node: HostNode, name: &str, value: &str);

    fn remove_attribute(&self, node: HostNode, name: &str);

    fn set_class(&self, node: HostNode, class: &str);

    /// Set one style property; `None` clears it.
    fn set_style(&self, node: HostNode, name: &str, value: Option<&str>);

    /// Bind a value as a node property rather than a markup attribute.
    fn set_property(&self, node: HostNode, name: &str, value: &Value);

    fn add_event_listener(&self, node: HostNode, event: &str, handler: &Callback);

    fn remove_event_listener(&self, node: HostNode, event: &str, handler: &Callback);

    /// Replace the text of a text node, or every child of an element with a
    /// single text node.
    fn set_text(&self, node: HostNode, text: &str);

    fn parent(&self, node: HostNode) -> Option<HostNode>;

    fn next_sibling(&self, node: HostNode) -> Option<HostNode>;

    fn first_child(&self, node: HostNode) -> Option<HostNode>;

    /// Find a node by selector. Adapters without lookup return `None`.
    fn query_selector(&self, _selector: &str) -> Option<HostNode> {
        None
    }

    /// Serialized children of a node, used as an inline template source.
    fn inner_markup(&self, _node: HostNode) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique() {
        let a = HostNode::new();
        let b = HostNode::new();
        assert_ne!(a, b);
        assert_eq!(HostNode::from_raw(a.raw()), a);
    }
}
