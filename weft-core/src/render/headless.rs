//! Headless Host
//!
//! An in-memory [`HostAdapter`]. It keeps a small node arena and records every
//! mutation the renderer performs as a [`HostOp`], so tests can assert on the
//! exact mutations a diff produced and not only on the final tree.
//!
//! Invariants:
//! - A node has at most one parent.
//! - Inserting a node that already has a parent is recorded as a move.
//! - Removing a node drops its whole subtree from the arena.
//! - Containers made with [`HeadlessHost::create_container`] are not logged.

use std::fmt::Write as _;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::host::{HostAdapter, HostNode};
use crate::reactive::{Callback, Value};

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement {
        node: HostNode,
        tag: String,
    },
    CreateText {
        node: HostNode,
        text: String,
    },
    CreateMarker {
        node: HostNode,
    },
    /// A detached node was attached.
    Insert {
        parent: HostNode,
        node: HostNode,
        anchor: Option<HostNode>,
    },
    /// An attached node was relocated.
    Move {
        parent: HostNode,
        node: HostNode,
        anchor: Option<HostNode>,
    },
    Remove {
        parent: HostNode,
        node: HostNode,
    },
    SetText {
        node: HostNode,
        text: String,
    },
    SetAttribute {
        node: HostNode,
        name: String,
        value: String,
    },
    RemoveAttribute {
        node: HostNode,
        name: String,
    },
    SetClass {
        node: HostNode,
        class: String,
    },
    SetStyle {
        node: HostNode,
        name: String,
        value: Option<String>,
    },
    SetProperty {
        node: HostNode,
        name: String,
        value: Value,
    },
    AddListener {
        node: HostNode,
        event: String,
    },
    RemoveListener {
        node: HostNode,
        event: String,
    },
}

impl HostOp {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            HostOp::CreateElement { .. } | HostOp::CreateText { .. } | HostOp::CreateMarker { .. }
        )
    }

    pub fn is_move(&self) -> bool {
        matches!(self, HostOp::Move { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, HostOp::Remove { .. })
    }
}

#[derive(Debug)]
enum NodeKind {
    Element(ElementData),
    Text(String),
    Marker,
}

#[derive(Debug, Default)]
struct ElementData {
    tag: String,
    attributes: IndexMap<String, String>,
    class: String,
    style: IndexMap<String, String>,
    properties: IndexMap<String, Value>,
    listeners: Vec<(String, Callback)>,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Arena {
    nodes: IndexMap<HostNode, NodeData>,
    ops: Vec<HostOp>,
}

impl Arena {
    fn alloc(&mut self, kind: NodeKind) -> HostNode {
        let node = HostNode::new();
        self.nodes.insert(node, NodeData::new(kind));
        node
    }

    fn detach(&mut self, node: HostNode) {
        let parent = self.nodes.get_mut(&node).and_then(|data| data.parent.take());
        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(&parent)) {
            parent.children.retain(|child| *child != node);
        }
    }

    fn drop_subtree(&mut self, node: HostNode) {
        let mut pending = vec![node];
        while let Some(node) = pending.pop() {
            if let Some(data) = self.nodes.shift_remove(&node) {
                pending.extend(data.children);
            }
        }
    }

    fn write_markup(&self, node: HostNode, out: &mut String) {
        let Some(data) = self.nodes.get(&node) else {
            return;
        };
        match &data.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Marker => {}
            NodeKind::Element(el) => {
                let _ = write!(out, "<{}", el.tag);
                if !el.class.is_empty() {
                    let _ = write!(out, " class=\"{}\"", el.class);
                }
                for (name, value) in &el.attributes {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                if !el.style.is_empty() {
                    let style: Vec<String> = el
                        .style
                        .iter()
                        .map(|(name, value)| format!("{name}: {value}"))
                        .collect();
                    let _ = write!(out, " style=\"{}\"", style.join("; "));
                }
                out.push('>');
                for child in &data.children {
                    self.write_markup(*child, out);
                }
                let _ = write!(out, "</{}>", el.tag);
            }
        }
    }

    fn text_content(&self, node: HostNode, out: &mut String) {
        let Some(data) = self.nodes.get(&node) else {
            return;
        };
        if let NodeKind::Text(text) = &data.kind {
            out.push_str(text);
        }
        for child in &data.children {
            self.text_content(*child, out);
        }
    }
}

/// In-memory host tree with an operation log.
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(HeadlessHost::new());
/// let root = host.create_container("div");
/// let renderer = Renderer::new(host.clone(), Runtime::new());
///
/// renderer.render(Some(h("p", None, "hi")), root)?;
/// assert_eq!(host.inner_markup(root).as_deref(), Some("<p>hi</p>"));
/// ```
#[derive(Default)]
pub struct HeadlessHost {
    arena: Mutex<Arena>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A detached element to mount into. Not recorded in the log.
    pub fn create_container(&self, tag: &str) -> HostNode {
        self.arena.lock().alloc(NodeKind::Element(ElementData {
            tag: tag.to_owned(),
            ..ElementData::default()
        }))
    }

    /// Every mutation recorded so far.
    pub fn ops(&self) -> Vec<HostOp> {
        self.arena.lock().ops.clone()
    }

    /// Drain the log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.arena.lock().ops)
    }

    pub fn clear_ops(&self) {
        self.arena.lock().ops.clear();
    }

    /// Number of live nodes, containers included.
    pub fn node_count(&self) -> usize {
        self.arena.lock().nodes.len()
    }

    pub fn contains(&self, node: HostNode) -> bool {
        self.arena.lock().nodes.contains_key(&node)
    }

    pub fn children(&self, node: HostNode) -> Vec<HostNode> {
        let arena = self.arena.lock();
        arena
            .nodes
            .get(&node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: HostNode) -> Option<String> {
        let arena = self.arena.lock();
        let tag = arena
            .nodes
            .get(&node)
            .and_then(NodeData::element)
            .map(|el| el.tag.clone());
        tag
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.arena.lock().text_content(node, &mut out);
        out
    }

    /// Serialized node, markers omitted.
    pub fn to_markup(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.arena.lock().write_markup(node, &mut out);
        out
    }

    pub fn attribute(&self, node: HostNode, name: &str) -> Option<String> {
        let arena = self.arena.lock();
        let value = arena
            .nodes
            .get(&node)
            .and_then(NodeData::element)
            .and_then(|el| el.attributes.get(name).cloned());
        value
    }

    pub fn class(&self, node: HostNode) -> Option<String> {
        let arena = self.arena.lock();
        let class = arena
            .nodes
            .get(&node)
            .and_then(NodeData::element)
            .map(|el| el.class.clone());
        class
    }

    pub fn style(&self, node: HostNode, name: &str) -> Option<String> {
        let arena = self.arena.lock();
        let value = arena
            .nodes
            .get(&node)
            .and_then(NodeData::element)
            .and_then(|el| el.style.get(name).cloned());
        value
    }

    pub fn property(&self, node: HostNode, name: &str) -> Option<Value> {
        let arena = self.arena.lock();
        let value = arena
            .nodes
            .get(&node)
            .and_then(NodeData::element)
            .and_then(|el| el.properties.get(name).cloned());
        value
    }

    pub fn listener_count(&self, node: HostNode, event: &str) -> usize {
        let arena = self.arena.lock();
        let count = arena
            .nodes
            .get(&node)
            .and_then(NodeData::element)
            .map_or(0, |el| el.listeners.iter().filter(|(e, _)| e == event).count());
        count
    }

    /// Call every listener bound for `event` on `node`. Returns how many ran.
    pub fn dispatch(&self, node: HostNode, event: &str, payload: &Value) -> usize {
        let handlers: Vec<Callback> = {
            let arena = self.arena.lock();
            arena
                .nodes
                .get(&node)
                .and_then(NodeData::element)
                .map(|el| {
                    el.listeners
                        .iter()
                        .filter(|(e, _)| e == event)
                        .map(|(_, handler)| handler.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        for handler in &handlers {
            handler.call(payload);
        }
        handlers.len()
    }
}

impl HostAdapter for HeadlessHost {
    fn create_element(&self, tag: &str) -> HostNode {
        let mut arena = self.arena.lock();
        let node = arena.alloc(NodeKind::Element(ElementData {
            tag: tag.to_owned(),
            ..ElementData::default()
        }));
        arena.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_owned(),
        });
        node
    }

    fn create_text(&self, text: &str) -> HostNode {
        let mut arena = self.arena.lock();
        let node = arena.alloc(NodeKind::Text(text.to_owned()));
        arena.ops.push(HostOp::CreateText {
            node,
            text: text.to_owned(),
        });
        node
    }

    fn create_marker(&self) -> HostNode {
        let mut arena = self.arena.lock();
        let node = arena.alloc(NodeKind::Marker);
        arena.ops.push(HostOp::CreateMarker { node });
        node
    }

    fn insert_before(&self, parent: HostNode, node: HostNode, anchor: Option<HostNode>) {
        let mut arena = self.arena.lock();
        if !arena.nodes.contains_key(&parent) || !arena.nodes.contains_key(&node) {
            return;
        }

        let moved = arena.nodes.get(&node).is_some_and(|data| data.parent.is_some());
        arena.detach(node);

        if let Some(data) = arena.nodes.get_mut(&parent) {
            let index = anchor
                .and_then(|anchor| data.children.iter().position(|child| *child == anchor))
                .unwrap_or(data.children.len());
            data.children.insert(index, node);
        }
        if let Some(data) = arena.nodes.get_mut(&node) {
            data.parent = Some(parent);
        }

        let op = if moved {
            HostOp::Move {
                parent,
                node,
                anchor,
            }
        } else {
            HostOp::Insert {
                parent,
                node,
                anchor,
            }
        };
        arena.ops.push(op);
    }

    fn remove_child(&self, parent: HostNode, node: HostNode) {
        let mut arena = self.arena.lock();
        arena.detach(node);
        arena.drop_subtree(node);
        arena.ops.push(HostOp::Remove { parent, node });
    }

    fn set_attribute(&self, node: HostNode, name: &str, value: &str) {
        let mut arena = self.arena.lock();
        if let Some(el) = arena.nodes.get_mut(&node).and_then(NodeData::element_mut) {
            el.attributes.insert(name.to_owned(), value.to_owned());
        }
        arena.ops.push(HostOp::SetAttribute {
            node,
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    fn remove_attribute(&self, node: HostNode, name: &str) {
        let mut arena = self.arena.lock();
        if let Some(el) = arena.nodes.get_mut(&node).and_then(NodeData::element_mut) {
            el.attributes.shift_remove(name);
            match name {
                "style" => el.style.clear(),
                "class" => el.class.clear(),
                _ => {}
            }
        }
        arena.ops.push(HostOp::RemoveAttribute {
            node,
            name: name.to_owned(),
        });
    }

    fn set_class(&self, node: HostNode, class: &str) {
        let mut arena = self.arena.lock();
        if let Some(el) = arena.nodes.get_mut(&node).and_then(NodeData::element_mut) {
            el.class = class.to_owned();
        }
        arena.ops.push(HostOp::SetClass {
            node,
            class: class.to_owned(),
        });
    }

    fn set_style(&self, node: HostNode, name: &str, value: Option<&str>) {
        let mut arena = self.arena.lock();
        if let Some(el) = arena.nodes.get_mut(&node).and_then(NodeData::element_mut) {
            match value {
                Some(value) => {
                    el.style.insert(name.to_owned(), value.to_owned());
                }
                None => {
                    el.style.shift_remove(name);
                }
            }
        }
        arena.ops.push(HostOp::SetStyle {
            node,
            name: name.to_owned(),
            value: value.map(str::to_owned),
        });
    }

    fn set_property(&self, node: HostNode, name: &str, value: &Value) {
        let mut arena = self.arena.lock();
        if let Some(el) = arena.nodes.get_mut(&node).and_then(NodeData::element_mut) {
            el.properties.insert(name.to_owned(), value.clone());
        }
        arena.ops.push(HostOp::SetProperty {
            node,
            name: name.to_owned(),
            value: value.clone(),
        });
    }

    fn add_event_listener(&self, node: HostNode, event: &str, handler: &Callback) {
        let mut arena = self.arena.lock();
        if let Some(el) = arena.nodes.get_mut(&node).and_then(NodeData::element_mut) {
            el.listeners.push((event.to_owned(), handler.clone()));
        }
        arena.ops.push(HostOp::AddListener {
            node,
            event: event.to_owned(),
        });
    }

    fn remove_event_listener(&self, node: HostNode, event: &str, handler: &Callback) {
        let mut arena = self.arena.lock();
        if let Some(el) = arena.nodes.get_mut(&node).and_then(NodeData::element_mut) {
            el.listeners
                .retain(|(e, bound)| !(e == event && bound.ptr_eq(handler)));
        }
        arena.ops.push(HostOp::RemoveListener {
            node,
            event: event.to_owned(),
        });
    }

    fn set_text(&self, node: HostNode, text: &str) {
        let mut arena = self.arena.lock();
        let is_element = match arena.nodes.get_mut(&node) {
            Some(NodeData {
                kind: NodeKind::Text(content),
                ..
            }) => {
                *content = text.to_owned();
                false
            }
            Some(NodeData {
                kind: NodeKind::Element(_),
                ..
            }) => true,
            _ => false,
        };

        if is_element {
            let old_children = arena
                .nodes
                .get_mut(&node)
                .map(|data| std::mem::take(&mut data.children))
                .unwrap_or_default();
            for child in old_children {
                arena.drop_subtree(child);
            }
            if !text.is_empty() {
                let child = arena.alloc(NodeKind::Text(text.to_owned()));
                if let Some(data) = arena.nodes.get_mut(&child) {
                    data.parent = Some(node);
                }
                if let Some(data) = arena.nodes.get_mut(&node) {
                    data.children.push(child);
                }
            }
        }

        arena.ops.push(HostOp::SetText {
            node,
            text: text.to_owned(),
        });
    }

    fn parent(&self, node: HostNode) -> Option<HostNode> {
        self.arena.lock().nodes.get(&node).and_then(|data| data.parent)
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let arena = self.arena.lock();
        let parent = arena.nodes.get(&node)?.parent?;
        let siblings = &arena.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|child| *child == node)?;
        siblings.get(index + 1).copied()
    }

    fn first_child(&self, node: HostNode) -> Option<HostNode> {
        let arena = self.arena.lock();
        let first = arena.nodes.get(&node)?.children.first().copied();
        first
    }

    fn query_selector(&self, selector: &str) -> Option<HostNode> {
        let arena = self.arena.lock();
        let found = match selector.strip_prefix('#') {
            Some(id) => arena.nodes.iter().find_map(|(node, data)| {
                data.element()
                    .filter(|el| el.attributes.get("id").is_some_and(|value| value == id))
                    .map(|_| *node)
            }),
            None => arena.nodes.iter().find_map(|(node, data)| {
                data.element()
                    .filter(|el| el.tag == selector)
                    .map(|_| *node)
            }),
        };
        found
    }

    fn inner_markup(&self, node: HostNode) -> Option<String> {
        let arena = self.arena.lock();
        let data = arena.nodes.get(&node)?;
        let mut out = String::new();
        for child in &data.children {
            arena.write_markup(*child, &mut out);
        }
        Some(out)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
