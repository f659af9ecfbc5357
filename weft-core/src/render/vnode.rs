//! Virtual Nodes
//!
//! A [`VNode`] describes one piece of host-tree structure: an element, a text
//! node, a fragment (a bracketed run of siblings) or a component. Nodes are
//! built fresh on every render with [`h`]; the previous render's tree is only
//! kept to diff against the next one.
//!
//! Once mounted, a node records the host node(s) it produced and, for
//! components, the instance that renders it. That binding is the only part of
//! a node that changes after construction.

use std::fmt;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::component::{Component, ComponentInstance};
use super::host::HostNode;
use crate::error::{Error, Result};
use crate::reactive::Value;

bitflags! {
    /// Classification of a node and of its children.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u8 {
        const ELEMENT        = 0b0000_0001;
        const TEXT           = 0b0000_0010;
        const FRAGMENT       = 0b0000_0100;
        const COMPONENT      = 0b0000_1000;
        const TEXT_CHILDREN  = 0b0001_0000;
        const ARRAY_CHILDREN = 0b0010_0000;
        const CHILDREN       = Self::TEXT_CHILDREN.bits() | Self::ARRAY_CHILDREN.bits();
    }
}

/// What a node is.
#[derive(Clone)]
pub enum VNodeType {
    /// A host element with this tag.
    Element(Arc<str>),
    /// A text node; its content is the node's text children.
    Text,
    /// A run of siblings between two marker nodes.
    Fragment,
    Component(Component),
}

impl VNodeType {
    /// Whether a node of type `other` can be patched in place of this one.
    pub fn is_same(&self, other: &VNodeType) -> bool {
        match (self, other) {
            (VNodeType::Element(a), VNodeType::Element(b)) => a == b,
            (VNodeType::Text, VNodeType::Text) => true,
            (VNodeType::Fragment, VNodeType::Fragment) => true,
            (VNodeType::Component(a), VNodeType::Component(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn shape(&self) -> ShapeFlags {
        match self {
            VNodeType::Element(_) => ShapeFlags::ELEMENT,
            VNodeType::Text => ShapeFlags::TEXT,
            VNodeType::Fragment => ShapeFlags::FRAGMENT,
            VNodeType::Component(_) => ShapeFlags::COMPONENT,
        }
    }
}

impl From<&str> for VNodeType {
    fn from(tag: &str) -> Self {
        VNodeType::Element(Arc::from(tag))
    }
}

impl From<String> for VNodeType {
    fn from(tag: String) -> Self {
        VNodeType::Element(Arc::from(tag))
    }
}

impl From<Arc<str>> for VNodeType {
    fn from(tag: Arc<str>) -> Self {
        VNodeType::Element(tag)
    }
}

impl From<Component> for VNodeType {
    fn from(component: Component) -> Self {
        VNodeType::Component(component)
    }
}

impl From<&Component> for VNodeType {
    fn from(component: &Component) -> Self {
        VNodeType::Component(Arc::clone(component))
    }
}

impl fmt::Debug for VNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeType::Element(tag) => write!(f, "<{tag}>"),
            VNodeType::Text => f.write_str("Text"),
            VNodeType::Fragment => f.write_str("Fragment"),
            VNodeType::Component(component) => write!(f, "Component({})", component.name()),
        }
    }
}

/// Sibling identity taken from the `key` prop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VKey {
    Int(i64),
    Str(Arc<str>),
}

impl VKey {
    /// `None` for null; integral numbers stay numeric.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(VKey::Int(*n as i64)),
            other => Some(VKey::Str(Arc::from(other.to_string()))),
        }
    }
}

impl fmt::Display for VKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VKey::Int(n) => write!(f, "{n}"),
            VKey::Str(s) => f.write_str(s),
        }
    }
}

/// Properties and attributes of a node, in insertion order.
pub type Props = IndexMap<Arc<str>, Value>;

/// Build a [`Props`] map.
///
/// ```rust,ignore
/// let props = props! { "key" => 1, "class" => "item" };
/// ```
#[macro_export]
macro_rules! props {
    () => {
        $crate::render::Props::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::render::Props::new();
        $(
            props.insert(::std::sync::Arc::<str>::from($name), $crate::Value::from($value));
        )+
        props
    }};
}

/// Children of a node.
#[derive(Clone, Default)]
pub enum Children {
    #[default]
    None,
    Text(Arc<str>),
    Nodes(Vec<VNode>),
}

impl Children {
    fn shape(&self) -> ShapeFlags {
        match self {
            Children::None => ShapeFlags::empty(),
            Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
            Children::Nodes(_) => ShapeFlags::ARRAY_CHILDREN,
        }
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::None
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::Text(Arc::from(text))
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::Text(Arc::from(text))
    }
}

impl From<Arc<str>> for Children {
    fn from(text: Arc<str>) -> Self {
        Children::Text(text)
    }
}

impl From<Value> for Children {
    fn from(value: Value) -> Self {
        Children::Text(Arc::from(value.to_string()))
    }
}

impl From<Vec<VNode>> for Children {
    fn from(nodes: Vec<VNode>) -> Self {
        Children::Nodes(nodes)
    }
}

impl From<VNode> for Children {
    fn from(node: VNode) -> Self {
        Children::Nodes(vec![node])
    }
}

macro_rules! impl_children_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Children {
                fn from(n: $ty) -> Self {
                    Children::from(Value::from(n))
                }
            }
        )*
    };
}

impl_children_from_number!(i32, i64, u32, u64, usize, f64);

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Children::None => f.write_str("None"),
            Children::Text(text) => write!(f, "{text:?}"),
            Children::Nodes(nodes) => f.debug_list().entries(nodes).finish(),
        }
    }
}

/// Where a mounted node lives in the host tree.
#[derive(Default)]
pub(crate) struct Binding {
    /// The host node; for fragments the leading marker.
    pub el: Option<HostNode>,
    /// Trailing marker of a fragment.
    pub anchor: Option<HostNode>,
    pub component: Option<Arc<ComponentInstance>>,
}

pub(crate) struct VNodeInner {
    ty: VNodeType,
    props: Option<Props>,
    children: Children,
    shape: ShapeFlags,
    key: Option<VKey>,
    binding: Mutex<Binding>,
}

/// A virtual node. Clones share the same node.
#[derive(Clone)]
pub struct VNode(Arc<VNodeInner>);

/// Non-owning handle to a [`VNode`].
#[derive(Clone, Default)]
pub(crate) struct WeakVNode(Weak<VNodeInner>);

impl WeakVNode {
    pub fn upgrade(&self) -> Option<VNode> {
        self.0.upgrade().map(VNode)
    }
}

impl VNode {
    fn build(ty: VNodeType, props: Option<Props>, children: Children) -> Self {
        let shape = ty.shape() | children.shape();
        let key = props
            .as_ref()
            .and_then(|props| props.get("key"))
            .and_then(VKey::from_value);
        Self(Arc::new(VNodeInner {
            ty,
            props,
            children,
            shape,
            key,
            binding: Mutex::new(Binding::default()),
        }))
    }

    pub fn ty(&self) -> &VNodeType {
        &self.0.ty
    }

    pub fn props(&self) -> Option<&Props> {
        self.0.props.as_ref()
    }

    pub fn children(&self) -> &Children {
        &self.0.children
    }

    /// Child nodes; empty unless the children are an array.
    pub fn child_nodes(&self) -> &[VNode] {
        match &self.0.children {
            Children::Nodes(nodes) => nodes,
            _ => &[],
        }
    }

    /// Text children, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.0.children {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn shape(&self) -> ShapeFlags {
        self.0.shape
    }

    pub fn key(&self) -> Option<&VKey> {
        self.0.key.as_ref()
    }

    /// The host node this node produced, once mounted.
    pub fn el(&self) -> Option<HostNode> {
        self.0.binding.lock().el
    }

    /// The trailing marker of a mounted fragment.
    pub fn anchor(&self) -> Option<HostNode> {
        self.0.binding.lock().anchor
    }

    /// The instance rendering a mounted component node.
    pub fn component(&self) -> Option<Arc<ComponentInstance>> {
        self.0.binding.lock().component.clone()
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set_el(&self, el: Option<HostNode>) {
        self.0.binding.lock().el = el;
    }

    pub(crate) fn set_anchor(&self, anchor: Option<HostNode>) {
        self.0.binding.lock().anchor = anchor;
    }

    pub(crate) fn set_component(&self, instance: Arc<ComponentInstance>) {
        let previous = self.0.binding.lock().component.replace(instance);
        drop(previous);
    }

    pub(crate) fn downgrade(&self) -> WeakVNode {
        WeakVNode(Arc::downgrade(&self.0))
    }

    /// A fresh copy whose props are this node's props overlaid with `extra`.
    pub(crate) fn with_merged_props(&self, extra: &Props) -> VNode {
        let mut props = self.0.props.clone().unwrap_or_default();
        for (name, value) in extra {
            props.insert(Arc::clone(name), value.clone());
        }
        VNode::build(self.0.ty.clone(), Some(props), self.0.children.clone())
    }

    /// Reject shapes the reconciler cannot handle. Only this node is
    /// checked, not its descendants.
    pub(crate) fn validate(&self) -> Result<()> {
        match (&self.0.ty, &self.0.children) {
            (VNodeType::Element(tag), _) if tag.is_empty() => {
                Err(Error::invalid("element with an empty tag"))
            }
            (VNodeType::Text, Children::Nodes(_)) => {
                Err(Error::invalid("text node with array children"))
            }
            (VNodeType::Fragment, Children::Text(_)) => {
                Err(Error::invalid("fragment with text children"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("type", &self.0.ty);
        if let Some(key) = &self.0.key {
            s.field("key", key);
        }
        if let Some(props) = &self.0.props {
            s.field("props", props);
        }
        s.field("children", &self.0.children).finish()
    }
}

/// Build a virtual node.
///
/// ```rust,ignore
/// let list = h("ul", None, vec![
///     h("li", props! { "key" => 1 }, "a"),
///     h("li", props! { "key" => 2 }, "b"),
/// ]);
/// ```
pub fn h(
    ty: impl Into<VNodeType>,
    props: impl Into<Option<Props>>,
    children: impl Into<Children>,
) -> VNode {
    VNode::build(ty.into(), props.into(), children.into())
}

/// A text node.
pub fn text(content: impl Into<Arc<str>>) -> VNode {
    VNode::build(VNodeType::Text, None, Children::Text(content.into()))
}

/// A fragment of sibling nodes.
pub fn fragment(children: Vec<VNode>) -> VNode {
    VNode::build(VNodeType::Fragment, None, Children::Nodes(children))
}

/// Whatever a render function returns, before normalization.
#[derive(Clone, Debug)]
pub enum Rendered {
    Node(VNode),
    Nodes(Vec<VNode>),
    Text(Arc<str>),
}

impl From<VNode> for Rendered {
    fn from(node: VNode) -> Self {
        Rendered::Node(node)
    }
}

impl From<Vec<VNode>> for Rendered {
    fn from(nodes: Vec<VNode>) -> Self {
        Rendered::Nodes(nodes)
    }
}

impl From<Option<VNode>> for Rendered {
    fn from(node: Option<VNode>) -> Self {
        match node {
            Some(node) => Rendered::Node(node),
            None => Rendered::Nodes(Vec::new()),
        }
    }
}

impl From<&str> for Rendered {
    fn from(text: &str) -> Self {
        Rendered::Text(Arc::from(text))
    }
}

impl From<String> for Rendered {
    fn from(text: String) -> Self {
        Rendered::Text(Arc::from(text))
    }
}

impl From<Value> for Rendered {
    fn from(value: Value) -> Self {
        Rendered::Text(Arc::from(value.to_string()))
    }
}

macro_rules! impl_rendered_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Rendered {
                fn from(n: $ty) -> Self {
                    Rendered::from(Value::from(n))
                }
            }
        )*
    };
}

impl_rendered_from_number!(i32, i64, u32, u64, usize, f64);

/// Turn a render result into one node: sequences become fragments, text
/// becomes a text node.
pub fn normalize(rendered: Rendered) -> VNode {
    match rendered {
        Rendered::Node(node) => node,
        Rendered::Nodes(nodes) => fragment(nodes),
        Rendered::Text(content) => text(content),
    }
}
