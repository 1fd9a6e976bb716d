//! Host Document Tree
//!
//! The runtime patches a host tree of element and text nodes admitting
//! parent/child/sibling insertion, the only host shape supported. This
//! module provides an in-memory implementation of that shape, plus the
//! [`Value`] type that flows through attribute bindings and branch
//! discriminants.
//!
//! Attributes and properties are kept distinct on purpose: some properties
//! (input `value`/`checked`, select `selected`, style maps) must be seeded
//! through the attribute path on first write and assigned directly
//! thereafter, to avoid fighting the host's own default-value handling. See
//! [`caps`] for the per-tag table.

pub mod caps;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

static HOST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A value carried by an attribute binding or branch discriminant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Text value.
    Text(String),
    /// Boolean flag.
    Flag(bool),
    /// Style map: ordered (property, value) pairs.
    Style(Vec<(String, String)>),
}

impl Value {
    /// Serialize for the attribute path.
    pub fn to_attr(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Text(s) => s.clone(),
            Value::Flag(b) => b.to_string(),
            Value::Style(pairs) => pairs
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Flag(v)
    }
}

enum HostKind {
    Element { tag: String },
    Text,
}

struct HostState {
    text: String,
    attrs: IndexMap<String, String>,
    props: IndexMap<String, Value>,
    children: Vec<HostNode>,
    parent: Weak<HostInner>,
}

struct HostInner {
    id: u64,
    kind: HostKind,
    state: RwLock<HostState>,
}

/// A node in the host tree. Clones share identity; equality is identity.
#[derive(Clone)]
pub struct HostNode {
    inner: Arc<HostInner>,
}

impl PartialEq for HostNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for HostNode {}

impl HostNode {
    fn new(kind: HostKind) -> Self {
        Self {
            inner: Arc::new(HostInner {
                id: HOST_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                kind,
                state: RwLock::new(HostState {
                    text: String::new(),
                    attrs: IndexMap::new(),
                    props: IndexMap::new(),
                    children: Vec::new(),
                    parent: Weak::new(),
                }),
            }),
        }
    }

    /// Create an element node.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(HostKind::Element { tag: tag.into() })
    }

    /// Create a text node.
    pub fn text(content: impl Into<String>) -> Self {
        let node = Self::new(HostKind::Text);
        node.inner.state.write().text = content.into();
        node
    }

    /// The node's unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The element tag, or `None` for text nodes.
    pub fn tag(&self) -> Option<&str> {
        match &self.inner.kind {
            HostKind::Element { tag } => Some(tag),
            HostKind::Text => None,
        }
    }

    /// Whether this is a text node.
    pub fn is_text(&self) -> bool {
        matches!(self.inner.kind, HostKind::Text)
    }

    /// Text content of a text node.
    pub fn text_content(&self) -> String {
        self.inner.state.read().text.clone()
    }

    /// Replace the text content.
    pub fn set_text(&self, content: impl Into<String>) {
        self.inner.state.write().text = content.into();
    }

    /// Set an attribute (string-serialized path).
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.state.write().attrs.insert(name.into(), value.into());
    }

    /// Read an attribute.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.state.read().attrs.get(name).cloned()
    }

    /// Assign a property directly (post-seed path).
    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        self.inner.state.write().props.insert(name.into(), value);
    }

    /// Read a property.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.inner.state.read().props.get(name).cloned()
    }

    /// The parent node, if attached.
    pub fn parent(&self) -> Option<HostNode> {
        self.inner
            .state
            .read()
            .parent
            .upgrade()
            .map(|inner| HostNode { inner })
    }

    /// Snapshot of the children.
    pub fn children(&self) -> Vec<HostNode> {
        self.inner.state.read().children.clone()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.inner.state.read().children.len()
    }

    /// Child at `index`, if present.
    pub fn child_at(&self, index: usize) -> Option<HostNode> {
        self.inner.state.read().children.get(index).cloned()
    }

    /// The next sibling under this node's parent.
    pub fn next_sibling(&self) -> Option<HostNode> {
        let parent = self.parent()?;
        let siblings = parent.inner.state.read();
        let idx = siblings.children.iter().position(|c| c == self)?;
        siblings.children.get(idx + 1).cloned()
    }

    /// Append `child` as the last child, detaching it from any old parent.
    pub fn append(&self, child: &HostNode) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `anchor` (or at the end when `anchor` is
    /// `None`), detaching it from any old parent first.
    pub fn insert_before(&self, child: &HostNode, anchor: Option<&HostNode>) {
        child.detach();
        {
            let mut state = self.inner.state.write();
            let idx = anchor
                .and_then(|a| state.children.iter().position(|c| c == a))
                .unwrap_or(state.children.len());
            state.children.insert(idx, child.clone());
        }
        child.inner.state.write().parent = Arc::downgrade(&self.inner);
    }

    /// Remove `child` from this node.
    pub fn remove_child(&self, child: &HostNode) {
        self.inner.state.write().children.retain(|c| c != child);
        let mut child_state = child.inner.state.write();
        if child_state.parent.upgrade().map(|p| Arc::ptr_eq(&p, &self.inner)) == Some(true) {
            child_state.parent = Weak::new();
        }
    }

    /// Detach this node from its parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }
}

impl std::fmt::Debug for HostNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner.kind {
            HostKind::Element { tag } => f
                .debug_struct("HostNode")
                .field("tag", tag)
                .field("children", &self.child_count())
                .finish(),
            HostKind::Text => f
                .debug_struct("HostNode")
                .field("text", &self.text_content())
                .finish(),
        }
    }
}
