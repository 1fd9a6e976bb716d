//! Built Nodes
//!
//! A [`Node`] is the builder's record of one built generator: the host node
//! it produced (if any), the subscription edges keeping it live, its child
//! nodes, and the component whose lifecycle it carries.
//!
//! Removal is the teardown path and it is ordered: edges are released first
//! so no callback can fire into a half-torn subtree, then children are
//! removed depth-first, then the component unmounts, and only then does the
//! host node detach. Removing twice is a no-op.
//!
//! Edge callbacks may hold their own `Node` through an `Arc`, which makes a
//! reference cycle; `remove` clears the edge list and breaks it.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::component::Component;
use crate::host::HostNode;
use crate::reactive::capture::EdgeRecord;

struct NodeState {
    edges: Vec<Arc<EdgeRecord>>,
    children: Vec<Node>,
    component: Option<Component>,
    mounted: bool,
    removed: bool,
}

pub(crate) struct NodeInner {
    host: Option<HostNode>,
    state: Mutex<NodeState>,
}

/// A built subtree. Clones share state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub(crate) fn new(host: Option<HostNode>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                host,
                state: Mutex::new(NodeState {
                    edges: Vec::new(),
                    children: Vec::new(),
                    component: None,
                    mounted: false,
                    removed: false,
                }),
            }),
        }
    }

    pub(crate) fn upgrade(inner: &Weak<NodeInner>) -> Option<Node> {
        inner.upgrade().map(|inner| Node { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeInner> {
        Arc::downgrade(&self.inner)
    }

    /// The host node this built node produced, if it produced one.
    pub fn host(&self) -> Option<HostNode> {
        self.inner.host.clone()
    }

    /// The component carried by this node, if any.
    pub fn component(&self) -> Option<Component> {
        self.inner.state.lock().component.clone()
    }

    /// Number of child nodes.
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    /// Whether the subtree has been removed.
    pub fn is_removed(&self) -> bool {
        self.inner.state.lock().removed
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.inner.state.lock().mounted
    }

    pub(crate) fn push_edge(&self, record: Arc<EdgeRecord>) {
        self.inner.state.lock().edges.push(record);
    }

    pub(crate) fn push_child(&self, child: Node) {
        self.inner.state.lock().children.push(child);
    }

    pub(crate) fn set_component(&self, component: Component) {
        self.inner.state.lock().component = Some(component);
    }

    /// Swap the child list, returning the old children. Used by branch
    /// selectors on re-selection.
    pub(crate) fn replace_children(&self, children: Vec<Node>) -> Vec<Node> {
        std::mem::replace(&mut self.inner.state.lock().children, children)
    }

    /// Fire mount on the whole subtree, children before self.
    pub(crate) fn fire_mounted(&self) {
        let (children, component) = {
            let mut state = self.inner.state.lock();
            if state.removed || state.mounted {
                return;
            }
            state.mounted = true;
            (state.children.clone(), state.component.clone())
        };
        for child in children {
            child.fire_mounted();
        }
        if let Some(component) = component {
            component.fire_mount();
        }
    }

    /// Tear the subtree down: release edges, remove children depth-first,
    /// unmount the component, detach the host node. Idempotent.
    pub fn remove(&self) {
        let (edges, children, component) = {
            let mut state = self.inner.state.lock();
            if state.removed {
                return;
            }
            state.removed = true;
            (
                std::mem::take(&mut state.edges),
                std::mem::take(&mut state.children),
                state.component.take(),
            )
        };
        for edge in &edges {
            edge.release();
        }
        for child in children {
            child.remove();
        }
        if let Some(component) = component {
            component.fire_unmount();
        }
        if let Some(host) = &self.inner.host {
            host.detach();
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("host", &self.inner.host)
            .field("children", &self.child_count())
            .field("removed", &self.is_removed())
            .finish()
    }
}
