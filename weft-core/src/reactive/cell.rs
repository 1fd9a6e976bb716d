//! Signal Core
//!
//! A Cell is the fundamental reactive primitive: a mutable value with change
//! notification. Reading a cell inside an active evaluation registers that
//! evaluation as a subscriber; writing a different value notifies every
//! registered edge through the scheduler.
//!
//! # Invariants
//!
//! - A tracked read adds at most one edge per (cell, callback).
//! - A write only notifies when the new value differs from the old
//!   (`PartialEq`).
//! - Edges are *not* cleared after firing; re-fires preserve subscription
//!   order (first subscribed, first fired).
//! - The first-observer hook fires at most once, when a live subscriber
//!   chain first exists.
//!
//! # Thread Safety
//!
//! The runtime is single-threaded and cooperative, but cells are shared
//! behind `Arc` with `parking_lot` locks so closures capturing them stay
//! `Send + Sync`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::context::Context;
use crate::reactive::capture::{CallerEdge, EdgeId, Track};
use crate::reactive::observe::{Observable, ObserveRef, RefState};

static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_cell_id() -> u64 {
    CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct CellInner<T> {
    id: u64,
    value: RwLock<T>,
    /// Subscriber edges in insertion order. Ordered re-fire is a contract,
    /// not an accident, so this is an IndexMap rather than a HashMap.
    edges: Mutex<IndexMap<EdgeId, CallerEdge>>,
    refs: Arc<RefState>,
}

impl<T> Track for CellInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn attach_edge(&self, edge: CallerEdge) {
        let mut edges = self.edges.lock();
        if !edges.contains_key(&edge.id) {
            edges.insert(edge.id, edge);
        }
    }

    fn detach_edge(&self, id: EdgeId) {
        self.edges.lock().shift_remove(&id);
    }

    fn cell_id(&self) -> u64 {
        self.id
    }

    fn ref_state(&self) -> Arc<RefState> {
        self.refs.clone()
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Created through [`Context::cell`]. Clones share state.
pub struct Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) ctx: Context,
    pub(crate) inner: Arc<CellInner<T>>,
}

impl<T> Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(ctx: Context, value: T) -> Self {
        Self {
            ctx,
            inner: Arc::new(CellInner {
                id: next_cell_id(),
                value: RwLock::new(value),
                edges: Mutex::new(IndexMap::new()),
                refs: RefState::new(),
            }),
        }
    }

    /// The cell's unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Tracked read. Inside an active evaluation this registers the
    /// evaluation as a subscriber exactly once.
    pub fn get(&self) -> T {
        if let Some(frame) = self.ctx.capture().current() {
            let live = frame.live;
            self.inner.attach_edge(CallerEdge {
                id: frame.id,
                callback: frame.callback,
                label: frame.label,
                owner: frame.owner,
            });
            self.ctx
                .capture()
                .record_touch(self.inner.clone() as Arc<dyn Track>);
            if live {
                self.inner.refs.mark_live();
            }
        }
        self.inner.value.read().clone()
    }

    /// Untracked read: never registers a subscription.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Write a new value. Compares against the current value and notifies
    /// every registered edge, in insertion order, only on change.
    pub fn set(&self, value: T) {
        let changed = {
            let mut guard = self.inner.value.write();
            if *guard == value {
                false
            } else {
                *guard = value;
                true
            }
        };
        if !changed {
            return;
        }

        // Collect under the lock, deliver outside it: a delivered callback
        // may subscribe or write again.
        let edges: Vec<CallerEdge> = self.inner.edges.lock().values().cloned().collect();
        tracing::trace!(cell = self.inner.id, edges = edges.len(), "cell changed");
        for edge in &edges {
            self.ctx.scheduler().deliver(edge);
        }
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(next);
    }

    /// Install the at-most-once first-observer hook. Fires the first time a
    /// live subscriber chain exists; immediately if one already does.
    pub fn on_reference<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.refs.set_hook(Box::new(hook));
    }

    /// Number of registered subscriber edges.
    pub fn subscriber_count(&self) -> usize {
        self.inner.edges.lock().len()
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Observable for Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn observe_ref(&self) -> ObserveRef {
        ObserveRef {
            state: self.inner.refs.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Cell<T>
where
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// An immutable value satisfying the same read interface as a cell. In a
/// binding it is a no-op producer: it never notifies.
pub struct Constant<T>
where
    T: Clone + Send + Sync + 'static,
{
    value: T,
    refs: Arc<RefState>,
}

impl<T> Constant<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        Self {
            value,
            refs: RefState::new(),
        }
    }

    /// The wrapped value.
    pub fn get(&self) -> T {
        self.value.clone()
    }

    /// Same as [`Constant::get`]; constants track nothing either way.
    pub fn get_untracked(&self) -> T {
        self.value.clone()
    }
}

impl<T> Clone for Constant<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            refs: self.refs.clone(),
        }
    }
}

impl<T> Observable for Constant<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn observe_ref(&self) -> ObserveRef {
        ObserveRef {
            state: self.refs.clone(),
        }
    }
}
