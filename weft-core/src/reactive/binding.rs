//! Bindings
//!
//! A binding is a derivation between cells and/or plain functions: reading
//! one side and writing the other whenever the source changes. The source
//! shape is resolved exactly once, at binding creation, into the closed
//! [`Source`] variant set, never re-checked ad hoc on every read.
//!
//! Each unidirectional edge carries its own re-entrancy guard so writes
//! triggered by the propagation itself cannot re-trigger the same edge;
//! composing two of them ([`bidirectional`]) therefore converges without
//! oscillation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::reactive::capture::EdgeRecord;
use crate::reactive::cell::{Cell, Constant};
use crate::reactive::derived::DerivedCell;
use crate::reactive::observe::ObserveRef;

/// The closed set of binding sources, resolved once at creation time.
pub enum Source<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// A mutable cell.
    Cell(Cell<T>),
    /// A derived (read-only) cell.
    Derived(DerivedCell<T>),
    /// An immutable wrapper; never notifies.
    Constant(Constant<T>),
    /// A plain value; never notifies.
    Value(T),
    /// A zero-argument function. May itself read cells, in which case the
    /// binding tracks whatever it reads.
    Thunk(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T> Source<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Tracked read (where the variant supports tracking).
    pub fn get(&self) -> T {
        match self {
            Source::Cell(c) => c.get(),
            Source::Derived(d) => d.get(),
            Source::Constant(c) => c.get(),
            Source::Value(v) => v.clone(),
            Source::Thunk(f) => f(),
        }
    }

    /// Untracked read.
    pub fn get_untracked(&self) -> T {
        match self {
            Source::Cell(c) => c.get_untracked(),
            Source::Derived(d) => d.get_untracked(),
            Source::Constant(c) => c.get_untracked(),
            Source::Value(v) => v.clone(),
            Source::Thunk(f) => f(),
        }
    }

    /// Whether the source can ever notify. Constants and plain values are
    /// no-op producers.
    pub fn is_reactive(&self) -> bool {
        matches!(
            self,
            Source::Cell(_) | Source::Derived(_) | Source::Thunk(_)
        )
    }

    pub(crate) fn observe_ref(&self) -> Option<ObserveRef> {
        match self {
            Source::Cell(c) => Some(crate::reactive::observe::Observable::observe_ref(c)),
            Source::Derived(d) => Some(crate::reactive::observe::Observable::observe_ref(d)),
            _ => None,
        }
    }
}

impl<T> Clone for Source<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Source::Cell(c) => Source::Cell(c.clone()),
            Source::Derived(d) => Source::Derived(d.clone()),
            Source::Constant(c) => Source::Constant(c.clone()),
            Source::Value(v) => Source::Value(v.clone()),
            Source::Thunk(f) => Source::Thunk(f.clone()),
        }
    }
}

impl<T> From<Cell<T>> for Source<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(cell: Cell<T>) -> Self {
        Source::Cell(cell)
    }
}

impl<T> From<DerivedCell<T>> for Source<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(derived: DerivedCell<T>) -> Self {
        Source::Derived(derived)
    }
}

impl<T> From<Constant<T>> for Source<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(constant: Constant<T>) -> Self {
        Source::Constant(constant)
    }
}

/// An established binding. Releasing it detaches every edge it registered.
pub struct Binding {
    records: Vec<Arc<EdgeRecord>>,
}

impl Binding {
    /// Detach every edge this binding registered. Idempotent.
    pub fn release(&self) {
        for record in &self.records {
            record.release();
        }
    }
}

/// Bind `source` into `destination`: an evaluation reading the source and
/// writing `transform(value)` into the destination, re-run on every source
/// notification. Guarded against re-entrancy.
pub fn unidirectional<T, U, F>(
    ctx: &Context,
    source: impl Into<Source<T>>,
    destination: Cell<U>,
    transform: F,
) -> Binding
where
    T: Clone + PartialEq + Send + Sync + 'static,
    U: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    let source = source.into();

    // Liveness of the destination implies liveness of the source, even
    // though the binding's own subscription is not a live observer.
    if let Some(up) = source.observe_ref() {
        crate::reactive::observe::Observable::observe_ref(&destination)
            .state
            .add_upstream(up.state);
    }

    let guard = Arc::new(AtomicBool::new(false));
    let callback = {
        let source = source.clone();
        let destination = destination.clone();
        let transform = Arc::new(transform);
        let guard = guard.clone();
        Arc::new(move || {
            // Read first: even a guarded run must keep the source tracked,
            // or the retrack after it would drop the edge.
            let value = source.get();
            if guard.swap(true, Ordering::SeqCst) {
                return;
            }
            destination.set(transform(value));
            guard.store(false, Ordering::SeqCst);
        })
    };

    let record = ctx.evaluate_inner(None, callback, false, None);
    Binding {
        records: vec![record],
    }
}

/// Bind two cells to each other through two independently-guarded
/// unidirectional edges. A write to either side settles both at the written
/// value without oscillation.
pub fn bidirectional<T>(ctx: &Context, a: Cell<T>, b: Cell<T>) -> Binding
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let forward = unidirectional(ctx, a.clone(), b.clone(), |v| v);
    let backward = unidirectional(ctx, b, a, |v| v);
    let mut records = forward.records;
    records.extend(backward.records);
    Binding { records }
}
