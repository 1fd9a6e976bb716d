//! Derived Cells
//!
//! A derived cell wraps a private cell whose value is recomputed by
//! re-running an evaluation whenever any touched cell notifies. Delivery is
//! immediate, so a derived value always equals its compute function applied
//! to the latest dependency values; there is no staleness window to reason
//! about.
//!
//! Reading a derived cell inside another evaluation adds transitive edges.
//! The subscription set follows the latest run of the compute function, so a
//! branching computation tracks only the branch it took. Dependencies of the
//! first run are wired into the onreference chain so liveness of the derived
//! cell implies liveness of what it reads.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::context::Context;
use crate::reactive::capture::EdgeRecord;
use crate::reactive::cell::Cell;
use crate::reactive::observe::{Observable, ObserveRef};

/// A read-only cell recomputed from other cells. Created through
/// [`Context::derived`]. Clones share state.
pub struct DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    cell: Cell<T>,
    record: Arc<EdgeRecord>,
}

impl<T> DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new<F>(ctx: &Context, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let compute = Arc::new(compute);

        // The private cell does not exist until the first computation has
        // produced an initial value, so the callback parks that first result
        // in a slot and writes through the cell on every later run.
        let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let target: Arc<RwLock<Option<Cell<T>>>> = Arc::new(RwLock::new(None));

        let callback = {
            let slot = slot.clone();
            let target = target.clone();
            let compute = compute.clone();
            Arc::new(move || {
                let value = compute();
                match target.read().as_ref() {
                    Some(cell) => cell.set(value),
                    None => *slot.lock() = Some(value),
                }
            })
        };

        // Internal subscription: not a live observer in the onreference
        // sense, and delivered immediately (no label).
        let record = ctx.evaluate_inner(None, callback, false, None);

        let initial = slot
            .lock()
            .take()
            .expect("derived computation produced no initial value");
        let cell = ctx.cell(initial);
        *target.write() = Some(cell.clone());

        // Liveness of the derived cell implies liveness of its dependencies.
        for dep in record.touched_cells() {
            cell.observe_ref().state.add_upstream(dep.ref_state());
        }

        Self { cell, record }
    }

    /// Tracked read of the derived value.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Untracked read.
    pub fn get_untracked(&self) -> T {
        self.cell.get_untracked()
    }

    /// The private cell's unique id.
    pub fn id(&self) -> u64 {
        self.cell.id()
    }

    /// Install the at-most-once first-observer hook on the derived value.
    pub fn on_reference<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cell.on_reference(hook);
    }

    /// Number of dependencies the compute function reads.
    pub fn dependency_count(&self) -> usize {
        self.record.touched_count()
    }

    /// Detach the recompute subscription from every dependency. The cell
    /// keeps its last value but stops updating.
    pub fn release(&self) {
        self.record.release();
    }
}

impl<T> Clone for DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            record: Arc::clone(&self.record),
        }
    }
}

impl<T> Observable for DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn observe_ref(&self) -> ObserveRef {
        self.cell.observe_ref()
    }
}

impl<T> std::fmt::Debug for DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedCell")
            .field("id", &self.cell.id())
            .field("value", &self.get_untracked())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
