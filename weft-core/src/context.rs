//! Root Context
//!
//! A `Context` is the root owner of one reactive graph: the dependency
//! capture stack, the scheduler with its microtask queue and lock table, and
//! the default host-patch label the builder binds attributes under.
//!
//! There are no global or thread-local tables. Everything hangs off an
//! explicit context, so independent roots (and independent tests) cannot
//! interfere with each other.

use std::sync::{Arc, Weak};

use crate::component::ComponentInner;
use crate::reactive::capture::{CaptureStack, EdgeFn, EdgeId, EdgeRecord, Rerun};
use crate::reactive::cell::Cell;
use crate::reactive::derived::DerivedCell;
use crate::reactive::label::{Label, LabelKind};
use crate::reactive::scheduler::{Release, Scheduler};

struct ContextInner {
    capture: Arc<CaptureStack>,
    scheduler: Scheduler,
    patch: Label,
}

/// The root runtime context. Clones share state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a fresh root context with its own scheduler and host-patch
    /// label.
    pub fn new() -> Self {
        let scheduler = Scheduler::new();
        let patch = Label::new(LabelKind::HostPatchBatch);
        scheduler.register_label(&patch);
        Self {
            inner: Arc::new(ContextInner {
                capture: Arc::new(CaptureStack::new()),
                scheduler,
                patch,
            }),
        }
    }

    /// Create a mutable reactive cell owned by this context.
    pub fn cell<T>(&self, value: T) -> Cell<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        Cell::new(self.clone(), value)
    }

    /// Create a read-only derived cell recomputed whenever a touched cell
    /// notifies.
    pub fn derived<T, F>(&self, compute: F) -> DerivedCell<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        DerivedCell::new(self, compute)
    }

    /// Create a label with the given delivery strategy, registered with this
    /// context's scheduler so `lock(None)` reaches it.
    pub fn label(&self, kind: LabelKind) -> Label {
        let label = Label::new(kind);
        self.inner.scheduler.register_label(&label);
        label
    }

    /// The context's default host-patch label: attribute and subtree patches
    /// coalesce on it, once per microtask turn.
    pub fn patch_label(&self) -> Label {
        self.inner.patch.clone()
    }

    /// Run `f` inside a capture frame and return the edge record linking `f`
    /// to every cell it read. Each of those cells re-runs `f`, re-tracked,
    /// on change until the record is released, so the subscriptions always
    /// reflect `f`'s latest run.
    pub fn evaluate<F>(&self, f: F) -> Arc<EdgeRecord>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.evaluate_inner(None, Arc::new(f), true, None)
    }

    pub(crate) fn evaluate_inner(
        &self,
        label: Option<Label>,
        callback: EdgeFn,
        live: bool,
        owner: Option<Weak<ComponentInner>>,
    ) -> Arc<EdgeRecord> {
        let record = Arc::new(EdgeRecord::new(EdgeId::new()));
        let rerun = Rerun::new(
            self.inner.capture.clone(),
            &record,
            callback,
            label,
            live,
            owner,
        );
        rerun.run();
        record
    }

    /// Run `f` once, tracked, and re-run it whenever a cell it read changes.
    /// The returned guard's `unsubscribe` releases the subscription.
    pub fn watch<F>(&self, f: F) -> Watch
    where
        F: Fn() + Send + Sync + 'static,
    {
        let record = self.evaluate(f);
        Watch { record }
    }

    /// Drain the microtask queue: every host-patch label that was touched
    /// this turn flushes exactly once.
    pub fn flush(&self) {
        self.inner.scheduler.run_turn();
    }

    /// Lock labels (all of this context's labels when `None`). See
    /// [`Scheduler::lock`].
    pub fn lock(&self, labels: Option<&[Label]>) {
        self.inner.scheduler.lock(labels);
    }

    /// Unlock labels (all currently-locked ones when `None`), returning the
    /// release callback that performs the deferred flush.
    pub fn unlock(&self, labels: Option<&[Label]>) -> Release {
        self.inner.scheduler.unlock(labels)
    }

    pub(crate) fn capture(&self) -> &CaptureStack {
        &self.inner.capture
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for an active [`Context::watch`] subscription.
pub struct Watch {
    record: Arc<EdgeRecord>,
}

impl Watch {
    /// Stop watching: detaches the callback from every cell it read.
    pub fn unsubscribe(&self) {
        self.record.release();
    }

    /// Number of cells the watcher is subscribed to.
    pub fn touched_count(&self) -> usize {
        self.record.touched_count()
    }
}
