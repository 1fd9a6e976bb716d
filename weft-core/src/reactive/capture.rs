//! Dependency Capture Context
//!
//! The capture context tracks which evaluation is currently running so cell
//! reads can be attributed to it. Each [`crate::Context`] owns one stack of
//! frames; `evaluate` pushes a frame, runs the closure, pops the frame, and
//! returns an [`EdgeRecord`] describing the subscription edges that were
//! created.
//!
//! Every notification re-enters the same machinery through `Rerun`: the
//! callback runs inside a fresh frame carrying the original edge id, and the
//! record's touched set is diffed afterwards. A computation that branches
//! therefore subscribes to whatever it read on its latest run, not on its
//! first.
//!
//! Nested evaluations attribute reads to the innermost frame, which is what
//! makes derived cells reading other derived cells work transitively.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::component::ComponentInner;
use crate::reactive::label::Label;
use crate::reactive::observe::RefState;

static EDGE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for one evaluation's subscription edge. The same edge id
/// is attached to every cell the evaluation touched, which gives the
/// "at most one edge per (cell, callback)" invariant for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(u64);

impl EdgeId {
    pub(crate) fn new() -> Self {
        Self(EDGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value, useful in logs.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The callback an edge delivers.
pub(crate) type EdgeFn = Arc<dyn Fn() + Send + Sync>;

/// One (callback, label) subscription as stored in a cell's edge map.
#[derive(Clone)]
pub(crate) struct CallerEdge {
    pub(crate) id: EdgeId,
    pub(crate) callback: EdgeFn,
    pub(crate) label: Option<Label>,
    /// Component whose subtree owns this edge; drives the host-patch
    /// before/after sweeps.
    pub(crate) owner: Option<Weak<ComponentInner>>,
}

/// Interface a capture frame uses to talk to a cell without knowing its value
/// type. Implemented by every cell's shared inner.
pub(crate) trait Track: Send + Sync {
    fn attach_edge(&self, edge: CallerEdge);
    fn detach_edge(&self, id: EdgeId);
    fn cell_id(&self) -> u64;
    fn ref_state(&self) -> Arc<RefState>;
}

/// A currently-evaluating frame.
pub(crate) struct Frame {
    pub(crate) id: EdgeId,
    pub(crate) callback: EdgeFn,
    pub(crate) label: Option<Label>,
    pub(crate) live: bool,
    pub(crate) owner: Option<Weak<ComponentInner>>,
    pub(crate) touched: SmallVec<[Arc<dyn Track>; 4]>,
}

/// Cloneable view of the innermost frame, handed to cells on tracked reads.
pub(crate) struct FrameHandle {
    pub(crate) id: EdgeId,
    pub(crate) callback: EdgeFn,
    pub(crate) label: Option<Label>,
    pub(crate) live: bool,
    pub(crate) owner: Option<Weak<ComponentInner>>,
}

/// The stack of active evaluations for one context.
pub(crate) struct CaptureStack {
    frames: Mutex<Vec<Frame>>,
}

impl CaptureStack {
    pub(crate) fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, frame: Frame) {
        self.frames.lock().push(frame);
    }

    pub(crate) fn pop(&self) -> Option<Frame> {
        self.frames.lock().pop()
    }

    /// Snapshot of the innermost frame, if an evaluation is active.
    pub(crate) fn current(&self) -> Option<FrameHandle> {
        let frames = self.frames.lock();
        frames.last().map(|f| FrameHandle {
            id: f.id,
            callback: f.callback.clone(),
            label: f.label.clone(),
            live: f.live,
            owner: f.owner.clone(),
        })
    }

    /// Record that the innermost evaluation touched `cell`. Deduplicated per
    /// cell so teardown releases each edge once.
    pub(crate) fn record_touch(&self, cell: Arc<dyn Track>) {
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.last_mut() {
            let id = cell.cell_id();
            if !frame.touched.iter().any(|c| c.cell_id() == id) {
                frame.touched.push(cell);
            }
        }
    }
}

/// The result of an `evaluate` call: the subscription edge and the cells it
/// touched. Releasing the record detaches the edge from every touched cell;
/// releasing twice is a no-op.
pub struct EdgeRecord {
    id: EdgeId,
    touched: Mutex<SmallVec<[Arc<dyn Track>; 4]>>,
    released: AtomicBool,
}

impl EdgeRecord {
    pub(crate) fn new(id: EdgeId) -> Self {
        Self {
            id,
            touched: Mutex::new(SmallVec::new()),
            released: AtomicBool::new(false),
        }
    }

    /// The edge id shared by every subscription this evaluation created.
    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// Replace the touched set after a run. Cells the run no longer read
    /// drop their edge; cells it still reads keep theirs (attachment is
    /// deduplicated by edge id, so re-reads are free).
    pub(crate) fn retrack(&self, new: SmallVec<[Arc<dyn Track>; 4]>) {
        if self.released.load(Ordering::SeqCst) {
            for cell in new.iter() {
                cell.detach_edge(self.id);
            }
            return;
        }
        let mut touched = self.touched.lock();
        for old in touched.iter() {
            let id = old.cell_id();
            if !new.iter().any(|c| c.cell_id() == id) {
                old.detach_edge(self.id);
            }
        }
        *touched = new;
    }

    /// Number of cells the evaluation touched.
    pub fn touched_count(&self) -> usize {
        self.touched.lock().len()
    }

    pub(crate) fn touched_cells(&self) -> Vec<Arc<dyn Track>> {
        self.touched.lock().iter().cloned().collect()
    }

    /// Detach this evaluation's callback from every cell it touched.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let touched = std::mem::take(&mut *self.touched.lock());
        for cell in touched.iter() {
            cell.detach_edge(self.id);
        }
    }
}

impl std::fmt::Debug for EdgeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeRecord")
            .field("id", &self.id)
            .field("touched", &self.touched_count())
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}

/// A re-runnable tracked evaluation. Every run, initial and notified alike,
/// pushes a frame carrying the record's edge id, runs the callback, and
/// retracks the record against what the run actually read.
///
/// Cells keep the evaluation alive: the callback they store captures this
/// value strongly, while the record is held weakly so a cell's edge map never
/// forms a cycle back through its own touched set.
pub(crate) struct Rerun {
    stack: Arc<CaptureStack>,
    record: Weak<EdgeRecord>,
    callback: EdgeFn,
    label: Option<Label>,
    live: bool,
    owner: Option<Weak<ComponentInner>>,
    this: Weak<Rerun>,
}

impl Rerun {
    pub(crate) fn new(
        stack: Arc<CaptureStack>,
        record: &Arc<EdgeRecord>,
        callback: EdgeFn,
        label: Option<Label>,
        live: bool,
        owner: Option<Weak<ComponentInner>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            stack,
            record: Arc::downgrade(record),
            callback,
            label,
            live,
            owner,
            this: this.clone(),
        })
    }

    pub(crate) fn run(&self) {
        let record = match self.record.upgrade() {
            Some(record) => record,
            // The release handle is gone, so nothing can retrack or detach
            // any more; deliver the callback untracked.
            None => {
                (self.callback)();
                return;
            }
        };
        if record.released.load(Ordering::SeqCst) {
            return;
        }
        let callback: EdgeFn = match self.this.upgrade() {
            Some(this) => Arc::new(move || this.run()),
            None => self.callback.clone(),
        };
        self.stack.push(Frame {
            id: record.id,
            callback,
            label: self.label.clone(),
            live: self.live,
            owner: self.owner.clone(),
            touched: SmallVec::new(),
        });
        (self.callback)();
        let frame = self
            .stack
            .pop()
            .expect("capture stack underflow after evaluation");
        record.retrack(frame.touched);
    }
}
