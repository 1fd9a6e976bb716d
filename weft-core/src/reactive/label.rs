//! Propagation Labels
//!
//! A label is the strategy object attached to a subscription edge that
//! decides *when* the callback actually runs:
//!
//! - `Immediate`: synchronously on notify.
//! - `CommonBatch`: accumulates callbacks (deduped, insertion-ordered) until
//!   an explicit [`Label::flush`]. Deterministic, not microtask-driven.
//! - `HostPatchBatch`: same coalescing, scheduled once per microtask turn,
//!   and the flush is wrapped in a before-sweep and after-sweep over every
//!   component whose subtree was touched.
//!
//! Any label can additionally be locked through the scheduler; while locked,
//! edges accumulate in original order and only the release callback returned
//! by `unlock` performs the flush.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::component::ComponentInner;
use crate::reactive::capture::{CallerEdge, EdgeFn, EdgeId};

static LABEL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The closed set of delivery strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// Run the callback synchronously on notify.
    Immediate,
    /// Coalesce into a deduped set; an explicit `flush()` runs and clears it.
    CommonBatch,
    /// Coalesce like `CommonBatch`, scheduled once per microtask turn, with
    /// component before/after sweeps around the flush.
    HostPatchBatch,
}

pub(crate) struct LabelState {
    /// Coalesced callbacks in arrival order, deduped by edge id.
    pending: IndexMap<EdgeId, EdgeFn>,
    /// Components touched since the last flush, deduped, in arrival order.
    touched: Vec<(u64, Weak<ComponentInner>)>,
    /// Reference-counted lock. While > 0, flushes are suppressed.
    locks: usize,
    /// Whether a microtask flush is already queued for this label.
    scheduled: bool,
}

pub(crate) struct LabelInner {
    id: u64,
    kind: LabelKind,
    state: Mutex<LabelState>,
}

/// A propagation label. Clones share state.
#[derive(Clone)]
pub struct Label {
    pub(crate) inner: Arc<LabelInner>,
}

impl Label {
    pub(crate) fn new(kind: LabelKind) -> Self {
        Self {
            inner: Arc::new(LabelInner {
                id: LABEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                kind,
                state: Mutex::new(LabelState {
                    pending: IndexMap::new(),
                    touched: Vec::new(),
                    locks: 0,
                    scheduled: false,
                }),
            }),
        }
    }

    /// The label's unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The delivery strategy.
    pub fn kind(&self) -> LabelKind {
        self.inner.kind
    }

    /// Whether the label currently holds at least one lock.
    pub fn is_locked(&self) -> bool {
        self.inner.state.lock().locks > 0
    }

    /// Number of coalesced callbacks awaiting a flush.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Accumulate an edge. Returns true when the caller should queue this
    /// label for a microtask flush (first host-patch arrival of the turn).
    pub(crate) fn enqueue(&self, edge: &CallerEdge) -> bool {
        let mut state = self.inner.state.lock();
        state
            .pending
            .entry(edge.id)
            .or_insert_with(|| edge.callback.clone());

        if let Some(owner) = &edge.owner {
            if let Some(strong) = owner.upgrade() {
                let id = strong.id();
                if !state.touched.iter().any(|(i, _)| *i == id) {
                    state.touched.push((id, owner.clone()));
                }
            }
        }

        if self.inner.kind == LabelKind::HostPatchBatch && !state.scheduled {
            state.scheduled = true;
            return true;
        }
        false
    }

    /// Run and clear the accumulation. A no-op while the label is locked or
    /// when nothing is pending.
    pub fn flush(&self) {
        let (callbacks, touched) = {
            let mut state = self.inner.state.lock();
            if state.locks > 0 {
                return;
            }
            state.scheduled = false;
            if state.pending.is_empty() {
                state.touched.clear();
                return;
            }
            let callbacks: Vec<EdgeFn> = state.pending.values().cloned().collect();
            state.pending.clear();
            let touched = std::mem::take(&mut state.touched);
            (callbacks, touched)
        };

        tracing::debug!(
            label = self.inner.id,
            kind = ?self.inner.kind,
            callbacks = callbacks.len(),
            "label flush"
        );

        let sweep = self.inner.kind == LabelKind::HostPatchBatch;
        let components: Vec<Arc<ComponentInner>> = if sweep {
            touched.iter().filter_map(|(_, w)| w.upgrade()).collect()
        } else {
            Vec::new()
        };

        for comp in &components {
            comp.fire_before_update();
        }
        for callback in &callbacks {
            callback();
        }
        for comp in &components {
            comp.fire_after_update();
        }
    }

    pub(crate) fn lock_inc(&self) {
        self.inner.state.lock().locks += 1;
    }

    /// Decrement the lock count, saturating at zero.
    pub(crate) fn lock_dec(&self) {
        let mut state = self.inner.state.lock();
        state.locks = state.locks.saturating_sub(1);
    }
}

impl std::fmt::Debug for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Label")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("pending", &self.pending_count())
            .field("locked", &self.is_locked())
            .finish()
    }
}
