//! Update Scheduler
//!
//! The scheduler is the delivery half of the signal graph: it takes a
//! subscription edge whose cell just changed and either runs it now
//! (immediate / unlabeled), accumulates it on its label, or queues the label
//! for the next microtask turn.
//!
//! There is no global scheduler. Each root [`crate::Context`] owns exactly
//! one, together with the lock table for lockable labels. "Microtask turn"
//! is an explicit operation here ([`Scheduler::run_turn`], surfaced as
//! `Context::flush`), which keeps delivery deterministic and testable.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::reactive::capture::CallerEdge;
use crate::reactive::label::{Label, LabelInner, LabelKind};

pub(crate) struct SchedulerInner {
    /// Labels queued for the current microtask turn, in arrival order.
    queue: Mutex<VecDeque<Label>>,
    /// Every label created through this context, for `lock(None)` semantics.
    labels: Mutex<Vec<Weak<LabelInner>>>,
}

/// Per-context scheduler. Clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(VecDeque::new()),
                labels: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn register_label(&self, label: &Label) {
        let mut labels = self.inner.labels.lock();
        labels.retain(|w| w.strong_count() > 0);
        labels.push(Arc::downgrade(&label.inner));
    }

    /// Deliver one edge according to its label.
    pub(crate) fn deliver(&self, edge: &CallerEdge) {
        match &edge.label {
            None => (edge.callback)(),
            Some(label) => {
                if label.kind() == LabelKind::Immediate && !label.is_locked() {
                    (edge.callback)();
                    return;
                }
                let schedule = label.enqueue(edge);
                if schedule {
                    self.inner.queue.lock().push_back(label.clone());
                }
            }
        }
    }

    /// Drain the microtask queue, flushing each queued label once. Locked
    /// labels keep their accumulation for their release callback.
    pub fn run_turn(&self) {
        loop {
            let label = self.inner.queue.lock().pop_front();
            match label {
                Some(label) => label.flush(),
                None => break,
            }
        }
    }

    fn resolve(&self, labels: Option<&[Label]>, locked_only: bool) -> Vec<Label> {
        match labels {
            Some(list) => list.to_vec(),
            None => {
                let registry = self.inner.labels.lock();
                registry
                    .iter()
                    .filter_map(|w| w.upgrade())
                    .map(|inner| Label { inner })
                    .filter(|l| !locked_only || l.is_locked())
                    .collect()
            }
        }
    }

    /// Lock the given labels, or every label of this context when `None`.
    /// Reference-counted: locking an already-locked label is safe and must be
    /// balanced by its own release.
    pub fn lock(&self, labels: Option<&[Label]>) {
        for label in self.resolve(labels, false) {
            label.lock_inc();
        }
    }

    /// Unlock the given labels, or every currently-locked label when `None`.
    /// Unlocking alone does not flush: the returned [`Release`] must be
    /// invoked to run the accumulation. Invoking it twice is a no-op.
    pub fn unlock(&self, labels: Option<&[Label]>) -> Release {
        let targets = self.resolve(labels, true);
        for label in &targets {
            label.lock_dec();
        }
        Release {
            targets: Mutex::new(Some(targets)),
        }
    }
}

/// The release callback returned by [`Scheduler::unlock`].
pub struct Release {
    targets: Mutex<Option<Vec<Label>>>,
}

impl Release {
    /// Flush whatever accumulated on the unlocked labels while they were
    /// locked. Calling twice, or with nothing pending, is a no-op.
    pub fn call(&self) {
        let targets = match self.targets.lock().take() {
            Some(t) => t,
            None => return,
        };
        for label in targets {
            if !label.is_locked() {
                label.flush();
            }
        }
    }
}
