//! Onreference Chain
//!
//! Every cell can carry an at-most-once "someone is now observing me" hook.
//! The hook does not fire when a subscription is merely declared; it fires
//! lazily, the first time a *live* subscriber chain is established: either a
//! direct subscriber with liveness (a `watch`, a builder edge) or a chain of
//! `observe` relations ending in one.
//!
//! This is what lets the builder declare subtrees (e.g. unselected branch
//! arms) without materializing them: until something downstream is actually
//! rendered, no hook fires and no work happens.

use std::sync::Arc;

use parking_lot::Mutex;

/// Shared liveness state for one cell. Type-erased so chains can cross cells
/// of different value types.
pub(crate) struct RefState {
    live: Mutex<bool>,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    /// Cells whose liveness is implied by ours, in subscription order.
    upstream: Mutex<Vec<Arc<RefState>>>,
}

impl RefState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            live: Mutex::new(false),
            hook: Mutex::new(None),
            upstream: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn is_live(&self) -> bool {
        *self.live.lock()
    }

    /// Install the first-observer hook. If a live subscriber chain already
    /// exists the first-observer moment has passed, so the hook runs
    /// immediately, which is its single permitted firing.
    pub(crate) fn set_hook(&self, hook: Box<dyn FnOnce() + Send>) {
        if self.is_live() {
            hook();
        } else {
            *self.hook.lock() = Some(hook);
        }
    }

    /// Establish liveness. Idempotent. Fires the hook (once) and propagates
    /// upstream in subscription order.
    pub(crate) fn mark_live(&self) {
        {
            let mut live = self.live.lock();
            if *live {
                return;
            }
            *live = true;
        }

        if let Some(hook) = self.hook.lock().take() {
            hook();
        }

        let upstream: Vec<Arc<RefState>> = self.upstream.lock().clone();
        for up in upstream {
            up.mark_live();
        }
    }

    /// Record that liveness of `self` implies liveness of `up`. If `self` is
    /// already live the implication is established immediately.
    pub(crate) fn add_upstream(&self, up: Arc<RefState>) {
        let already_live = {
            let mut ups = self.upstream.lock();
            ups.push(up.clone());
            self.is_live()
        };
        if already_live {
            up.mark_live();
        }
    }
}

/// Opaque handle onto a cell's liveness state, used by [`observe`].
pub struct ObserveRef {
    pub(crate) state: Arc<RefState>,
}

/// Anything that participates in the onreference chain: cells, derived cells
/// and constants all satisfy this.
pub trait Observable {
    /// Handle onto this value's liveness state.
    fn observe_ref(&self) -> ObserveRef;
}

/// Declare that liveness of `downstream` implies liveness of `upstream`.
///
/// Establishing the relation before `downstream` has a real subscriber fires
/// nothing; the upstream hook fires later, when liveness is actually
/// established anywhere further down the chain.
pub fn observe<A, B>(upstream: &A, downstream: &B)
where
    A: Observable + ?Sized,
    B: Observable + ?Sized,
{
    downstream
        .observe_ref()
        .state
        .add_upstream(upstream.observe_ref().state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_hook(counter: &Arc<AtomicI32>) -> Box<dyn FnOnce() + Send> {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn hook_fires_once_on_liveness() {
        let state = RefState::new();
        let fired = Arc::new(AtomicI32::new(0));
        state.set_hook(counting_hook(&fired));

        assert_eq!(fired.load(Ordering::SeqCst), 0);

        state.mark_live();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Further liveness is a no-op.
        state.mark_live();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_set_after_liveness_fires_immediately() {
        let state = RefState::new();
        state.mark_live();

        let fired = Arc::new(AtomicI32::new(0));
        state.set_hook(counting_hook(&fired));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chain_is_lazy_until_downstream_liveness() {
        let a = RefState::new();
        let b = RefState::new();
        let fired = Arc::new(AtomicI32::new(0));
        a.set_hook(counting_hook(&fired));

        // b observes a; b has no real subscriber, so nothing fires.
        b.add_upstream(a.clone());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Liveness anywhere downstream reaches a.
        b.mark_live();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn relation_to_an_already_live_downstream_fires_upstream() {
        let a = RefState::new();
        let b = RefState::new();
        let fired = Arc::new(AtomicI32::new(0));
        a.set_hook(counting_hook(&fired));

        b.mark_live();
        b.add_upstream(a.clone());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
