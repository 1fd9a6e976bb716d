//! Suspense Coordination
//!
//! A [`SuspendGroup`] tracks outstanding async operations for one boundary.
//! While any capture is outstanding the group's pending cell reads
//! `Flag(true)`, which is what a suspense boundary branches on to show its
//! fallback.
//!
//! # Staleness
//!
//! Resolving is membership-based: a capture that was superseded by a newer
//! cancellable capture, or wiped by [`SuspendGroup::reset`], is no longer in
//! the outstanding set, so its `resolve` is a no-op returning `false`.
//!
//! # Switching
//!
//! Every group owns a [`SwitchDriver`]. Entering the pending state flips the
//! pending cell directly (the fallback must show at once), but the switch
//! back to content runs through the driver: before hooks, then the
//! pending-cell swap under a locked host-patch label, then after hooks. The
//! group keeps a generation counter, bumped on every capture and reset; a
//! capture arriving in a before hook moves it, which aborts the switch and
//! leaves the fallback up for the new work.
//!
//! # Escalation
//!
//! A boundary without a fallback of its own escalates: while it is pending it
//! holds a capture on the nearest enclosing group, so the outer fallback
//! covers it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::build::generator::{BranchArm, Generator};
use crate::context::Context;
use crate::host::Value;
use crate::reactive::cell::Cell;

static GROUP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

type CaptureOp = Box<dyn FnOnce() + Send>;

struct Escalation {
    outer: SuspendGroup,
    active: Option<Capture>,
}

struct GroupState {
    /// Outstanding capture ids, each marked cancellable or not. Order is
    /// arrival order.
    outstanding: IndexMap<u64, bool>,
    next_capture: u64,
    escalation: Option<Escalation>,
}

struct GroupInner {
    id: u64,
    /// Bumped on every capture and reset; the switch driver snapshots it to
    /// detect supersession.
    generation: AtomicU64,
    state: Mutex<GroupState>,
    pending: Cell<Value>,
    ctx: Context,
    /// Drives the switch out of the pending state: before hooks, the locked
    /// pending-cell swap, after hooks.
    driver: SwitchDriver,
}

/// Tracks outstanding async operations for one suspense boundary. Clones
/// share state.
#[derive(Clone)]
pub struct SuspendGroup {
    inner: Arc<GroupInner>,
}

impl SuspendGroup {
    /// Create an empty group whose pending cell lives in `ctx`.
    pub fn new(ctx: &Context) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                id: GROUP_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                generation: AtomicU64::new(0),
                state: Mutex::new(GroupState {
                    outstanding: IndexMap::new(),
                    next_capture: 0,
                    escalation: None,
                }),
                pending: ctx.cell(Value::Flag(false)),
                ctx: ctx.clone(),
                driver: SwitchDriver::new(),
            }),
        }
    }

    /// The group's unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The cell a boundary branches on: `Flag(true)` while anything is
    /// outstanding.
    pub fn pending_cell(&self) -> Cell<Value> {
        self.inner.pending.clone()
    }

    /// Whether any capture is outstanding.
    pub fn is_pending(&self) -> bool {
        !self.inner.state.lock().outstanding.is_empty()
    }

    /// Current generation. Bumped on every capture and reset.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Escalate this group's pending state into `outer` (the nearest
    /// enclosing group). Used by fallbackless boundaries.
    pub(crate) fn escalate_to(&self, outer: SuspendGroup) {
        self.inner.state.lock().escalation = Some(Escalation {
            outer,
            active: None,
        });
    }

    /// The driver wrapping this group's switch out of the pending state.
    /// Registering hooks on it brackets every fallback-to-content swap.
    pub fn driver(&self) -> &SwitchDriver {
        &self.inner.driver
    }

    /// Register an outstanding operation. `op` runs when the capture
    /// resolves non-stale. A cancellable capture is superseded (silently
    /// dropped from the outstanding set) by any later capture.
    pub fn capture<F>(&self, op: F, cancellable: bool) -> Capture
    where
        F: FnOnce() + Send + 'static,
    {
        self.capture_boxed(Box::new(op), cancellable)
    }

    /// Non-generic body of [`SuspendGroup::capture`]; escalation recurses
    /// through it with an already-boxed op.
    fn capture_boxed(&self, op: CaptureOp, cancellable: bool) -> Capture {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let (id, became_pending, escalate) = {
            let mut state = self.inner.state.lock();
            let was_empty = state.outstanding.is_empty();
            state.outstanding.retain(|_, cancellable| !*cancellable);

            let id = state.next_capture;
            state.next_capture += 1;
            state.outstanding.insert(id, cancellable);

            let escalate = if was_empty {
                state
                    .escalation
                    .as_ref()
                    .filter(|e| e.active.is_none())
                    .map(|e| e.outer.clone())
            } else {
                None
            };
            (id, was_empty, escalate)
        };

        tracing::trace!(group = self.inner.id, capture = id, cancellable, "capture");

        if became_pending {
            self.inner.pending.set(Value::Flag(true));
        }
        if let Some(outer) = escalate {
            let held = outer.capture_boxed(Box::new(|| {}), false);
            if let Some(esc) = self.inner.state.lock().escalation.as_mut() {
                esc.active = Some(held);
            }
        }

        Capture {
            group: Arc::downgrade(&self.inner),
            id,
            op: Mutex::new(Some(op)),
        }
    }

    /// Drop every outstanding capture without running its op, bump the
    /// generation, and settle the pending cell. Bypasses the switch driver:
    /// a reset clears the pending state unconditionally.
    pub fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let released = {
            let mut state = self.inner.state.lock();
            state.outstanding.clear();
            state.escalation.as_mut().and_then(|e| e.active.take())
        };
        self.inner.pending.set(Value::Flag(false));
        if let Some(capture) = released {
            capture.resolve();
        }
    }

    fn settle(&self, id: u64, op: Option<CaptureOp>) -> bool {
        let (was_member, now_settled) = {
            let mut state = self.inner.state.lock();
            let was_member = state.outstanding.shift_remove(&id).is_some();
            (was_member, was_member && state.outstanding.is_empty())
        };
        if !was_member {
            // Superseded or reset since this capture was taken.
            return false;
        }
        if let Some(op) = op {
            op();
        }
        if now_settled {
            self.drive_resolved();
        }
        true
    }

    /// Switch out of the pending state through the driver. An aborted switch
    /// means a before hook captured again: the fallback stays up, which
    /// matches the group being pending once more, and the escalation capture
    /// stays held.
    fn drive_resolved(&self) {
        let pending = self.inner.pending.clone();
        let completed = self.inner.driver.run(&self.inner.ctx, self, move || {
            pending.set(Value::Flag(false));
        });
        if !completed {
            return;
        }
        let released = self
            .inner
            .state
            .lock()
            .escalation
            .as_mut()
            .and_then(|e| e.active.take());
        if let Some(capture) = released {
            capture.resolve();
        }
    }
}

impl std::fmt::Debug for SuspendGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspendGroup")
            .field("id", &self.inner.id)
            .field("outstanding", &self.inner.state.lock().outstanding.len())
            .finish()
    }
}

/// One outstanding operation held against a [`SuspendGroup`].
pub struct Capture {
    group: Weak<GroupInner>,
    id: u64,
    op: Mutex<Option<CaptureOp>>,
}

impl Capture {
    /// Resolve the operation. Runs the op and settles the group if this
    /// capture is still a member of the outstanding set; returns `false`
    /// (doing nothing) when it went stale.
    pub fn resolve(&self) -> bool {
        let Some(inner) = self.group.upgrade() else {
            return false;
        };
        let op = self.op.lock().take();
        let group = SuspendGroup { inner };
        let settled = group.settle(self.id, op);
        tracing::trace!(
            group = group.inner.id,
            capture = self.id,
            stale = !settled,
            "resolve"
        );
        settled
    }
}

/// Phases of one fallback/content switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPhase {
    Idle,
    BeforeSwitch,
    Switching,
    AfterSwitch,
}

type SwitchHook = Arc<dyn Fn() + Send + Sync>;

/// Runs a content swap in ordered phases, locking the host-patch label around
/// the swap itself and aborting when the group's generation moves under it.
pub struct SwitchDriver {
    phase: Mutex<SwitchPhase>,
    before: Mutex<Vec<SwitchHook>>,
    after: Mutex<Vec<SwitchHook>>,
}

impl SwitchDriver {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(SwitchPhase::Idle),
            before: Mutex::new(Vec::new()),
            after: Mutex::new(Vec::new()),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SwitchPhase {
        *self.phase.lock()
    }

    /// Run `f` before each swap.
    pub fn on_before_switch<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before.lock().push(Arc::new(f));
    }

    /// Run `f` after each completed swap. Skipped when the swap aborts.
    pub fn on_after_switch<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.after.lock().push(Arc::new(f));
    }

    /// Drive one switch: before hooks, then `swap` under a host-patch lock,
    /// then after hooks. Aborts (returning `false`) if `group`'s generation
    /// moves before the swap step, so a superseding capture wins.
    pub fn run<F>(&self, ctx: &Context, group: &SuspendGroup, swap: F) -> bool
    where
        F: FnOnce(),
    {
        let generation = group.generation();

        *self.phase.lock() = SwitchPhase::BeforeSwitch;
        let before: Vec<SwitchHook> = self.before.lock().clone();
        for hook in before {
            hook();
        }

        if group.generation() != generation {
            *self.phase.lock() = SwitchPhase::Idle;
            tracing::debug!(group = group.id(), "switch superseded before swap");
            return false;
        }

        *self.phase.lock() = SwitchPhase::Switching;
        let patch = ctx.patch_label();
        ctx.lock(Some(std::slice::from_ref(&patch)));
        swap();
        let release = ctx.unlock(Some(std::slice::from_ref(&patch)));
        release.call();

        *self.phase.lock() = SwitchPhase::AfterSwitch;
        let after: Vec<SwitchHook> = self.after.lock().clone();
        for hook in after {
            hook();
        }

        *self.phase.lock() = SwitchPhase::Idle;
        true
    }
}

impl Default for SwitchDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a suspense boundary around `content`. While the boundary's group has
/// outstanding captures the `fallback` shows instead; a boundary without a
/// fallback escalates its pending state to the nearest enclosing group.
pub fn suspense(ctx: &Context, content: Generator, fallback: Option<Generator>) -> Generator {
    let ctx = ctx.clone();
    Generator::component(move |scope| {
        let outer = scope.group();
        let group = SuspendGroup::new(&ctx);
        if fallback.is_none() {
            if let Some(outer) = outer {
                group.escalate_to(outer);
            }
        }
        scope.install_group(group.clone());

        match &fallback {
            Some(fb) => {
                let fb = fb.clone();
                let content = content.clone();
                Generator::branch(
                    group.pending_cell(),
                    vec![
                        BranchArm::thunk(
                            |v| *v == Value::Flag(true),
                            move || fb.clone(),
                        ),
                        BranchArm::thunk(|_| true, move || content.clone()),
                    ],
                )
            }
            None => content.clone(),
        }
    })
}
