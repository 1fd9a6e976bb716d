//! Components and Lifecycle
//!
//! A component is the lifecycle unit of a built subtree. It moves through a
//! one-way state machine:
//!
//! ```text
//! Constructing -> Built -> Mounted -> Unmounted
//! ```
//!
//! Hooks may only be registered while `Constructing` (inside the component
//! body, through its [`Scope`]). Mount and unmount fire at most once each;
//! before/after update hooks fire around every host-patch flush that touched
//! the component's subtree.
//!
//! # Error capture
//!
//! Build errors route through the component ancestry. Each component may
//! register error hooks; [`ComponentInner::capture_error`] walks from the
//! failing component to the root, most derived first, calling every hook with
//! the running count of hooks that already absorbed the error. The final
//! count tells the builder whether anyone handled it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Error;
use crate::suspense::SuspendGroup;

static COMPONENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Lifecycle states, in order. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The body is running; hooks may be registered.
    Constructing,
    /// The subtree exists but is not attached to the host tree.
    Built,
    /// Attached; update sweeps apply.
    Mounted,
    /// Detached for good.
    Unmounted,
}

/// What an error hook decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Captured {
    /// The hook handled the error; the count of handlers goes up.
    Absorbed,
    /// Keep walking.
    Propagate,
}

type Hook = Arc<dyn Fn() + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&Error, usize) -> Captured + Send + Sync>;

#[derive(Default)]
struct Hooks {
    mount: Vec<Hook>,
    unmount: Vec<Hook>,
    before_update: Vec<Hook>,
    after_update: Vec<Hook>,
    error: Vec<ErrorHook>,
}

pub(crate) struct ComponentInner {
    id: u64,
    parent: Option<Weak<ComponentInner>>,
    state: Mutex<Lifecycle>,
    hooks: Mutex<Hooks>,
    group: Mutex<Option<SuspendGroup>>,
}

impl ComponentInner {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Run before-update hooks if mounted. Called by the host-patch sweep.
    pub(crate) fn fire_before_update(&self) {
        if *self.state.lock() != Lifecycle::Mounted {
            return;
        }
        let hooks: Vec<Hook> = self.hooks.lock().before_update.clone();
        for hook in hooks {
            hook();
        }
    }

    /// Run after-update hooks if mounted. Called by the host-patch sweep.
    pub(crate) fn fire_after_update(&self) {
        if *self.state.lock() != Lifecycle::Mounted {
            return;
        }
        let hooks: Vec<Hook> = self.hooks.lock().after_update.clone();
        for hook in hooks {
            hook();
        }
    }

    /// Route `error` through this component's error hooks and then every
    /// ancestor's, most derived first, threading the count of hooks that
    /// absorbed it. Returns the final count.
    pub(crate) fn capture_error(self: &Arc<Self>, error: &Error) -> usize {
        let mut absorbed = 0usize;
        let mut current: Option<Arc<ComponentInner>> = Some(Arc::clone(self));
        while let Some(comp) = current {
            let hooks: Vec<ErrorHook> = comp.hooks.lock().error.clone();
            for hook in hooks {
                if hook(error, absorbed) == Captured::Absorbed {
                    absorbed += 1;
                }
            }
            current = comp.parent.as_ref().and_then(|w| w.upgrade());
        }
        absorbed
    }

    fn find_group(self: &Arc<Self>) -> Option<SuspendGroup> {
        let mut current: Option<Arc<ComponentInner>> = Some(Arc::clone(self));
        while let Some(comp) = current {
            if let Some(group) = comp.group.lock().clone() {
                return Some(group);
            }
            current = comp.parent.as_ref().and_then(|w| w.upgrade());
        }
        None
    }
}

/// Handle to one component. Clones share state.
#[derive(Clone)]
pub struct Component {
    pub(crate) inner: Arc<ComponentInner>,
}

impl Component {
    pub(crate) fn new(parent: Option<&Component>) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                id: COMPONENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                parent: parent.map(|p| Arc::downgrade(&p.inner)),
                state: Mutex::new(Lifecycle::Constructing),
                hooks: Mutex::new(Hooks::default()),
                group: Mutex::new(None),
            }),
        }
    }

    /// The component's unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        *self.inner.state.lock()
    }

    pub(crate) fn downgrade(&self) -> Weak<ComponentInner> {
        Arc::downgrade(&self.inner)
    }

    /// End of body construction: `Constructing -> Built`.
    pub(crate) fn mark_built(&self) {
        let mut state = self.inner.state.lock();
        if *state == Lifecycle::Constructing {
            *state = Lifecycle::Built;
        }
    }

    /// Attach: `Built -> Mounted`, firing mount hooks once. No-op in any
    /// other state.
    pub(crate) fn fire_mount(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != Lifecycle::Built {
                return;
            }
            *state = Lifecycle::Mounted;
        }
        tracing::trace!(component = self.inner.id, "mount");
        let hooks: Vec<Hook> = self.inner.hooks.lock().mount.clone();
        for hook in hooks {
            hook();
        }
    }

    /// Detach for good. Unmount hooks fire only if the component actually
    /// mounted; the state becomes `Unmounted` either way.
    pub(crate) fn fire_unmount(&self) {
        let was_mounted = {
            let mut state = self.inner.state.lock();
            if *state == Lifecycle::Unmounted {
                return;
            }
            let was = *state == Lifecycle::Mounted;
            *state = Lifecycle::Unmounted;
            was
        };
        if !was_mounted {
            return;
        }
        tracing::trace!(component = self.inner.id, "unmount");
        let hooks: Vec<Hook> = self.inner.hooks.lock().unmount.clone();
        for hook in hooks {
            hook();
        }
    }

    fn register<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Hooks),
    {
        if *self.inner.state.lock() != Lifecycle::Constructing {
            return Err(Error::invalid_usage(
                "lifecycle hooks may only be registered during component construction",
            ));
        }
        f(&mut self.inner.hooks.lock());
        Ok(())
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// The component body's view of its own component, valid while the body runs.
#[derive(Clone)]
pub struct Scope {
    component: Component,
}

impl Scope {
    pub(crate) fn new(component: Component) -> Self {
        Self { component }
    }

    /// The component this scope belongs to.
    pub fn component(&self) -> Component {
        self.component.clone()
    }

    /// Run `f` when the component attaches to the host tree. At most once.
    pub fn on_mount<F>(&self, f: F) -> Result<(), Error>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.component.register(|h| h.mount.push(Arc::new(f)))
    }

    /// Run `f` when the component detaches. At most once.
    pub fn on_unmount<F>(&self, f: F) -> Result<(), Error>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.component.register(|h| h.unmount.push(Arc::new(f)))
    }

    /// Run `f` before each host-patch flush that touched this subtree.
    pub fn on_before_update<F>(&self, f: F) -> Result<(), Error>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.component
            .register(|h| h.before_update.push(Arc::new(f)))
    }

    /// Run `f` after each host-patch flush that touched this subtree.
    pub fn on_after_update<F>(&self, f: F) -> Result<(), Error>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.component.register(|h| h.after_update.push(Arc::new(f)))
    }

    /// Register an error hook. It receives the error and the number of hooks
    /// that have already absorbed it on this walk.
    pub fn on_error_captured<F>(&self, f: F) -> Result<(), Error>
    where
        F: Fn(&Error, usize) -> Captured + Send + Sync + 'static,
    {
        self.component.register(|h| h.error.push(Arc::new(f)))
    }

    /// Install a suspend group on this component, making it the nearest group
    /// for every descendant.
    pub fn install_group(&self, group: SuspendGroup) {
        *self.component.inner.group.lock() = Some(group);
    }

    /// The nearest suspend group: this component's, or the closest ancestor's.
    pub fn group(&self) -> Option<SuspendGroup> {
        self.component.inner.find_group()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn lifecycle_advances_one_way() {
        let comp = Component::new(None);
        assert_eq!(comp.state(), Lifecycle::Constructing);

        comp.mark_built();
        assert_eq!(comp.state(), Lifecycle::Built);

        comp.fire_mount();
        assert_eq!(comp.state(), Lifecycle::Mounted);

        comp.fire_unmount();
        assert_eq!(comp.state(), Lifecycle::Unmounted);

        // Terminal: nothing re-fires.
        comp.fire_mount();
        assert_eq!(comp.state(), Lifecycle::Unmounted);
    }

    #[test]
    fn mount_and_unmount_hooks_fire_once() {
        let comp = Component::new(None);
        let scope = Scope::new(comp.clone());
        let mounts = Arc::new(AtomicI32::new(0));
        let unmounts = Arc::new(AtomicI32::new(0));

        let m = mounts.clone();
        scope
            .on_mount(move || {
                m.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let u = unmounts.clone();
        scope
            .on_unmount(move || {
                u.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        comp.mark_built();
        comp.fire_mount();
        comp.fire_mount();
        assert_eq!(mounts.load(Ordering::SeqCst), 1);

        comp.fire_unmount();
        comp.fire_unmount();
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hooks_rejected_after_construction() {
        let comp = Component::new(None);
        comp.mark_built();
        let scope = Scope::new(comp);
        let result = scope.on_mount(|| {});
        assert!(matches!(result, Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn unmount_without_mount_skips_hooks() {
        let comp = Component::new(None);
        let scope = Scope::new(comp.clone());
        let unmounts = Arc::new(AtomicI32::new(0));
        let u = unmounts.clone();
        scope
            .on_unmount(move || {
                u.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        comp.mark_built();
        comp.fire_unmount();
        assert_eq!(comp.state(), Lifecycle::Unmounted);
        assert_eq!(unmounts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_walks_ancestry_most_derived_first() {
        let root = Component::new(None);
        let child = Component::new(Some(&root));

        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        Scope::new(root.clone())
            .on_error_captured(move |_, seen| {
                o.lock().push(("root", seen));
                Captured::Absorbed
            })
            .unwrap();
        let o = order.clone();
        Scope::new(child.clone())
            .on_error_captured(move |_, seen| {
                o.lock().push(("child", seen));
                Captured::Absorbed
            })
            .unwrap();

        let err = Error::invalid_usage("boom");
        let absorbed = child.inner.capture_error(&err);
        assert_eq!(absorbed, 2);
        assert_eq!(&*order.lock(), &[("child", 0), ("root", 1)]);
    }

    #[test]
    fn unhandled_error_reports_zero() {
        let comp = Component::new(None);
        let err = Error::invalid_usage("boom");
        assert_eq!(comp.inner.capture_error(&err), 0);
    }

    #[test]
    fn group_lookup_walks_parents() {
        let ctx = crate::context::Context::new();
        let root = Component::new(None);
        let child = Component::new(Some(&root));
        let grandchild = Component::new(Some(&child));

        let group = SuspendGroup::new(&ctx);
        // The ancestors must outlive the lookup; parent links are weak.
        Scope::new(root.clone()).install_group(group.clone());

        let found = Scope::new(grandchild).group();
        assert!(found.is_some());
        assert_eq!(found.map(|g| g.id()), Some(group.id()));
    }

    #[test]
    fn update_sweeps_only_fire_while_mounted() {
        let comp = Component::new(None);
        let scope = Scope::new(comp.clone());
        let count = Arc::new(AtomicI32::new(0));
        let c = count.clone();
        scope
            .on_before_update(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        comp.mark_built();
        comp.inner.fire_before_update();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        comp.fire_mount();
        comp.inner.fire_before_update();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        comp.fire_unmount();
        comp.inner.fire_before_update();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
