//! Builder and Reconciler
//!
//! [`mount`] turns a generator into host nodes under a target, wiring every
//! reactive property and branch selector into the context's host-patch
//! label. [`hydrate`] does the same against a target that already contains
//! rendered output: elements are claimed in order and adopted instead of
//! created, with strict structure checks.
//!
//! # Hydration claiming
//!
//! A cursor walks the existing children of each claimed element. Elements
//! and raw nodes consume the cursor; text nodes are always created fresh
//! (replacing a claimed text node in place when one is there). A claimed
//! node with the wrong tag is a [`Error::TagMismatch`]; running out of nodes
//! to claim, or leaving some unclaimed, is a [`Error::ChildCountMismatch`].
//!
//! # Error routing
//!
//! A build failure travels to the nearest enclosing component, which runs
//! the error-hook chain once. If any hook absorbs it the component builds as
//! an empty placeholder; otherwise the failure keeps propagating outward
//! without re-running the chain, and surfaces from `mount`/`hydrate`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::build::generator::{ArmBody, Generator};
use crate::build::node::Node;
use crate::component::{Component, Scope};
use crate::context::Context;
use crate::error::Error;
use crate::host::caps::{caps_for, NodeCaps};
use crate::host::{HostNode, Value};
use crate::reactive::binding::Source;

/// Build `generator` as fresh host nodes appended under `target`.
pub fn mount(ctx: &Context, generator: &Generator, target: &HostNode) -> Result<Node, Error> {
    let node = build(ctx, generator, target, None, None, None).map_err(BuildFail::into_error)?;
    node.fire_mounted();
    tracing::debug!(target = target.id(), "mount complete");
    Ok(node)
}

/// Build `generator` against host nodes already present under `target`,
/// adopting them instead of creating new ones. The structure must match
/// exactly; on a mismatch the partial build is torn down and the error
/// returned.
pub fn hydrate(ctx: &Context, generator: &Generator, target: &HostNode) -> Result<Node, Error> {
    let cursor = Cursor::new(target.clone());
    let node = match build(ctx, generator, target, None, Some(&cursor), None) {
        Ok(node) => node,
        Err(fail) => return Err(fail.into_error()),
    };
    if cursor.consumed() < target.child_count() {
        node.remove();
        return Err(Error::ChildCountMismatch {
            expected: cursor.consumed(),
            found: target.child_count(),
        });
    }
    node.fire_mounted();
    tracing::debug!(target = target.id(), claimed = cursor.consumed(), "hydrate complete");
    Ok(node)
}

/// Position while claiming existing children during hydration. Clones share
/// the position.
#[derive(Clone)]
pub(crate) struct Cursor {
    inner: Arc<CursorInner>,
}

struct CursorInner {
    parent: HostNode,
    index: AtomicUsize,
}

impl Cursor {
    fn new(parent: HostNode) -> Self {
        Self {
            inner: Arc::new(CursorInner {
                parent,
                index: AtomicUsize::new(0),
            }),
        }
    }

    fn peek(&self) -> Option<HostNode> {
        self.inner
            .parent
            .child_at(self.inner.index.load(Ordering::SeqCst))
    }

    fn take(&self) -> Option<HostNode> {
        let idx = self.inner.index.load(Ordering::SeqCst);
        let child = self.inner.parent.child_at(idx)?;
        self.inner.index.store(idx + 1, Ordering::SeqCst);
        Some(child)
    }

    fn consumed(&self) -> usize {
        self.inner.index.load(Ordering::SeqCst)
    }

    /// Step back one slot. Used when a claimed node was torn down by a
    /// failed build, so the following sibling is claimed at the right index.
    fn retreat(&self) {
        let idx = self.inner.index.load(Ordering::SeqCst);
        if idx > 0 {
            self.inner.index.store(idx - 1, Ordering::SeqCst);
        }
    }

    fn shortfall(&self) -> Error {
        Error::ChildCountMismatch {
            expected: self.consumed() + 1,
            found: self.inner.parent.child_count(),
        }
    }
}

/// Internal failure wrapper distinguishing a fresh error from one that has
/// already been offered to a component's error-hook chain.
enum BuildFail {
    Fresh(Error),
    Chained(Error),
}

impl BuildFail {
    fn into_error(self) -> Error {
        match self {
            BuildFail::Fresh(err) | BuildFail::Chained(err) => err,
        }
    }
}

fn build(
    ctx: &Context,
    generator: &Generator,
    parent: &HostNode,
    anchor: Option<&HostNode>,
    cursor: Option<&Cursor>,
    owner: Option<&Component>,
) -> Result<Node, BuildFail> {
    match generator {
        Generator::Empty => Ok(Node::new(None)),
        Generator::Text(source) => Ok(build_text(ctx, source, parent, anchor, cursor, owner)),
        Generator::Raw(raw) => build_raw(raw, parent, anchor, cursor),
        Generator::Element(spec) => {
            let host = match cursor {
                Some(cursor) => {
                    let existing = cursor
                        .take()
                        .ok_or_else(|| BuildFail::Fresh(cursor.shortfall()))?;
                    match existing.tag() {
                        Some(tag) if tag == spec.tag => existing,
                        other => {
                            return Err(BuildFail::Fresh(Error::TagMismatch {
                                expected: spec.tag.clone(),
                                found: other.unwrap_or("#text").to_string(),
                            }))
                        }
                    }
                }
                None => {
                    let host = HostNode::element(&spec.tag);
                    parent.insert_before(&host, anchor);
                    host
                }
            };

            let node = Node::new(Some(host.clone()));
            let caps = caps_for(&spec.tag);
            for (name, source) in &spec.props {
                bind_prop(ctx, &node, &host, caps, name, source, owner);
            }

            let child_cursor = cursor.map(|_| Cursor::new(host.clone()));
            for child in &spec.children {
                match build(ctx, child, &host, None, child_cursor.as_ref(), owner) {
                    Ok(built) => node.push_child(built),
                    Err(fail) => {
                        // Tear down this frame so a failed build leaves no
                        // orphaned host nodes behind.
                        node.remove();
                        if let Some(cursor) = cursor {
                            cursor.retreat();
                        }
                        return Err(fail);
                    }
                }
            }
            if let Some(cc) = &child_cursor {
                if cc.consumed() < host.child_count() {
                    let mismatch = Error::ChildCountMismatch {
                        expected: cc.consumed(),
                        found: host.child_count(),
                    };
                    node.remove();
                    if let Some(cursor) = cursor {
                        cursor.retreat();
                    }
                    return Err(BuildFail::Fresh(mismatch));
                }
            }
            Ok(node)
        }
        Generator::Component(spec) => {
            let component = Component::new(owner);
            let scope = Scope::new(component.clone());
            let body = (spec.body)(&scope);

            let node = Node::new(None);
            node.set_component(component.clone());
            match build(ctx, &body, parent, anchor, cursor, Some(&component)) {
                Ok(child) => {
                    node.push_child(child);
                    component.mark_built();
                    Ok(node)
                }
                Err(BuildFail::Fresh(err)) => {
                    // Usage errors signal programming mistakes; they bypass
                    // the boundary chain entirely.
                    if !err.is_structural() {
                        return Err(BuildFail::Chained(err));
                    }
                    let absorbed = component.inner.capture_error(&err);
                    if absorbed > 0 {
                        tracing::debug!(
                            component = component.id(),
                            error = %err,
                            absorbed,
                            "build error absorbed"
                        );
                        component.mark_built();
                        Ok(node)
                    } else {
                        Err(BuildFail::Chained(err))
                    }
                }
                Err(chained) => Err(chained),
            }
        }
        Generator::Branch(spec) => build_branch(ctx, spec, parent, anchor, cursor, owner),
        Generator::Observed(spec) => {
            {
                let mut built = spec.built.lock();
                if *built {
                    return Err(BuildFail::Fresh(Error::invalid_usage(
                        "observed generator built more than once",
                    )));
                }
                *built = true;
            }
            build(ctx, &spec.inner, parent, anchor, cursor, owner)
        }
    }
}

fn build_text(
    ctx: &Context,
    source: &Source<Value>,
    parent: &HostNode,
    anchor: Option<&HostNode>,
    cursor: Option<&Cursor>,
    owner: Option<&Component>,
) -> Node {
    let host = HostNode::text("");

    // Text is always created fresh; hydration replaces a claimed text node
    // in place rather than adopting it.
    match cursor.and_then(|c| c.peek()) {
        Some(existing) if existing.is_text() => {
            if let Some(cursor) = cursor {
                cursor.take();
            }
            parent.insert_before(&host, Some(&existing));
            existing.detach();
        }
        _ => parent.insert_before(&host, anchor),
    }

    let node = Node::new(Some(host.clone()));
    if source.is_reactive() {
        let source = source.clone();
        let host = host.clone();
        let record = ctx.evaluate_inner(
            Some(ctx.patch_label()),
            Arc::new(move || {
                host.set_text(source.get().to_attr());
            }),
            true,
            owner.map(|c| c.downgrade()),
        );
        node.push_edge(record);
    } else {
        host.set_text(source.get_untracked().to_attr());
    }
    node
}

fn build_raw(
    raw: &HostNode,
    parent: &HostNode,
    anchor: Option<&HostNode>,
    cursor: Option<&Cursor>,
) -> Result<Node, BuildFail> {
    match cursor {
        Some(cursor) => match cursor.take() {
            Some(existing) if existing == *raw => {}
            Some(existing) => {
                parent.insert_before(raw, Some(&existing));
                existing.detach();
            }
            None => return Err(BuildFail::Fresh(cursor.shortfall())),
        },
        None => parent.insert_before(raw, anchor),
    }
    Ok(Node::new(Some(raw.clone())))
}

fn bind_prop(
    ctx: &Context,
    node: &Node,
    host: &HostNode,
    caps: &'static NodeCaps,
    name: &str,
    source: &Source<Value>,
    owner: Option<&Component>,
) {
    let seeded_path = caps.is_seeded(name);
    if source.is_reactive() {
        let seeded = Arc::new(AtomicBool::new(false));
        let host = host.clone();
        let name = name.to_string();
        let source = source.clone();
        let record = ctx.evaluate_inner(
            Some(ctx.patch_label()),
            Arc::new(move || {
                let value = source.get();
                apply_prop(&host, &name, &value, seeded_path, &seeded);
            }),
            true,
            owner.map(|c| c.downgrade()),
        );
        node.push_edge(record);
    } else {
        let value = source.get_untracked();
        apply_prop(host, name, &value, seeded_path, &AtomicBool::new(false));
    }
}

/// Seeded properties go through the attribute path exactly once, then switch
/// to direct property assignment.
fn apply_prop(host: &HostNode, name: &str, value: &Value, seeded_path: bool, seeded: &AtomicBool) {
    if seeded_path && seeded.swap(true, Ordering::SeqCst) {
        host.set_property(name, value.clone());
    } else {
        host.set_attribute(name, value.to_attr());
    }
}

struct BranchRt {
    /// `None` until the first selection; then the selected arm index (or
    /// `None` again when no arm matched).
    selected: Mutex<Option<Option<usize>>>,
    /// Hydration cursor for the very first selection only.
    pending_cursor: Mutex<Option<Cursor>>,
    /// Failure from the first selection, surfaced to the build call.
    initial_error: Mutex<Option<BuildFail>>,
    initialized: AtomicBool,
}

fn build_branch(
    ctx: &Context,
    spec: &Arc<crate::build::generator::BranchSpec>,
    parent: &HostNode,
    anchor: Option<&HostNode>,
    cursor: Option<&Cursor>,
    owner: Option<&Component>,
) -> Result<Node, BuildFail> {
    // The marker anchors the selected content's position across rebuilds.
    let marker = HostNode::text("");
    match cursor {
        Some(cursor) => {
            match cursor.peek() {
                Some(existing) => parent.insert_before(&marker, Some(&existing)),
                None => parent.append(&marker),
            }
            // The marker now occupies the claimed slot.
            cursor.take();
        }
        None => parent.insert_before(&marker, anchor),
    }

    let branch_node = Node::new(Some(marker.clone()));
    let rt = Arc::new(BranchRt {
        selected: Mutex::new(None),
        pending_cursor: Mutex::new(cursor.cloned()),
        initial_error: Mutex::new(None),
        initialized: AtomicBool::new(false),
    });

    let callback = {
        let ctx = ctx.clone();
        let spec = Arc::clone(spec);
        let parent = parent.clone();
        let marker = marker.clone();
        let rt = Arc::clone(&rt);
        let owner = owner.cloned();
        let weak_node = branch_node.downgrade();
        Arc::new(move || {
            let value = spec.discriminant.get();
            let idx = spec.arms.iter().position(|arm| (arm.predicate)(&value));

            let Some(node) = Node::upgrade(&weak_node) else {
                return;
            };
            if node.is_removed() {
                return;
            }

            let first = !rt.initialized.load(Ordering::SeqCst);
            let rebuild = match (*rt.selected.lock(), idx) {
                _ if first => true,
                (Some(Some(prev)), Some(next)) if prev == next => {
                    matches!(spec.arms[next].body, ArmBody::Thunk(_))
                }
                (Some(None), None) => false,
                _ => true,
            };
            if !rebuild {
                return;
            }
            *rt.selected.lock() = Some(idx);
            tracing::trace!(arm = ?idx, "branch select");

            let content = idx.map(|i| match &spec.arms[i].body {
                ArmBody::Fixed(g) => g.clone(),
                ArmBody::Thunk(f) => f(),
            });
            let pending = rt.pending_cursor.lock().take();

            // New content goes in at the marker before the old content
            // leaves, so siblings never shift.
            let built = match content {
                Some(g) => build(&ctx, &g, &parent, Some(&marker), pending.as_ref(), owner.as_ref()),
                None => Ok(Node::new(None)),
            };
            match built {
                Ok(new_node) => {
                    let old = node.replace_children(vec![new_node.clone()]);
                    for stale in old {
                        stale.remove();
                    }
                    if node.is_mounted() {
                        new_node.fire_mounted();
                    }
                }
                Err(fail) if first => {
                    *rt.initial_error.lock() = Some(fail);
                }
                Err(fail) => {
                    let err = fail.into_error();
                    let absorbed = if err.is_structural() {
                        owner
                            .as_ref()
                            .map(|c| c.inner.capture_error(&err))
                            .unwrap_or(0)
                    } else {
                        0
                    };
                    if absorbed == 0 {
                        tracing::error!(error = %err, "unhandled branch rebuild error");
                    }
                    for stale in node.replace_children(Vec::new()) {
                        stale.remove();
                    }
                }
            }
        })
    };

    let record = ctx.evaluate_inner(
        Some(ctx.patch_label()),
        callback,
        true,
        owner.map(|c| c.downgrade()),
    );
    rt.initialized.store(true, Ordering::SeqCst);
    branch_node.push_edge(record);

    if let Some(fail) = rt.initial_error.lock().take() {
        branch_node.remove();
        if let Some(cursor) = cursor {
            cursor.retreat();
        }
        return Err(fail);
    }
    Ok(branch_node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::generator::BranchArm;
    use crate::component::Captured;
    use std::sync::atomic::AtomicI32;

    fn counter_label(root: &HostNode) -> Vec<String> {
        root.children()
            .iter()
            .map(|c| match c.tag() {
                Some(tag) => tag.to_string(),
                None => format!("#text:{}", c.text_content()),
            })
            .collect()
    }

    #[test]
    fn mounts_static_tree() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let gen = Generator::element(
            "div",
            vec![("class".into(), Source::Value(Value::Text("box".into())))],
            vec![Generator::text("hello")],
        );

        let node = mount(&ctx, &gen, &root).unwrap();
        assert_eq!(root.child_count(), 1);
        let div = root.child_at(0).unwrap();
        assert_eq!(div.tag(), Some("div"));
        assert_eq!(div.attribute("class"), Some("box".into()));
        assert_eq!(div.child_at(0).unwrap().text_content(), "hello");

        node.remove();
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn reactive_text_coalesces_per_flush() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let cell = ctx.cell(Value::Int(0));

        let _node = mount(&ctx, &Generator::text_source(cell.clone()), &root).unwrap();
        let text = root.child_at(0).unwrap();
        assert_eq!(text.text_content(), "0");

        cell.set(Value::Int(1));
        cell.set(Value::Int(2));
        cell.set(Value::Int(3));
        // Nothing applied until the turn flushes.
        assert_eq!(text.text_content(), "0");

        ctx.flush();
        assert_eq!(text.text_content(), "3");
    }

    #[test]
    fn seeded_prop_writes_attribute_then_property() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let cell = ctx.cell(Value::Text("first".into()));

        let gen = Generator::element("input", vec![("value".into(), cell.clone().into())], vec![]);
        let _node = mount(&ctx, &gen, &root).unwrap();

        let input = root.child_at(0).unwrap();
        assert_eq!(input.attribute("value"), Some("first".into()));
        assert_eq!(input.property("value"), None);

        cell.set(Value::Text("second".into()));
        ctx.flush();
        assert_eq!(input.attribute("value"), Some("first".into()));
        assert_eq!(input.property("value"), Some(Value::Text("second".into())));
    }

    #[test]
    fn non_seeded_prop_stays_on_attribute_path() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let cell = ctx.cell(Value::Text("a".into()));

        let gen = Generator::element("div", vec![("class".into(), cell.clone().into())], vec![]);
        let _node = mount(&ctx, &gen, &root).unwrap();

        cell.set(Value::Text("b".into()));
        ctx.flush();
        let div = root.child_at(0).unwrap();
        assert_eq!(div.attribute("class"), Some("b".into()));
        assert_eq!(div.property("class"), None);
    }

    #[test]
    fn hydrate_adopts_matching_structure() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let existing = HostNode::element("div");
        let inner = HostNode::element("span");
        existing.append(&inner);
        root.append(&existing);

        let cell = ctx.cell(Value::Text("live".into()));
        let gen = Generator::element(
            "div",
            vec![("class".into(), cell.clone().into())],
            vec![Generator::element("span", vec![], vec![])],
        );

        let _node = hydrate(&ctx, &gen, &root).unwrap();
        // Same host nodes, now wired.
        assert_eq!(root.child_at(0), Some(existing.clone()));
        assert_eq!(existing.child_at(0), Some(inner));

        cell.set(Value::Text("updated".into()));
        ctx.flush();
        assert_eq!(existing.attribute("class"), Some("updated".into()));
    }

    #[test]
    fn hydrate_rejects_wrong_tag() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        root.append(&HostNode::element("p"));

        let gen = Generator::element("div", vec![], vec![]);
        let err = hydrate(&ctx, &gen, &root).unwrap_err();
        assert_eq!(
            err,
            Error::TagMismatch {
                expected: "div".into(),
                found: "p".into(),
            }
        );
    }

    #[test]
    fn hydrate_rejects_leftover_children() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        root.append(&HostNode::element("div"));
        root.append(&HostNode::element("div"));

        let gen = Generator::element("div", vec![], vec![]);
        let err = hydrate(&ctx, &gen, &root).unwrap_err();
        assert!(matches!(err, Error::ChildCountMismatch { .. }));
    }

    #[test]
    fn hydrate_rejects_shortfall() {
        let ctx = Context::new();
        let root = HostNode::element("body");

        let gen = Generator::element("div", vec![], vec![]);
        let err = hydrate(&ctx, &gen, &root).unwrap_err();
        assert!(matches!(err, Error::ChildCountMismatch { .. }));
    }

    #[test]
    fn branch_switches_arms_on_discriminant_change() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let mode = ctx.cell(Value::Int(0));

        let gen = Generator::branch(
            mode.clone(),
            vec![
                BranchArm::new(
                    |v| *v == Value::Int(0),
                    Generator::element("p", vec![], vec![]),
                ),
                BranchArm::new(|_| true, Generator::element("div", vec![], vec![])),
            ],
        );
        let _node = mount(&ctx, &gen, &root).unwrap();
        assert_eq!(counter_label(&root), ["p", "#text:"]);

        mode.set(Value::Int(1));
        ctx.flush();
        assert_eq!(counter_label(&root), ["div", "#text:"]);

        mode.set(Value::Int(0));
        ctx.flush();
        assert_eq!(counter_label(&root), ["p", "#text:"]);
    }

    #[test]
    fn branch_same_arm_fixed_does_not_rebuild() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let mode = ctx.cell(Value::Int(0));

        let gen = Generator::branch(
            mode.clone(),
            vec![BranchArm::new(
                |v| matches!(v, Value::Int(n) if n % 2 == 0),
                Generator::element("p", vec![], vec![]),
            )],
        );
        let _node = mount(&ctx, &gen, &root).unwrap();
        let first = root.child_at(0).unwrap();

        // Still even: same arm, fixed body, same host node survives.
        mode.set(Value::Int(2));
        ctx.flush();
        assert_eq!(root.child_at(0), Some(first));
    }

    #[test]
    fn branch_thunk_arm_rebuilds_on_reselection() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let mode = ctx.cell(Value::Int(0));
        let builds = Arc::new(AtomicI32::new(0));

        let b = builds.clone();
        let gen = Generator::branch(
            mode.clone(),
            vec![BranchArm::thunk(
                |_| true,
                move || {
                    b.fetch_add(1, Ordering::SeqCst);
                    Generator::element("p", vec![], vec![])
                },
            )],
        );
        let _node = mount(&ctx, &gen, &root).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        mode.set(Value::Int(1));
        ctx.flush();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(root.child_count(), 2); // content + marker
    }

    #[test]
    fn component_lifecycle_runs_through_mount() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let mounts = Arc::new(AtomicI32::new(0));
        let unmounts = Arc::new(AtomicI32::new(0));

        let (m, u) = (mounts.clone(), unmounts.clone());
        let gen = Generator::component(move |scope| {
            let m = m.clone();
            let u = u.clone();
            scope
                .on_mount(move || {
                    m.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            scope
                .on_unmount(move || {
                    u.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            Generator::element("div", vec![], vec![])
        });

        let node = mount(&ctx, &gen, &root).unwrap();
        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert_eq!(unmounts.load(Ordering::SeqCst), 0);

        node.remove();
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn before_and_after_sweeps_wrap_each_flush_once() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let cell = ctx.cell(Value::Int(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        let cell_in = cell.clone();
        let log_in = log.clone();
        let gen = Generator::component(move |scope| {
            let l = log_in.clone();
            scope
                .on_before_update(move || l.lock().push("before"))
                .unwrap();
            let l = log_in.clone();
            scope
                .on_after_update(move || l.lock().push("after"))
                .unwrap();
            Generator::text_source(cell_in.clone())
        });
        let _node = mount(&ctx, &gen, &root).unwrap();

        // Several writes, one turn: one before/after pair.
        cell.set(Value::Int(1));
        cell.set(Value::Int(2));
        cell.set(Value::Int(3));
        ctx.flush();
        assert_eq!(&*log.lock(), &["before", "after"]);
    }

    /// A prerendered `<div><p/></div>` the generators below disagree with.
    fn prerendered_mismatch() -> HostNode {
        let root = HostNode::element("body");
        let div = HostNode::element("div");
        div.append(&HostNode::element("p"));
        root.append(&div);
        root
    }

    fn mismatching_content() -> Generator {
        Generator::element(
            "div",
            vec![],
            vec![Generator::element("span", vec![], vec![])],
        )
    }

    #[test]
    fn error_boundary_absorbs_hydration_failure() {
        let ctx = Context::new();
        let root = prerendered_mismatch();
        let seen = Arc::new(Mutex::new(None));

        let s = seen.clone();
        let gen = Generator::component(move |scope| {
            let s = s.clone();
            scope
                .on_error_captured(move |err, _| {
                    *s.lock() = Some(err.clone());
                    Captured::Absorbed
                })
                .unwrap();
            mismatching_content()
        });

        let node = hydrate(&ctx, &gen, &root).unwrap();
        assert!(matches!(*seen.lock(), Some(Error::TagMismatch { .. })));
        // Absorbed: the boundary builds as an empty placeholder and the
        // failed subtree is pruned from the host.
        assert_eq!(node.child_count(), 0);
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn unabsorbed_failure_surfaces_from_hydrate() {
        let ctx = Context::new();
        let root = prerendered_mismatch();

        let gen = Generator::component(move |_| mismatching_content());
        let err = hydrate(&ctx, &gen, &root).unwrap_err();
        assert!(matches!(err, Error::TagMismatch { .. }));
    }

    #[test]
    fn error_chain_runs_once_for_nested_boundaries() {
        let ctx = Context::new();
        let root = prerendered_mismatch();
        let outer_calls = Arc::new(AtomicI32::new(0));

        // Inner boundary has no hook of its own; the chain reaches the outer
        // hook exactly once, and the inner component becomes the placeholder.
        let inner_gen = Generator::component(move |_| mismatching_content());
        let o = outer_calls.clone();
        let gen = Generator::component(move |scope| {
            let o = o.clone();
            scope
                .on_error_captured(move |_, _| {
                    o.fetch_add(1, Ordering::SeqCst);
                    Captured::Absorbed
                })
                .unwrap();
            inner_gen.clone()
        });

        hydrate(&ctx, &gen, &root).unwrap();
        assert_eq!(outer_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn usage_errors_bypass_boundaries() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let hook_calls = Arc::new(AtomicI32::new(0));

        let once = Generator::observed(Generator::element("div", vec![], vec![]));
        let failing = Generator::element("section", vec![], vec![once.clone(), once]);

        let h = hook_calls.clone();
        let gen = Generator::component(move |scope| {
            let h = h.clone();
            scope
                .on_error_captured(move |_, _| {
                    h.fetch_add(1, Ordering::SeqCst);
                    Captured::Absorbed
                })
                .unwrap();
            failing.clone()
        });

        let err = mount(&ctx, &gen, &root).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn observed_generator_rejects_second_build() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let gen = Generator::observed(Generator::element("div", vec![], vec![]));

        mount(&ctx, &gen, &root).unwrap();
        let err = mount(&ctx, &gen, &root).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[test]
    fn raw_node_is_adopted_as_is() {
        let ctx = Context::new();
        let root = HostNode::element("body");
        let canvas = HostNode::element("canvas");
        canvas.set_attribute("width", "640");

        let _node = mount(&ctx, &Generator::raw(canvas.clone()), &root).unwrap();
        assert_eq!(root.child_at(0), Some(canvas));
    }
}
