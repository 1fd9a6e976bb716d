//! Integration Tests for the Runtime
//!
//! These tests exercise the public API end to end: cells driving host
//! patches through the scheduler, hydration, branch selection, component
//! lifecycle, and suspense coordination.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use weft_core::{
    bidirectional, hydrate, mount, suspense, BranchArm, Captured, Context, Error, Generator,
    HostNode, SuspendGroup, Value,
};

/// Subscribers re-fire in the order they first subscribed, every time.
#[test]
fn subscribers_refire_in_subscription_order() {
    let ctx = Context::new();
    let cell = ctx.cell(0);
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["a", "b", "c"] {
        let cell = cell.clone();
        let order = order.clone();
        ctx.watch(move || {
            cell.get();
            order.lock().push(name);
        });
    }
    order.lock().clear();

    cell.set(1);
    assert_eq!(&*order.lock(), &["a", "b", "c"]);

    // Edges survive the fire; the next write replays the same order.
    order.lock().clear();
    cell.set(2);
    assert_eq!(&*order.lock(), &["a", "b", "c"]);
}

/// Writing the current value back does not notify anyone.
#[test]
fn equal_write_is_silent() {
    let ctx = Context::new();
    let cell = ctx.cell(7);
    let fires = Arc::new(AtomicI32::new(0));

    let c = cell.clone();
    let f = fires.clone();
    ctx.watch(move || {
        c.get();
        f.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fires.load(Ordering::SeqCst), 1);

    cell.set(7);
    assert_eq!(fires.load(Ordering::SeqCst), 1);
    cell.set(8);
    assert_eq!(fires.load(Ordering::SeqCst), 2);
}

/// A derived chain stays consistent through multi-hop updates.
#[test]
fn derived_chain_stays_consistent() {
    let ctx = Context::new();
    let base = ctx.cell(1);

    let b = base.clone();
    let doubled = ctx.derived(move || b.get() * 2);
    let d = doubled.clone();
    let label = ctx.derived(move || format!("value: {}", d.get()));

    assert_eq!(label.get_untracked(), "value: 2");
    base.set(21);
    assert_eq!(label.get_untracked(), "value: 42");
}

/// A bidirectional binding converges from either side.
#[test]
fn bidirectional_binding_converges() {
    let ctx = Context::new();
    let left = ctx.cell(String::from("start"));
    let right = ctx.cell(String::new());

    let binding = bidirectional(&ctx, left.clone(), right.clone());
    assert_eq!(right.get_untracked(), "start");

    right.set("from the right".into());
    assert_eq!(left.get_untracked(), "from the right");

    binding.release();
    left.set("detached".into());
    assert_eq!(right.get_untracked(), "from the right");
}

/// The first-observer hook fires lazily, at most once, and cascades through
/// derived cells to their dependencies.
#[test]
fn on_reference_fires_once_through_derivations() {
    let ctx = Context::new();
    let base = ctx.cell(0);
    let fired = Arc::new(AtomicI32::new(0));

    let f = fired.clone();
    base.on_reference(move || {
        f.fetch_add(1, Ordering::SeqCst);
    });

    // Declaring a derivation is not observation.
    let b = base.clone();
    let derived = ctx.derived(move || b.get() + 1);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // A live read of the derived value makes the whole chain live.
    let d = derived.clone();
    ctx.watch(move || {
        d.get();
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Further observers change nothing.
    let b = base.clone();
    ctx.watch(move || {
        b.get();
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// While a label is locked nothing flushes; the release callback performs
/// the deferred flush exactly once.
#[test]
fn locked_patches_apply_on_release() {
    let ctx = Context::new();
    let root = HostNode::element("body");
    let cell = ctx.cell(Value::Int(0));

    mount(&ctx, &Generator::text_source(cell.clone()), &root).unwrap();
    let text = root.child_at(0).unwrap();

    ctx.lock(None);
    cell.set(Value::Int(9));
    ctx.flush();
    assert_eq!(text.text_content(), "0");

    let release = ctx.unlock(None);
    assert_eq!(text.text_content(), "0");
    release.call();
    assert_eq!(text.text_content(), "9");

    // Calling the release again is a no-op.
    release.call();
    assert_eq!(text.text_content(), "9");
}

/// N writes in one turn produce one applied patch and one before/after pair.
#[test]
fn writes_coalesce_into_one_patch_turn() {
    let ctx = Context::new();
    let root = HostNode::element("body");
    let cell = ctx.cell(Value::Int(0));
    let sweeps = Arc::new(Mutex::new(Vec::new()));

    let c = cell.clone();
    let s = sweeps.clone();
    let gen = Generator::component(move |scope| {
        let s2 = s.clone();
        scope.on_before_update(move || s2.lock().push("before")).unwrap();
        let s2 = s.clone();
        scope.on_after_update(move || s2.lock().push("after")).unwrap();
        Generator::text_source(c.clone())
    });
    mount(&ctx, &gen, &root).unwrap();
    let text = root.child_at(0).unwrap();

    for n in 1..=5 {
        cell.set(Value::Int(n));
    }
    assert_eq!(text.text_content(), "0");

    ctx.flush();
    assert_eq!(text.text_content(), "5");
    assert_eq!(&*sweeps.lock(), &["before", "after"]);

    // A fresh turn gets a fresh pair.
    cell.set(Value::Int(6));
    ctx.flush();
    assert_eq!(&*sweeps.lock(), &["before", "after", "before", "after"]);
}

/// Hydration adopts existing host nodes and leaves them live.
#[test]
fn hydration_attaches_to_prerendered_output() {
    let ctx = Context::new();
    let root = HostNode::element("body");
    let div = HostNode::element("div");
    let span = HostNode::element("span");
    div.append(&span);
    root.append(&div);

    let class = ctx.cell(Value::Text("cold".into()));
    let gen = Generator::element(
        "div",
        vec![("class".into(), class.clone().into())],
        vec![Generator::element("span", vec![], vec![])],
    );

    hydrate(&ctx, &gen, &root).unwrap();
    assert_eq!(root.child_at(0), Some(div.clone()));

    class.set(Value::Text("warm".into()));
    ctx.flush();
    assert_eq!(div.attribute("class"), Some("warm".into()));
}

/// Structure mismatches during hydration are hard errors.
#[test]
fn hydration_mismatches_are_rejected() {
    let ctx = Context::new();

    let root = HostNode::element("body");
    root.append(&HostNode::element("p"));
    let gen = Generator::element("div", vec![], vec![]);
    assert!(matches!(
        hydrate(&ctx, &gen, &root),
        Err(Error::TagMismatch { .. })
    ));

    let root = HostNode::element("body");
    root.append(&HostNode::element("div"));
    root.append(&HostNode::element("div"));
    assert!(matches!(
        hydrate(&ctx, &gen, &root),
        Err(Error::ChildCountMismatch { .. })
    ));
}

/// A branch cycles through its arms as the discriminant changes, unmounting
/// the content it replaces.
#[test]
fn branch_cycles_and_unmounts_replaced_content() {
    let ctx = Context::new();
    let root = HostNode::element("body");
    let mode = ctx.cell(Value::Int(0));
    let unmounts = Arc::new(AtomicI32::new(0));

    let u = unmounts.clone();
    let even_arm = Generator::component(move |scope| {
        let u = u.clone();
        scope
            .on_unmount(move || {
                u.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        Generator::element("p", vec![], vec![])
    });

    let gen = Generator::branch(
        mode.clone(),
        vec![
            BranchArm::new(
                |v| matches!(v, Value::Int(n) if n % 2 == 0),
                even_arm,
            ),
            BranchArm::new(|_| true, Generator::element("div", vec![], vec![])),
        ],
    );
    mount(&ctx, &gen, &root).unwrap();
    assert_eq!(root.child_at(0).unwrap().tag(), Some("p"));

    mode.set(Value::Int(1));
    ctx.flush();
    assert_eq!(root.child_at(0).unwrap().tag(), Some("div"));
    assert_eq!(unmounts.load(Ordering::SeqCst), 1);

    mode.set(Value::Int(2));
    ctx.flush();
    assert_eq!(root.child_at(0).unwrap().tag(), Some("p"));

    mode.set(Value::Int(3));
    ctx.flush();
    assert_eq!(root.child_at(0).unwrap().tag(), Some("div"));
    assert_eq!(unmounts.load(Ordering::SeqCst), 2);
}

/// A suspense boundary shows its fallback while captures are outstanding
/// and switches back when the last one resolves.
#[test]
fn suspense_switches_fallback_and_content() {
    let ctx = Context::new();
    let root = HostNode::element("body");
    let group_slot: Arc<Mutex<Option<SuspendGroup>>> = Arc::new(Mutex::new(None));

    let slot = group_slot.clone();
    let content = Generator::component(move |scope| {
        *slot.lock() = Some(scope.group().expect("boundary installs a group"));
        Generator::element("article", vec![], vec![])
    });
    let fallback = Generator::element("progress", vec![], vec![]);

    let gen = suspense(&ctx, content, Some(fallback));
    mount(&ctx, &gen, &root).unwrap();
    assert_eq!(root.child_at(0).unwrap().tag(), Some("article"));

    let group = group_slot.lock().clone().unwrap();
    let capture = group.capture(|| {}, false);
    ctx.flush();
    assert_eq!(root.child_at(0).unwrap().tag(), Some("progress"));

    assert!(capture.resolve());
    ctx.flush();
    assert_eq!(root.child_at(0).unwrap().tag(), Some("article"));
}

/// A superseded capture resolves stale: no op runs, no state changes.
#[test]
fn superseded_capture_resolves_stale() {
    let ctx = Context::new();
    let group = SuspendGroup::new(&ctx);
    let applied = Arc::new(AtomicI32::new(0));

    let a = applied.clone();
    let first = group.capture(
        move || {
            a.fetch_add(1, Ordering::SeqCst);
        },
        true,
    );
    let a = applied.clone();
    let second = group.capture(
        move || {
            a.fetch_add(10, Ordering::SeqCst);
        },
        true,
    );

    assert!(!first.resolve());
    assert_eq!(applied.load(Ordering::SeqCst), 0);
    assert!(group.is_pending());

    assert!(second.resolve());
    assert_eq!(applied.load(Ordering::SeqCst), 10);
    assert!(!group.is_pending());
}

/// Structural hydration failures route to the nearest boundary that absorbs
/// them; the boundary renders empty and its siblings still hydrate.
#[test]
fn error_boundary_contains_descendant_failures() {
    let ctx = Context::new();

    // Prerendered output whose <div><p/></div> part the generators below
    // disagree with.
    let root = HostNode::element("body");
    let main = HostNode::element("main");
    let div = HostNode::element("div");
    div.append(&HostNode::element("p"));
    main.append(&div);
    main.append(&HostNode::element("footer"));
    root.append(&main);

    let captured = Arc::new(AtomicI32::new(0));
    let c = captured.clone();
    let gen = Generator::element(
        "main",
        vec![],
        vec![
            Generator::component(move |scope| {
                let c = c.clone();
                scope
                    .on_error_captured(move |_, _| {
                        c.fetch_add(1, Ordering::SeqCst);
                        Captured::Absorbed
                    })
                    .unwrap();
                Generator::element(
                    "div",
                    vec![],
                    vec![Generator::element("span", vec![], vec![])],
                )
            }),
            Generator::element("footer", vec![], vec![]),
        ],
    );

    hydrate(&ctx, &gen, &root).unwrap();
    assert_eq!(captured.load(Ordering::SeqCst), 1);

    // The mismatched subtree was pruned; the sibling after the boundary
    // still hydrated.
    let tags: Vec<Option<String>> = main
        .children()
        .iter()
        .map(|c| c.tag().map(str::to_string))
        .collect();
    assert_eq!(tags, vec![Some("footer".into())]);
}
