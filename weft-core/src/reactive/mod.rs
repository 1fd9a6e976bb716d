//! Reactive Primitives
//!
//! The signal core of the runtime: cells, derived cells, the dependency
//! capture stack, propagation labels and the per-context scheduler, bindings,
//! and the lazy onreference chain.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A cell is a container for mutable state. Reading it inside an active
//! evaluation registers that evaluation as a subscriber; writing a different
//! value notifies every subscriber through the scheduler.
//!
//! ## Labels
//!
//! When a subscriber actually runs is decided by the label on its edge:
//! immediately, on an explicit flush, or coalesced once per microtask turn
//! with component before/after sweeps. Labels can be locked; a lock's
//! release callback performs the deferred flush.
//!
//! ## Bindings and observation
//!
//! Bindings are guarded derivations between cells. The onreference chain
//! lets a cell learn, at most once and lazily, that something downstream is
//! actually observing it, which is what allows declared-but-unrendered
//! subtrees to cost nothing.

pub mod binding;
pub mod capture;
pub mod cell;
pub mod derived;
pub mod label;
pub mod observe;
pub mod scheduler;

pub use binding::{bidirectional, unidirectional, Binding, Source};
pub use capture::{EdgeId, EdgeRecord};
pub use cell::{Cell, Constant};
pub use derived::DerivedCell;
pub use label::{Label, LabelKind};
pub use observe::{observe, Observable, ObserveRef};
pub use scheduler::{Release, Scheduler};
