//! Weft Core
//!
//! The runtime for the Weft fine-grained reactive UI framework. It
//! implements:
//!
//! - Reactive primitives (cells, derived cells, bindings)
//! - Propagation labels and a per-context microtask scheduler
//! - The node builder and hydration reconciler
//! - Component lifecycle, error capture, and suspense coordination
//!
//! Everything hangs off an explicit [`Context`]; there are no global tables,
//! so independent roots never interfere.
//!
//! # Architecture
//!
//! - `reactive`: cells, dependency capture, labels, bindings, observation
//! - `host`: the in-memory host document tree and value types
//! - `build`: generators, the builder/reconciler, built-node teardown
//! - `component`: lifecycle state machine and error-hook chains
//! - `suspense`: suspend groups and fallback/content switching
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{Context, Generator, HostNode};
//!
//! let ctx = Context::new();
//! let count = ctx.cell(weft_core::Value::Int(0));
//!
//! let root = HostNode::element("body");
//! weft_core::mount(&ctx, &Generator::text_source(count.clone()), &root)?;
//!
//! count.set(weft_core::Value::Int(5));
//! ctx.flush();
//! // The text node now reads "5".
//! ```

pub mod build;
pub mod component;
pub mod context;
pub mod error;
pub mod host;
pub mod reactive;
pub mod suspense;

pub use build::{hydrate, mount, BranchArm, Generator, Node};
pub use component::{Captured, Component, Lifecycle, Scope};
pub use context::{Context, Watch};
pub use error::Error;
pub use host::{caps::caps_for, HostNode, Value};
pub use reactive::{
    bidirectional, observe, unidirectional, Binding, Cell, Constant, DerivedCell, EdgeId,
    EdgeRecord, Label, LabelKind, Observable, ObserveRef, Release, Scheduler, Source,
};
pub use suspense::{suspense, Capture, SuspendGroup, SwitchDriver, SwitchPhase};
