//! Node Generators
//!
//! A generator is the declarative description the builder consumes: a tree of
//! text, elements, raw host nodes, component bodies, and branch selectors.
//! Generators are cheap to clone (specs are `Arc`-shared) and inert until
//! built.
//!
//! The [`Generator::observed`] wrapper marks a generator as single-build:
//! handing the same observed generator to the builder twice is a usage error,
//! which catches accidental reuse of stateful subtrees.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::Scope;
use crate::host::{HostNode, Value};
use crate::reactive::binding::Source;
use crate::reactive::cell::Cell;

/// Recipe for an element node: tag, property sources, child generators.
pub struct ElementSpec {
    pub(crate) tag: String,
    pub(crate) props: Vec<(String, Source<Value>)>,
    pub(crate) children: Vec<Generator>,
}

/// Recipe for a component: the body run with a fresh [`Scope`] per build.
pub struct ComponentSpec {
    pub(crate) body: Box<dyn Fn(&Scope) -> Generator + Send + Sync>,
}

/// Recipe for a branch selector: a discriminant cell and ordered arms.
pub struct BranchSpec {
    pub(crate) discriminant: Cell<Value>,
    pub(crate) arms: Vec<BranchArm>,
}

/// Single-build wrapper state.
pub struct ObservedSpec {
    pub(crate) inner: Generator,
    pub(crate) built: Mutex<bool>,
}

/// What a branch arm produces when selected.
#[derive(Clone)]
pub(crate) enum ArmBody {
    /// A fixed generator, rebuilt only when the selected arm index changes.
    Fixed(Generator),
    /// A thunk, re-invoked on every re-selection even of the same arm.
    Thunk(Arc<dyn Fn() -> Generator + Send + Sync>),
}

/// One arm of a branch selector: a predicate over the discriminant value and
/// the content to build when it is the first arm to match.
#[derive(Clone)]
pub struct BranchArm {
    pub(crate) predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
    pub(crate) body: ArmBody,
}

impl BranchArm {
    /// An arm with fixed content.
    pub fn new<P>(predicate: P, content: Generator) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            body: ArmBody::Fixed(content),
        }
    }

    /// An arm whose content is produced fresh on every selection.
    pub fn thunk<P, F>(predicate: P, content: F) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn() -> Generator + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            body: ArmBody::Thunk(Arc::new(content)),
        }
    }
}

/// A declarative description of a host subtree. Clones share specs.
#[derive(Clone)]
pub enum Generator {
    /// A text node whose content follows a source.
    Text(Source<Value>),
    /// A pre-built host node adopted as-is.
    Raw(HostNode),
    /// An element with property sources and child generators.
    Element(Arc<ElementSpec>),
    /// A component body, run with a fresh [`Scope`] at build time.
    Component(Arc<ComponentSpec>),
    /// A branch selector over a discriminant cell.
    Branch(Arc<BranchSpec>),
    /// Single-build wrapper; building it twice is an error.
    Observed(Arc<ObservedSpec>),
    /// Builds nothing.
    Empty,
}

impl Generator {
    /// Static text.
    pub fn text(content: impl Into<Value>) -> Self {
        Generator::Text(Source::Value(content.into()))
    }

    /// Text following a reactive source.
    pub fn text_source(source: impl Into<Source<Value>>) -> Self {
        Generator::Text(source.into())
    }

    /// Adopt a pre-built host node.
    pub fn raw(node: HostNode) -> Self {
        Generator::Raw(node)
    }

    /// An element with property sources and children.
    pub fn element(
        tag: impl Into<String>,
        props: Vec<(String, Source<Value>)>,
        children: Vec<Generator>,
    ) -> Self {
        Generator::Element(Arc::new(ElementSpec {
            tag: tag.into(),
            props,
            children,
        }))
    }

    /// A component. `body` runs once per build with that build's scope.
    pub fn component<F>(body: F) -> Self
    where
        F: Fn(&Scope) -> Generator + Send + Sync + 'static,
    {
        Generator::Component(Arc::new(ComponentSpec {
            body: Box::new(body),
        }))
    }

    /// A branch selector. The first arm whose predicate matches the
    /// discriminant's value is built; re-selection of the same arm index
    /// rebuilds only thunk arms.
    pub fn branch(discriminant: Cell<Value>, arms: Vec<BranchArm>) -> Self {
        Generator::Branch(Arc::new(BranchSpec {
            discriminant,
            arms,
        }))
    }

    /// Wrap a generator so it can be built at most once.
    pub fn observed(inner: Generator) -> Self {
        Generator::Observed(Arc::new(ObservedSpec {
            inner,
            built: Mutex::new(false),
        }))
    }

    /// Builds nothing.
    pub fn empty() -> Self {
        Generator::Empty
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Generator::Text(_) => f.write_str("Generator::Text"),
            Generator::Raw(node) => f.debug_tuple("Generator::Raw").field(node).finish(),
            Generator::Element(spec) => f
                .debug_struct("Generator::Element")
                .field("tag", &spec.tag)
                .field("children", &spec.children.len())
                .finish(),
            Generator::Component(_) => f.write_str("Generator::Component"),
            Generator::Branch(spec) => f
                .debug_struct("Generator::Branch")
                .field("arms", &spec.arms.len())
                .finish(),
            Generator::Observed(_) => f.write_str("Generator::Observed"),
            Generator::Empty => f.write_str("Generator::Empty"),
        }
    }
}
