//! Building Generators into Host Trees
//!
//! Declarative [`Generator`] descriptions go in, live host subtrees come
//! out. [`builder::mount`] creates everything fresh; [`builder::hydrate`]
//! claims host nodes already rendered by a previous pass and wires them
//! without rebuilding. The returned [`Node`] owns the subtree's subscription
//! edges and component lifecycles, and tears all of it down on `remove`.

pub mod builder;
pub mod generator;
pub mod node;

pub use builder::{hydrate, mount};
pub use generator::{BranchArm, Generator};
pub use node::Node;
