//! Model graph nodes
//!
//! Each node is a declarative unit: the input parameters it consumes,
//! the output parameter it emits, and the formula relating them. Nodes
//! are pure functions of their declared inputs for a single time index;
//! they carry no memory of other time indices or other resources.

mod node;

pub use node::{piecewise_linear, Formula, NodeKind, NodeSpec};
