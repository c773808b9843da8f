//! vocab-graph-core: In-memory vocabulary hierarchy graph.
//!
//! A pure Rust library that holds concepts grouped into vocabularies,
//! the `subClassOf` edges between them, and provides hop-bounded closure
//! traversal (parents, children, ancestors, descendants, reflexive
//! descendants). No async or store dependencies; this crate compiles
//! standalone.
//!
//! Used as the evaluation engine of the in-process store backend in
//! `vocab-graph`, and by the benchmark binary.

mod graph;
mod traversal;

pub use graph::{ConceptRecord, HierarchyDirection, HierarchyGraph, NodeId};
pub use traversal::{closure, ClosureResult, HopRange, Reached};
