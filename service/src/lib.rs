//! vocab-graph: pooled, cancellable, streaming traversal over a vocabulary
//! hierarchy graph.
//!
//! Concepts live in vocabularies and are linked by directed `subClassOf`
//! edges (child to parent). `VocabService` answers point lookups, batch
//! existence checks, label matching and the hierarchy traversals (parents,
//! children, ancestors, descendants, flatten) against a graph store reached
//! through a bounded `ConnectionPool`. Traversals stream concepts one at a
//! time over a `tokio` channel and stop early when the caller's
//! `CancelToken` fires.
//!
//! Two store backends implement the `Connector` seam: `MemoryStore`, an
//! in-process graph evaluated with `vocab_graph_core`, and `BoltConnector`
//! (feature `bolt`), a Neo4j server spoken to over Bolt.

mod cancel;
mod catalog;
mod config;
mod error;
mod mapper;
mod memory;
mod model;
mod pool;
mod request;
mod service;
mod store;

#[cfg(feature = "bolt")]
mod bolt;

pub use cancel::CancelToken;
pub use catalog::{QueryKind, Statement, CONCEPT_COLUMNS};
pub use config::ServiceConfig;
pub use error::{Result, VocabError};
pub use mapper::concept_from_row;
pub use memory::{MemoryConnection, MemoryRows, MemoryStore};
pub use model::{Concept, Vocabulary};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use request::{dispatch, error_body, Request};
pub use service::{ConceptStream, Traversal, VocabService};
pub use store::{Connection, Connector, Row, RowStream, Value};

#[cfg(feature = "bolt")]
pub use bolt::{BoltConnection, BoltConnector, BoltRows};

pub use vocab_graph_core as core;
