//! In-process store backend over `vocab_graph_core::HierarchyGraph`.
//!
//! Evaluates each catalog statement by kind instead of parsing Cypher:
//! lookups go through the `(vocab, code)` index, hierarchy kinds through
//! the core's visited-set closure (so cyclic data terminates), and `Match`
//! through an anchored regex, the way Cypher's `=~` full-matches.
//!
//! Also carries fault injection and counters so the facade's failure and
//! resource paths can be exercised without a live store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tracing::trace;
use vocab_graph_core::{closure, ConceptRecord, HierarchyGraph, NodeId};

use crate::catalog::{QueryKind, Statement};
use crate::error::{Result, VocabError};
use crate::model::Vocabulary;
use crate::store::{Connection, Connector, Row, RowStream, Value};

#[derive(Default)]
struct Faults {
    fail_connect: AtomicBool,
    fail_on_code: Mutex<Option<String>>,
    fail_after_rows: Mutex<Option<usize>>,
}

#[derive(Default)]
struct Counters {
    connections: AtomicUsize,
    statements: AtomicUsize,
    rows: AtomicUsize,
}

/// Shared in-memory vocabulary store. Clones share the same graph.
#[derive(Clone, Default)]
pub struct MemoryStore {
    graph: Arc<RwLock<HierarchyGraph>>,
    faults: Arc<Faults>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new(graph: HierarchyGraph) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
            ..Self::default()
        }
    }

    /// Run a closure against the graph, e.g. to load more concepts.
    pub fn with_graph_mut<R>(&self, f: impl FnOnce(&mut HierarchyGraph) -> R) -> R {
        f(&mut self.graph.write())
    }

    pub fn with_graph<R>(&self, f: impl FnOnce(&HierarchyGraph) -> R) -> R {
        f(&self.graph.read())
    }

    /// Make every subsequent `connect()` fail with `Connectivity`.
    pub fn fail_connect(&self, fail: bool) {
        self.faults.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make statements whose `$code` equals `code` fail on execution.
    pub fn fail_on_code(&self, code: Option<&str>) {
        *self.faults.fail_on_code.lock() = code.map(str::to_string);
    }

    /// Make every result stream fail after yielding `rows` rows.
    pub fn fail_after_rows(&self, rows: Option<usize>) {
        *self.faults.fail_after_rows.lock() = rows;
    }

    /// Vocabularies held by the store, ordered by id.
    pub fn vocabularies(&self) -> Vec<Vocabulary> {
        self.graph
            .read()
            .vocabularies()
            .into_iter()
            .map(|(id, label)| Vocabulary {
                id: id.to_string(),
                label: label.to_string(),
            })
            .collect()
    }

    /// Connections opened so far.
    pub fn connections_opened(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    /// Statements executed so far, across all connections.
    pub fn statements_executed(&self) -> usize {
        self.counters.statements.load(Ordering::SeqCst)
    }

    /// Rows pulled by consumers so far.
    pub fn rows_fetched(&self) -> usize {
        self.counters.rows.load(Ordering::SeqCst)
    }

    fn evaluate(&self, statement: &Statement) -> Result<Vec<Row>> {
        let kind = statement.kind;
        let vocab = param(statement, "vocab")?;
        let graph = self.graph.read();

        let rows = match kind {
            QueryKind::Get => graph
                .resolve(vocab, param(statement, "code")?)
                .and_then(|id| concept_row(&graph, vocab, id))
                .into_iter()
                .collect(),
            QueryKind::Exists => graph
                .resolve(vocab, param(statement, "code")?)
                .map(|_| Row::new(vec![Value::Int(1)]))
                .into_iter()
                .collect(),
            QueryKind::Match => {
                let pattern = param(statement, "pattern")?;
                let re = Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|e| VocabError::query(kind, format!("invalid pattern: {e}")))?;
                graph
                    .members(vocab)
                    .filter(|&id| {
                        graph.concept(id).is_some_and(|c| {
                            re.is_match(&c.label.to_lowercase())
                                || c.synonyms.iter().any(|s| re.is_match(&s.to_lowercase()))
                        })
                    })
                    .filter_map(|id| concept_row(&graph, vocab, id))
                    .collect()
            }
            QueryKind::Parents
            | QueryKind::Children
            | QueryKind::Ancestors
            | QueryKind::Descendants
            | QueryKind::Flatten => {
                let Some((direction, hops)) = kind.hierarchy() else {
                    return Err(VocabError::query(kind, "not a hierarchy statement"));
                };
                match graph.resolve(vocab, param(statement, "code")?) {
                    Some(start) => closure(&graph, start, direction, hops)
                        .node_ids()
                        .filter_map(|id| concept_row(&graph, vocab, id))
                        .collect(),
                    None => Vec::new(),
                }
            }
        };

        Ok(rows)
    }
}

impl MemoryStore {
    /// A small ICD-10-CM extract (plus an ICD-9-CM neighbour) around
    /// Down syndrome (`Q90`) and fall injuries (`W17.81XD`).
    ///
    /// `Q90` has two ancestors and four children, all leaves.
    pub fn icd10cm_fixture() -> Self {
        let mut graph = HierarchyGraph::new();
        graph.add_vocabulary("icd10cm", "International Classification of Diseases, 10th Revision, Clinical Modification");
        graph.add_vocabulary("icd9cm", "International Classification of Diseases, 9th Revision, Clinical Modification");

        let icd10 = |code: &str, label: &str, synonyms: &[&str], parents: &[&str]| {
            (
                ConceptRecord::new(format!("icd10cm:{code}"), "icd10cm", code, label)
                    .with_synonyms(synonyms.iter().copied()),
                parents.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            )
        };

        graph.load_records(vec![
            icd10("Q00-Q99", "Congenital malformations, deformations and chromosomal abnormalities", &[], &[]),
            icd10("Q90-Q99", "Chromosomal abnormalities, not elsewhere classified", &[], &["Q00-Q99"]),
            icd10("Q90", "Down syndrome", &["Down's syndrome"], &["Q90-Q99"]),
            icd10("Q90.0", "Trisomy 21, nonmosaicism (meiotic nondisjunction)", &[], &["Q90"]),
            icd10("Q90.1", "Trisomy 21, mosaicism (mitotic nondisjunction)", &[], &["Q90"]),
            icd10("Q90.2", "Trisomy 21, translocation", &[], &["Q90"]),
            icd10("Q90.9", "Down syndrome, unspecified", &["Trisomy 21, unspecified"], &["Q90"]),
            icd10("Q91", "Trisomy 18 and Trisomy 13", &[], &["Q90-Q99"]),
            icd10("V00-Y99", "External causes of morbidity", &[], &[]),
            icd10("W00-W19", "Slipping, tripping, stumbling and falls", &[], &["V00-Y99"]),
            icd10("W17", "Other fall from one level to another", &[], &["W00-W19"]),
            icd10("W17.8", "Other fall from one level to another", &[], &["W17"]),
            icd10("W17.81", "Fall down embankment (hill)", &[], &["W17.8"]),
            icd10("W17.81XD", "Fall down embankment (hill), subsequent encounter", &[], &["W17.81"]),
        ]);

        graph.load_records(vec![
            (
                ConceptRecord::new("icd9cm:758", "icd9cm", "758", "Chromosomal anomalies"),
                vec![],
            ),
            (
                ConceptRecord::new("icd9cm:758.0", "icd9cm", "758.0", "Down's syndrome")
                    .with_synonyms(["Trisomy 21"]),
                vec!["758".to_string()],
            ),
        ]);

        Self::new(graph)
    }
}

fn param<'a>(statement: &'a Statement, name: &'static str) -> Result<&'a str> {
    statement
        .param(name)
        .ok_or_else(|| VocabError::query(statement.kind, format!("missing parameter ${name}")))
}

/// Build the five-column row. The vocab column is the requested vocabulary,
/// as the templates return `v.id`.
fn concept_row(graph: &HierarchyGraph, vocab: &str, id: NodeId) -> Option<Row> {
    let c = graph.concept(id)?;
    let synonyms = if c.synonyms.is_empty() {
        Value::Null
    } else {
        Value::from(c.synonyms.clone())
    };
    Some(Row::new(vec![
        Value::from(c.id.as_str()),
        Value::from(vocab),
        Value::from(c.label.as_str()),
        Value::from(c.code.as_str()),
        synonyms,
    ]))
}

#[async_trait]
impl Connector for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        if self.faults.fail_connect.load(Ordering::SeqCst) {
            return Err(VocabError::connectivity("memory store: connection refused"));
        }
        self.counters.connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }
}

pub struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl Connection for MemoryConnection {
    type Rows = MemoryRows;

    async fn execute(&mut self, statement: &Statement) -> Result<MemoryRows> {
        let store = &self.store;
        store.counters.statements.fetch_add(1, Ordering::SeqCst);

        let failing = store.faults.fail_on_code.lock().clone();
        if let (Some(bad), Some(code)) = (failing, statement.param("code")) {
            if bad == code {
                return Err(VocabError::query(
                    statement.kind,
                    format!("injected failure for code '{code}'"),
                ));
            }
        }

        let rows = store.evaluate(statement)?;
        trace!(kind = %statement.kind, rows = rows.len(), "memory statement evaluated");
        Ok(MemoryRows {
            kind: statement.kind,
            rows: rows.into(),
            yielded: 0,
            fail_after: *store.faults.fail_after_rows.lock(),
            counters: Arc::clone(&store.counters),
        })
    }
}

pub struct MemoryRows {
    kind: QueryKind,
    rows: VecDeque<Row>,
    yielded: usize,
    fail_after: Option<usize>,
    counters: Arc<Counters>,
}

#[async_trait]
impl RowStream for MemoryRows {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.fail_after == Some(self.yielded) {
            return Err(VocabError::query(self.kind, "injected failure during iteration"));
        }
        // Yield so a concurrent consumer interleaves with row production.
        tokio::task::yield_now().await;
        let row = self.rows.pop_front();
        if row.is_some() {
            self.yielded += 1;
            self.counters.rows.fetch_add(1, Ordering::SeqCst);
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(store: &MemoryStore, statement: Statement) -> Result<Vec<Row>> {
        let mut conn = store.connect().await?;
        let mut rows = conn.execute(&statement).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next_row().await? {
            out.push(row);
        }
        Ok(out)
    }

    fn codes(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|r| match &r.0[3] {
                Value::String(s) => s.clone(),
                other => panic!("code column was {other}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fixture_hierarchy_counts() {
        let store = MemoryStore::icd10cm_fixture();
        let count = |kind| {
            let store = store.clone();
            async move { run(&store, Statement::traversal(kind, "icd10cm", "Q90")).await.unwrap().len() }
        };
        assert_eq!(count(QueryKind::Parents).await, 1);
        assert_eq!(count(QueryKind::Children).await, 4);
        assert_eq!(count(QueryKind::Ancestors).await, 2);
        assert_eq!(count(QueryKind::Descendants).await, 4);
        assert_eq!(count(QueryKind::Flatten).await, 5);
    }

    #[tokio::test]
    async fn test_get_row_shape_and_null_synonyms() {
        let store = MemoryStore::icd10cm_fixture();
        let rows = run(&store, Statement::get("icd10cm", "Q90.2")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 5);
        assert_eq!(rows[0].0[4], Value::Null);
    }

    #[tokio::test]
    async fn test_lookup_is_vocabulary_scoped() {
        let store = MemoryStore::icd10cm_fixture();
        assert!(run(&store, Statement::get("icd9cm", "Q90")).await.unwrap().is_empty());
        assert!(run(&store, Statement::exists("icd10cm", "758.0")).await.unwrap().is_empty());
        assert_eq!(run(&store, Statement::exists("icd9cm", "758.0")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_match_is_anchored_and_checks_synonyms() {
        let store = MemoryStore::icd10cm_fixture();
        let rows = run(&store, Statement::matching("icd10cm", ".*Trisomy 21.*")).await.unwrap();
        assert_eq!(codes(&rows), vec!["Q90.0", "Q90.1", "Q90.2", "Q90.9"]);

        // Unanchored fragment does not match a longer label.
        let rows = run(&store, Statement::matching("icd10cm", "down syndrome")).await.unwrap();
        assert_eq!(codes(&rows), vec!["Q90"]);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_query_error() {
        let store = MemoryStore::icd10cm_fixture();
        let err = run(&store, Statement::matching("icd10cm", "(unclosed")).await.unwrap_err();
        assert!(matches!(err, VocabError::QueryExecution { kind: QueryKind::Match, .. }));
    }

    #[tokio::test]
    async fn test_unknown_start_is_empty() {
        let store = MemoryStore::icd10cm_fixture();
        let rows = run(&store, Statement::traversal(QueryKind::Descendants, "icd10cm", "XXX"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::icd10cm_fixture();

        store.fail_connect(true);
        assert!(matches!(store.connect().await, Err(VocabError::Connectivity { .. })));
        store.fail_connect(false);

        store.fail_on_code(Some("Q90"));
        assert!(run(&store, Statement::get("icd10cm", "Q90")).await.is_err());
        assert!(run(&store, Statement::get("icd10cm", "Q91")).await.is_ok());
        store.fail_on_code(None);

        store.fail_after_rows(Some(2));
        let err = run(&store, Statement::traversal(QueryKind::Children, "icd10cm", "Q90"))
            .await
            .unwrap_err();
        assert!(matches!(err, VocabError::QueryExecution { kind: QueryKind::Children, .. }));
    }

    #[test]
    fn test_fixture_vocabularies() {
        let store = MemoryStore::icd10cm_fixture();
        let ids: Vec<String> = store.vocabularies().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["icd10cm", "icd9cm"]);
        assert!(store.vocabularies()[0].label.contains("10th Revision"));
    }

    #[tokio::test]
    async fn test_counters() {
        let store = MemoryStore::icd10cm_fixture();
        run(&store, Statement::traversal(QueryKind::Flatten, "icd10cm", "Q90")).await.unwrap();
        assert_eq!(store.connections_opened(), 1);
        assert_eq!(store.statements_executed(), 1);
        assert_eq!(store.rows_fetched(), 5);
    }
}
