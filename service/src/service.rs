//! The vocabulary graph service facade.
//!
//! Every operation validates its arguments before touching the pool, leases
//! one connection for the duration of the call, executes the matching
//! catalog statement and maps rows to `Concept`s. Streaming operations push
//! each concept onto a caller-supplied channel, racing every row fetch and
//! every hand-off against the caller's `CancelToken`. Cancellation (or the
//! receiver going away) is a clean early stop, not an error.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::catalog::{QueryKind, Statement};
use crate::error::{Result, VocabError};
use crate::mapper::concept_from_row;
use crate::model::Concept;
use crate::pool::{ConnectionPool, PoolStats, PooledConnection};
use crate::store::{Connection, Connector, RowStream};

/// How a streaming statement ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Completed(usize),
    Stopped(usize),
}

/// One streaming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Traversal {
    Match { vocab: String, pattern: String },
    Parents { vocab: String, code: String },
    Children { vocab: String, code: String },
    Ancestors { vocab: String, code: String },
    Descendants { vocab: String, code: String },
    Flatten { vocab: String, codes: Vec<String> },
}

impl Traversal {
    /// Reject empty arguments, exactly as the corresponding method would.
    pub fn validate(&self) -> Result<()> {
        match self {
            Traversal::Match { vocab, pattern } => {
                require("vocab", vocab)?;
                require("pattern", pattern)
            }
            Traversal::Parents { vocab, code }
            | Traversal::Children { vocab, code }
            | Traversal::Ancestors { vocab, code }
            | Traversal::Descendants { vocab, code } => {
                require("vocab", vocab)?;
                require("code", code)
            }
            Traversal::Flatten { vocab, codes } => {
                require("vocab", vocab)?;
                require_codes(codes.as_slice())
            }
        }
    }
}

/// Producer-side handle of a spawned traversal.
///
/// Concepts arrive in store order through a single-slot channel. The
/// producer's outcome is only available from `finish()` once the stream
/// has been drained.
pub struct ConceptStream {
    rx: mpsc::Receiver<Concept>,
    task: JoinHandle<Result<()>>,
}

impl ConceptStream {
    /// Next concept, or `None` once the producer has terminated.
    pub async fn next(&mut self) -> Option<Concept> {
        self.rx.recv().await
    }

    /// Stop receiving and return the producer's outcome. Items not yet
    /// received are dropped; the producer treats this like cancellation.
    pub async fn finish(mut self) -> Result<()> {
        self.rx.close();
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Ok(()),
        }
    }

    /// Drain to closure, then report the producer's outcome.
    pub async fn collect(mut self) -> Result<Vec<Concept>> {
        let mut concepts = Vec::new();
        while let Some(concept) = self.next().await {
            concepts.push(concept);
        }
        self.finish().await?;
        Ok(concepts)
    }
}

/// Hierarchy traversal facade over a pooled graph store.
pub struct VocabService<C: Connector> {
    pool: ConnectionPool<C>,
}

impl<C: Connector> Clone for VocabService<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<C: Connector> VocabService<C> {
    pub fn new(pool: ConnectionPool<C>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Get a concept by code. `Ok(None)` when the vocabulary has no such code.
    pub async fn get(&self, vocab: &str, code: &str) -> Result<Option<Concept>> {
        require("vocab", vocab)?;
        require("code", code)?;

        let mut conn = self.pool.acquire().await?;
        let result = async {
            let mut rows = conn.execute(&Statement::get(vocab, code)).await?;
            let first = rows.next_row().await?;
            drain(&mut rows).await?;
            first.map(concept_from_row).transpose()
        }
        .await;
        settle(&mut conn, &result);

        debug!(vocab, code, found = matches!(result, Ok(Some(_))), "get");
        result
    }

    /// Check which codes exist in a vocabulary.
    ///
    /// One existence probe per code, sequentially on one connection, in
    /// input order. The first failing probe aborts the batch; no partial
    /// result is returned.
    pub async fn validate<S: AsRef<str>>(&self, vocab: &str, codes: &[S]) -> Result<Vec<bool>> {
        require("vocab", vocab)?;
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        require_codes(codes)?;

        let mut conn = self.pool.acquire().await?;
        let result = async {
            let mut found = Vec::with_capacity(codes.len());
            for code in codes {
                let mut rows = conn.execute(&Statement::exists(vocab, code.as_ref())).await?;
                found.push(rows.next_row().await?.is_some());
                drain(&mut rows).await?;
            }
            Ok::<_, VocabError>(found)
        }
        .await;
        settle(&mut conn, &result);

        debug!(vocab, codes = codes.len(), ok = result.is_ok(), "validate");
        result
    }

    /// Stream concepts whose lower-cased label or any lower-cased synonym
    /// fully matches `pattern` (a regular expression, matched
    /// case-insensitively).
    pub async fn match_concepts(
        &self,
        cancel: &CancelToken,
        vocab: &str,
        pattern: &str,
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        require("vocab", vocab)?;
        require("pattern", pattern)?;
        self.run(Statement::matching(vocab, pattern), cancel, out)
            .await
            .map(drop)
    }

    /// Stream the direct parents of a concept.
    pub async fn parents(
        &self,
        cancel: &CancelToken,
        vocab: &str,
        code: &str,
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        self.hierarchy(QueryKind::Parents, cancel, vocab, code, out).await
    }

    /// Stream the direct children of a concept.
    pub async fn children(
        &self,
        cancel: &CancelToken,
        vocab: &str,
        code: &str,
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        self.hierarchy(QueryKind::Children, cancel, vocab, code, out).await
    }

    /// Stream every ancestor (one or more hops up).
    pub async fn ancestors(
        &self,
        cancel: &CancelToken,
        vocab: &str,
        code: &str,
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        self.hierarchy(QueryKind::Ancestors, cancel, vocab, code, out).await
    }

    /// Stream every descendant (one or more hops down).
    pub async fn descendants(
        &self,
        cancel: &CancelToken,
        vocab: &str,
        code: &str,
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        self.hierarchy(QueryKind::Descendants, cancel, vocab, code, out).await
    }

    /// Stream each code followed by all its descendants, code by code in
    /// input order. Results are not deduplicated across codes. A failure
    /// stops the remaining codes; concepts already sent stay sent.
    pub async fn flatten<S: AsRef<str>>(
        &self,
        cancel: &CancelToken,
        vocab: &str,
        codes: &[S],
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        require("vocab", vocab)?;
        require_codes(codes)?;

        for code in codes {
            if cancel.is_cancelled() || out.is_closed() {
                break;
            }
            let statement = Statement::traversal(QueryKind::Flatten, vocab, code.as_ref());
            if let Flow::Stopped(_) = self.run(statement, cancel, out).await? {
                break;
            }
        }
        Ok(())
    }

    /// Run any streaming request.
    pub async fn traverse(
        &self,
        traversal: &Traversal,
        cancel: &CancelToken,
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        match traversal {
            Traversal::Match { vocab, pattern } => {
                self.match_concepts(cancel, vocab, pattern, out).await
            }
            Traversal::Parents { vocab, code } => self.parents(cancel, vocab, code, out).await,
            Traversal::Children { vocab, code } => self.children(cancel, vocab, code, out).await,
            Traversal::Ancestors { vocab, code } => self.ancestors(cancel, vocab, code, out).await,
            Traversal::Descendants { vocab, code } => {
                self.descendants(cancel, vocab, code, out).await
            }
            Traversal::Flatten { vocab, codes } => {
                self.flatten(cancel, vocab, codes.as_slice(), out).await
            }
        }
    }

    /// Spawn a traversal on the runtime and hand back its consumer side.
    /// Invalid arguments are reported here, before anything is spawned.
    pub fn stream(&self, traversal: Traversal, cancel: CancelToken) -> Result<ConceptStream> {
        traversal.validate()?;

        let (tx, rx) = mpsc::channel(1);
        let service = self.clone();
        let task = tokio::spawn(async move { service.traverse(&traversal, &cancel, &tx).await });
        Ok(ConceptStream { rx, task })
    }

    async fn hierarchy(
        &self,
        kind: QueryKind,
        cancel: &CancelToken,
        vocab: &str,
        code: &str,
        out: &mpsc::Sender<Concept>,
    ) -> Result<()> {
        require("vocab", vocab)?;
        require("code", code)?;
        self.run(Statement::traversal(kind, vocab, code), cancel, out)
            .await
            .map(drop)
    }

    /// Lease, execute, stream. The lease is released on every return path.
    async fn run(
        &self,
        statement: Statement,
        cancel: &CancelToken,
        out: &mpsc::Sender<Concept>,
    ) -> Result<Flow> {
        let kind = statement.kind;

        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Flow::Stopped(0)),
            conn = self.pool.acquire() => conn?,
        };

        let result = pump(&mut conn, &statement, cancel, out).await;
        if !matches!(result, Ok(Flow::Completed(_))) {
            // Unread rows may still be pending on the wire.
            conn.discard();
        }

        match &result {
            Ok(Flow::Completed(rows)) => debug!(%kind, rows, "stream completed"),
            Ok(Flow::Stopped(rows)) => debug!(%kind, rows, "stream stopped early"),
            Err(err) => debug!(%kind, error = %err, "stream failed"),
        }
        result
    }
}

/// Execute the statement and forward mapped rows until exhaustion,
/// cancellation, receiver drop, or error.
async fn pump<C: Connector>(
    conn: &mut PooledConnection<C>,
    statement: &Statement,
    cancel: &CancelToken,
    out: &mpsc::Sender<Concept>,
) -> Result<Flow> {
    let mut rows = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(Flow::Stopped(0)),
        rows = conn.execute(statement) => rows?,
    };

    let mut delivered = 0;
    loop {
        let row = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Flow::Stopped(delivered)),
            row = rows.next_row() => row?,
        };
        let Some(row) = row else {
            return Ok(Flow::Completed(delivered));
        };

        let concept = concept_from_row(row)?;
        trace!(code = %concept.code, "emit");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Flow::Stopped(delivered)),
            sent = out.send(concept) => {
                if sent.is_err() {
                    return Ok(Flow::Stopped(delivered));
                }
            }
        }
        delivered += 1;
    }
}

/// Close the connection on release after a store failure; its state is
/// unknown, so it must not go back to the idle list.
fn settle<C: Connector, T>(conn: &mut PooledConnection<C>, result: &Result<T>) {
    if let Err(VocabError::QueryExecution { .. } | VocabError::Connectivity { .. }) = result {
        conn.discard();
    }
}

/// Consume what is left of a result so the connection can be reused.
async fn drain<R: RowStream>(rows: &mut R) -> Result<()> {
    while rows.next_row().await?.is_some() {}
    Ok(())
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(VocabError::empty(field));
    }
    Ok(())
}

fn require_codes<S: AsRef<str>>(codes: &[S]) -> Result<()> {
    if codes.is_empty() {
        return Err(VocabError::empty("codes"));
    }
    if let Some(pos) = codes.iter().position(|c| c.as_ref().is_empty()) {
        return Err(VocabError::InvalidArgument {
            field: "codes",
            message: format!("code at position {pos} cannot be empty"),
        });
    }
    Ok(())
}
