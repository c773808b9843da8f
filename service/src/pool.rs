//! Bounded connection pool.
//!
//! At most `max_connections` connections are leased at once; `acquire`
//! waits when the pool is saturated. A lease is a `PooledConnection` guard
//! and is released when the guard drops, so every exit path (success,
//! error, cancellation, panic) releases exactly once. Connection failures
//! are reported to the caller and never retried here.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, trace};

use crate::config::DEFAULT_MAX_CONNECTIONS;
use crate::error::{Result, VocabError};
use crate::store::Connector;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub max_connections: usize,
    /// Successful leases handed out.
    pub acquired: usize,
    /// Leases returned (guard dropped).
    pub released: usize,
    /// Connections established through the connector.
    pub opened: usize,
    /// Connections closed instead of being returned to the idle list.
    pub discarded: usize,
    pub in_use: usize,
    pub idle: usize,
}

struct PoolInner<C: Connector> {
    connector: C,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<C::Connection>>,
    max_connections: usize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    opened: AtomicUsize,
    discarded: AtomicUsize,
}

/// Shared handle to a bounded set of store connections. Cheap to clone.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create a pool. Connections are opened lazily on first use.
    /// A `max_connections` of zero selects the default (20).
    pub fn new(connector: C, max_connections: usize) -> Self {
        let max_connections = if max_connections == 0 {
            DEFAULT_MAX_CONNECTIONS
        } else {
            max_connections
        };
        Self {
            inner: Arc::new(PoolInner {
                connector,
                permits: Arc::new(Semaphore::new(max_connections)),
                idle: Mutex::new(Vec::with_capacity(max_connections)),
                max_connections,
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    pub fn max_connections(&self) -> usize {
        self.inner.max_connections
    }

    /// Lease a connection, waiting while all connections are in use.
    pub async fn acquire(&self) -> Result<PooledConnection<C>> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| closed())?;
        self.lease(permit).await
    }

    /// Lease a connection only if one is available right now.
    pub async fn try_acquire(&self) -> Result<Option<PooledConnection<C>>> {
        match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => self.lease(permit).await.map(Some),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(closed()),
        }
    }

    async fn lease(&self, permit: OwnedSemaphorePermit) -> Result<PooledConnection<C>> {
        let reused = self.inner.idle.lock().pop();
        let conn = match reused {
            Some(conn) => {
                trace!("reusing idle connection");
                conn
            }
            None => {
                // On failure the permit drops here and the slot is free again.
                let conn = self.inner.connector.connect().await?;
                let opened = self.inner.opened.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(opened, max = self.inner.max_connections, "opened store connection");
                conn
            }
        };
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            discard: false,
            _permit: permit,
        })
    }

    /// Refuse new leases and drop idle connections. Outstanding leases
    /// stay valid and their connections are closed on release.
    pub fn close(&self) {
        self.inner.permits.close();
        self.inner.idle.lock().clear();
        debug!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        let acquired = self.inner.acquired.load(Ordering::Relaxed);
        let released = self.inner.released.load(Ordering::Relaxed);
        PoolStats {
            max_connections: self.inner.max_connections,
            acquired,
            released,
            opened: self.inner.opened.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
            in_use: acquired.saturating_sub(released),
            idle: self.inner.idle.lock().len(),
        }
    }
}

fn closed() -> VocabError {
    VocabError::connectivity("connection pool is closed")
}

/// A leased connection. Derefs to the backend connection; returns it to
/// the pool on drop.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    pool: Arc<PoolInner<C>>,
    discard: bool,
    // Dropped after `Drop::drop` has put the connection back.
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> PooledConnection<C> {
    /// Close the connection on release instead of reusing it. Used after
    /// failures and abandoned result streams, whose connection state is
    /// unknown.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is present until release")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection is present until release")
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.discard || self.pool.permits.is_closed() {
                self.pool.discarded.fetch_add(1, Ordering::Relaxed);
                drop(conn);
            } else {
                self.pool.idle.lock().push(conn);
            }
        }
        self.pool.released.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::Statement;
    use crate::store::{Connection, Row, RowStream};

    #[derive(Default)]
    struct CountingConnector {
        fail: AtomicBool,
        opened: AtomicUsize,
    }

    struct NullConnection(usize);

    struct NoRows;

    #[async_trait]
    impl RowStream for NoRows {
        async fn next_row(&mut self) -> Result<Option<Row>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl Connection for NullConnection {
        type Rows = NoRows;

        async fn execute(&mut self, _statement: &Statement) -> Result<NoRows> {
            Ok(NoRows)
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Connection = NullConnection;

        async fn connect(&self) -> Result<NullConnection> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(VocabError::connectivity("store unreachable"));
            }
            Ok(NullConnection(self.opened.fetch_add(1, Ordering::SeqCst)))
        }
    }

    #[tokio::test]
    async fn test_acquire_release_reuses_connection() {
        let pool = ConnectionPool::new(CountingConnector::default(), 2);
        {
            let conn = pool.acquire().await.unwrap();
            assert_eq!(conn.0, 0);
            assert_eq!(pool.stats().in_use, 1);
        }
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.0, 0, "idle connection should be reused");
        drop(conn);

        let stats = pool.stats();
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.released, 2);
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn test_zero_max_uses_default() {
        let pool = ConnectionPool::new(CountingConnector::default(), 0);
        assert_eq!(pool.max_connections(), 20);
    }

    #[tokio::test]
    async fn test_saturated_pool_blocks_until_release() {
        let pool = ConnectionPool::new(CountingConnector::default(), 1);
        let held = pool.acquire().await.unwrap();

        assert!(pool.try_acquire().await.unwrap().is_none());

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| c.0) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "acquire must wait while saturated");

        drop(held);
        let id = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must be woken by release")
            .unwrap()
            .unwrap();
        assert_eq!(id, 0);
        assert_eq!(pool.stats().opened, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_frees_slot() {
        let pool = ConnectionPool::new(CountingConnector::default(), 1);
        pool.connector().fail.store(true, Ordering::SeqCst);
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, VocabError::Connectivity { .. }));

        pool.connector().fail.store(false, Ordering::SeqCst);
        assert!(pool.try_acquire().await.unwrap().is_some());
        let stats = pool.stats();
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
    }

    #[tokio::test]
    async fn test_discarded_connection_not_reused() {
        let pool = ConnectionPool::new(CountingConnector::default(), 1);
        let mut conn = pool.acquire().await.unwrap();
        conn.discard();
        drop(conn);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.0, 1, "a fresh connection replaces the discarded one");
        assert_eq!(pool.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_close_rejects_new_leases() {
        let pool = ConnectionPool::new(CountingConnector::default(), 2);
        let held = pool.acquire().await.unwrap();
        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire().await, Err(VocabError::Connectivity { .. })));
        assert!(matches!(pool.try_acquire().await, Err(VocabError::Connectivity { .. })));

        drop(held);
        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.idle, 0);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_max() {
        let pool = ConnectionPool::new(CountingConnector::default(), 3);
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _conn = pool.acquire().await.unwrap();
                    peak.fetch_max(pool.stats().in_use, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        let stats = pool.stats();
        assert_eq!(stats.acquired, 16);
        assert_eq!(stats.released, 16);
        assert!(stats.opened <= 3);
    }
}
