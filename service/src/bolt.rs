//! Neo4j backend over the Bolt protocol (`neo4rs`).
//!
//! Each `connect()` opens a driver handle limited to a single Bolt
//! connection, so the facade's `ConnectionPool` is the only concurrency
//! bound and one lease really is one connection.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt, TryStreamExt};
use neo4rs::{ConfigBuilder, Graph};
use tracing::debug;

use crate::catalog::{QueryKind, Statement, CONCEPT_COLUMNS};
use crate::config::ServiceConfig;
use crate::error::{Result, VocabError};
use crate::pool::ConnectionPool;
use crate::service::VocabService;
use crate::store::{Connection, Connector, Row, RowStream, Value};

pub struct BoltConnector {
    config: ServiceConfig,
}

impl BoltConnector {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for BoltConnector {
    type Connection = BoltConnection;

    async fn connect(&self) -> Result<BoltConnection> {
        let config = &self.config;
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .fetch_size(config.fetch_size)
            .max_connections(1);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }

        let driver_config = builder
            .build()
            .map_err(|e| VocabError::connectivity(format!("bolt config for {}: {e}", config.uri)))?;
        let graph = Graph::connect(driver_config)
            .await
            .map_err(|e| VocabError::connectivity(format!("could not connect to {}: {e}", config.uri)))?;

        debug!(uri = %config.uri, "bolt connection established");
        Ok(BoltConnection { graph })
    }
}

pub struct BoltConnection {
    graph: Graph,
}

#[async_trait]
impl Connection for BoltConnection {
    type Rows = BoltRows;

    async fn execute(&mut self, statement: &Statement) -> Result<BoltRows> {
        let query = statement
            .params
            .iter()
            .fold(neo4rs::query(statement.text), |q, (name, value)| {
                q.param(name, value.as_str())
            });

        let detached = self
            .graph
            .execute(query)
            .await
            .map_err(|e| VocabError::query(statement.kind, e.to_string()))?;

        Ok(BoltRows {
            kind: statement.kind,
            stream: Box::pin(TryStreamExt::into_stream(detached.into_stream())),
        })
    }
}

type DriverRows = Pin<Box<dyn Stream<Item = std::result::Result<neo4rs::Row, neo4rs::Error>> + Send>>;

pub struct BoltRows {
    kind: QueryKind,
    stream: DriverRows,
}

#[async_trait]
impl RowStream for BoltRows {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        let next = self
            .stream
            .next()
            .await
            .transpose()
            .map_err(|e| VocabError::query(self.kind, e.to_string()))?;

        let Some(row) = next else {
            return Ok(None);
        };
        if !self.kind.returns_concepts() {
            return Ok(Some(Row::new(vec![Value::Int(1)])));
        }
        concept_columns(&row).map(Some)
    }
}

/// Read the five concept columns by name into a positional row.
fn concept_columns(row: &neo4rs::Row) -> Result<Row> {
    let text = |column: &'static str| -> Result<Value> {
        row.get::<String>(column)
            .map(Value::String)
            .map_err(|e| VocabError::RowShape {
                column,
                expected: "string",
                found: e.to_string(),
            })
    };

    let synonyms = row
        .get::<Option<Vec<String>>>(CONCEPT_COLUMNS[4])
        .map(Value::from)
        .map_err(|e| VocabError::RowShape {
            column: "synonyms",
            expected: "list of strings or null",
            found: e.to_string(),
        })?;

    Ok(Row::new(vec![
        text(CONCEPT_COLUMNS[0])?,
        text(CONCEPT_COLUMNS[1])?,
        text(CONCEPT_COLUMNS[2])?,
        text(CONCEPT_COLUMNS[3])?,
        synonyms,
    ]))
}

impl VocabService<BoltConnector> {
    /// Build a service against a Neo4j server and verify it is reachable by
    /// leasing (and releasing) one connection.
    pub async fn connect(config: ServiceConfig) -> Result<Self> {
        let max_connections = config.max_connections;
        let connector = BoltConnector::new(config)?;
        let service = Self::new(ConnectionPool::new(connector, max_connections));
        drop(service.pool().acquire().await?);
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_driver_handles_are_send() {
        assert_send::<BoltConnection>();
        assert_send::<BoltRows>();
    }

    #[test]
    fn test_connector_rejects_invalid_config() {
        let config = ServiceConfig {
            fetch_size: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            BoltConnector::new(config),
            Err(VocabError::Config { setting: "fetch_size", .. })
        ));

        let connector = BoltConnector::new(ServiceConfig::default().with_uri("db.internal:7687")).unwrap();
        assert_eq!(connector.config().uri, "bolt://db.internal:7687");
    }
}
