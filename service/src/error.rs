//! Error types for vocabulary graph operations.
//!
//! Absence is not an error: a point lookup with no match returns `None` and a
//! traversal with no match yields an empty stream. Everything here is
//! returned to the immediate caller unchanged; nothing is retried or
//! swallowed inside the service.

use thiserror::Error;

use crate::catalog::QueryKind;

pub type Result<T> = std::result::Result<T, VocabError>;

#[derive(Debug, Error)]
pub enum VocabError {
    /// Empty or missing vocabulary, code, pattern or code list.
    /// Raised before any connection is acquired.
    #[error("invalid argument '{field}': {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// Connection establishment failed, or the pool was closed.
    #[error("graph store connectivity: {message}")]
    Connectivity { message: String },

    /// Statement execution or row iteration failed.
    #[error("{kind} query failed: {message}")]
    QueryExecution { kind: QueryKind, message: String },

    /// A row did not have the shape the query contract promises.
    #[error("row contract violated at column '{column}': expected {expected}, found {found}")]
    RowShape {
        column: &'static str,
        expected: &'static str,
        found: String,
    },

    /// A configuration value is out of range or malformed.
    #[error("invalid setting '{setting}': {message}")]
    Config {
        setting: &'static str,
        message: String,
    },

    /// A response could not be encoded as JSON.
    #[error("response encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl VocabError {
    pub fn empty(field: &'static str) -> Self {
        Self::InvalidArgument {
            field,
            message: format!("{field} cannot be empty"),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn query(kind: QueryKind, message: impl Into<String>) -> Self {
        Self::QueryExecution {
            kind,
            message: message.into(),
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}
