//! JSON request decoding and dispatch.
//!
//! A request is `{"method": "<name>", "params": {...}}`. Decoding produces
//! a typed `Request`, so an unknown method or a mis-shaped parameter object
//! is rejected before the service is touched. Streaming methods are drained
//! to completion and answered as a JSON array.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{Result, VocabError};
use crate::service::{Traversal, VocabService};
use crate::store::Connector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "lowercase")]
pub enum Request {
    Get { vocab: String, code: String },
    Validate { vocab: String, codes: Vec<String> },
    Match { vocab: String, pattern: String },
    Parents { vocab: String, code: String },
    Children { vocab: String, code: String },
    Ancestors { vocab: String, code: String },
    Descendants { vocab: String, code: String },
    Flatten { vocab: String, codes: Vec<String> },
}

impl Request {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| VocabError::InvalidArgument {
            field: "request",
            message: e.to_string(),
        })
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::Validate { .. } => "validate",
            Request::Match { .. } => "match",
            Request::Parents { .. } => "parents",
            Request::Children { .. } => "children",
            Request::Ancestors { .. } => "ancestors",
            Request::Descendants { .. } => "descendants",
            Request::Flatten { .. } => "flatten",
        }
    }

    /// The streaming form of this request, if it is one.
    pub fn into_traversal(self) -> std::result::Result<Traversal, Self> {
        Ok(match self {
            Request::Match { vocab, pattern } => Traversal::Match { vocab, pattern },
            Request::Parents { vocab, code } => Traversal::Parents { vocab, code },
            Request::Children { vocab, code } => Traversal::Children { vocab, code },
            Request::Ancestors { vocab, code } => Traversal::Ancestors { vocab, code },
            Request::Descendants { vocab, code } => Traversal::Descendants { vocab, code },
            Request::Flatten { vocab, codes } => Traversal::Flatten { vocab, codes },
            other @ (Request::Get { .. } | Request::Validate { .. }) => return Err(other),
        })
    }
}

/// Execute one request and encode its answer.
///
/// `get` answers a concept or `null`, `validate` a boolean array, and every
/// streaming method the array of concepts received before the stream ended.
/// A cancelled stream answers what was received so far.
pub async fn dispatch<C: Connector>(
    service: &VocabService<C>,
    request: Request,
    cancel: &CancelToken,
) -> Result<serde_json::Value> {
    let method = request.method();
    debug!(method, "dispatch");

    let traversal = match request.into_traversal() {
        Ok(traversal) => traversal,
        Err(Request::Get { vocab, code }) => {
            return Ok(serde_json::to_value(service.get(&vocab, &code).await?)?);
        }
        Err(Request::Validate { vocab, codes }) => {
            return Ok(serde_json::to_value(service.validate(&vocab, codes.as_slice()).await?)?);
        }
        Err(other) => {
            return Err(VocabError::InvalidArgument {
                field: "method",
                message: format!("{} is not dispatchable", other.method()),
            })
        }
    };

    let (tx, mut rx) = mpsc::channel(1);
    let producer = async move {
        // The sender drops when the traversal returns, ending the receive loop.
        service.traverse(&traversal, cancel, &tx).await
    };
    let consumer = async {
        let mut concepts = Vec::new();
        while let Some(concept) = rx.recv().await {
            concepts.push(concept);
        }
        concepts
    };
    let (outcome, concepts) = tokio::join!(producer, consumer);
    outcome?;

    Ok(serde_json::to_value(concepts)?)
}

/// The body written back for a failed request.
pub fn error_body(err: &VocabError) -> serde_json::Value {
    serde_json::json!({ "error": err.to_string() })
}
