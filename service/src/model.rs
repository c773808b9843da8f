use serde::{Deserialize, Serialize};

/// A single term within one vocabulary, identified for traversal purposes
/// by the pair `(vocab, code)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    /// Globally unique node identifier.
    pub id: String,
    /// Owning vocabulary id.
    pub vocab: String,
    /// Vocabulary-local code.
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// A named collection of concepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub id: String,
    pub label: String,
}
