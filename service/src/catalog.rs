//! Query catalog: one parameterized Cypher template per operation.
//!
//! User input is only ever bound as a parameter (`$vocab`, `$code`,
//! `$pattern`), never spliced into query text.
//!
//! Every concept-returning template yields the same five columns:
//! `id, vocab, label, code, synonyms`.

use std::fmt;

use vocab_graph_core::{HierarchyDirection, HopRange};

const GET: &str = "\
MATCH (v:Vocabulary {id: $vocab})<-[:classOf]-(c:Class {code: $code})
RETURN c.id AS id, v.id AS vocab, c.label AS label, c.code AS code, c.synonyms AS synonyms
LIMIT 1";

const EXISTS: &str = "\
MATCH (:Vocabulary {id: $vocab})<-[:classOf]-(c:Class {code: $code})
RETURN 1
LIMIT 1";

const MATCH: &str = "\
MATCH (v:Vocabulary {id: $vocab})<-[:classOf]-(c:Class)
WHERE lower(c.label) =~ $pattern
   OR any(syn IN c.synonyms WHERE lower(syn) =~ $pattern)
RETURN c.id AS id, v.id AS vocab, c.label AS label, c.code AS code, c.synonyms AS synonyms";

const PARENTS: &str = "\
MATCH (v:Vocabulary {id: $vocab})<-[:classOf]-(:Class {code: $code})-[:subClassOf]->(c:Class)
RETURN DISTINCT c.id AS id, v.id AS vocab, c.label AS label, c.code AS code, c.synonyms AS synonyms";

const CHILDREN: &str = "\
MATCH (v:Vocabulary {id: $vocab})<-[:classOf]-(:Class {code: $code})<-[:subClassOf]-(c:Class)
RETURN DISTINCT c.id AS id, v.id AS vocab, c.label AS label, c.code AS code, c.synonyms AS synonyms";

const ANCESTORS: &str = "\
MATCH (v:Vocabulary {id: $vocab})<-[:classOf]-(:Class {code: $code})-[:subClassOf*1..]->(c:Class)
RETURN DISTINCT c.id AS id, v.id AS vocab, c.label AS label, c.code AS code, c.synonyms AS synonyms";

const DESCENDANTS: &str = "\
MATCH (v:Vocabulary {id: $vocab})<-[:classOf]-(:Class {code: $code})<-[:subClassOf*1..]-(c:Class)
RETURN DISTINCT c.id AS id, v.id AS vocab, c.label AS label, c.code AS code, c.synonyms AS synonyms";

const FLATTEN: &str = "\
MATCH (v:Vocabulary {id: $vocab})<-[:classOf]-(:Class {code: $code})<-[:subClassOf*0..]-(c:Class)
RETURN DISTINCT c.id AS id, v.id AS vocab, c.label AS label, c.code AS code, c.synonyms AS synonyms";

/// Column names of the concept row, in `RETURN` order.
pub const CONCEPT_COLUMNS: [&str; 5] = ["id", "vocab", "label", "code", "synonyms"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Get,
    Exists,
    Match,
    Parents,
    Children,
    Ancestors,
    Descendants,
    Flatten,
}

impl QueryKind {
    pub fn name(self) -> &'static str {
        match self {
            QueryKind::Get => "get",
            QueryKind::Exists => "exists",
            QueryKind::Match => "match",
            QueryKind::Parents => "parents",
            QueryKind::Children => "children",
            QueryKind::Ancestors => "ancestors",
            QueryKind::Descendants => "descendants",
            QueryKind::Flatten => "flatten",
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            QueryKind::Get => GET,
            QueryKind::Exists => EXISTS,
            QueryKind::Match => MATCH,
            QueryKind::Parents => PARENTS,
            QueryKind::Children => CHILDREN,
            QueryKind::Ancestors => ANCESTORS,
            QueryKind::Descendants => DESCENDANTS,
            QueryKind::Flatten => FLATTEN,
        }
    }

    /// Direction and hop bound of the hierarchy kinds; `None` for lookups.
    pub fn hierarchy(self) -> Option<(HierarchyDirection, HopRange)> {
        match self {
            QueryKind::Parents => Some((HierarchyDirection::Parents, HopRange::exactly_one())),
            QueryKind::Children => Some((HierarchyDirection::Children, HopRange::exactly_one())),
            QueryKind::Ancestors => Some((HierarchyDirection::Parents, HopRange::strict())),
            QueryKind::Descendants => Some((HierarchyDirection::Children, HopRange::strict())),
            QueryKind::Flatten => Some((HierarchyDirection::Children, HopRange::reflexive())),
            QueryKind::Get | QueryKind::Exists | QueryKind::Match => None,
        }
    }

    /// Whether rows carry the five concept columns.
    pub fn returns_concepts(self) -> bool {
        !matches!(self, QueryKind::Exists)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A template together with its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: QueryKind,
    pub text: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl Statement {
    fn new(kind: QueryKind, params: Vec<(&'static str, String)>) -> Self {
        Self {
            kind,
            text: kind.template(),
            params,
        }
    }

    pub fn get(vocab: &str, code: &str) -> Self {
        Self::new(
            QueryKind::Get,
            vec![("vocab", vocab.to_string()), ("code", code.to_string())],
        )
    }

    pub fn exists(vocab: &str, code: &str) -> Self {
        Self::new(
            QueryKind::Exists,
            vec![("vocab", vocab.to_string()), ("code", code.to_string())],
        )
    }

    /// The pattern is lower-cased before binding so matching is
    /// case-insensitive whatever the store's collation.
    pub fn matching(vocab: &str, pattern: &str) -> Self {
        Self::new(
            QueryKind::Match,
            vec![("vocab", vocab.to_string()), ("pattern", pattern.to_lowercase())],
        )
    }

    /// Hierarchy traversal rooted at `(vocab, code)`.
    ///
    /// # Panics
    /// If `kind` is not one of the hierarchy kinds.
    pub(crate) fn traversal(kind: QueryKind, vocab: &str, code: &str) -> Self {
        assert!(
            kind.hierarchy().is_some(),
            "{kind} is not a hierarchy traversal"
        );
        Self::new(
            kind,
            vec![("vocab", vocab.to_string()), ("code", code.to_string())],
        )
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}
