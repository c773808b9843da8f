//! Row mapper: concept row -> `Concept`.

use crate::catalog::CONCEPT_COLUMNS;
use crate::error::{Result, VocabError};
use crate::model::Concept;
use crate::store::{Row, Value};

/// Convert a five-column concept row into a `Concept`.
///
/// A null `synonyms` column maps to an empty list. Any other mismatch
/// (column count, non-string scalar, non-string synonym) is a contract
/// violation and is reported as `RowShape`, never coerced.
pub fn concept_from_row(row: Row) -> Result<Concept> {
    let values = row.into_values();
    if values.len() != CONCEPT_COLUMNS.len() {
        return Err(VocabError::RowShape {
            column: "*",
            expected: "5 columns",
            found: format!("{} columns", values.len()),
        });
    }

    let mut cols = values.into_iter();
    let mut next = || cols.next().unwrap_or(Value::Null);

    let id = string(CONCEPT_COLUMNS[0], next())?;
    let vocab = string(CONCEPT_COLUMNS[1], next())?;
    let label = string(CONCEPT_COLUMNS[2], next())?;
    let code = string(CONCEPT_COLUMNS[3], next())?;
    let synonyms = synonyms(next())?;

    Ok(Concept {
        id,
        vocab,
        code,
        label,
        synonyms,
    })
}

fn string(column: &'static str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(VocabError::RowShape {
            column,
            expected: "string",
            found: other.type_name().to_string(),
        }),
    }
}

fn synonyms(value: Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::List(items) => items
            .into_iter()
            .map(|item| string("synonyms", item))
            .collect(),
        other => Err(VocabError::RowShape {
            column: "synonyms",
            expected: "list of strings or null",
            found: other.type_name().to_string(),
        }),
    }
}
