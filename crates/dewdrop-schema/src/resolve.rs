//! Relationship resolution heuristics.
//!
//! Each resolver refuses to guess: when detection is ambiguous it fails with
//! a [`RelationshipError`] carrying the candidates and a remediation example.

use crate::metadata::{ColumnMetadata, TableMetadata};
use dewdrop_core::{Error, RelationshipError, Result, Row, Value};
use std::sync::Arc;

/// Title-like names, checked before any suffix match.
const TITLE_NAMES: &[&str] = &["name", "title"];
const TITLE_SUFFIXES: &[&str] = &["_name", "_title"];

/// Pick the column used as the display label for a table's rows.
///
/// Text columns are scanned in ordinal order. An exact `name`/`title`
/// wins, then a `*_name`/`*_title` column, then the only text column.
#[allow(clippy::result_large_err)]
pub fn detect_title_column(meta: &TableMetadata) -> Result<String> {
    let text = meta.text_columns();

    let exact = text
        .iter()
        .find(|c| TITLE_NAMES.contains(&c.name.to_ascii_lowercase().as_str()));
    let suffixed = || {
        text.iter().find(|c| {
            let lower = c.name.to_ascii_lowercase();
            TITLE_SUFFIXES.iter().any(|s| lower.ends_with(s))
        })
    };
    let only = || match text.as_slice() {
        [only] => Some(only),
        _ => None,
    };

    if let Some(col) = exact.or_else(suffixed).or_else(only) {
        tracing::trace!(table = %meta.name, column = %col.name, "Title column detected");
        return Ok(col.name.clone());
    }

    let columns_considered = if text.is_empty() {
        meta.column_names()
    } else {
        text.iter().map(|c| c.name.clone()).collect()
    };
    Err(Error::Relationship(
        RelationshipError::TitleColumnNotDetected {
            table: meta.name.clone(),
            columns_considered,
        },
    ))
}

/// Require `column` to be set and to exist on `meta`.
#[allow(clippy::result_large_err)]
pub fn validate_group_column<'a>(
    meta: &'a TableMetadata,
    column: Option<&str>,
) -> Result<&'a ColumnMetadata> {
    column.and_then(|c| meta.column(c)).ok_or_else(|| {
        Error::Relationship(RelationshipError::GroupColumnNotSet {
            table: meta.name.clone(),
            column: column.map(String::from),
            available: meta.column_names(),
        })
    })
}

/// Require every row's `group_column` value to be one of `expected_keys`.
///
/// Keys are compared with [`Value::same_key`]. A row missing the column
/// counts as having a NULL key.
#[allow(clippy::result_large_err)]
pub fn validate_group_keys(rows: &[Row], group_column: &str, expected_keys: &[Value]) -> Result<()> {
    for row in rows {
        let key = row.get_by_name(group_column).cloned().unwrap_or(Value::Null);
        if !expected_keys.iter().any(|k| k.same_key(&key)) {
            return Err(Error::Relationship(
                RelationshipError::GroupKeyNotPresentInResultset {
                    group_column: group_column.to_string(),
                    group_key: key,
                    row: row
                        .iter()
                        .map(|(name, value)| (name.to_string(), value.clone()))
                        .collect(),
                    expected_keys: expected_keys.to_vec(),
                },
            ));
        }
    }
    Ok(())
}

fn is_junction_between(candidate: &TableMetadata, owner: &str, related: &str) -> bool {
    if candidate.name == owner || candidate.name == related {
        return false;
    }
    let to_owner = candidate.references_to(owner).len();
    if owner == related {
        return to_owner >= 2;
    }
    to_owner >= 1 && !candidate.references_to(related).is_empty()
}

/// Tables among `catalog` whose references point at both `owner` and `related`.
pub fn detect_junction_tables(
    owner: &TableMetadata,
    related: &TableMetadata,
    catalog: &[Arc<TableMetadata>],
) -> Vec<String> {
    catalog
        .iter()
        .filter(|t| is_junction_between(t, &owner.name, &related.name))
        .map(|t| t.name.clone())
        .collect()
}

/// How a many-to-many alias maps onto its junction table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionMapping {
    /// Junction table
    pub junction_table: String,
    /// Junction column referencing the owning table
    pub source_column: String,
    /// Related table
    pub reference_table: String,
    /// Junction column referencing the related table
    pub reference_column: String,
    /// Column of the related table the junction points at
    pub reference_pk: String,
}

fn mapping_from(junction: &TableMetadata, owner: &str, related: &str) -> Option<JunctionMapping> {
    let (source_column, _) = junction.foreign_keys().find(|(_, r)| r.table == owner)?;
    let (reference_column, reference) = junction
        .foreign_keys()
        .find(|(col, r)| r.table == related && *col != source_column)?;
    Some(JunctionMapping {
        junction_table: junction.name.clone(),
        source_column: source_column.to_string(),
        reference_table: related.to_string(),
        reference_column: reference_column.to_string(),
        reference_pk: reference.column.clone(),
    })
}

fn ambiguous(owner: &TableMetadata, alias: &str, candidates: Vec<String>) -> Error {
    Error::Relationship(RelationshipError::AmbiguousRelationship {
        table: owner.name.clone(),
        alias: alias.to_string(),
        candidates,
    })
}

/// Resolve a `has_many` declaration into a junction mapping.
///
/// `declared` is the table named in the declaration. When it references the
/// owner it is taken as the junction itself and must reference exactly one
/// other table. Otherwise it is taken as the related table and exactly one
/// junction in `catalog` must link the two.
#[allow(clippy::result_large_err)]
pub fn resolve_junction(
    owner: &TableMetadata,
    alias: &str,
    declared: &TableMetadata,
    catalog: &[Arc<TableMetadata>],
) -> Result<JunctionMapping> {
    if !declared.references_to(&owner.name).is_empty() && declared.name != owner.name {
        let mut others: Vec<String> = declared
            .foreign_keys()
            .map(|(_, r)| r.table.clone())
            .filter(|t| *t != owner.name)
            .collect();
        others.dedup();
        if others.is_empty() && declared.references_to(&owner.name).len() >= 2 {
            others.push(owner.name.clone());
        }
        return match others.as_slice() {
            [related] => mapping_from(declared, &owner.name, related)
                .ok_or_else(|| ambiguous(owner, alias, vec![declared.name.clone()])),
            _ => Err(ambiguous(owner, alias, others)),
        };
    }

    let candidates = detect_junction_tables(owner, declared, catalog);
    tracing::debug!(
        table = %owner.name,
        alias,
        related = %declared.name,
        candidates = ?candidates,
        "Junction candidates"
    );
    match candidates.as_slice() {
        [only] => catalog
            .iter()
            .find(|t| t.name == *only)
            .and_then(|junction| mapping_from(junction, &owner.name, &declared.name))
            .ok_or_else(|| ambiguous(owner, alias, candidates.clone())),
        _ => Err(ambiguous(owner, alias, candidates)),
    }
}
