//! Manual census entries and voter lookup.

use std::fmt::Display;

use log::debug;

use crate::config::Record;
use crate::duplicates::{exists, CensusStore, MatchPredicate};
use crate::schema::ColumnSchema;
use crate::types::{is_blank, ErrorCode, TypeRegistry};

/// Why a manual entry was refused.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum EntryIssue {
    BlankColumn { column: String },
    InvalidValue { column: String, kind: ErrorCode },
    AlreadyExists,
}

impl EntryIssue {
    pub fn code(&self) -> &'static str {
        match self {
            EntryIssue::BlankColumn { .. } => "blank_column",
            EntryIssue::InvalidValue { .. } => "invalid_value",
            EntryIssue::AlreadyExists => "already_exists",
        }
    }
}

impl Display for EntryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryIssue::BlankColumn { column } => write!(f, "{} cannot be blank", column),
            EntryIssue::InvalidValue { column, kind } => write!(f, "{}: {}", column, kind),
            EntryIssue::AlreadyExists => write!(f, "this voter is already in the census"),
        }
    }
}

/// Validates a voter typed in by an administrator and returns the record to store.
///
/// Every column is required. Field names are matched ignoring case.
pub fn prepare_entry<S: CensusStore + ?Sized>(
    schema: &ColumnSchema,
    registry: &TypeRegistry,
    store: &S,
    data: &Record,
) -> Result<Record, Vec<EntryIssue>> {
    let mut issues: Vec<EntryIssue> = Vec::new();
    let mut record = Record::new();
    for col in schema.columns().iter() {
        let value = data.get_ignore_case(&col.name).unwrap_or("");
        if is_blank(value) {
            issues.push(EntryIssue::BlankColumn {
                column: col.name.clone(),
            });
            continue;
        }
        if let Some(kind) = registry.validate(&col.type_tag, value) {
            issues.push(EntryIssue::InvalidValue {
                column: col.name.clone(),
                kind,
            });
        }
        record.insert(&col.name, &registry.transform(&col.type_tag, value));
    }
    if exists(store, &record) {
        issues.push(EntryIssue::AlreadyExists);
    }
    if issues.is_empty() {
        Ok(record)
    } else {
        debug!("prepare_entry: refused: {:?}", issues);
        Err(issues)
    }
}

/// The predicate over the transformed non-blank identity fields.
pub fn identity_predicate(
    schema: &ColumnSchema,
    registry: &TypeRegistry,
    data: &Record,
) -> Option<MatchPredicate> {
    let record: Record = schema
        .columns()
        .iter()
        .filter_map(|col| {
            data.get_ignore_case(&col.name)
                .filter(|v| !is_blank(v))
                .map(|v| (col.name.as_str(), registry.transform(&col.type_tag, v)))
        })
        .collect();
    MatchPredicate::for_values(&record)
}

/// Finds the voter with the given identity fields.
///
/// Without any identity field, nobody is found.
pub fn find_voter<S: CensusStore + ?Sized>(
    schema: &ColumnSchema,
    registry: &TypeRegistry,
    store: &S,
    data: &Record,
) -> Option<Record> {
    let predicate = identity_predicate(schema, registry, data)?;
    store.find_match(&predicate).cloned()
}

/// The voters, newest first, optionally filtered by the value of the first column.
///
/// The query is a case-insensitive substring. A blank query keeps every voter.
pub fn list_voters<'a>(
    schema: &ColumnSchema,
    voters: &'a [Record],
    query: Option<&str>,
) -> Vec<&'a Record> {
    let needle = query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    let identifier = schema.columns().first().map(|c| c.name.as_str());
    debug!("list_voters: column {:?}, query {:?}", identifier, needle);
    voters
        .iter()
        .rev()
        .filter(|v| match (&needle, identifier) {
            (None, _) => true,
            (Some(n), Some(col)) => v
                .get(col)
                .map_or(false, |value| value.to_lowercase().contains(n.as_str())),
            (Some(_), None) => false,
        })
        .collect()
}
