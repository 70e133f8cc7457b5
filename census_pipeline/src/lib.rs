mod config;
use log::{debug, info, warn};

use std::{collections::HashSet, io::Read};

pub use crate::config::*;
pub use crate::duplicates::{
    exists, import_batch, replace_census, BatchOutcome, CensusStore, MatchPredicate, MemoryCensus,
};
pub use crate::schema::{normalize_key, ColumnDefinition, ColumnSchema, ConfigIssue, RawColumn};
pub use crate::types::{ColumnType, ErrorCode, TypeRegistry, TypeTag};

use crate::types::is_blank;

pub mod builder;
pub mod duplicates;
pub mod entry;
pub mod manual;
pub mod reader;
pub mod schema;
pub mod survey;
pub mod types;

/// Runs the census pipeline over an uploaded file.
///
/// Arguments:
/// * `input` the raw content of the upload
/// * `schema` the census columns of the election. An empty schema means that the
/// columns are not configured yet: headers are then not checked and rows are kept as read.
/// * `registry` the column types
///
/// Header and row problems are all collected. As soon as there is one, no record is returned.
pub fn run_census_import(
    input: &[u8],
    schema: &ColumnSchema,
    registry: &TypeRegistry,
) -> CensusData {
    info!(
        "Processing {:?} bytes, columns: {:?}",
        input.len(),
        schema.names()
    );
    match reader::decode(input) {
        Ok(table) => process_table(table, schema, registry),
        Err(issue) => {
            warn!("run_census_import: could not decode the input: {}", issue);
            CensusData {
                issues: vec![issue],
                ..CensusData::default()
            }
        }
    }
}

/// Same as [run_census_import], reading the upload from a stream.
pub fn run_census_import_from<R: Read>(
    input: R,
    schema: &ColumnSchema,
    registry: &TypeRegistry,
) -> CensusData {
    match reader::decode_from(input) {
        Ok(table) => process_table(table, schema, registry),
        Err(issue) => {
            warn!("run_census_import_from: could not decode the input: {}", issue);
            CensusData {
                issues: vec![issue],
                ..CensusData::default()
            }
        }
    }
}

fn process_table(
    table: reader::DecodedTable,
    schema: &ColumnSchema,
    registry: &TypeRegistry,
) -> CensusData {
    let reader::DecodedTable { headers, rows } = table;
    debug!(
        "process_table: headers: {:?}, {:?} rows",
        headers,
        rows.len()
    );

    if rows.is_empty() {
        info!("process_table: no data rows, nothing to check");
        return CensusData {
            headers,
            ..CensusData::default()
        };
    }

    let mut issues = validate_headers(schema, &headers);
    let (accepted, row_issues) = validate_rows(schema, registry, &rows);
    issues.extend(row_issues);

    if !issues.is_empty() {
        warn!(
            "process_table: {:?} issues found, {:?} of {:?} rows were acceptable",
            issues.len(),
            accepted.len(),
            rows.len()
        );
        return CensusData {
            issues,
            headers,
            ..CensusData::default()
        };
    }

    let deduplicated = transform_and_deduplicate(schema, registry, &accepted);
    info!(
        "process_table: {:?} records accepted, {:?} duplicates removed, {:?} blank rows",
        deduplicated.records.len(),
        deduplicated.duplicates_removed,
        deduplicated.blank_rows
    );
    CensusData {
        records: deduplicated.records,
        issues,
        duplicates_removed: deduplicated.duplicates_removed,
        blank_rows: deduplicated.blank_rows,
        already_in_census: 0,
        headers,
    }
}

/// Compares the headers of an upload with the census columns, ignoring case.
///
/// Blank headers are ignored. Nothing is checked when the schema has no column.
pub fn validate_headers(schema: &ColumnSchema, headers: &[String]) -> Vec<ValidationIssue> {
    if schema.is_empty() {
        debug!("validate_headers: columns not configured, skipping");
        return vec![];
    }
    let header_keys: HashSet<String> = headers.iter().map(|h| normalize_key(h)).collect();

    let missing: Vec<String> = schema
        .columns()
        .iter()
        .filter(|c| !header_keys.contains(&normalize_key(&c.name)))
        .map(|c| c.name.clone())
        .collect();
    let extra: Vec<String> = headers
        .iter()
        .filter(|h| !h.trim().is_empty() && schema.position(h).is_none())
        .cloned()
        .collect();

    let mut issues: Vec<ValidationIssue> = Vec::new();
    if !missing.is_empty() {
        issues.push(ValidationIssue::HeaderError {
            kind: HeaderErrorKind::Missing,
            columns: missing,
        });
    }
    if !extra.is_empty() {
        issues.push(ValidationIssue::HeaderError {
            kind: HeaderErrorKind::Extra,
            columns: extra,
        });
    }
    issues
}

/// Checks every non-blank cell against the type of its column.
///
/// Returns the rows without any problem, and the problems of the other rows.
/// The first data row is row 2.
pub fn validate_rows<'a>(
    schema: &ColumnSchema,
    registry: &TypeRegistry,
    rows: &'a [Record],
) -> (Vec<&'a Record>, Vec<ValidationIssue>) {
    let mut accepted: Vec<&Record> = Vec::new();
    let mut issues: Vec<ValidationIssue> = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let mut row_issues: Vec<ValidationIssue> = Vec::new();
        for (key, value) in row.iter() {
            if let Some(col) = schema.find(key) {
                if let Some(kind) = registry.validate(&col.type_tag, value) {
                    row_issues.push(ValidationIssue::RowError {
                        row: idx + 2,
                        column: col.name.clone(),
                        kind,
                    });
                }
            }
        }
        if row_issues.is_empty() {
            accepted.push(row);
        } else {
            debug!("validate_rows: row {:?} rejected: {:?}", idx + 2, row_issues);
            issues.extend(row_issues);
        }
    }
    (accepted, issues)
}

/// Applies the column transforms to a row. The fields are named and ordered after the schema.
///
/// Without any column, the row is returned as it is.
pub fn transform_record(schema: &ColumnSchema, registry: &TypeRegistry, row: &Record) -> Record {
    if schema.is_empty() {
        return row.clone();
    }
    let mut values: Vec<Option<&str>> = vec![None; schema.len()];
    for (key, value) in row.iter() {
        if let Some(idx) = schema.position(key) {
            values[idx] = Some(value);
        }
    }
    schema
        .columns()
        .iter()
        .zip(values)
        .map(|(col, v)| {
            (
                col.name.as_str(),
                registry.transform(&col.type_tag, v.unwrap_or("")),
            )
        })
        .collect()
}

/// The records left by [transform_and_deduplicate].
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Deduplicated {
    /// In the order of the rows.
    pub records: Vec<Record>,
    pub duplicates_removed: usize,
    pub blank_rows: usize,
}

/// Transforms the rows and keeps the first of the rows that end up with the same values.
///
/// Rows whose values are all blank once transformed are dropped: they cannot be stored.
pub fn transform_and_deduplicate(
    schema: &ColumnSchema,
    registry: &TypeRegistry,
    rows: &[&Record],
) -> Deduplicated {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut res = Deduplicated::default();
    for row in rows.iter() {
        let transformed = transform_record(schema, registry, row);
        if transformed.iter().all(|(_, v)| is_blank(v)) {
            debug!("transform_and_deduplicate: blank row {:?}", row);
            res.blank_rows += 1;
        } else if seen.insert(transformed.values()) {
            res.records.push(transformed);
        } else {
            debug!("transform_and_deduplicate: duplicate row {:?}", transformed);
            res.duplicates_removed += 1;
        }
    }
    res
}

impl CensusData {
    /// Drops the records that the census already contains.
    pub fn without_persisted<S: CensusStore + ?Sized>(self, store: &S) -> CensusData {
        let before = self.records.len();
        let records: Vec<Record> = self
            .records
            .into_iter()
            .filter(|r| !exists(store, r))
            .collect();
        let already_in_census = self.already_in_census + before - records.len();
        if already_in_census > 0 {
            info!(
                "without_persisted: {:?} records already in the census",
                already_in_census
            );
        }
        CensusData {
            records,
            already_in_census,
            ..self
        }
    }
}
