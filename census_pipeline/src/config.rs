// ********* Records ***********

use std::error::Error;
use std::fmt::Display;

use crate::schema::normalize_key;
use crate::types::ErrorCode;

/// A row of named values, in column order.
///
/// Once accepted by the pipeline, the names are exactly the column names of the schema.
#[derive(Eq, PartialEq, Debug, Clone, Default, Hash)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Record {
        Record { fields: Vec::new() }
    }

    /// Sets a value. An existing field with the same name is overwritten in place.
    pub fn insert(&mut self, name: &str, value: &str) {
        if let Some(f) = self.fields.iter_mut().find(|(n, _)| n == name) {
            f.1 = value.to_string();
        } else {
            self.fields.push((name.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Looks up a value with the same name normalization as the schema.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        let key = normalize_key(name);
        self.fields
            .iter()
            .find(|(n, _)| normalize_key(n) == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn values(&self) -> Vec<String> {
        self.fields.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: AsRef<str>, V: AsRef<str>> FromIterator<(N, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut r = Record::new();
        for (n, v) in iter {
            r.insert(n.as_ref(), v.as_ref());
        }
        r
    }
}

// ******** Validation results *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum HeaderErrorKind {
    Missing,
    Extra,
}

/// A problem found while reading an upload.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ValidationIssue {
    /// The input is not readable as delimited text.
    CsvError { message: String },
    HeaderError {
        kind: HeaderErrorKind,
        columns: Vec<String>,
    },
    /// A cell rejected by its column type. The header is row 1.
    RowError {
        row: usize,
        column: String,
        kind: ErrorCode,
    },
}

impl ValidationIssue {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationIssue::CsvError { .. } => "malformed_csv",
            ValidationIssue::HeaderError {
                kind: HeaderErrorKind::Missing,
                ..
            } => "missing_columns",
            ValidationIssue::HeaderError {
                kind: HeaderErrorKind::Extra,
                ..
            } => "extra_columns",
            ValidationIssue::RowError { .. } => "validation_error",
        }
    }
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::CsvError { message } => write!(f, "malformed CSV file: {}", message),
            ValidationIssue::HeaderError {
                kind: HeaderErrorKind::Missing,
                columns,
            } => write!(f, "missing columns: {}", columns.join(", ")),
            ValidationIssue::HeaderError {
                kind: HeaderErrorKind::Extra,
                columns,
            } => write!(f, "unexpected columns: {}", columns.join(", ")),
            ValidationIssue::RowError { row, column, kind } => {
                write!(f, "row {}, column {}: {}", row, column, kind)
            }
        }
    }
}

/// The outcome of one run of the pipeline over an upload.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct CensusData {
    /// Accepted records. Always empty when there are issues.
    pub records: Vec<Record>,
    pub issues: Vec<ValidationIssue>,
    /// Rows dropped because they were identical to an earlier row once transformed.
    pub duplicates_removed: usize,
    /// Rows without any value once transformed.
    pub blank_rows: usize,
    /// Records dropped because the census already contains them.
    pub already_in_census: usize,
    pub headers: Vec<String>,
}

impl CensusData {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Classification of a survey respondent.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ImportStatus {
    Valid,
    /// At least one column has no value.
    Incomplete,
    /// All the columns are filled but one value is rejected by its type.
    Invalid,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Valid => "valid",
            ImportStatus::Incomplete => "incomplete",
            ImportStatus::Invalid => "invalid",
        }
    }
}

impl Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ********* Store **********

/// Errors reported by a census store.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum StoreError {
    EmptyRecord,
    DuplicateEntry,
    TransactionInProgress,
    NoTransaction,
    /// Failure of the storage backend (file, database, ...).
    Backend(String),
}

impl Error for StoreError {}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::EmptyRecord => write!(f, "cannot store a record without fields"),
            StoreError::DuplicateEntry => write!(f, "the record is already in the census"),
            StoreError::TransactionInProgress => write!(f, "a transaction is already open"),
            StoreError::NoTransaction => write!(f, "no transaction is open"),
            StoreError::Backend(msg) => write!(f, "census storage failure: {}", msg),
        }
    }
}
