//! Conversion of survey answers into census records.

use std::collections::HashSet;
use std::fmt::Display;

use log::{debug, info};

use crate::config::{ImportStatus, Record};
use crate::duplicates::{exists, CensusStore};
use crate::schema::{normalize_key, ColumnDefinition, ColumnSchema};
use crate::types::{is_blank, TypeRegistry};

/// Problems of a survey field mapping, found when it is configured.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum MappingIssue {
    /// A census column that no question feeds.
    UnmappedColumn { column: String },
    /// A question id that is not part of the survey.
    QuestionNotFound { question: String },
}

impl MappingIssue {
    pub fn code(&self) -> &'static str {
        match self {
            MappingIssue::UnmappedColumn { .. } => "unmapped_column",
            MappingIssue::QuestionNotFound { .. } => "question_not_found",
        }
    }
}

impl Display for MappingIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingIssue::UnmappedColumn { column } => {
                write!(f, "no question is mapped to the column {:?}", column)
            }
            MappingIssue::QuestionNotFound { question } => {
                write!(f, "the question {:?} is not in the survey", question)
            }
        }
    }
}

/// Column name to question id.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct FieldMapping {
    pairs: Vec<(String, String)>,
}

impl FieldMapping {
    pub fn new(pairs: &[(String, String)]) -> FieldMapping {
        FieldMapping {
            pairs: pairs
                .iter()
                .map(|(c, q)| (c.trim().to_string(), q.trim().to_string()))
                .collect(),
        }
    }

    /// The question feeding a column. Blank question ids do not count.
    pub fn question_for(&self, column: &str) -> Option<&str> {
        let key = normalize_key(column);
        self.pairs
            .iter()
            .find(|(c, q)| normalize_key(c) == key && !q.is_empty())
            .map(|(_, q)| q.as_str())
    }

    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.pairs
            .iter()
            .map(|(_, q)| q.as_str())
            .filter(|q| !q.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.questions().next().is_none()
    }

    /// Every census column must be mapped, and every mapped question must exist.
    /// An empty mapping is not checked.
    pub fn check(&self, schema: &ColumnSchema, known_questions: &[String]) -> Vec<MappingIssue> {
        if self.is_empty() {
            return vec![];
        }
        let mut issues: Vec<MappingIssue> = schema
            .columns()
            .iter()
            .filter(|c| self.question_for(&c.name).is_none())
            .map(|c| MappingIssue::UnmappedColumn {
                column: c.name.clone(),
            })
            .collect();
        let known: HashSet<&str> = known_questions.iter().map(|q| q.as_str()).collect();
        for q in self.questions() {
            if !known.contains(q) {
                issues.push(MappingIssue::QuestionNotFound {
                    question: q.to_string(),
                });
            }
        }
        issues
    }
}

/// The answer of a respondent to one question.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Answer {
    pub question: String,
    pub body: Option<String>,
    /// Selected choices, for choice questions.
    pub choices: Vec<String>,
}

impl Answer {
    /// The text body, or the first choice when the body is blank.
    pub fn value(&self) -> Option<&str> {
        match self.body.as_deref() {
            Some(b) if !is_blank(b) => Some(b),
            _ => self.choices.first().map(|c| c.as_str()),
        }
    }
}

/// All the answers of one respondent.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Respondent {
    pub id: String,
    pub answers: Vec<Answer>,
}

impl Respondent {
    fn answer_to(&self, question: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question == question)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SurveyEntry {
    pub respondent_id: String,
    /// Transformed values of the answered columns.
    pub record: Record,
    pub status: ImportStatus,
    /// The answers as given, before transformation.
    pub raw_values: Record,
}

/// Builds the census record of every respondent and classifies it.
///
/// Respondents whose record matches a voter of the census are left out.
/// Nothing is returned until both the columns and the mapping are configured.
pub fn classify_respondents<S: CensusStore + ?Sized>(
    schema: &ColumnSchema,
    registry: &TypeRegistry,
    mapping: &FieldMapping,
    respondents: &[Respondent],
    store: &S,
) -> Vec<SurveyEntry> {
    if schema.is_empty() || mapping.is_empty() {
        info!("classify_respondents: columns or mapping not configured");
        return vec![];
    }
    let mut entries: Vec<SurveyEntry> = Vec::new();
    for respondent in respondents.iter() {
        let mut record = Record::new();
        let mut raw_values = Record::new();
        for col in schema.columns().iter() {
            let answer = mapping
                .question_for(&col.name)
                .and_then(|q| respondent.answer_to(q));
            if let Some(a) = answer {
                let raw = a.value().unwrap_or("");
                raw_values.insert(&col.name, raw);
                record.insert(&col.name, &registry.transform(&col.type_tag, raw));
            }
        }
        if exists(store, &record) {
            debug!(
                "classify_respondents: {:?} already in the census",
                respondent.id
            );
            continue;
        }
        let status = classify(schema, registry, &record);
        entries.push(SurveyEntry {
            respondent_id: respondent.id.clone(),
            record,
            status,
            raw_values,
        });
    }
    info!(
        "classify_respondents: {:?} respondents, {:?} entries",
        respondents.len(),
        entries.len()
    );
    entries
}

fn classify(schema: &ColumnSchema, registry: &TypeRegistry, record: &Record) -> ImportStatus {
    let values: Vec<(&ColumnDefinition, &str)> = schema
        .columns()
        .iter()
        .map(|c| (c, record.get(&c.name).unwrap_or("")))
        .collect();
    if values.iter().any(|(_, v)| is_blank(v)) {
        ImportStatus::Incomplete
    } else if values
        .iter()
        .any(|(c, v)| registry.validate(&c.type_tag, v).is_some())
    {
        ImportStatus::Invalid
    } else {
        ImportStatus::Valid
    }
}

/// The records of the valid entries.
pub fn valid_records(entries: &[SurveyEntry]) -> Vec<Record> {
    entries
        .iter()
        .filter(|e| e.status == ImportStatus::Valid)
        .map(|e| e.record.clone())
        .collect()
}

/// Number of entries per status: valid, incomplete, invalid.
pub fn status_counts(entries: &[SurveyEntry]) -> (usize, usize, usize) {
    let count = |s: ImportStatus| entries.iter().filter(|e| e.status == s).count();
    (
        count(ImportStatus::Valid),
        count(ImportStatus::Incomplete),
        count(ImportStatus::Invalid),
    )
}
