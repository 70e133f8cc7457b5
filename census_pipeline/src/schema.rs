use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use crate::types::{TypeRegistry, TypeTag};

/// The canonical form of a column name, used for every name comparison.
pub fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A column as submitted by an administrator or read back from a saved configuration.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawColumn {
    pub name: Option<String>,
    pub column_type: Option<String>,
}

impl RawColumn {
    pub fn new(name: &str, column_type: &str) -> RawColumn {
        RawColumn {
            name: Some(name.to_string()),
            column_type: Some(column_type.to_string()),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub type_tag: TypeTag,
}

impl ColumnDefinition {
    pub fn new(name: &str, type_tag: TypeTag) -> ColumnDefinition {
        ColumnDefinition {
            name: name.trim().to_string(),
            type_tag,
        }
    }
}

/// Problems found when an administrator saves the column configuration.
/// Positions start at 1.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ConfigIssue {
    BlankName { position: usize },
    InvalidType { position: usize, type_tag: String },
    DuplicateName { position: usize, name: String },
    NoColumns,
}

impl ConfigIssue {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigIssue::BlankName { .. } => "blank_name",
            ConfigIssue::InvalidType { .. } => "invalid_type",
            ConfigIssue::DuplicateName { .. } => "duplicate_name",
            ConfigIssue::NoColumns => "no_columns",
        }
    }
}

impl Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigIssue::BlankName { position } => {
                write!(f, "column {}: the name cannot be blank", position)
            }
            ConfigIssue::InvalidType { position, type_tag } => {
                write!(f, "column {}: unknown type {:?}", position, type_tag)
            }
            ConfigIssue::DuplicateName { position, name } => {
                write!(f, "column {}: the name {:?} is already used", position, name)
            }
            ConfigIssue::NoColumns => write!(f, "at least one column is required"),
        }
    }
}

/// The ordered columns of a census.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ColumnSchema {
    columns: Vec<ColumnDefinition>,
    // normalized name -> position in columns
    index: HashMap<String, usize>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<ColumnDefinition>) -> ColumnSchema {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (idx, c) in columns.iter().enumerate() {
            // The first definition wins when names collide.
            index.entry(normalize_key(&c.name)).or_insert(idx);
        }
        ColumnSchema { columns, index }
    }

    /// Builds a schema out of raw columns. Names are trimmed and a missing type
    /// is a free text column. Unknown types are kept as they are: they are
    /// reported by [ColumnSchema::check].
    pub fn normalize(raw: &[RawColumn]) -> ColumnSchema {
        let columns = raw
            .iter()
            .map(|rc| {
                let type_tag = match rc.column_type.as_deref() {
                    Some(t) if !t.trim().is_empty() => TypeTag::from_tag(t),
                    _ => TypeTag::FreeText,
                };
                ColumnDefinition::new(rc.name.as_deref().unwrap_or(""), type_tag)
            })
            .collect();
        ColumnSchema::new(columns)
    }

    /// Validates the columns submitted by an administrator.
    pub fn check(raw: &[RawColumn], registry: &TypeRegistry) -> Vec<ConfigIssue> {
        let mut issues: Vec<ConfigIssue> = Vec::new();
        if raw.is_empty() {
            issues.push(ConfigIssue::NoColumns);
        }
        let mut seen: HashSet<String> = HashSet::new();
        for (idx, rc) in raw.iter().enumerate() {
            let position = idx + 1;
            let name = rc.name.as_deref().unwrap_or("").trim();
            if name.is_empty() {
                issues.push(ConfigIssue::BlankName { position });
            } else if !seen.insert(normalize_key(name)) {
                issues.push(ConfigIssue::DuplicateName {
                    position,
                    name: name.to_string(),
                });
            }
            match rc.column_type.as_deref() {
                Some(tag) if !tag.trim().is_empty() => {
                    if !registry.is_known(&TypeTag::from_tag(tag)) {
                        issues.push(ConfigIssue::InvalidType {
                            position,
                            type_tag: tag.to_string(),
                        });
                    }
                }
                // A missing type is a free text column.
                _ => {}
            }
        }
        issues
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of the column with the given name (case-insensitive).
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize_key(name)).cloned()
    }

    pub fn find(&self, name: &str) -> Option<&ColumnDefinition> {
        self.position(name).map(|idx| &self.columns[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_names_and_defaults_types() {
        let schema = ColumnSchema::normalize(&[
            RawColumn::new("  DNI ", "alphanumeric"),
            RawColumn {
                name: Some("Name".to_string()),
                column_type: None,
            },
            RawColumn::new("Zip", "postal_code"),
        ]);
        assert_eq!(schema.names(), vec!["DNI", "Name", "Zip"]);
        assert_eq!(schema.columns()[0].type_tag, TypeTag::Alphanumeric);
        assert_eq!(schema.columns()[1].type_tag, TypeTag::FreeText);
        assert_eq!(
            schema.columns()[2].type_tag,
            TypeTag::Other("postal_code".to_string())
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let schema = ColumnSchema::normalize(&[
            RawColumn::new("Birth Date", "date"),
            RawColumn::new("ID", "number"),
        ]);
        assert_eq!(schema.position(" birth date"), Some(0));
        assert_eq!(schema.find("id").map(|c| c.name.as_str()), Some("ID"));
        assert_eq!(schema.find("other"), None);
    }

    #[test]
    fn check_reports_positions() {
        let reg = TypeRegistry::builtin();
        let issues = ColumnSchema::check(
            &[
                RawColumn::new("Name", "free_text"),
                RawColumn::new("  ", "number"),
                RawColumn::new("name ", "wrong"),
                RawColumn {
                    name: Some("Zip".to_string()),
                    column_type: None,
                },
            ],
            &reg,
        );
        assert_eq!(
            issues,
            vec![
                ConfigIssue::BlankName { position: 2 },
                ConfigIssue::DuplicateName {
                    position: 3,
                    name: "name".to_string()
                },
                ConfigIssue::InvalidType {
                    position: 3,
                    type_tag: "wrong".to_string()
                },
            ]
        );
        assert_eq!(issues[0].code(), "blank_name");
        assert_eq!(issues[2].code(), "invalid_type");
    }

    #[test]
    fn check_requires_a_column() {
        let issues = ColumnSchema::check(&[], &TypeRegistry::builtin());
        assert_eq!(issues, vec![ConfigIssue::NoColumns]);
        assert!(ColumnSchema::check(
            &[RawColumn::new("DNI", "alphanumeric")],
            &TypeRegistry::builtin()
        )
        .is_empty());
    }
}
