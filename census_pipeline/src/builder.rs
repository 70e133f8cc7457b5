pub use crate::schema::{normalize_key, ColumnDefinition, ColumnSchema};
pub use crate::types::TypeTag;

/// A builder for the census columns.
///
/// It follows the edits an administrator makes on the column form.
///
/// ```
/// use census_pipeline::builder::SchemaBuilder;
/// use census_pipeline::TypeTag;
///
/// let mut builder = SchemaBuilder::new()
///     .column("DNI", TypeTag::Alphanumeric)
///     .column("Birth date", TypeTag::Date);
///
/// builder.add_column("Zip", TypeTag::TextTrim);
/// builder.remove_column("birth date");
///
/// let schema = builder.build();
/// assert_eq!(schema.names(), vec!["DNI", "Zip"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    pub(crate) _columns: Vec<ColumnDefinition>,
}

impl SchemaBuilder {
    pub fn new() -> SchemaBuilder {
        SchemaBuilder {
            _columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, type_tag: TypeTag) -> SchemaBuilder {
        self.add_column(name, type_tag);
        self
    }

    /// Adds a column at the end.
    ///
    /// A column with the same name (ignoring case) is replaced in place.
    pub fn add_column(&mut self, name: &str, type_tag: TypeTag) {
        let col = ColumnDefinition::new(name, type_tag);
        match self.position(name) {
            Some(idx) => self._columns[idx] = col,
            None => self._columns.push(col),
        }
    }

    /// Returns true if a column was removed.
    pub fn remove_column(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) => {
                self._columns.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.position(name).map(|idx| &self._columns[idx])
    }

    pub fn column_names(&self) -> Vec<String> {
        self._columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn build(&self) -> ColumnSchema {
        ColumnSchema::new(self._columns.clone())
    }

    fn position(&self, name: &str) -> Option<usize> {
        let key = normalize_key(name);
        self._columns
            .iter()
            .position(|c| normalize_key(&c.name) == key)
    }
}
