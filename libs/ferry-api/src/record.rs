use std::collections::HashMap;
use std::fmt;

use crate::error::RecordError;
use crate::value::ColumnValue;

/// A named column value.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    value: ColumnValue,
}

impl Column {
    pub fn new(name: impl Into<String>, value: ColumnValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ColumnValue {
        &self.value
    }

    pub fn into_value(self) -> ColumnValue {
        self.value
    }
}

/// Ordered, named collection of column values. The unit of transfer.
///
/// Column order is insertion order and is positional for row-based sinks.
/// A record is built fresh per row and owned by exactly one side of a
/// channel at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Append a column. Names are unique within a record.
    pub fn add_column(&mut self, column: Column) -> Result<(), RecordError> {
        if self.index.contains_key(&column.name) {
            return Err(RecordError::ColumnExists(column.name));
        }
        self.index.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    pub fn column(&self, i: usize) -> Option<&Column> {
        self.columns.get(i)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Approximate payload size of all values.
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.value.byte_size()).sum()
    }

    /// Values joined by `delimiter`, nil rendered as `<nil>`.
    pub fn display_with(&self, delimiter: &str) -> String {
        self.columns
            .iter()
            .map(|c| c.value.to_string())
            .collect::<Vec<_>>()
            .join(delimiter)
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_with("\t"))
    }
}
