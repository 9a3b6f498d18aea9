use crate::database::model::DatabaseModel;

use serde_json::{Map, Value};

/// Schema descriptor for one entity collection.
///
/// The table name doubles as the storage key of the collection. A table never holds data,
/// only the shape of the records stored under its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTable {
    name: String,
    columns: Vec<String>,
    primary_keys: Vec<String>,
}

impl DatabaseTable {
    pub fn new(name: impl Into<String>, columns: &[&str], primary_keys: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary_keys: primary_keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Build a clean model shaped by this table.
    pub fn create_model(&self, values: Map<String, Value>) -> DatabaseModel {
        DatabaseModel::new(&self.primary_keys, values)
    }

    pub fn empty_model(&self) -> DatabaseModel {
        self.create_model(Map::new())
    }
}
