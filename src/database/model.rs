//! Generic entity record.
//!
//! A `DatabaseModel` is an ordered map of field name to JSON value. Its identity is derived from
//! the values of the primary-key fields declared by its table, joined by [`IDENTIFIER_SEPARATOR`].

use crate::database::types::DatabaseError;

use serde_json::{Map, Value};

/// Separator placed between primary-key values in an identifier.
pub const IDENTIFIER_SEPARATOR: &str = "-";

#[derive(Debug, Clone)]
pub struct DatabaseModel {
    primary_keys: Vec<String>,
    values: Map<String, Value>,
    is_dirty: bool,
}

impl DatabaseModel {
    /// Create a clean model with the given primary keys and initial values.
    pub fn new<S: AsRef<str>>(primary_keys: &[S], values: Map<String, Value>) -> Self {
        Self {
            primary_keys: primary_keys.iter().map(|k| k.as_ref().to_string()).collect(),
            values,
            is_dirty: false,
        }
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// String value of a field, `None` if absent or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.values.get(field).and_then(Value::as_bool)
    }

    /// Numeric value of a field. Numbers stored as strings are accepted as well.
    pub fn get_u64(&self, field: &str) -> Option<u64> {
        match self.values.get(field)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Replace every value of the model.
    pub fn set_values(&mut self, values: Map<String, Value>) {
        self.values = values;
        self.is_dirty = true;
    }

    /// Update a single field.
    pub fn set_field(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
        self.is_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Called by the adapter once the model has been persisted.
    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Whether every primary-key field currently holds a usable value.
    pub fn has_identifier(&self) -> bool {
        self.get_identifier().is_ok()
    }

    /// Build the identifier from the primary-key values, in declaration order.
    pub fn get_identifier(&self) -> Result<String, DatabaseError> {
        if self.primary_keys.is_empty() {
            return Err(DatabaseError::NoPrimaryKeys);
        }

        let mut parts = Vec::with_capacity(self.primary_keys.len());
        for key in &self.primary_keys {
            let part = match self.values.get(key) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => return Err(DatabaseError::MissingPrimaryKey(key.clone())),
            };
            parts.push(part);
        }

        Ok(parts.join(IDENTIFIER_SEPARATOR))
    }
}

/// Two models are equal when they share primary keys and values. The dirty flag is ignored.
impl PartialEq for DatabaseModel {
    fn eq(&self, other: &Self) -> bool {
        self.primary_keys == other.primary_keys && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_identifier_joins_primary_keys_in_order() {
        let model = DatabaseModel::new(&["a", "b"], values(json!({"b": "Y", "a": "X", "c": 1})));
        assert_eq!(model.get_identifier().unwrap(), "X-Y");
        assert_eq!(model.get_identifier().unwrap(), "X-Y");
    }

    #[test]
    fn test_identifier_requires_primary_keys() {
        let model = DatabaseModel::new::<&str>(&[], values(json!({"a": "X"})));
        assert!(matches!(
            model.get_identifier(),
            Err(DatabaseError::NoPrimaryKeys)
        ));
    }

    #[test]
    fn test_identifier_requires_every_value() {
        let model = DatabaseModel::new(&["a", "b"], values(json!({"a": "X"})));
        match model.get_identifier() {
            Err(DatabaseError::MissingPrimaryKey(field)) => assert_eq!(field, "b"),
            other => panic!("unexpected result: {:?}", other),
        }

        let empty = DatabaseModel::new(&["a"], values(json!({"a": ""})));
        assert!(!empty.has_identifier());
    }

    #[test]
    fn test_numeric_primary_key() {
        let model = DatabaseModel::new(&["port"], values(json!({"port": 3000})));
        assert_eq!(model.get_identifier().unwrap(), "3000");
    }

    #[test]
    fn test_mutations_set_dirty() {
        let mut model = DatabaseModel::new(&["a"], Map::new());
        assert!(!model.is_dirty());

        model.set_field("a", "X");
        assert!(model.is_dirty());
        assert_eq!(model.get_str("a"), Some("X"));

        model.mark_clean();
        model.set_values(values(json!({"a": "Z"})));
        assert!(model.is_dirty());
        assert_eq!(model.get_identifier().unwrap(), "Z");
    }

    #[test]
    fn test_equality_ignores_dirty_flag() {
        let clean = DatabaseModel::new(&["a"], values(json!({"a": "X"})));
        let mut dirty = DatabaseModel::new(&["a"], Map::new());
        dirty.set_field("a", "X");
        assert_eq!(clean, dirty);
    }

    #[test]
    fn test_get_u64_accepts_strings() {
        let model = DatabaseModel::new(&["a"], values(json!({"a": "1", "n": "42", "m": 7})));
        assert_eq!(model.get_u64("n"), Some(42));
        assert_eq!(model.get_u64("m"), Some(7));
        assert_eq!(model.get_u64("missing"), None);
    }
}
