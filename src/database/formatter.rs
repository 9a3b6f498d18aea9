//! Storage string formatters.
//!
//! A formatter converts an [`Entities`] collection to the string stored by a backend and back.
//! Reads are validated first so that corrupted or foreign data is reported instead of being
//! silently replaced by an empty collection.

use crate::database::table::DatabaseTable;
use crate::database::types::{DatabaseError, Entities};

use serde_json::{Map, Value};

/// Serialization strategy for entity collections.
pub trait DataFormatter: Send + Sync {
    /// Returns true if `raw` is empty or structurally a collection of records.
    fn validate(&self, raw: &str) -> bool;

    /// Parse a stored collection into models shaped by `table`. Empty input yields no entities.
    fn parse(&self, table: &DatabaseTable, raw: &str) -> Result<Entities, DatabaseError>;

    /// Serialize a collection. Output is deterministic and keeps insertion order.
    fn format(&self, entities: &Entities) -> Result<String, DatabaseError>;
}

/// JSON formatter: `{"<identifier>": {"<field>": <value>, ...}, ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    fn records(raw: &str) -> Result<Map<String, Value>, String> {
        let parsed: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let Value::Object(records) = parsed else {
            return Err("top-level value is not an object".to_string());
        };

        if let Some((identifier, _)) = records.iter().find(|(_, record)| !record.is_object()) {
            return Err(format!("record '{}' is not an object", identifier));
        }

        Ok(records)
    }
}

impl DataFormatter for JsonFormatter {
    fn validate(&self, raw: &str) -> bool {
        raw.trim().is_empty() || Self::records(raw).is_ok()
    }

    fn parse(&self, table: &DatabaseTable, raw: &str) -> Result<Entities, DatabaseError> {
        if raw.trim().is_empty() {
            return Ok(Entities::new());
        }

        let records = Self::records(raw).map_err(|reason| DatabaseError::InvalidStoredFormat {
            table: table.name().to_string(),
            reason,
        })?;

        let entities = records
            .into_iter()
            .filter_map(|(identifier, record)| match record {
                Value::Object(values) => Some((identifier, table.create_model(values))),
                _ => None,
            })
            .collect();

        Ok(entities)
    }

    fn format(&self, entities: &Entities) -> Result<String, DatabaseError> {
        let records: Map<String, Value> = entities
            .iter()
            .map(|(identifier, model)| (identifier.clone(), Value::Object(model.values().clone())))
            .collect();

        Ok(serde_json::to_string(&Value::Object(records))?)
    }
}
