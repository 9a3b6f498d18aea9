//! Storage adapter.
//!
//! The adapter owns a backend, a formatter and a registry of schemas. It is the single read/write
//! surface for every entity kind: collections are always read and written whole, under the name
//! of the registered table.

use crate::database::backend::StorageBackend;
use crate::database::formatter::DataFormatter;
use crate::database::table::DatabaseTable;
use crate::database::types::{DatabaseError, Entities};

use std::collections::HashMap;
use tokio::sync::Mutex;

pub struct StorageAdapter {
    backend: Box<dyn StorageBackend>,
    formatter: Box<dyn DataFormatter>,
    schemas: HashMap<String, DatabaseTable>,
    /// Serializes read-modify-write cycles issued through `update`.
    write_lock: Mutex<()>,
}

impl StorageAdapter {
    /// Create an adapter with an empty schema registry.
    pub fn new(backend: Box<dyn StorageBackend>, formatter: Box<dyn DataFormatter>) -> Self {
        Self {
            backend,
            formatter,
            schemas: HashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Replace the schema registry.
    pub fn with_schemas(mut self, schemas: HashMap<String, DatabaseTable>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Look up a registered schema.
    pub fn schema(&self, schema_id: &str) -> Result<&DatabaseTable, DatabaseError> {
        self.schemas
            .get(schema_id)
            .ok_or_else(|| DatabaseError::SchemaNotRegistered(schema_id.to_string()))
    }

    /// Read the whole collection of `schema_id`.
    ///
    /// Returns an empty collection if nothing was stored yet. Data that fails formatter validation
    /// is reported as `InvalidStoredFormat` rather than discarded.
    pub async fn read(&self, schema_id: &str) -> Result<Entities, DatabaseError> {
        let table = self.schema(schema_id)?;

        let Some(raw) = self.backend.get(table.name()).await? else {
            return Ok(Entities::new());
        };

        if !self.formatter.validate(&raw) {
            log::error!(
                "Stored data for table '{}' failed validation ({} bytes)",
                table.name(),
                raw.len()
            );
            return Err(DatabaseError::InvalidStoredFormat {
                table: table.name().to_string(),
                reason: "formatter validation failed".to_string(),
            });
        }

        self.formatter.parse(table, &raw)
    }

    /// Overwrite the whole collection of `schema_id`, returning the number of entities written.
    ///
    /// Written models are marked clean.
    pub async fn write(
        &self,
        schema_id: &str,
        entities: &mut Entities,
    ) -> Result<usize, DatabaseError> {
        let table = self.schema(schema_id)?;

        let raw = self.formatter.format(entities)?;
        self.backend.set(table.name(), &raw).await?;

        for model in entities.values_mut() {
            model.mark_clean();
        }

        log::debug!(
            "Wrote {} entities to table '{}' using {} backend",
            entities.len(),
            table.name(),
            self.backend.name()
        );
        Ok(entities.len())
    }

    /// Read, modify and write back a collection without interleaving with other updates.
    pub async fn update<T, F>(&self, schema_id: &str, modify: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut Entities) -> Result<T, DatabaseError>,
    {
        let _guard = self.write_lock.lock().await;

        let mut entities = self.read(schema_id).await?;
        let result = modify(&mut entities)?;
        self.write(schema_id, &mut entities).await?;

        Ok(result)
    }

    /// Drop the stored collection of `schema_id`.
    pub async fn clear(&self, schema_id: &str) -> Result<(), DatabaseError> {
        let table = self.schema(schema_id)?;
        self.backend.remove(table.name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::backend::MemoryStorageBackend;
    use crate::database::formatter::JsonFormatter;
    use serde_json::json;

    fn wallets_table() -> DatabaseTable {
        DatabaseTable::new("wallets", &["id", "name"], &["id"])
    }

    fn adapter_with(schemas: HashMap<String, DatabaseTable>) -> StorageAdapter {
        StorageAdapter::new(Box::new(MemoryStorageBackend::new()), Box::new(JsonFormatter))
            .with_schemas(schemas)
    }

    fn wallets_adapter() -> StorageAdapter {
        adapter_with(HashMap::from([("wallets".to_string(), wallets_table())]))
    }

    #[tokio::test]
    async fn test_read_unknown_schema_fails() {
        let adapter = wallets_adapter();
        match adapter.read("unknown").await {
            Err(DatabaseError::SchemaNotRegistered(id)) => assert_eq!(id, "unknown"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            adapter.write("unknown", &mut Entities::new()).await,
            Err(DatabaseError::SchemaNotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_read_empty_storage_returns_empty_collection() {
        let adapter = wallets_adapter();
        assert!(adapter.read("wallets").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_corrupted_storage_fails() {
        let backend = MemoryStorageBackend::new();
        backend.set("wallets", "[\"not a map\"]").await.unwrap();
        let adapter = StorageAdapter::new(Box::new(backend), Box::new(JsonFormatter))
            .with_schemas(HashMap::from([("wallets".to_string(), wallets_table())]));

        assert!(matches!(
            adapter.read("wallets").await,
            Err(DatabaseError::InvalidStoredFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_and_dirty_flags_cleared() {
        let adapter = wallets_adapter();
        let table = wallets_table();

        let mut model = table.empty_model();
        model.set_field("id", "w1");
        model.set_field("name", "Main");
        assert!(model.is_dirty());

        let mut entities = Entities::new();
        entities.insert(model.get_identifier().unwrap(), model);

        assert_eq!(adapter.write("wallets", &mut entities).await.unwrap(), 1);
        assert!(entities.values().all(|m| !m.is_dirty()));

        let read = adapter.read("wallets").await.unwrap();
        assert_eq!(read, entities);
    }

    #[tokio::test]
    async fn test_schema_id_and_table_name_share_one_slot() {
        // Registered under an id that differs from the table name
        let adapter = adapter_with(HashMap::from([("wallet_schema".to_string(), wallets_table())]));
        let table = wallets_table();

        let mut entities = Entities::new();
        entities.insert(
            "w1".to_string(),
            table.create_model(json!({"id": "w1", "name": "Main"}).as_object().cloned().unwrap()),
        );
        adapter.write("wallet_schema", &mut entities).await.unwrap();

        let read = adapter.read("wallet_schema").await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read["w1"].get_str("name"), Some("Main"));
    }

    #[tokio::test]
    async fn test_write_is_full_overwrite() {
        let adapter = wallets_adapter();
        let table = wallets_table();

        let mut first = Entities::new();
        for id in ["w1", "w2"] {
            first.insert(
                id.to_string(),
                table.create_model(json!({"id": id}).as_object().cloned().unwrap()),
            );
        }
        adapter.write("wallets", &mut first).await.unwrap();

        let mut second = Entities::new();
        second.insert(
            "w3".to_string(),
            table.create_model(json!({"id": "w3"}).as_object().cloned().unwrap()),
        );
        adapter.write("wallets", &mut second).await.unwrap();

        let read = adapter.read("wallets").await.unwrap();
        assert_eq!(read.keys().collect::<Vec<_>>(), ["w3"]);
    }

    #[tokio::test]
    async fn test_update_and_clear() {
        let adapter = wallets_adapter();
        let table = wallets_table();

        let count = adapter
            .update("wallets", |entities| {
                entities.insert(
                    "w1".to_string(),
                    table.create_model(json!({"id": "w1"}).as_object().cloned().unwrap()),
                );
                Ok(entities.len())
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(adapter.read("wallets").await.unwrap().len(), 1);

        adapter.clear("wallets").await.unwrap();
        assert!(adapter.read("wallets").await.unwrap().is_empty());
    }
}
