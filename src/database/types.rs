use crate::database::model::DatabaseModel;

use indexmap::IndexMap;

/// A collection of entities keyed by their identifier, in insertion order.
pub type Entities<M = DatabaseModel> = IndexMap<String, M>;

/// Errors raised by the persistence layer.
///
/// Structural errors (unknown schema, corrupted storage) indicate a programming error or local
/// state corruption and are meant to propagate loudly to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Schema not registered: {0}")]
    SchemaNotRegistered(String),

    #[error("Invalid stored format in table '{table}': {reason}")]
    InvalidStoredFormat { table: String, reason: String },

    #[error("Entity '{identifier}' not found in table '{table}'")]
    NotFound { table: String, identifier: String },

    #[error("Model does not declare any primary key")]
    NoPrimaryKeys,

    #[error("Missing value for primary key field '{0}'")]
    MissingPrimaryKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    EncryptionError(String),
}
