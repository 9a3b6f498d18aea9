//! Local persistence and entity modeling.
//!
//! Every entity kind the client persists (accounts, wallets, peers, settings) goes through the
//! same generic pipeline:
//!
//! - `backend`: key/value persistence of string blobs (file backed, or in-memory fallback).
//! - `formatter`: turns a collection of models into a storage string and back, validating on read.
//! - `model` / `table`: a single record with a composite-key identity, and the schema that
//!   shapes it.
//! - `adapter`: wires backend, formatter and the registered schemas into whole-collection
//!   read/write.
//! - `repositories`: typed per-entity facades over the adapter.
//!
//! Adding a new entity kind only requires a table and a typed model in `entities`.

/// Key/value storage backends
pub mod backend;
/// Schema registry and whole-collection read/write
pub mod adapter;
/// Typed entity models and their tables
pub mod entities;
/// Storage string formatters
pub mod formatter;
/// Generic entity record
pub mod model;
/// Typed per-entity repositories
pub mod repositories;
/// Schema descriptors
pub mod table;
/// Error and collection types
pub mod types;

pub use adapter::StorageAdapter;
pub use backend::{FileStorageBackend, MemoryStorageBackend, StorageBackend, open_backend};
pub use entities::*;
pub use formatter::JsonFormatter;
pub use model::DatabaseModel;
pub use repositories::*;
pub use table::DatabaseTable;
pub use types::*;
