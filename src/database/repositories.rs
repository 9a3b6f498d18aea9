use crate::database::adapter::StorageAdapter;
use crate::database::entities::{AccountsModel, PeersModel, SettingsModel, WalletsModel};
use crate::database::model::DatabaseModel;
use crate::database::table::DatabaseTable;
use crate::database::types::{DatabaseError, Entities};

use std::marker::PhantomData;
use std::sync::Arc;

/// A typed entity kind that can be persisted through a [`Repository`].
pub trait EntityModel: Clone + Send + Sync + 'static {
    /// Schema id the entity's table is registered under.
    const SCHEMA: &'static str;

    fn table() -> DatabaseTable;
    fn from_model(model: DatabaseModel) -> Self;
    fn model(&self) -> &DatabaseModel;
    fn into_model(self) -> DatabaseModel;
}

/// Typed facade over the storage adapter for one entity kind.
///
/// The adapter only reads and writes whole collections, so every mutation here is a
/// read-modify-write of the full collection.
pub struct Repository<M: EntityModel> {
    adapter: Arc<StorageAdapter>,
    _marker: PhantomData<M>,
}

impl<M: EntityModel> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            _marker: PhantomData,
        }
    }
}

pub type AccountsRepository = Repository<AccountsModel>;
pub type WalletsRepository = Repository<WalletsModel>;
pub type PeersRepository = Repository<PeersModel>;
pub type SettingsRepository = Repository<SettingsModel>;

impl<M: EntityModel> Repository<M> {
    pub fn new(adapter: Arc<StorageAdapter>) -> Self {
        Self {
            adapter,
            _marker: PhantomData,
        }
    }

    /// Every stored entity keyed by identifier. Empty storage yields an empty collection.
    pub async fn entries(&self) -> Result<Entities<M>, DatabaseError> {
        let entities = self.adapter.read(M::SCHEMA).await?;
        Ok(entities
            .into_iter()
            .map(|(identifier, model)| (identifier, M::from_model(model)))
            .collect())
    }

    pub async fn find(&self, identifier: &str) -> Result<bool, DatabaseError> {
        Ok(self.adapter.read(M::SCHEMA).await?.contains_key(identifier))
    }

    pub async fn read(&self, identifier: &str) -> Result<M, DatabaseError> {
        self.entries()
            .await?
            .shift_remove(identifier)
            .ok_or_else(|| DatabaseError::NotFound {
                table: M::SCHEMA.to_string(),
                identifier: identifier.to_string(),
            })
    }

    /// Stored entities in insertion order.
    pub async fn collect(&self) -> Result<Vec<M>, DatabaseError> {
        Ok(self.entries().await?.into_values().collect())
    }

    /// Insert or replace the entity stored under `identifier`.
    pub async fn store(&self, identifier: &str, entity: M) -> Result<usize, DatabaseError> {
        let model = entity.into_model();
        self.adapter
            .update(M::SCHEMA, |entities| {
                entities.insert(identifier.to_string(), model);
                Ok(entities.len())
            })
            .await
    }

    /// Store an entity under its own identifier, returning that identifier.
    pub async fn create(&self, entity: M) -> Result<String, DatabaseError> {
        let identifier = entity.model().get_identifier()?;
        self.store(&identifier, entity).await?;
        Ok(identifier)
    }

    /// Remove an entity. Returns false if nothing was stored under `identifier`.
    pub async fn delete(&self, identifier: &str) -> Result<bool, DatabaseError> {
        self.adapter
            .update(M::SCHEMA, |entities| {
                Ok(entities.shift_remove(identifier).is_some())
            })
            .await
    }
}

impl Repository<WalletsModel> {
    /// Wallets attached to an account, in insertion order.
    pub async fn wallets_for_account(
        &self,
        account_name: &str,
    ) -> Result<Vec<WalletsModel>, DatabaseError> {
        Ok(self
            .collect()
            .await?
            .into_iter()
            .filter(|wallet| wallet.account_name() == Some(account_name))
            .collect())
    }
}

impl Repository<PeersModel> {
    /// The peer flagged as default, if any.
    pub async fn default_peer(&self) -> Result<Option<PeersModel>, DatabaseError> {
        Ok(self.collect().await?.into_iter().find(PeersModel::is_default))
    }
}
