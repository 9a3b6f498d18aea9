//! Typed entity models.
//!
//! Each entity kind wraps a [`DatabaseModel`] and declares its table. The wrappers only add typed
//! accessors; persistence stays generic and goes through [`crate::database::Repository`].

use crate::database::model::DatabaseModel;
use crate::database::repositories::EntityModel;
use crate::database::table::DatabaseTable;
use crate::database::types::DatabaseError;
use crate::node::{Address, NetworkType, NodeError, NodeInfo};

use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Opaque encryption of secret material, provided by the host application.
pub trait EncryptionService: Send + Sync {
    fn encrypt(&self, data: &str, password: &str) -> Result<String, DatabaseError>;
    fn decrypt(&self, data: &str, password: &str) -> Result<String, DatabaseError>;
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// All tables known to the client, keyed by schema id.
pub fn default_schemas() -> HashMap<String, DatabaseTable> {
    HashMap::from([
        (AccountsModel::SCHEMA.to_string(), AccountsModel::table()),
        (WalletsModel::SCHEMA.to_string(), WalletsModel::table()),
        (PeersModel::SCHEMA.to_string(), PeersModel::table()),
        (SettingsModel::SCHEMA.to_string(), SettingsModel::table()),
    ])
}

/// A user account grouping several wallets behind one password.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountsModel(DatabaseModel);

impl EntityModel for AccountsModel {
    const SCHEMA: &'static str = "accounts";

    fn table() -> DatabaseTable {
        DatabaseTable::new(
            Self::SCHEMA,
            &[
                "accountName",
                "wallets",
                "password",
                "hint",
                "networkType",
                "seed",
                "generationHash",
            ],
            &["accountName"],
        )
    }

    fn from_model(model: DatabaseModel) -> Self {
        Self(model)
    }

    fn model(&self) -> &DatabaseModel {
        &self.0
    }

    fn into_model(self) -> DatabaseModel {
        self.0
    }
}

impl AccountsModel {
    /// Create a new account. The password is only ever stored encrypted with itself.
    pub fn create(
        account_name: &str,
        password: &str,
        hint: &str,
        network_type: NetworkType,
        encryption: &dyn EncryptionService,
    ) -> Result<Self, DatabaseError> {
        let encrypted = encryption.encrypt(password, password)?;
        let mut model = Self::table().empty_model();
        model.set_values(object(json!({
            "accountName": account_name,
            "wallets": [],
            "password": encrypted,
            "hint": hint,
            "networkType": network_type.as_u8(),
        })));
        Ok(Self(model))
    }

    pub fn account_name(&self) -> Option<&str> {
        self.0.get_str("accountName")
    }

    pub fn hint(&self) -> Option<&str> {
        self.0.get_str("hint")
    }

    pub fn network_type(&self) -> Option<NetworkType> {
        self.0
            .get_u64("networkType")
            .and_then(|n| u8::try_from(n).ok())
            .and_then(NetworkType::from_u8)
    }

    pub fn wallet_ids(&self) -> Vec<String> {
        self.0
            .get("wallets")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attach a wallet id to the account. Returns false if it was already attached.
    pub fn add_wallet_id(&mut self, wallet_id: &str) -> bool {
        let mut ids = self.wallet_ids();
        if ids.iter().any(|id| id == wallet_id) {
            return false;
        }
        ids.push(wallet_id.to_string());
        self.0.set_field("wallets", json!(ids));
        true
    }

    /// Check a password against the stored (encrypted) one.
    pub fn verify_password(&self, password: &str, encryption: &dyn EncryptionService) -> bool {
        self.0
            .get_str("password")
            .and_then(|stored| encryption.decrypt(stored, password).ok())
            .is_some_and(|plain| plain == password)
    }
}

/// A wallet (key pair reference) attached to an account.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletsModel(DatabaseModel);

impl EntityModel for WalletsModel {
    const SCHEMA: &'static str = "wallets";

    fn table() -> DatabaseTable {
        DatabaseTable::new(
            Self::SCHEMA,
            &[
                "id",
                "accountName",
                "name",
                "type",
                "address",
                "publicKey",
                "path",
                "isMultisig",
                "encPrivate",
            ],
            &["id"],
        )
    }

    fn from_model(model: DatabaseModel) -> Self {
        Self(model)
    }

    fn model(&self) -> &DatabaseModel {
        &self.0
    }

    fn into_model(self) -> DatabaseModel {
        self.0
    }
}

impl WalletsModel {
    pub fn new(
        id: &str,
        account_name: &str,
        name: &str,
        address: &Address,
        public_key: &str,
    ) -> Self {
        let mut model = Self::table().empty_model();
        model.set_values(object(json!({
            "id": id,
            "accountName": account_name,
            "name": name,
            "type": "seed",
            "address": address.plain(),
            "publicKey": public_key,
            "isMultisig": false,
        })));
        Self(model)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get_str("id")
    }

    pub fn account_name(&self) -> Option<&str> {
        self.0.get_str("accountName")
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get_str("name")
    }

    pub fn public_key(&self) -> Option<&str> {
        self.0.get_str("publicKey")
    }

    /// Parsed address of the wallet.
    pub fn address(&self) -> Result<Address, NodeError> {
        let raw = self.0.get_str("address").unwrap_or_default();
        Address::parse(raw)
    }

    pub fn is_multisig(&self) -> bool {
        self.0.get_bool("isMultisig").unwrap_or(false)
    }

    pub fn set_multisig(&mut self, is_multisig: bool) {
        self.0.set_field("isMultisig", is_multisig);
    }
}

/// A known node endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PeersModel(DatabaseModel);

impl EntityModel for PeersModel {
    const SCHEMA: &'static str = "peers";

    fn table() -> DatabaseTable {
        DatabaseTable::new(
            Self::SCHEMA,
            &[
                "rest_url",
                "host",
                "port",
                "protocol",
                "networkType",
                "generationHash",
                "roles",
                "is_default",
                "friendly_name",
            ],
            &["rest_url"],
        )
    }

    fn from_model(model: DatabaseModel) -> Self {
        Self(model)
    }

    fn model(&self) -> &DatabaseModel {
        &self.0
    }

    fn into_model(self) -> DatabaseModel {
        self.0
    }
}

impl PeersModel {
    /// Build a peer from its REST URL (`http://host:port`).
    pub fn from_url(rest_url: &str) -> Result<Self, NodeError> {
        let url = reqwest::Url::parse(rest_url)
            .map_err(|e| NodeError::InvalidUrl(format!("{}: {}", rest_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| NodeError::InvalidUrl(format!("{}: missing host", rest_url)))?;
        let port = url.port_or_known_default().unwrap_or(3000);

        let mut model = Self::table().empty_model();
        model.set_values(object(json!({
            "rest_url": normalize_url(rest_url),
            "host": host,
            "port": port,
            "protocol": url.scheme(),
            "is_default": false,
            "friendly_name": host,
        })));
        Ok(Self(model))
    }

    pub fn rest_url(&self) -> Option<&str> {
        self.0.get_str("rest_url")
    }

    pub fn host(&self) -> Option<&str> {
        self.0.get_str("host")
    }

    pub fn generation_hash(&self) -> Option<&str> {
        self.0.get_str("generationHash")
    }

    pub fn is_default(&self) -> bool {
        self.0.get_bool("is_default").unwrap_or(false)
    }

    pub fn set_default(&mut self, is_default: bool) {
        self.0.set_field("is_default", is_default);
    }

    /// Record what the node reported about itself.
    pub fn set_node_info(&mut self, info: &NodeInfo) {
        self.0.set_field("networkType", info.network_identifier);
        self.0
            .set_field("generationHash", info.network_generation_hash_seed.clone());
        self.0.set_field("roles", info.roles);
        if !info.friendly_name.is_empty() {
            self.0.set_field("friendly_name", info.friendly_name.clone());
        }
    }
}

/// Strip trailing slashes so that the same node always maps to the same identifier.
pub fn normalize_url(rest_url: &str) -> String {
    rest_url.trim().trim_end_matches('/').to_string()
}

/// Per-account preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsModel(DatabaseModel);

impl EntityModel for SettingsModel {
    const SCHEMA: &'static str = "settings";

    fn table() -> DatabaseTable {
        DatabaseTable::new(
            Self::SCHEMA,
            &[
                "accountName",
                "language",
                "default_fee",
                "default_wallet",
                "explorer_url",
            ],
            &["accountName"],
        )
    }

    fn from_model(model: DatabaseModel) -> Self {
        Self(model)
    }

    fn model(&self) -> &DatabaseModel {
        &self.0
    }

    fn into_model(self) -> DatabaseModel {
        self.0
    }
}

impl SettingsModel {
    pub fn new(account_name: &str) -> Self {
        let mut model = Self::table().empty_model();
        model.set_values(object(json!({
            "accountName": account_name,
            "language": "en-US",
            "default_fee": 100_000,
            "default_wallet": "",
            "explorer_url": "",
        })));
        Self(model)
    }

    pub fn account_name(&self) -> Option<&str> {
        self.0.get_str("accountName")
    }

    pub fn default_fee(&self) -> u64 {
        self.0.get_u64("default_fee").unwrap_or(0)
    }

    /// Id of the wallet to focus after login, if one was chosen.
    pub fn default_wallet(&self) -> Option<&str> {
        self.0.get_str("default_wallet").filter(|id| !id.is_empty())
    }

    pub fn set_default_wallet(&mut self, wallet_id: &str) {
        self.0.set_field("default_wallet", wallet_id);
    }
}
