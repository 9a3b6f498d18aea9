//! Types exchanged with a remote node.
//!
//! REST responses are parsed from `serde_json::Value` into these structures. Numeric amounts and
//! heights arrive as decimal strings on the wire and are accepted in either form.

use crate::store::StoreError;

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Accept a `u64` encoded either as a JSON number or as a decimal string.
pub(crate) fn u64_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn u64_field(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A base32 account address in its plain (undashed, uppercase) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Length of a plain address.
    pub const LENGTH: usize = 40;

    /// Parse a plain or pretty (dashed) address.
    pub fn parse(raw: &str) -> Result<Self, NodeError> {
        let plain: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if plain.len() != Self::LENGTH {
            return Err(NodeError::InvalidAddress(format!(
                "'{}' has {} characters, expected {}",
                raw,
                plain.len(),
                Self::LENGTH
            )));
        }
        if !plain.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)) {
            return Err(NodeError::InvalidAddress(format!(
                "'{}' is not base32",
                raw
            )));
        }

        Ok(Self(plain))
    }

    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn plain(&self) -> &str {
        &self.0
    }

    /// Dashed form, six characters per group.
    pub fn pretty(&self) -> String {
        self.0
            .chars()
            .chunks(6)
            .into_iter()
            .map(|chunk| chunk.collect::<String>())
            .join("-")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = NodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Network an account or node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    MainNet,
    TestNet,
    Private,
    PrivateTest,
}

impl NetworkType {
    pub fn as_u8(&self) -> u8 {
        match self {
            NetworkType::MainNet => 104,
            NetworkType::TestNet => 152,
            NetworkType::Private => 120,
            NetworkType::PrivateTest => 168,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            104 => Some(NetworkType::MainNet),
            152 => Some(NetworkType::TestNet),
            120 => Some(NetworkType::Private),
            168 => Some(NetworkType::PrivateTest),
            _ => None,
        }
    }
}

impl FromStr for NetworkType {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkType::MainNet),
            "testnet" => Ok(NetworkType::TestNet),
            "private" => Ok(NetworkType::Private),
            "private_test" | "privatetest" => Ok(NetworkType::PrivateTest),
            other => Err(NodeError::InvalidNetwork(other.to_string())),
        }
    }
}

/// Public key together with the address derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAccount {
    pub public_key: String,
    pub address: Address,
}

/// Lifecycle stage of a transaction as observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionGroup {
    Confirmed,
    Unconfirmed,
    Partial,
}

impl TransactionGroup {
    pub const ALL: [TransactionGroup; 3] = [
        TransactionGroup::Confirmed,
        TransactionGroup::Unconfirmed,
        TransactionGroup::Partial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionGroup::Confirmed => "confirmed",
            TransactionGroup::Unconfirmed => "unconfirmed",
            TransactionGroup::Partial => "partial",
        }
    }

    /// Position in the lifecycle: partial < unconfirmed < confirmed.
    pub fn stage(&self) -> u8 {
        match self {
            TransactionGroup::Partial => 0,
            TransactionGroup::Unconfirmed => 1,
            TransactionGroup::Confirmed => 2,
        }
    }
}

impl fmt::Display for TransactionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionGroup {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(TransactionGroup::Confirmed),
            "unconfirmed" => Ok(TransactionGroup::Unconfirmed),
            "partial" => Ok(TransactionGroup::Partial),
            other => Err(StoreError::InvalidGroup(other.to_string())),
        }
    }
}

/// A transaction as reported by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    pub hash: String,
    /// Block height, `None` until the transaction is confirmed.
    pub height: Option<u64>,
    /// Position within the block (or within the node's pool for pending transactions).
    pub index: u32,
    pub transaction_type: u16,
    pub signer_public_key: String,
    /// Raw transaction body as returned by the node.
    pub body: Value,
}

impl TransactionData {
    /// Parse a `{"meta": {...}, "transaction": {...}}` document.
    pub fn from_rest(value: &Value) -> Result<Self, NodeError> {
        let meta = value
            .get("meta")
            .ok_or_else(|| NodeError::InvalidPayload("transaction without meta".to_string()))?;
        let body = value.get("transaction").cloned().unwrap_or(Value::Null);

        // Aggregate inner transactions only carry the parent hash
        let hash = meta
            .get("hash")
            .or_else(|| meta.get("aggregateHash"))
            .and_then(Value::as_str)
            .filter(|hash| !hash.is_empty())
            .ok_or_else(|| NodeError::InvalidPayload("transaction without hash".to_string()))?
            .to_string();

        Ok(Self {
            hash,
            height: u64_field(meta, "height").filter(|height| *height > 0),
            index: u64_field(meta, "index")
                .and_then(|index| u32::try_from(index).ok())
                .unwrap_or(0),
            transaction_type: u64_field(&body, "type")
                .and_then(|t| u16::try_from(t).ok())
                .unwrap_or(0),
            signer_public_key: str_field(&body, "signerPublicKey"),
            body,
        })
    }
}

/// Amount of a mosaic held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicBalance {
    pub id: String,
    #[serde(deserialize_with = "u64_from_any")]
    pub amount: u64,
}

/// Account state returned by `GET /accounts/{address}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: Address,
    pub public_key: String,
    pub mosaics: Vec<MosaicBalance>,
    pub importance: u64,
}

impl AccountInfo {
    pub fn from_rest(address: &Address, value: &Value) -> Result<Self, NodeError> {
        let account = value.get("account").ok_or(NodeError::NoData)?;
        let mosaics = match account.get("mosaics") {
            Some(mosaics) => serde_json::from_value(mosaics.clone())?,
            None => Vec::new(),
        };

        Ok(Self {
            address: address.clone(),
            public_key: str_field(account, "publicKey"),
            mosaics,
            importance: u64_field(account, "importance").unwrap_or(0),
        })
    }

    /// Balance of a mosaic, zero if the account does not hold it.
    pub fn balance(&self, mosaic_id: &str) -> u64 {
        self.mosaics
            .iter()
            .find(|mosaic| mosaic.id.eq_ignore_ascii_case(mosaic_id))
            .map(|mosaic| mosaic.amount)
            .unwrap_or(0)
    }
}

/// A mosaic definition owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MosaicInfo {
    pub id: String,
    #[serde(deserialize_with = "u64_from_any")]
    pub supply: u64,
    #[serde(default)]
    pub divisibility: u8,
    #[serde(default)]
    pub owner_address: String,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub start_height: u64,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub duration: u64,
}

/// A namespace owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub id: String,
    pub depth: u8,
    pub active: bool,
    pub start_height: u64,
    pub end_height: u64,
}

impl NamespaceInfo {
    /// Parse a `{"meta": {...}, "namespace": {...}}` document.
    pub fn from_rest(value: &Value) -> Result<Self, NodeError> {
        let namespace = value.get("namespace").ok_or(NodeError::NoData)?;
        let depth = u64_field(namespace, "depth")
            .and_then(|depth| u8::try_from(depth).ok())
            .unwrap_or(1)
            .max(1);
        let id = str_field(namespace, &format!("level{}", depth - 1));
        if id.is_empty() {
            return Err(NodeError::InvalidPayload(
                "namespace without id".to_string(),
            ));
        }

        Ok(Self {
            id,
            depth,
            active: value
                .get("meta")
                .and_then(|meta| meta.get("active"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            start_height: u64_field(namespace, "startHeight").unwrap_or(0),
            end_height: u64_field(namespace, "endHeight").unwrap_or(0),
        })
    }
}

/// Multisig configuration of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigInfo {
    pub account_address: String,
    pub min_approval: u32,
    pub min_removal: u32,
    #[serde(default)]
    pub cosignatory_addresses: Vec<String>,
    #[serde(default)]
    pub multisig_addresses: Vec<String>,
}

impl MultisigInfo {
    /// True if the account requires cosignatures.
    pub fn is_multisig(&self) -> bool {
        self.min_approval > 0 && !self.cosignatory_addresses.is_empty()
    }
}

/// Self-description of a node returned by `GET /node/info`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeInfo {
    pub public_key: String,
    pub network_generation_hash_seed: String,
    pub network_identifier: u8,
    pub roles: u32,
    pub port: u16,
    pub host: String,
    pub friendly_name: String,
}

impl NodeInfo {
    pub fn network_type(&self) -> Option<NetworkType> {
        NetworkType::from_u8(self.network_identifier)
    }
}

/// A transaction signed locally, ready to be announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Hex-encoded serialized transaction.
    pub payload: String,
    /// Hex-encoded transaction hash.
    pub hash: String,
    pub signer_public_key: String,
    pub network_type: NetworkType,
}

impl SignedTransaction {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.payload.is_empty() || hex::decode(&self.payload).is_err() {
            return Err(NodeError::InvalidPayload(
                "payload is not a hex string".to_string(),
            ));
        }
        match hex::decode(&self.hash) {
            Ok(bytes) if bytes.len() == 32 => Ok(()),
            _ => Err(NodeError::InvalidPayload(format!(
                "invalid transaction hash '{}'",
                self.hash
            ))),
        }
    }
}

/// Paging parameters for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page_size: u32,
    pub page_number: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page_size: 100,
            page_number: 1,
        }
    }
}

/// Error types for node communication
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Node rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown network type: {0}")]
    InvalidNetwork(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("No data returned")]
    NoData,

    #[error("Listener error: {0}")]
    ListenerError(String),
}
