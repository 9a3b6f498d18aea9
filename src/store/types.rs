//! Types shared by the synchronization stores

use crate::database::{DatabaseError, WalletsModel};
use crate::node::{Address, NodeError, PublicAccount, SignedTransaction};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Error types for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid transaction group: {0}")]
    InvalidGroup(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Network error: {0}")]
    NetworkError(#[from] NodeError),

    #[error("No wallet selected")]
    NoCurrentWallet,

    #[error("Store not initialized")]
    NotInitialized,
}

/// Outcome of announcing a signed transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastResult {
    pub transaction: SignedTransaction,
    pub success: bool,
    pub error_message: Option<String>,
}

impl BroadcastResult {
    pub fn accepted(transaction: SignedTransaction) -> Self {
        Self {
            transaction,
            success: true,
            error_message: None,
        }
    }

    pub fn rejected(transaction: SignedTransaction, error: impl ToString) -> Self {
        Self {
            transaction,
            success: false,
            error_message: Some(error.to_string()),
        }
    }
}

/// Options of `WalletStore::set_current_wallet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetWalletOptions {
    /// Only the address is needed: keep previous subscriptions and skip history fetches.
    pub is_cosignatory_mode: bool,
}

/// Anything an address can be taken from.
#[derive(Debug, Clone)]
pub enum AddressSource {
    Raw(String),
    PublicAccount(PublicAccount),
    Wallet(WalletsModel),
}

impl AddressSource {
    pub fn resolve(&self) -> Result<Address, NodeError> {
        match self {
            AddressSource::Raw(raw) => Address::parse(raw),
            AddressSource::PublicAccount(account) => Ok(account.address.clone()),
            AddressSource::Wallet(wallet) => wallet.address(),
        }
    }
}

impl From<&str> for AddressSource {
    fn from(raw: &str) -> Self {
        AddressSource::Raw(raw.to_string())
    }
}

impl From<String> for AddressSource {
    fn from(raw: String) -> Self {
        AddressSource::Raw(raw)
    }
}

impl From<&Address> for AddressSource {
    fn from(address: &Address) -> Self {
        AddressSource::Raw(address.plain().to_string())
    }
}

impl From<PublicAccount> for AddressSource {
    fn from(account: PublicAccount) -> Self {
        AddressSource::PublicAccount(account)
    }
}

impl From<WalletsModel> for AddressSource {
    fn from(wallet: WalletsModel) -> Self {
        AddressSource::Wallet(wallet)
    }
}

/// A transaction signed locally but not yet observed on chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTransaction {
    pub signed: SignedTransaction,
    pub staged_at: DateTime<Utc>,
}

impl StagedTransaction {
    pub fn new(signed: SignedTransaction) -> Self {
        Self {
            signed,
            staged_at: Utc::now(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.signed.hash
    }
}
