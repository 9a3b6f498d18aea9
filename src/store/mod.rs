//! Client-side synchronization stores.
//!
//! A [`WalletStore`] mirrors the focused wallet and a [`NetworkStore`] tracks the current node.
//! Both serialize their initialize and uninitialize sequences through an [`AwaitLock`], and both
//! publish cross-component notifications on a shared [`EventBus`].

pub mod events;
pub mod lock;
pub mod network;
pub mod subscriptions;
pub mod transactions;
pub mod types;
pub mod wallet;

#[cfg(test)]
pub mod test_utils;

pub use events::{AppEvent, EventBus};
pub use lock::AwaitLock;
pub use network::{NetworkState, NetworkStore};
pub use transactions::{AddOutcome, TransactionLedger};
pub use types::*;
pub use wallet::{WalletState, WalletStore};
