//! Client core that keeps local wallet and network state in sync with a remote node.
//!
//! - `database`: local persistence of accounts, wallets, peers and settings.
//! - `node`: the remote node contract with its REST and WebSocket implementation.
//! - `store`: the wallet and network synchronization stores.

/// Environment configuration
pub mod config;
/// Local persistence and entity modeling
pub mod database;
/// Remote node integration
pub mod node;
/// Synchronization stores
pub mod store;
/// Formatting helpers
pub mod utils;
