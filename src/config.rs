//! Runtime configuration read from the environment.

use crate::node::{NetworkType, websocket_url};

use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_NODE_URL: &str = "http://localhost:3000";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
	/// REST URL of the node used when no peer was chosen yet
	pub node_url: String,
	/// Directory holding the persisted tables
	pub data_dir: PathBuf,
	pub network: NetworkType,
	/// Transactions fetched per group on initialize
	pub page_size: u32,
	/// Account to log into at startup
	pub account: Option<String>,
}

impl Config {
	/// Load configuration from environment variables
	///
	/// - `WALLET_NODE_URL`: node REST endpoint (default `http://localhost:3000`)
	/// - `WALLET_DATA_DIR`: storage directory (default `./data`)
	/// - `WALLET_NETWORK`: `mainnet`, `testnet` (default), `private` or `private_test`
	/// - `WALLET_PAGE_SIZE`: transactions per page (default 100)
	/// - `WALLET_ACCOUNT`: account to log into
	///
	/// Log filtering is left to `RUST_LOG`.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| env::var(key).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let defaults = Self::default();

		let network = match lookup("WALLET_NETWORK") {
			Some(raw) => raw.parse::<NetworkType>().unwrap_or_else(|e| {
				warn!("{}, defaulting to testnet", e);
				defaults.network
			}),
			None => defaults.network,
		};

		let page_size = match lookup("WALLET_PAGE_SIZE") {
			Some(raw) => match raw.trim().parse::<u32>() {
				Ok(size) if size > 0 => size,
				_ => {
					warn!("Invalid WALLET_PAGE_SIZE '{}', using {}", raw, DEFAULT_PAGE_SIZE);
					DEFAULT_PAGE_SIZE
				}
			},
			None => defaults.page_size,
		};

		let config = Self {
			node_url: lookup("WALLET_NODE_URL")
				.map(|url| url.trim_end_matches('/').to_string())
				.unwrap_or(defaults.node_url),
			data_dir: lookup("WALLET_DATA_DIR")
				.map(PathBuf::from)
				.unwrap_or(defaults.data_dir),
			network,
			page_size,
			account: lookup("WALLET_ACCOUNT").filter(|name| !name.is_empty()),
		};
		info!("Node URL: {}", config.node_url);
		config
	}

	/// WebSocket endpoint of the configured node.
	pub fn ws_url(&self) -> String {
		websocket_url(&self.node_url)
	}
}

impl Default for Config {
	fn default() -> Self {
		Self {
			node_url: DEFAULT_NODE_URL.to_string(),
			data_dir: PathBuf::from(DEFAULT_DATA_DIR),
			network: NetworkType::TestNet,
			page_size: DEFAULT_PAGE_SIZE,
			account: None,
		}
	}
}
