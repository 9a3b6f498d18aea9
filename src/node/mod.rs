//! Remote node integration
//!
//! This module defines the contract the synchronization stores use to talk to a node
//! (`RemoteLedgerService`, `Listener`, `ChannelSubscription`) and one concrete implementation
//! speaking the node's REST API over `reqwest` and its push channels over a WebSocket.

/// REST client for a node
mod client;
/// WebSocket push listener
mod listener;
/// Type definitions for node data structures
mod types;

pub use client::{NodeClient, NodeClientFactory, websocket_url};
pub use listener::{WsChannelSubscription, WsListener};
pub use types::*;

use std::sync::Arc;
use tokio::sync::mpsc;

/// Divisibility of the network currency mosaic.
pub const NETWORK_CURRENCY_DIVISIBILITY: u32 = 6;

/// Push channels a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
	Block,
	ConfirmedAdded,
	UnconfirmedAdded,
	UnconfirmedRemoved,
	PartialAdded,
	PartialRemoved,
	Status,
}

impl Channel {
	/// Channels opened for every tracked address.
	pub const ADDRESS_CHANNELS: [Channel; 7] = [
		Channel::Block,
		Channel::ConfirmedAdded,
		Channel::UnconfirmedAdded,
		Channel::UnconfirmedRemoved,
		Channel::PartialAdded,
		Channel::PartialRemoved,
		Channel::Status,
	];

	pub fn name(&self) -> &'static str {
		match self {
			Channel::Block => "block",
			Channel::ConfirmedAdded => "confirmedAdded",
			Channel::UnconfirmedAdded => "unconfirmedAdded",
			Channel::UnconfirmedRemoved => "unconfirmedRemoved",
			Channel::PartialAdded => "partialAdded",
			Channel::PartialRemoved => "partialRemoved",
			Channel::Status => "status",
		}
	}

	/// Whether the channel is scoped to an address.
	pub fn is_address_scoped(&self) -> bool {
		!matches!(self, Channel::Block)
	}

	/// Wire topic, `<name>/<address>` for address-scoped channels.
	pub fn topic(&self, address: Option<&Address>) -> String {
		match address {
			Some(address) if self.is_address_scoped() => {
				format!("{}/{}", self.name(), address.plain())
			}
			_ => self.name().to_string(),
		}
	}

	/// Split a wire topic into its channel and optional address.
	pub fn from_topic(topic: &str) -> Option<(Channel, Option<Address>)> {
		let (name, address) = match topic.split_once('/') {
			Some((name, address)) => (name, Address::parse(address).ok()),
			None => (topic, None),
		};
		let channel = Channel::ADDRESS_CHANNELS
			.into_iter()
			.find(|channel| channel.name() == name)?;
		Some((channel, address))
	}
}

/// An event pushed by the node.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
	NewBlock { height: u64 },
	ConfirmedAdded(TransactionData),
	UnconfirmedAdded(TransactionData),
	UnconfirmedRemoved(String),
	PartialAdded(TransactionData),
	PartialRemoved(String),
	Status { hash: String, code: String },
}

/// A pushed event together with the address its topic was scoped to.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerMessage {
	pub address: Option<Address>,
	pub event: ListenerEvent,
}

/// Where a listener delivers its events.
pub type EventSender = mpsc::UnboundedSender<ListenerMessage>;

/// Contract of a remote node.
#[async_trait::async_trait]
pub trait RemoteLedgerService: Send + Sync {
	/// Base REST URL of the node.
	fn base_url(&self) -> &str;

	async fn account_info(&self, address: &Address) -> Result<AccountInfo, NodeError>;

	/// One page of transactions of a group involving `address`, newest first.
	async fn transactions(
		&self,
		address: &Address,
		group: TransactionGroup,
		page: PageQuery,
	) -> Result<Vec<TransactionData>, NodeError>;

	async fn owned_mosaics(&self, address: &Address) -> Result<Vec<MosaicInfo>, NodeError>;

	async fn owned_namespaces(&self, address: &Address) -> Result<Vec<NamespaceInfo>, NodeError>;

	/// Multisig configuration, `None` if the account has none.
	async fn multisig_info(&self, address: &Address) -> Result<Option<MultisigInfo>, NodeError>;

	async fn node_info(&self) -> Result<NodeInfo, NodeError>;

	async fn chain_height(&self) -> Result<u64, NodeError>;

	/// Announce a complete transaction. Returns the node's acknowledgement message.
	async fn announce(&self, signed: &SignedTransaction) -> Result<String, NodeError>;

	/// Announce an aggregate that still needs cosignatures.
	async fn announce_partial(&self, signed: &SignedTransaction) -> Result<String, NodeError>;

	/// Open a push listener delivering into `events`.
	async fn open_listener(&self, events: EventSender) -> Result<Box<dyn Listener>, NodeError>;
}

/// An open push connection.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
	/// Register a channel, scoped to `address` when the channel supports it.
	async fn subscribe(
		&self,
		channel: Channel,
		address: Option<&Address>,
	) -> Result<Box<dyn ChannelSubscription>, NodeError>;

	/// Close the connection. Closing twice is a no-op.
	async fn close(&self);

	fn is_open(&self) -> bool;
}

/// Handle of one channel registration.
#[async_trait::async_trait]
pub trait ChannelSubscription: Send + Sync {
	fn topic(&self) -> &str;

	/// Stop receiving events for the topic.
	async fn cancel(&self);
}

/// Creates a service handle for a node URL.
pub trait LedgerServiceFactory: Send + Sync {
	fn create(&self, base_url: &str) -> Result<Arc<dyn RemoteLedgerService>, NodeError>;
}
