//!
//! WebSocket push listener.
//!
//! The node greets every connection with `{"uid": "..."}`. Channels are then registered by
//! sending `{"uid", "subscribe": topic}` and dropped with `{"uid", "unsubscribe": topic}`; pushed
//! events arrive as `{"topic", "data"}`. A spawned task owns the socket and forwards parsed events
//! to the listener's event sender.

use super::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

enum Command {
	Send(String),
	Close,
}

/// Push listener over a node WebSocket.
pub struct WsListener {
	uid: String,
	commands: mpsc::UnboundedSender<Command>,
	open: Arc<AtomicBool>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl WsListener {
	/// Connect and wait for the node's `uid` greeting.
	///
	/// # Arguments
	/// * `ws_url` - The WebSocket endpoint, e.g. `ws://localhost:3000/ws`.
	/// * `events` - Where parsed push events are delivered.
	pub async fn connect(ws_url: &str, events: EventSender) -> Result<Self, NodeError> {
		debug!("Attempting WebSocket connection to: {}", ws_url);

		let (ws_stream, response) = connect_async(ws_url).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		// Wait for the uid greeting
		let uid = match ws_receiver.next().await {
			Some(msg) => match msg? {
				Message::Text(text) => {
					let parsed: Value = serde_json::from_str(&text)?;
					parsed
						.get("uid")
						.and_then(Value::as_str)
						.map(str::to_string)
						.ok_or_else(|| {
							NodeError::ListenerError("Greeting without uid".to_string())
						})?
				}
				_ => {
					return Err(NodeError::ListenerError(
						"Unexpected message type during handshake".to_string(),
					));
				}
			},
			None => {
				return Err(NodeError::ListenerError(
					"Connection closed during handshake".to_string(),
				));
			}
		};
		info!("Listener connected with uid {}", uid);

		let (commands, mut command_receiver) = mpsc::unbounded_channel();
		let open = Arc::new(AtomicBool::new(true));
		let task_open = open.clone();

		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					command = command_receiver.recv() => match command {
						Some(Command::Send(text)) => {
							if let Err(e) = ws_sender.send(Message::Text(text)).await {
								error!("Failed to send listener command: {}", e);
								break;
							}
						}
						Some(Command::Close) | None => {
							let _ = ws_sender.close().await;
							break;
						}
					},
					msg = ws_receiver.next() => match msg {
						Some(Ok(Message::Text(text))) => match parse_message(&text) {
							Ok(Some(message)) => {
								if events.send(message).is_err() {
									debug!("Event receiver dropped, stopping listener");
									break;
								}
							}
							Ok(None) => {}
							Err(e) => warn!("Ignoring malformed push message: {}", e),
						},
						Some(Ok(Message::Close(_))) | None => {
							info!("Listener connection closed by node");
							break;
						}
						Some(Ok(_)) => {}
						Some(Err(e)) => {
							error!("Listener connection error: {}", e);
							break;
						}
					},
				}
			}
			task_open.store(false, Ordering::SeqCst);
		});

		Ok(Self {
			uid,
			commands,
			open,
			task: Mutex::new(Some(task)),
		})
	}

	pub fn uid(&self) -> &str {
		&self.uid
	}

	fn send(&self, body: Value) -> Result<(), NodeError> {
		self.commands
			.send(Command::Send(body.to_string()))
			.map_err(|_| NodeError::ListenerError("Listener is closed".to_string()))
	}
}

#[async_trait::async_trait]
impl Listener for WsListener {
	async fn subscribe(
		&self,
		channel: Channel,
		address: Option<&Address>,
	) -> Result<Box<dyn ChannelSubscription>, NodeError> {
		if !self.is_open() {
			return Err(NodeError::ListenerError("Listener is closed".to_string()));
		}

		let topic = channel.topic(address);
		self.send(json!({ "uid": self.uid, "subscribe": topic }))?;
		debug!("Subscribed to {}", topic);

		Ok(Box::new(WsChannelSubscription {
			uid: self.uid.clone(),
			topic,
			commands: self.commands.clone(),
			cancelled: AtomicBool::new(false),
		}))
	}

	async fn close(&self) {
		let Some(task) = self.task.lock().await.take() else {
			return;
		};

		let _ = self.commands.send(Command::Close);
		if let Err(e) = task.await {
			warn!("Listener task ended abnormally: {}", e);
		}
		self.open.store(false, Ordering::SeqCst);
		info!("Listener {} closed", self.uid);
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}
}

/// One registered topic on a [`WsListener`].
pub struct WsChannelSubscription {
	uid: String,
	topic: String,
	commands: mpsc::UnboundedSender<Command>,
	cancelled: AtomicBool,
}

#[async_trait::async_trait]
impl ChannelSubscription for WsChannelSubscription {
	fn topic(&self) -> &str {
		&self.topic
	}

	async fn cancel(&self) {
		if self.cancelled.swap(true, Ordering::SeqCst) {
			return;
		}
		let body = json!({ "uid": self.uid, "unsubscribe": self.topic });
		// The connection may already be gone, in which case there is nothing to unsubscribe from
		if self.commands.send(Command::Send(body.to_string())).is_ok() {
			debug!("Unsubscribed from {}", self.topic);
		}
	}
}

fn hash_of(data: &Value) -> Option<String> {
	data.get("meta")
		.and_then(|meta| meta.get("hash"))
		.or_else(|| data.get("hash"))
		.and_then(Value::as_str)
		.map(str::to_string)
}

/// Parse one pushed frame. Greetings and unknown topics yield `None`.
pub(crate) fn parse_message(text: &str) -> Result<Option<ListenerMessage>, NodeError> {
	let parsed: Value = serde_json::from_str(text)?;

	let Some(topic) = parsed.get("topic").and_then(Value::as_str) else {
		return Ok(None);
	};
	let Some((channel, address)) = Channel::from_topic(topic) else {
		debug!("Ignoring message for topic: {}", topic);
		return Ok(None);
	};
	let data = parsed.get("data").ok_or(NodeError::NoData)?;

	let missing_hash = || NodeError::InvalidPayload(format!("{} message without hash", topic));
	let event = match channel {
		Channel::Block => {
			let height = data
				.get("block")
				.and_then(|block| block.get("height"))
				.and_then(|height| match height {
					Value::String(s) => s.parse().ok(),
					other => other.as_u64(),
				})
				.ok_or_else(|| NodeError::InvalidPayload("block without height".to_string()))?;
			ListenerEvent::NewBlock { height }
		}
		Channel::ConfirmedAdded => ListenerEvent::ConfirmedAdded(TransactionData::from_rest(data)?),
		Channel::UnconfirmedAdded => {
			ListenerEvent::UnconfirmedAdded(TransactionData::from_rest(data)?)
		}
		Channel::PartialAdded => ListenerEvent::PartialAdded(TransactionData::from_rest(data)?),
		Channel::UnconfirmedRemoved => {
			ListenerEvent::UnconfirmedRemoved(hash_of(data).ok_or_else(missing_hash)?)
		}
		Channel::PartialRemoved => {
			ListenerEvent::PartialRemoved(hash_of(data).ok_or_else(missing_hash)?)
		}
		Channel::Status => ListenerEvent::Status {
			hash: hash_of(data).ok_or_else(missing_hash)?,
			code: data
				.get("code")
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_string(),
		},
	};

	Ok(Some(ListenerMessage { address, event }))
}
