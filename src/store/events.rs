//! Application event bus.
//!
//! Stores publish cross-component notifications here (login, wallet change, node change).
//! Delivery is fire-and-forget: publishing with no subscriber is not an error, and a subscriber
//! that falls behind loses the oldest events.

use crate::node::Address;

use tokio::sync::broadcast;
use tracing::debug;

const EVENT_BUS_CAPACITY: usize = 64;

/// Notifications published by the stores.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// An account was unlocked.
    Login { account_name: String },
    /// The focused wallet changed.
    WalletChange {
        wallet_id: Option<String>,
        address: Address,
    },
    /// The current node changed.
    NewConnection { rest_url: String },
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::Login { .. } => "onLogin",
            AppEvent::WalletChange { .. } => "onWalletChange",
            AppEvent::NewConnection { .. } => "newConnection",
        }
    }
}

/// Process-wide publish/subscribe channel for [`AppEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Publish an event to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: AppEvent) -> usize {
        let name = event.name();
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!("Published {} to {} subscribers", name, delivered);
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}
