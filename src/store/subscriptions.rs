//! Listener subscriptions per tracked address.

use crate::node::{Address, ChannelSubscription, Listener};

use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::debug;

/// One listener connection with its channel handles and the task forwarding its events.
pub struct Subscription {
    listener: Box<dyn Listener>,
    handles: Vec<Box<dyn ChannelSubscription>>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        listener: Box<dyn Listener>,
        handles: Vec<Box<dyn ChannelSubscription>>,
        pump: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            listener,
            handles,
            pump,
        }
    }

    pub fn topics(&self) -> Vec<&str> {
        self.handles.iter().map(|handle| handle.topic()).collect()
    }

    /// Cancel every channel handle, then close the listener, then stop the event task.
    pub async fn teardown(self) {
        for handle in &self.handles {
            handle.cancel().await;
        }
        self.listener.close().await;
        if let Some(pump) = self.pump {
            pump.abort();
        }
        debug!("Tore down {} channel subscriptions", self.handles.len());
    }
}

/// Registry of open subscriptions keyed by address.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<Address, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, subscription: Subscription) {
        self.entries.entry(address).or_default().push(subscription);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Remove the entry of `address`. The caller tears the returned subscriptions down.
    pub fn take(&mut self, address: &Address) -> Vec<Subscription> {
        self.entries.remove(address).unwrap_or_default()
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> Vec<(Address, Vec<Subscription>)> {
        self.entries.drain().collect()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
