//! Network store: current node, connection status, chain height and known peers.

use crate::database::{EntityModel, PeersModel, PeersRepository, normalize_url};
use crate::node::{
    Channel, LedgerServiceFactory, ListenerEvent, ListenerMessage, NetworkType, NodeInfo,
    RemoteLedgerService,
};
use crate::store::events::{AppEvent, EventBus};
use crate::store::lock::AwaitLock;
use crate::store::subscriptions::Subscription;
use crate::store::types::StoreError;

use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct NetworkState {
    pub initialized: bool,
    /// URL requested through `set_current_peer`, preferred over every other source.
    pub selected_url: Option<String>,
    pub current_peer: Option<PeersModel>,
    pub network_type: Option<NetworkType>,
    pub generation_hash: Option<String>,
    pub is_connected: bool,
    pub chain_height: u64,
    pub known_peers: Vec<PeersModel>,
}

impl NetworkState {
    fn apply_node_info(&mut self, peer: PeersModel, node_info: &NodeInfo, height: u64) {
        self.current_peer = Some(peer);
        self.network_type = node_info.network_type();
        self.generation_hash = Some(node_info.network_generation_hash_seed.clone());
        self.chain_height = height;
        self.is_connected = true;
    }

    /// Point at `peer` with nothing known about it yet.
    fn disconnect_from(&mut self, peer: PeersModel) {
        self.current_peer = Some(peer);
        self.network_type = None;
        self.generation_hash = None;
        self.chain_height = 0;
        self.is_connected = false;
    }

    fn apply_event(&mut self, message: ListenerMessage) {
        if let ListenerEvent::NewBlock { height } = message.event {
            if height > self.chain_height {
                self.chain_height = height;
            }
        }
    }
}

pub struct NetworkStore {
    state: RwLock<NetworkState>,
    service: RwLock<Option<Arc<dyn RemoteLedgerService>>>,
    lock: AwaitLock,
    subscription: Mutex<Option<Subscription>>,
    peers: PeersRepository,
    factory: Arc<dyn LedgerServiceFactory>,
    events: EventBus,
    default_url: String,
    expected_network: NetworkType,
}

impl NetworkStore {
    pub fn new(
        peers: PeersRepository,
        factory: Arc<dyn LedgerServiceFactory>,
        events: EventBus,
        default_url: &str,
        expected_network: NetworkType,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(NetworkState::default()),
            service: RwLock::new(None),
            lock: AwaitLock::new(),
            subscription: Mutex::new(None),
            peers,
            factory,
            events,
            default_url: normalize_url(default_url),
            expected_network,
        })
    }

    /// Connect to the selected peer, else the default peer, else the configured URL.
    ///
    /// An unreachable node leaves the store initialized with `is_connected == false`.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), StoreError> {
        self.lock
            .initialize(move || async move {
                if self.state.read().await.initialized {
                    return Ok(());
                }

                let known_peers = self.peers.collect().await?;
                let selected = self.state.read().await.selected_url.clone();
                let url = match selected {
                    Some(url) => url,
                    None => match self.peers.default_peer().await? {
                        Some(peer) => peer
                            .rest_url()
                            .map(str::to_string)
                            .unwrap_or_else(|| self.default_url.clone()),
                        None => self.default_url.clone(),
                    },
                };
                info!("Connecting to node {}", url);

                let service = self.factory.create(&url)?;
                *self.service.write().await = Some(service.clone());

                let (node_info, height) =
                    futures::join!(service.node_info(), service.chain_height());
                let (node_info, height) = match (node_info, height) {
                    (Ok(node_info), Ok(height)) => (node_info, height),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("Node {} unreachable: {}", url, e);
                        let peer = match known_peers
                            .iter()
                            .find(|peer| peer.rest_url() == Some(url.as_str()))
                        {
                            Some(peer) => peer.clone(),
                            None => PeersModel::from_url(&url)?,
                        };
                        let mut state = self.state.write().await;
                        state.disconnect_from(peer);
                        state.known_peers = known_peers;
                        state.initialized = true;
                        return Ok(());
                    }
                };

                if node_info.network_type() != Some(self.expected_network) {
                    warn!(
                        "Node {} reports network {}, expected {:?}",
                        url, node_info.network_identifier, self.expected_network
                    );
                }

                let known = known_peers
                    .iter()
                    .find(|peer| peer.rest_url() == Some(url.as_str()))
                    .cloned();
                let mut peer = match known.clone() {
                    Some(peer) => peer,
                    None => PeersModel::from_url(&url)?,
                };
                peer.set_node_info(&node_info);
                if known.is_some() {
                    let identifier = peer.model().get_identifier()?;
                    self.peers.store(&identifier, peer.clone()).await?;
                }

                let known_peers = self.peers.collect().await?;
                {
                    let mut state = self.state.write().await;
                    state.apply_node_info(peer, &node_info, height);
                    state.known_peers = known_peers;
                }

                if let Err(e) = self.subscribe_blocks(service.as_ref()).await {
                    warn!("Failed to subscribe to blocks of {}: {}", url, e);
                }

                self.state.write().await.initialized = true;
                info!("Connected to {} at height {}", url, height);
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn subscribe_blocks(
        self: &Arc<Self>,
        service: &dyn RemoteLedgerService,
    ) -> Result<(), StoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener = service.open_listener(sender).await?;
        let handle = match listener.subscribe(Channel::Block, None).await {
            Ok(handle) => handle,
            Err(e) => {
                listener.close().await;
                return Err(e.into());
            }
        };

        let pump = tokio::spawn(Self::pump(Arc::downgrade(self), receiver));
        let previous = self
            .subscription
            .lock()
            .await
            .replace(Subscription::new(listener, vec![handle], Some(pump)));
        if let Some(previous) = previous {
            previous.teardown().await;
        }
        Ok(())
    }

    async fn pump(store: Weak<Self>, mut receiver: mpsc::UnboundedReceiver<ListenerMessage>) {
        while let Some(message) = receiver.recv().await {
            let Some(store) = store.upgrade() else {
                break;
            };
            store.state.write().await.apply_event(message);
        }
    }

    /// Close the block subscription and mark the store disconnected.
    pub async fn uninitialize(&self) {
        self.lock
            .uninitialize(move || async move {
                let subscription = self.subscription.lock().await.take();
                if let Some(subscription) = subscription {
                    subscription.teardown().await;
                }
                let mut state = self.state.write().await;
                state.initialized = false;
                state.is_connected = false;
                debug!("Network store uninitialized");
            })
            .await
    }

    /// Switch to another node, remembering it as a known peer.
    pub async fn set_current_peer(self: &Arc<Self>, rest_url: &str) -> Result<(), StoreError> {
        let peer = PeersModel::from_url(rest_url)?;
        let identifier = peer.model().get_identifier()?;

        self.uninitialize().await;
        if !self.peers.find(&identifier).await? {
            self.peers.store(&identifier, peer).await?;
        }
        self.state.write().await.selected_url = Some(identifier.clone());
        self.initialize().await?;

        self.events.publish(AppEvent::NewConnection {
            rest_url: identifier,
        });
        Ok(())
    }

    pub async fn add_known_peer(&self, rest_url: &str) -> Result<PeersModel, StoreError> {
        let peer = PeersModel::from_url(rest_url)?;
        self.peers.create(peer.clone()).await?;
        let known_peers = self.peers.collect().await?;
        self.state.write().await.known_peers = known_peers;
        Ok(peer)
    }

    /// Forget a peer. Returns false if it was not known.
    pub async fn remove_known_peer(&self, rest_url: &str) -> Result<bool, StoreError> {
        let removed = self.peers.delete(&normalize_url(rest_url)).await?;
        let known_peers = self.peers.collect().await?;
        self.state.write().await.known_peers = known_peers;
        Ok(removed)
    }

    pub async fn service(&self) -> Option<Arc<dyn RemoteLedgerService>> {
        self.service.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected
    }

    pub async fn chain_height(&self) -> u64 {
        self.state.read().await.chain_height
    }

    pub async fn current_peer(&self) -> Option<PeersModel> {
        self.state.read().await.current_peer.clone()
    }

    pub async fn network_type(&self) -> Option<NetworkType> {
        self.state.read().await.network_type
    }

    pub async fn generation_hash(&self) -> Option<String> {
        self.state.read().await.generation_hash.clone()
    }

    pub async fn known_peers(&self) -> Vec<PeersModel> {
        self.state.read().await.known_peers.clone()
    }
}
