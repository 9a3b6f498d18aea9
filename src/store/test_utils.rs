//! In-memory node double for store tests.
//!
//! Records every call in a shared log so tests can assert on ordering, supports per-address
//! response delays and forced failures, and lets tests push listener events by hand.

use crate::database::{
    JsonFormatter, MemoryStorageBackend, PeersRepository, StorageAdapter, WalletsModel,
    WalletsRepository, default_schemas,
};
use crate::node::*;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ADDRESS_A: &str = "TDDGQWDPLFAUUVSOFJHBHXMLXJ5MTYSQ3OHGOAYA";
pub const ADDRESS_B: &str = "TBULEAUG2CZQISUR442HWA6UAKGWIXHDABJVIPYA";
pub const ADDRESS_C: &str = "TCFBSVBZQ3QGLYRYOBLJJ2WFVUWRHYWSD6SJB6IA";

pub const GENERATION_HASH: &str =
    "49D6E1CE276A85B70EAFE52349AACCA389302E7A9754BCF1221E79494FC665A4";

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn address(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

pub fn wallet(id: &str, raw: &str) -> WalletsModel {
    WalletsModel::new(id, "alice", id, &address(raw), "")
}

pub fn tx(hash: &str, height: Option<u64>, index: u32) -> TransactionData {
    TransactionData {
        hash: hash.to_string(),
        height,
        index,
        transaction_type: 16724,
        signer_public_key: String::new(),
        body: serde_json::Value::Null,
    }
}

pub fn account_info(raw: &str, amount: u64) -> AccountInfo {
    AccountInfo {
        address: address(raw),
        public_key: String::new(),
        mosaics: vec![MosaicBalance {
            id: "6BED913FA20223F8".to_string(),
            amount,
        }],
        importance: 0,
    }
}

pub fn signed(hash_byte: &str) -> SignedTransaction {
    SignedTransaction {
        payload: "0A0B".to_string(),
        hash: hash_byte.repeat(32),
        signer_public_key: "CD".repeat(32),
        network_type: NetworkType::TestNet,
    }
}

pub fn adapter() -> Arc<StorageAdapter> {
    Arc::new(
        StorageAdapter::new(Box::new(MemoryStorageBackend::new()), Box::new(JsonFormatter))
            .with_schemas(default_schemas()),
    )
}

pub fn wallets_repository() -> WalletsRepository {
    WalletsRepository::new(adapter())
}

pub fn peers_repository() -> PeersRepository {
    PeersRepository::new(adapter())
}

/// Per-channel subscription handle counting its cancellations.
pub struct MockSubscription {
    topic: String,
    cancels: Arc<AtomicUsize>,
    log: CallLog,
}

#[async_trait::async_trait]
impl ChannelSubscription for MockSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("cancel {}", self.topic));
    }
}

/// Observable state of one opened mock listener.
#[derive(Default)]
pub struct MockListenerState {
    pub closed: AtomicUsize,
    pub subscriptions: Mutex<Vec<(String, Arc<AtomicUsize>)>>,
}

pub struct MockListener {
    state: Arc<MockListenerState>,
    log: CallLog,
}

#[async_trait::async_trait]
impl Listener for MockListener {
    async fn subscribe(
        &self,
        channel: Channel,
        address: Option<&Address>,
    ) -> Result<Box<dyn ChannelSubscription>, NodeError> {
        let topic = channel.topic(address);
        let cancels = Arc::new(AtomicUsize::new(0));
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .push((topic.clone(), cancels.clone()));
        self.log.lock().unwrap().push(format!("subscribe {}", topic));
        Ok(Box::new(MockSubscription {
            topic,
            cancels,
            log: self.log.clone(),
        }))
    }

    async fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("close listener".to_string());
    }

    fn is_open(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst) == 0
    }
}

/// Scriptable [`RemoteLedgerService`].
pub struct MockLedgerService {
    base_url: String,
    pub log: CallLog,
    pub accounts: Mutex<HashMap<Address, AccountInfo>>,
    pub transactions: Mutex<HashMap<(Address, TransactionGroup), Vec<TransactionData>>>,
    pub mosaics: Mutex<HashMap<Address, Vec<MosaicInfo>>>,
    pub multisig: Mutex<HashMap<Address, MultisigInfo>>,
    pub node_info: Mutex<NodeInfo>,
    pub height: AtomicU64,
    /// Delay applied to every address-scoped call for an address.
    pub delays: Mutex<HashMap<Address, Duration>>,
    /// Extra delay on owned-mosaic lookups.
    pub mosaic_delays: Mutex<HashMap<Address, Duration>>,
    pub fail: AtomicBool,
    pub fail_listener: AtomicBool,
    pub reject_announce: Mutex<Option<String>>,
    pub listeners: Mutex<Vec<Arc<MockListenerState>>>,
    pub senders: Mutex<Vec<EventSender>>,
}

impl MockLedgerService {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            log: Arc::new(Mutex::new(Vec::new())),
            accounts: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            mosaics: Mutex::new(HashMap::new()),
            multisig: Mutex::new(HashMap::new()),
            node_info: Mutex::new(NodeInfo {
                network_identifier: NetworkType::TestNet.as_u8(),
                network_generation_hash_seed: GENERATION_HASH.to_string(),
                friendly_name: "mock".to_string(),
                ..NodeInfo::default()
            }),
            height: AtomicU64::new(100),
            delays: Mutex::new(HashMap::new()),
            mosaic_delays: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            fail_listener: AtomicBool::new(false),
            reject_announce: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn with_account(self, info: AccountInfo) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(info.address.clone(), info);
        self
    }

    pub fn with_transactions(
        self,
        raw: &str,
        group: TransactionGroup,
        transactions: Vec<TransactionData>,
    ) -> Self {
        self.transactions
            .lock()
            .unwrap()
            .insert((address(raw), group), transactions);
        self
    }

    pub fn with_delay(self, raw: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(address(raw), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.calls().iter().position(|call| call == entry)
    }

    /// Push an event on the most recently opened listener.
    pub fn push(&self, address: Option<&Address>, event: ListenerEvent) -> bool {
        let senders = self.senders.lock().unwrap();
        senders.last().is_some_and(|sender| {
            sender
                .send(ListenerMessage {
                    address: address.cloned(),
                    event,
                })
                .is_ok()
        })
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }

    async fn respond<T>(
        &self,
        call: &str,
        address: &Address,
        value: impl FnOnce(&Self) -> T,
    ) -> Result<T, NodeError> {
        self.record(format!("{} start {}", call, address));
        let delay = self.delays.lock().unwrap().get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("{} end {}", call, address));

        if self.fail.load(Ordering::SeqCst) {
            return Err(NodeError::Rejected {
                status: 500,
                message: "node unavailable".to_string(),
            });
        }
        Ok(value(self))
    }
}

#[async_trait::async_trait]
impl RemoteLedgerService for MockLedgerService {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo, NodeError> {
        self.respond("account_info", address, |mock| {
            mock.accounts.lock().unwrap().get(address).cloned()
        })
        .await?
        .ok_or(NodeError::NoData)
    }

    async fn transactions(
        &self,
        address: &Address,
        group: TransactionGroup,
        page: PageQuery,
    ) -> Result<Vec<TransactionData>, NodeError> {
        self.respond(&format!("transactions {}", group), address, |mock| {
            mock.transactions
                .lock()
                .unwrap()
                .get(&(address.clone(), group))
                .map(|all| all.iter().take(page.page_size as usize).cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })
        .await
    }

    async fn owned_mosaics(&self, address: &Address) -> Result<Vec<MosaicInfo>, NodeError> {
        let delay = self.mosaic_delays.lock().unwrap().get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.respond("owned_mosaics", address, |mock| {
            mock.mosaics
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_default()
        })
        .await
    }

    async fn owned_namespaces(&self, address: &Address) -> Result<Vec<NamespaceInfo>, NodeError> {
        self.respond("owned_namespaces", address, |_| Vec::new()).await
    }

    async fn multisig_info(&self, address: &Address) -> Result<Option<MultisigInfo>, NodeError> {
        self.respond("multisig_info", address, |mock| {
            mock.multisig.lock().unwrap().get(address).cloned()
        })
        .await
    }

    async fn node_info(&self) -> Result<NodeInfo, NodeError> {
        self.record("node_info".to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(NodeError::NoData);
        }
        Ok(self.node_info.lock().unwrap().clone())
    }

    async fn chain_height(&self) -> Result<u64, NodeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NodeError::NoData);
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn announce(&self, signed: &SignedTransaction) -> Result<String, NodeError> {
        self.record(format!("announce {}", signed.hash));
        match self.reject_announce.lock().unwrap().clone() {
            Some(message) => Err(NodeError::Rejected {
                status: 409,
                message,
            }),
            None => Ok("packet 9 was pushed to the network via /transactions".to_string()),
        }
    }

    async fn announce_partial(&self, signed: &SignedTransaction) -> Result<String, NodeError> {
        self.record(format!("announce_partial {}", signed.hash));
        match self.reject_announce.lock().unwrap().clone() {
            Some(message) => Err(NodeError::Rejected {
                status: 409,
                message,
            }),
            None => Ok(
                "packet 256 was pushed to the network via /transactions/partial".to_string(),
            ),
        }
    }

    async fn open_listener(&self, events: EventSender) -> Result<Box<dyn Listener>, NodeError> {
        self.record("open listener".to_string());
        if self.fail_listener.load(Ordering::SeqCst) {
            return Err(NodeError::ListenerError("connection refused".to_string()));
        }
        let state = Arc::new(MockListenerState::default());
        self.listeners.lock().unwrap().push(state.clone());
        self.senders.lock().unwrap().push(events);
        Ok(Box::new(MockListener {
            state,
            log: self.log.clone(),
        }))
    }
}

/// Factory handing out [`MockLedgerService`]s and remembering them by URL.
#[derive(Default)]
pub struct MockServiceFactory {
    pub created: Mutex<Vec<Arc<MockLedgerService>>>,
    pub fail_all: AtomicBool,
}

impl MockServiceFactory {
    pub fn last(&self) -> Option<Arc<MockLedgerService>> {
        self.created.lock().unwrap().last().cloned()
    }
}

impl LedgerServiceFactory for MockServiceFactory {
    fn create(&self, base_url: &str) -> Result<Arc<dyn RemoteLedgerService>, NodeError> {
        let service = Arc::new(MockLedgerService::new(base_url));
        service
            .fail
            .store(self.fail_all.load(Ordering::SeqCst), Ordering::SeqCst);
        self.created.lock().unwrap().push(service.clone());
        Ok(service)
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
