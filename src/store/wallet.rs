//! Wallet synchronization store.
//!
//! The store tracks one focused wallet: its account info, owned assets, multisig configuration,
//! transactions per group and locally staged transactions. Live data comes from REST fetches and
//! from listener pushes, both committed through the synchronous mutation methods of
//! [`WalletState`]. No `.await` happens while the state lock is held.
//!
//! Responses are gated at commit time: data fetched for an address that is no longer focused only
//! lands in the per-address caches, never in the focused slot.

use crate::database::{EntityModel, WalletsModel, WalletsRepository};
use crate::node::{
    AccountInfo, Address, Channel, ListenerEvent, ListenerMessage, MosaicInfo, MultisigInfo,
    NamespaceInfo, NodeError, PageQuery, RemoteLedgerService, SignedTransaction, TransactionData,
    TransactionGroup,
};
use crate::store::events::{AppEvent, EventBus};
use crate::store::lock::AwaitLock;
use crate::store::subscriptions::{Subscription, SubscriptionRegistry};
use crate::store::transactions::{AddOutcome, TransactionLedger};
use crate::store::types::{
    AddressSource, BroadcastResult, SetWalletOptions, StagedTransaction, StoreError,
};

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Follow-up work requested by a listener event.
#[derive(Debug, Clone, PartialEq)]
enum Followup {
    None,
    RefreshInfo(Address),
}

/// Observable state of the wallet store.
#[derive(Debug, Default)]
pub struct WalletState {
    pub initialized: bool,
    pub cosignatory_mode: bool,
    pub current_wallet: Option<WalletsModel>,
    pub current_address: Option<Address>,
    pub current_info: Option<AccountInfo>,
    pub current_mosaics: Vec<MosaicInfo>,
    pub current_namespaces: Vec<NamespaceInfo>,
    pub current_multisig: Option<MultisigInfo>,
    pub ledger: TransactionLedger,
    /// Signed transactions not yet acknowledged by the node, keyed by hash.
    pub staged: IndexMap<String, StagedTransaction>,
    /// Latest account info per address, focused or not.
    pub other_wallets_info: HashMap<Address, AccountInfo>,
    pub other_multisig_info: HashMap<Address, MultisigInfo>,
}

impl WalletState {
    fn is_focused(&self, address: &Address) -> bool {
        self.current_address.as_ref() == Some(address)
    }

    /// Move the focus, dropping everything derived from the previous one.
    fn set_focus(
        &mut self,
        wallet: Option<WalletsModel>,
        address: Address,
        cosignatory_mode: bool,
    ) {
        self.current_wallet = wallet;
        self.current_address = Some(address);
        self.cosignatory_mode = cosignatory_mode;
        self.reset_focused_data();
    }

    fn reset_focused_data(&mut self) {
        self.initialized = false;
        self.current_info = None;
        self.current_mosaics.clear();
        self.current_namespaces.clear();
        self.current_multisig = None;
        self.ledger.clear();
    }

    fn commit_info(&mut self, address: &Address, info: AccountInfo) {
        if self.is_focused(address) {
            self.current_info = Some(info.clone());
        }
        self.other_wallets_info.insert(address.clone(), info);
    }

    fn commit_transactions(
        &mut self,
        address: &Address,
        group: TransactionGroup,
        transactions: &[TransactionData],
    ) -> bool {
        if !self.is_focused(address) {
            return false;
        }
        for transaction in transactions {
            self.ledger.add(group, transaction.clone());
        }
        true
    }

    fn commit_mosaics(&mut self, address: &Address, mosaics: &[MosaicInfo]) -> bool {
        if !self.is_focused(address) {
            return false;
        }
        self.current_mosaics = mosaics.to_vec();
        true
    }

    fn commit_namespaces(&mut self, address: &Address, namespaces: &[NamespaceInfo]) -> bool {
        if !self.is_focused(address) {
            return false;
        }
        self.current_namespaces = namespaces.to_vec();
        true
    }

    /// Returns the focused wallet if its multisig flag has to change.
    fn commit_multisig(
        &mut self,
        address: &Address,
        multisig: Option<&MultisigInfo>,
    ) -> Option<WalletsModel> {
        match multisig {
            Some(info) => {
                self.other_multisig_info.insert(address.clone(), info.clone());
            }
            None => {
                self.other_multisig_info.remove(address);
            }
        }
        if !self.is_focused(address) {
            return None;
        }
        self.current_multisig = multisig.cloned();

        let is_multisig = multisig.is_some_and(MultisigInfo::is_multisig);
        let wallet = self.current_wallet.as_mut()?;
        if wallet.is_multisig() == is_multisig {
            return None;
        }
        wallet.set_multisig(is_multisig);
        Some(wallet.clone())
    }

    fn apply_event(&mut self, message: ListenerMessage) -> Followup {
        let Some(address) = message.address else {
            return Followup::None;
        };
        if !self.is_focused(&address) {
            debug!("Dropping event for unfocused address {}", address);
            return Followup::None;
        }

        match message.event {
            ListenerEvent::NewBlock { .. } => Followup::None,
            ListenerEvent::ConfirmedAdded(transaction) => {
                self.staged.shift_remove(&transaction.hash);
                self.ledger.add(TransactionGroup::Confirmed, transaction);
                Followup::RefreshInfo(address)
            }
            ListenerEvent::UnconfirmedAdded(transaction) => {
                self.staged.shift_remove(&transaction.hash);
                self.ledger.add(TransactionGroup::Unconfirmed, transaction);
                Followup::None
            }
            ListenerEvent::PartialAdded(transaction) => {
                self.ledger.add(TransactionGroup::Partial, transaction);
                Followup::None
            }
            ListenerEvent::UnconfirmedRemoved(hash) => {
                self.ledger.remove(TransactionGroup::Unconfirmed, &hash);
                Followup::None
            }
            ListenerEvent::PartialRemoved(hash) => {
                self.ledger.remove(TransactionGroup::Partial, &hash);
                Followup::None
            }
            ListenerEvent::Status { hash, code } => {
                warn!("Transaction {} failed with status {}", hash, code);
                self.staged.shift_remove(&hash);
                self.ledger.remove_pending(&hash);
                Followup::None
            }
        }
    }
}

/// Store of the focused wallet.
pub struct WalletStore {
    state: RwLock<WalletState>,
    lock: AwaitLock,
    subscriptions: Mutex<SubscriptionRegistry>,
    service: RwLock<Arc<dyn RemoteLedgerService>>,
    wallets: WalletsRepository,
    events: EventBus,
    page_size: u32,
}

impl WalletStore {
    pub fn new(
        service: Arc<dyn RemoteLedgerService>,
        wallets: WalletsRepository,
        events: EventBus,
        page_size: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(WalletState::default()),
            lock: AwaitLock::new(),
            subscriptions: Mutex::new(SubscriptionRegistry::new()),
            service: RwLock::new(service),
            wallets,
            events,
            page_size,
        })
    }

    pub async fn service(&self) -> Arc<dyn RemoteLedgerService> {
        self.service.read().await.clone()
    }

    /// Switch to another node. A focused wallet is re-initialized against it.
    pub async fn set_service(
        self: &Arc<Self>,
        service: Arc<dyn RemoteLedgerService>,
    ) -> Option<JoinHandle<Result<(), StoreError>>> {
        info!("Wallet store now using node {}", service.base_url());
        *self.service.write().await = service;

        if self.state.read().await.current_address.is_none() {
            return None;
        }
        self.uninitialize().await;
        self.state.write().await.reset_focused_data();
        Some(self.spawn_initialize())
    }

    /// Subscribe and fetch everything for the focused address.
    ///
    /// Info and the three transaction groups are awaited; owned assets and multisig info are
    /// fetched in the background and may land after this returns.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), StoreError> {
        self.lock
            .initialize(move || async move {
                let (address, cosignatory_mode) = {
                    let state = self.state.read().await;
                    if state.initialized {
                        return Ok(());
                    }
                    let address = state
                        .current_address
                        .clone()
                        .ok_or(StoreError::NoCurrentWallet)?;
                    (address, state.cosignatory_mode)
                };
                info!("Initializing wallet store for {}", address);

                if let Err(e) = self.subscribe(&address).await {
                    warn!("Failed to subscribe to {}: {}", address, e);
                }

                if !cosignatory_mode {
                    futures::join!(
                        self.rest_fetch_info(&address),
                        self.rest_fetch_transactions(&address, TransactionGroup::Confirmed),
                        self.rest_fetch_transactions(&address, TransactionGroup::Unconfirmed),
                        self.rest_fetch_transactions(&address, TransactionGroup::Partial),
                    );

                    let store = self.clone();
                    let target = address.clone();
                    tokio::spawn(async move { store.rest_fetch_owned_mosaics(&target).await });
                    let store = self.clone();
                    let target = address.clone();
                    tokio::spawn(async move { store.rest_fetch_owned_namespaces(&target).await });
                    let store = self.clone();
                    let target = address.clone();
                    tokio::spawn(async move { store.rest_fetch_multisig(&target).await });
                }

                let mut state = self.state.write().await;
                if state.is_focused(&address) {
                    state.initialized = true;
                }
                Ok::<_, StoreError>(())
            })
            .await
    }

    fn spawn_initialize(self: &Arc<Self>) -> JoinHandle<Result<(), StoreError>> {
        let store = self.clone();
        tokio::spawn(async move {
            let result = store.initialize().await;
            if let Err(e) = &result {
                error!("Wallet store initialization failed: {}", e);
            }
            result
        })
    }

    /// Tear down every subscription and mark the store uninitialized.
    pub async fn uninitialize(&self) {
        self.lock
            .uninitialize(move || async move {
                let entries = self.subscriptions.lock().await.drain();
                for (address, subscriptions) in entries {
                    debug!("Unsubscribing {}", address);
                    for subscription in subscriptions {
                        subscription.teardown().await;
                    }
                }
                self.state.write().await.initialized = false;
                info!("Wallet store uninitialized");
            })
            .await
    }

    /// Focus another wallet.
    ///
    /// Outside cosignatory mode the previous wallet is fully uninitialized first. The returned
    /// handle resolves when the new wallet's initialize has run; callers need not await it.
    pub async fn set_current_wallet(
        self: &Arc<Self>,
        wallet: WalletsModel,
        options: SetWalletOptions,
    ) -> Result<JoinHandle<Result<(), StoreError>>, StoreError> {
        let address = AddressSource::from(wallet.clone()).resolve()?;

        let had_previous = self.state.read().await.current_address.is_some();
        if had_previous && !options.is_cosignatory_mode {
            self.uninitialize().await;
        }

        let wallet_id = wallet.id().map(str::to_string);
        self.state
            .write()
            .await
            .set_focus(Some(wallet), address.clone(), options.is_cosignatory_mode);
        info!("Focused wallet {}", address.pretty());

        self.events.publish(AppEvent::WalletChange { wallet_id, address });
        Ok(self.spawn_initialize())
    }

    /// Focus a stored wallet by id.
    pub async fn set_current_wallet_by_id(
        self: &Arc<Self>,
        wallet_id: &str,
        options: SetWalletOptions,
    ) -> Result<JoinHandle<Result<(), StoreError>>, StoreError> {
        let wallet = self.wallets.read(wallet_id).await?;
        self.set_current_wallet(wallet, options).await
    }

    /// Open a listener with one subscription per tracked channel for `address`.
    pub async fn subscribe(self: &Arc<Self>, address: &Address) -> Result<(), StoreError> {
        if self.subscriptions.lock().await.contains(address) {
            return Ok(());
        }

        let service = self.service().await;
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener = service.open_listener(sender).await?;

        let mut handles = Vec::with_capacity(Channel::ADDRESS_CHANNELS.len());
        for channel in Channel::ADDRESS_CHANNELS {
            match listener.subscribe(channel, Some(address)).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in &handles {
                        handle.cancel().await;
                    }
                    listener.close().await;
                    return Err(e.into());
                }
            }
        }

        let pump = tokio::spawn(Self::pump(Arc::downgrade(self), receiver));
        self.subscriptions
            .lock()
            .await
            .insert(address.clone(), Subscription::new(listener, handles, Some(pump)));
        debug!("Subscribed to {}", address);
        Ok(())
    }

    /// Cancel every channel of `address`, close its listener and forget it.
    pub async fn unsubscribe(&self, address: &Address) {
        let subscriptions = self.subscriptions.lock().await.take(address);
        for subscription in subscriptions {
            subscription.teardown().await;
        }
    }

    pub async fn subscribed_addresses(&self) -> Vec<Address> {
        self.subscriptions.lock().await.addresses()
    }

    async fn pump(store: Weak<Self>, mut receiver: mpsc::UnboundedReceiver<ListenerMessage>) {
        while let Some(message) = receiver.recv().await {
            let Some(store) = store.upgrade() else {
                break;
            };
            store.handle_listener_message(message).await;
        }
    }

    /// Apply one pushed event.
    pub async fn handle_listener_message(self: &Arc<Self>, message: ListenerMessage) {
        let followup = self.state.write().await.apply_event(message);

        if let Followup::RefreshInfo(address) = followup {
            let store = self.clone();
            tokio::spawn(async move { store.rest_fetch_info(&address).await });
        }
    }

    /// Record a transaction in the group named `group`.
    pub async fn add_transaction(
        &self,
        group: &str,
        transaction: TransactionData,
    ) -> Result<AddOutcome, StoreError> {
        self.state.write().await.ledger.add_named(group, transaction)
    }

    pub async fn remove_transaction(&self, group: &str, hash: &str) -> Result<bool, StoreError> {
        self.state.write().await.ledger.remove_named(group, hash)
    }

    pub async fn rest_fetch_info(&self, source: impl Into<AddressSource>) -> Option<AccountInfo> {
        let address = resolve(source.into())?;

        match self.service().await.account_info(&address).await {
            Ok(info) => {
                self.state.write().await.commit_info(&address, info.clone());
                Some(info)
            }
            Err(e) => {
                warn!("Failed to fetch account info of {}: {}", address, e);
                None
            }
        }
    }

    /// Fetch the newest page of `group` and merge it into the ledger if still focused.
    pub async fn rest_fetch_transactions(
        &self,
        source: impl Into<AddressSource>,
        group: TransactionGroup,
    ) -> Vec<TransactionData> {
        let Some(address) = resolve(source.into()) else {
            return Vec::new();
        };
        let page = PageQuery {
            page_size: self.page_size,
            ..PageQuery::default()
        };

        match self.service().await.transactions(&address, group, page).await {
            Ok(transactions) => {
                let committed = self
                    .state
                    .write()
                    .await
                    .commit_transactions(&address, group, &transactions);
                debug!(
                    "Fetched {} {} transactions of {} (committed: {})",
                    transactions.len(),
                    group,
                    address,
                    committed
                );
                transactions
            }
            Err(e) => {
                warn!("Failed to fetch {} transactions of {}: {}", group, address, e);
                Vec::new()
            }
        }
    }

    pub async fn rest_fetch_owned_mosaics(
        &self,
        source: impl Into<AddressSource>,
    ) -> Vec<MosaicInfo> {
        let Some(address) = resolve(source.into()) else {
            return Vec::new();
        };

        match self.service().await.owned_mosaics(&address).await {
            Ok(mosaics) => {
                self.state.write().await.commit_mosaics(&address, &mosaics);
                mosaics
            }
            Err(e) => {
                warn!("Failed to fetch mosaics of {}: {}", address, e);
                Vec::new()
            }
        }
    }

    pub async fn rest_fetch_owned_namespaces(
        &self,
        source: impl Into<AddressSource>,
    ) -> Vec<NamespaceInfo> {
        let Some(address) = resolve(source.into()) else {
            return Vec::new();
        };

        match self.service().await.owned_namespaces(&address).await {
            Ok(namespaces) => {
                self.state
                    .write()
                    .await
                    .commit_namespaces(&address, &namespaces);
                namespaces
            }
            Err(e) => {
                warn!("Failed to fetch namespaces of {}: {}", address, e);
                Vec::new()
            }
        }
    }

    /// Fetch multisig info. A change of the focused wallet's multisig flag is persisted.
    pub async fn rest_fetch_multisig(
        &self,
        source: impl Into<AddressSource>,
    ) -> Option<MultisigInfo> {
        let address = resolve(source.into())?;

        let multisig = match self.service().await.multisig_info(&address).await {
            Ok(multisig) => multisig,
            Err(e) => {
                warn!("Failed to fetch multisig info of {}: {}", address, e);
                return None;
            }
        };

        let changed = self
            .state
            .write()
            .await
            .commit_multisig(&address, multisig.as_ref());
        if let Some(wallet) = changed {
            if let Err(e) = self.persist_wallet(wallet).await {
                error!("Failed to persist multisig flag of {}: {}", address, e);
            }
        }
        multisig
    }

    async fn persist_wallet(&self, wallet: WalletsModel) -> Result<(), StoreError> {
        let identifier = wallet.model().get_identifier()?;
        self.wallets.store(&identifier, wallet).await?;
        Ok(())
    }

    /// Keep a signed transaction until the node acknowledges it. Returns false if already staged.
    pub async fn stage_transaction(&self, signed: SignedTransaction) -> bool {
        let mut state = self.state.write().await;
        if state.staged.contains_key(&signed.hash) {
            return false;
        }
        state
            .staged
            .insert(signed.hash.clone(), StagedTransaction::new(signed));
        true
    }

    pub async fn rest_announce_transaction(&self, signed: SignedTransaction) -> BroadcastResult {
        let result = self.service().await.announce(&signed).await;
        self.settle_announcement(signed, result).await
    }

    pub async fn rest_announce_partial(&self, signed: SignedTransaction) -> BroadcastResult {
        let result = self.service().await.announce_partial(&signed).await;
        self.settle_announcement(signed, result).await
    }

    async fn settle_announcement(
        &self,
        signed: SignedTransaction,
        result: Result<String, NodeError>,
    ) -> BroadcastResult {
        match result {
            Ok(_) => {
                self.state.write().await.staged.shift_remove(&signed.hash);
                BroadcastResult::accepted(signed)
            }
            Err(e) => {
                warn!("Announcement of {} rejected: {}", signed.hash, e);
                BroadcastResult::rejected(signed, e)
            }
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.initialized
    }

    pub async fn current_address(&self) -> Option<Address> {
        self.state.read().await.current_address.clone()
    }

    pub async fn current_wallet(&self) -> Option<WalletsModel> {
        self.state.read().await.current_wallet.clone()
    }

    pub async fn current_info(&self) -> Option<AccountInfo> {
        self.state.read().await.current_info.clone()
    }

    pub async fn owned_mosaics(&self) -> Vec<MosaicInfo> {
        self.state.read().await.current_mosaics.clone()
    }

    pub async fn owned_namespaces(&self) -> Vec<NamespaceInfo> {
        self.state.read().await.current_namespaces.clone()
    }

    pub async fn multisig_info(&self) -> Option<MultisigInfo> {
        self.state.read().await.current_multisig.clone()
    }

    pub async fn transactions(&self, group: TransactionGroup) -> Vec<TransactionData> {
        self.state.read().await.ledger.transactions(group)
    }

    pub async fn staged_transactions(&self) -> Vec<StagedTransaction> {
        self.state.read().await.staged.values().cloned().collect()
    }

    pub async fn other_wallet_info(&self, address: &Address) -> Option<AccountInfo> {
        self.state.read().await.other_wallets_info.get(address).cloned()
    }
}

fn resolve(source: AddressSource) -> Option<Address> {
    match source.resolve() {
        Ok(address) => Some(address),
        Err(e) => {
            warn!("Skipping fetch: {}", e);
            None
        }
    }
}
