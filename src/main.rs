use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use wallet_state_sync::config::Config;
use wallet_state_sync::database::{
	AccountsRepository, JsonFormatter, PeersRepository, SettingsRepository, StorageAdapter,
	WalletsModel, WalletsRepository, default_schemas, open_backend,
};
use wallet_state_sync::node::{NETWORK_CURRENCY_DIVISIBILITY, NodeClientFactory};
use wallet_state_sync::store::{
	AppEvent, EventBus, NetworkStore, SetWalletOptions, StoreError, WalletStore,
};
use wallet_state_sync::utils::format_relative_amount;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting wallet state sync");
	let config = Config::from_env();

	if let Err(e) = run(config).await {
		error!("Wallet state sync stopped: {}", e);
	}
}

async fn run(config: Config) -> Result<(), StoreError> {
	let backend = open_backend(&config.data_dir).await;
	let adapter = Arc::new(
		StorageAdapter::new(backend, Box::new(JsonFormatter)).with_schemas(default_schemas()),
	);
	let accounts = AccountsRepository::new(adapter.clone());
	let wallets = WalletsRepository::new(adapter.clone());
	let peers = PeersRepository::new(adapter.clone());
	let settings = SettingsRepository::new(adapter);
	let events = EventBus::new();

	let network = NetworkStore::new(
		peers,
		Arc::new(NodeClientFactory),
		events.clone(),
		&config.node_url,
		config.network,
	);
	network.initialize().await?;
	if !network.is_connected().await {
		warn!("Node unreachable, continuing offline");
	}
	let service = network.service().await.ok_or(StoreError::NotInitialized)?;

	let wallet = WalletStore::new(service, wallets.clone(), events.clone(), config.page_size);

	// Follow node switches
	let mut receiver = events.subscribe();
	let follower = {
		let network = network.clone();
		let wallet = wallet.clone();
		tokio::spawn(async move {
			loop {
				match receiver.recv().await {
					Ok(AppEvent::NewConnection { rest_url }) => {
						info!("Switched to node {}", rest_url);
						if let Some(service) = network.service().await {
							wallet.set_service(service).await;
						}
					}
					Ok(_) => {}
					Err(RecvError::Lagged(skipped)) => warn!("Missed {} app events", skipped),
					Err(RecvError::Closed) => break,
				}
			}
		})
	};

	if let Some(account_name) = &config.account {
		if !accounts.find(account_name).await? {
			warn!("Account {} is not stored locally", account_name);
		}
		events.publish(AppEvent::Login {
			account_name: account_name.clone(),
		});

		match select_wallet(&wallets, &settings, account_name).await? {
			Some(selected) => {
				let initialized = wallet
					.set_current_wallet(selected, SetWalletOptions::default())
					.await?;
				match initialized.await {
					Ok(Ok(())) => log_balances(&wallet).await,
					Ok(Err(e)) => warn!("Wallet not initialized: {}", e),
					Err(e) => error!("Initialize task failed: {}", e),
				}
			}
			None => warn!("Account {} has no wallets", account_name),
		}
	}

	info!("Syncing, press Ctrl-C to stop");
	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for shutdown signal: {}", e);
	}

	info!("Shutting down");
	follower.abort();
	wallet.uninitialize().await;
	network.uninitialize().await;
	Ok(())
}

/// The account's default wallet, else its first wallet.
async fn select_wallet(
	wallets: &WalletsRepository,
	settings: &SettingsRepository,
	account_name: &str,
) -> Result<Option<WalletsModel>, StoreError> {
	let default_wallet = if settings.find(account_name).await? {
		settings
			.read(account_name)
			.await?
			.default_wallet()
			.map(str::to_string)
	} else {
		None
	};

	let candidates = wallets.wallets_for_account(account_name).await?;
	let selected = default_wallet
		.and_then(|id| {
			candidates
				.iter()
				.find(|wallet| wallet.id() == Some(id.as_str()))
				.cloned()
		})
		.or_else(|| candidates.into_iter().next());
	Ok(selected)
}

async fn log_balances(wallet: &WalletStore) {
	let Some(info) = wallet.current_info().await else {
		return;
	};
	let owned = wallet.owned_mosaics().await;
	info!("Wallet {}", info.address.pretty());
	for balance in &info.mosaics {
		let divisibility = owned
			.iter()
			.find(|mosaic| mosaic.id.eq_ignore_ascii_case(&balance.id))
			.map(|mosaic| u32::from(mosaic.divisibility))
			.unwrap_or(NETWORK_CURRENCY_DIVISIBILITY);
		info!(
			"  {}: {}",
			balance.id,
			format_relative_amount(balance.amount, divisibility)
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_state_sync::database::{MemoryStorageBackend, SettingsModel};
	use wallet_state_sync::node::Address;

	fn repositories() -> (WalletsRepository, SettingsRepository) {
		let adapter = Arc::new(
			StorageAdapter::new(Box::new(MemoryStorageBackend::new()), Box::new(JsonFormatter))
				.with_schemas(default_schemas()),
		);
		(WalletsRepository::new(adapter.clone()), SettingsRepository::new(adapter))
	}

	async fn add_wallet(wallets: &WalletsRepository, id: &str, raw: &str) {
		let address = Address::parse(raw).unwrap();
		wallets
			.create(WalletsModel::new(id, "alice", id, &address, ""))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_select_wallet_prefers_default_then_first() {
		let (wallets, settings) = repositories();
		assert!(select_wallet(&wallets, &settings, "alice").await.unwrap().is_none());

		add_wallet(&wallets, "w1", "TDDGQWDPLFAUUVSOFJHBHXMLXJ5MTYSQ3OHGOAYA").await;
		add_wallet(&wallets, "w2", "TBULEAUG2CZQISUR442HWA6UAKGWIXHDABJVIPYA").await;

		let selected = select_wallet(&wallets, &settings, "alice").await.unwrap();
		assert_eq!(selected.unwrap().id(), Some("w1"));

		let mut preferences = SettingsModel::new("alice");
		preferences.set_default_wallet("w2");
		settings.create(preferences).await.unwrap();
		let selected = select_wallet(&wallets, &settings, "alice").await.unwrap();
		assert_eq!(selected.unwrap().id(), Some("w2"));

		// A default pointing at a deleted wallet falls back to the first one
		wallets.delete("w2").await.unwrap();
		let selected = select_wallet(&wallets, &settings, "alice").await.unwrap();
		assert_eq!(selected.unwrap().id(), Some("w1"));
	}
}
