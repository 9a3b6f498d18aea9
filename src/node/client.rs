//!
//! REST client for a node.
//!
//! This module provides an async client for the node's REST API: account state, transaction
//! pages per group, owned assets, multisig configuration, node and chain info, and transaction
//! announcement. Push notifications are delegated to [`WsListener`].

use super::listener::WsListener;
use super::*;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Node REST client
#[derive(Clone)]
pub struct NodeClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// The base REST URL, without trailing slash.
	base_url: String,
}

impl NodeClient {
	/// Create a new node client.
	///
	/// # Arguments
	/// * `base_url` - The REST endpoint of the node, e.g. `http://localhost:3000`.
	///
	/// # Returns
	/// A new `NodeClient`, or a `NodeError` if the HTTP client cannot be built.
	pub fn new(base_url: &str) -> Result<Self, NodeError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	/// WebSocket endpoint derived from the REST URL.
	pub fn websocket_url(&self) -> String {
		websocket_url(&self.base_url)
	}

	async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, NodeError> {
		self.get_optional_json(path, query)
			.await?
			.ok_or(NodeError::Rejected {
				status: StatusCode::NOT_FOUND.as_u16(),
				message: format!("{} not found", path),
			})
	}

	/// GET a JSON document, `None` on 404.
	async fn get_optional_json(
		&self,
		path: &str,
		query: &[(&str, String)],
	) -> Result<Option<Value>, NodeError> {
		let url = format!("{}{}", self.base_url, path);
		debug!("GET {}", url);

		let response = self.http_client.get(&url).query(query).send().await?;
		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if !response.status().is_success() {
			return Err(rejection(response).await);
		}

		Ok(Some(response.json().await?))
	}

	async fn put_json(&self, path: &str, body: &Value) -> Result<Value, NodeError> {
		let url = format!("{}{}", self.base_url, path);
		debug!("PUT {}", url);

		let response = self
			.http_client
			.put(&url)
			.header("Content-Type", "application/json")
			.json(body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(rejection(response).await);
		}

		Ok(response.json().await?)
	}

	async fn announce_to(
		&self,
		path: &str,
		signed: &SignedTransaction,
	) -> Result<String, NodeError> {
		signed.validate()?;

		let response = self
			.put_json(path, &json!({ "payload": signed.payload }))
			.await?;
		let message = response
			.get("message")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();

		info!("Announced transaction {}: {}", signed.hash, message);
		Ok(message)
	}
}

/// WebSocket endpoint of a node given its REST URL.
pub fn websocket_url(base_url: &str) -> String {
	let base_url = base_url.trim_end_matches('/');
	let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
		format!("wss://{}", rest)
	} else if let Some(rest) = base_url.strip_prefix("http://") {
		format!("ws://{}", rest)
	} else {
		base_url.to_string()
	};
	format!("{}/ws", ws_base)
}

async fn rejection(response: reqwest::Response) -> NodeError {
	let status = response.status();
	let message = match response.json::<Value>().await {
		Ok(body) => body
			.get("message")
			.and_then(Value::as_str)
			.map(str::to_string)
			.unwrap_or_else(|| body.to_string()),
		Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
	};
	NodeError::Rejected {
		status: status.as_u16(),
		message,
	}
}

/// Items of a paged `{"data": [...]}` response.
fn page_items(value: &Value) -> &[Value] {
	value
		.get("data")
		.and_then(Value::as_array)
		.map(Vec::as_slice)
		.unwrap_or_default()
}

#[async_trait::async_trait]
impl RemoteLedgerService for NodeClient {
	fn base_url(&self) -> &str {
		&self.base_url
	}

	async fn account_info(&self, address: &Address) -> Result<AccountInfo, NodeError> {
		let response = self
			.get_json(&format!("/accounts/{}", address.plain()), &[])
			.await?;
		AccountInfo::from_rest(address, &response)
	}

	async fn transactions(
		&self,
		address: &Address,
		group: TransactionGroup,
		page: PageQuery,
	) -> Result<Vec<TransactionData>, NodeError> {
		let response = self
			.get_json(
				&format!("/transactions/{}", group.as_str()),
				&[
					("address", address.plain().to_string()),
					("pageSize", page.page_size.to_string()),
					("pageNumber", page.page_number.to_string()),
					("order", "desc".to_string()),
				],
			)
			.await?;

		page_items(&response)
			.iter()
			.map(TransactionData::from_rest)
			.collect()
	}

	async fn owned_mosaics(&self, address: &Address) -> Result<Vec<MosaicInfo>, NodeError> {
		let response = self
			.get_json("/mosaics", &[("ownerAddress", address.plain().to_string())])
			.await?;

		page_items(&response)
			.iter()
			.map(|item| {
				let mosaic = item.get("mosaic").ok_or(NodeError::NoData)?;
				Ok(serde_json::from_value(mosaic.clone())?)
			})
			.collect()
	}

	async fn owned_namespaces(&self, address: &Address) -> Result<Vec<NamespaceInfo>, NodeError> {
		let response = self
			.get_json("/namespaces", &[("ownerAddress", address.plain().to_string())])
			.await?;

		page_items(&response)
			.iter()
			.map(NamespaceInfo::from_rest)
			.collect()
	}

	async fn multisig_info(&self, address: &Address) -> Result<Option<MultisigInfo>, NodeError> {
		let Some(response) = self
			.get_optional_json(&format!("/account/{}/multisig", address.plain()), &[])
			.await?
		else {
			return Ok(None);
		};

		let multisig = response.get("multisig").ok_or(NodeError::NoData)?;
		Ok(Some(serde_json::from_value(multisig.clone())?))
	}

	async fn node_info(&self) -> Result<NodeInfo, NodeError> {
		let response = self.get_json("/node/info", &[]).await?;
		Ok(serde_json::from_value(response)?)
	}

	async fn chain_height(&self) -> Result<u64, NodeError> {
		let response = self.get_json("/chain/info", &[]).await?;
		match response.get("height") {
			Some(Value::String(height)) => height
				.parse()
				.map_err(|_| NodeError::InvalidPayload(format!("invalid height '{}'", height))),
			Some(Value::Number(height)) => height.as_u64().ok_or(NodeError::NoData),
			_ => Err(NodeError::NoData),
		}
	}

	async fn announce(&self, signed: &SignedTransaction) -> Result<String, NodeError> {
		self.announce_to("/transactions", signed).await
	}

	async fn announce_partial(&self, signed: &SignedTransaction) -> Result<String, NodeError> {
		self.announce_to("/transactions/partial", signed).await
	}

	async fn open_listener(&self, events: EventSender) -> Result<Box<dyn Listener>, NodeError> {
		let listener = WsListener::connect(&self.websocket_url(), events).await?;
		Ok(Box::new(listener))
	}
}

/// Creates [`NodeClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeClientFactory;

impl LedgerServiceFactory for NodeClientFactory {
	fn create(&self, base_url: &str) -> Result<Arc<dyn RemoteLedgerService>, NodeError> {
		Ok(Arc::new(NodeClient::new(base_url)?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpListener;

	const ADDRESS: &str = "TDDGQWDPLFAUUVSOFJHBHXMLXJ5MTYSQ3OHGOAYA";

	/// Serve exactly one HTTP response and hand back the request line.
	async fn serve_once(
		status: &'static str,
		body: &'static str,
	) -> (String, tokio::task::JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let base_url = format!("http://{}", listener.local_addr().unwrap());

		let handle = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut request = Vec::new();
			let mut buf = [0u8; 4096];

			// Read headers, then as much body as Content-Length announces
			let header_end = loop {
				let n = socket.read(&mut buf).await.unwrap();
				request.extend_from_slice(&buf[..n]);
				if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
					break pos + 4;
				}
				if n == 0 {
					break request.len();
				}
			};
			let head = String::from_utf8_lossy(&request[..header_end]).to_string();
			let content_length = head
				.lines()
				.find_map(|line| {
					let (name, value) = line.split_once(':')?;
					name.eq_ignore_ascii_case("content-length")
						.then(|| value.trim().parse::<usize>().ok())
						.flatten()
				})
				.unwrap_or(0);
			while request.len() < header_end + content_length {
				let n = socket.read(&mut buf).await.unwrap();
				if n == 0 {
					break;
				}
				request.extend_from_slice(&buf[..n]);
			}

			let response = format!(
				"HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
				status,
				body.len(),
				body
			);
			socket.write_all(response.as_bytes()).await.unwrap();
			socket.shutdown().await.ok();

			head.lines().next().unwrap_or_default().to_string()
		});

		(base_url, handle)
	}

	fn signed() -> SignedTransaction {
		SignedTransaction {
			payload: "0A0B0C".to_string(),
			hash: "AB".repeat(32),
			signer_public_key: "CD".repeat(32),
			network_type: NetworkType::TestNet,
		}
	}

	#[test]
	fn test_websocket_url() {
		assert_eq!(websocket_url("http://localhost:3000"), "ws://localhost:3000/ws");
		assert_eq!(
			websocket_url("https://node.example.com:3001/"),
			"wss://node.example.com:3001/ws"
		);
		let client = NodeClient::new("http://localhost:3000/").unwrap();
		assert_eq!(client.base_url(), "http://localhost:3000");
		assert_eq!(client.websocket_url(), "ws://localhost:3000/ws");
	}

	#[tokio::test]
	async fn test_account_info() {
		let (base_url, server) = serve_once(
			"200 OK",
			r#"{"account":{"publicKey":"AB","importance":"0","mosaics":[{"id":"6BED913FA20223F8","amount":"10"}]}}"#,
		)
		.await;
		let client = NodeClient::new(&base_url).unwrap();
		let address = Address::parse(ADDRESS).unwrap();

		let info = client.account_info(&address).await.unwrap();
		assert_eq!(info.balance("6BED913FA20223F8"), 10);
		assert_eq!(server.await.unwrap(), format!("GET /accounts/{} HTTP/1.1", ADDRESS));
	}

	#[tokio::test]
	async fn test_transactions_page() {
		let (base_url, server) = serve_once(
			"200 OK",
			r#"{"data":[{"meta":{"hash":"A1","height":"10","index":1},"transaction":{"type":16724}}],"pagination":{"pageNumber":1,"pageSize":100}}"#,
		)
		.await;
		let client = NodeClient::new(&base_url).unwrap();
		let address = Address::parse(ADDRESS).unwrap();

		let page = client
			.transactions(&address, TransactionGroup::Confirmed, PageQuery::default())
			.await
			.unwrap();
		assert_eq!(page.len(), 1);
		assert_eq!(page[0].hash, "A1");

		let request_line = server.await.unwrap();
		assert!(request_line.starts_with("GET /transactions/confirmed?"));
		assert!(request_line.contains(&format!("address={}", ADDRESS)));
		assert!(request_line.contains("order=desc"));
	}

	#[tokio::test]
	async fn test_multisig_not_found_is_none() {
		let body = r#"{"code":"ResourceNotFound","message":"no resource"}"#;
		let (base_url, _server) = serve_once("404 Not Found", body).await;
		let client = NodeClient::new(&base_url).unwrap();
		let address = Address::parse(ADDRESS).unwrap();

		assert_eq!(client.multisig_info(&address).await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_announce_accepted() {
		let (base_url, server) = serve_once(
			"202 Accepted",
			r#"{"message":"packet 9 was pushed to the network via /transactions"}"#,
		)
		.await;
		let client = NodeClient::new(&base_url).unwrap();

		let message = client.announce(&signed()).await.unwrap();
		assert!(message.starts_with("packet 9"));
		assert_eq!(server.await.unwrap(), "PUT /transactions HTTP/1.1");
	}

	#[tokio::test]
	async fn test_announce_rejected() {
		let body = r#"{"code":"InvalidArgument","message":"payload malformed"}"#;
		let (base_url, _server) = serve_once("409 Conflict", body).await;
		let client = NodeClient::new(&base_url).unwrap();

		match client.announce_partial(&signed()).await {
			Err(NodeError::Rejected { status, message }) => {
				assert_eq!(status, 409);
				assert_eq!(message, "payload malformed");
			}
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_announce_invalid_payload_is_not_sent() {
		let client = NodeClient::new("http://127.0.0.1:9").unwrap();
		let mut invalid = signed();
		invalid.payload = String::new();

		assert!(matches!(
			client.announce(&invalid).await,
			Err(NodeError::InvalidPayload(_))
		));
	}
}
