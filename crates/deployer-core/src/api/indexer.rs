//! REST indexer dialect. Also serves hash-keyed transaction lookups for the
//! verifier's cross-check.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::address::{Address, Cell};
use crate::api::throttle::{ThrottledClient, decode_json};
use crate::api::types::{
    AccountState, AccountStatus, GetMethodResult, StackItem, TransactionId, TransactionInfo,
    de_u64_flexible, parse_int,
};
use crate::api::{ApiDialect, LedgerApi, TransactionLookup};
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct IndexerClient {
    endpoint: String,
    api_key: Option<String>,
    http: ThrottledClient,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    #[serde(deserialize_with = "de_u64_flexible")]
    balance: u64,
    status: String,
    #[serde(default)]
    last_transaction_lt: Option<u64>,
    #[serde(default)]
    last_transaction_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireComputePhase {
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    skipped: bool,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    hash: String,
    lt: u64,
    utime: u64,
    #[serde(deserialize_with = "de_u64_flexible")]
    total_fees: u64,
    success: bool,
    #[serde(default)]
    aborted: bool,
    #[serde(default)]
    compute_phase: Option<WireComputePhase>,
}

#[derive(Debug, Deserialize)]
struct WireTransactions {
    transactions: Vec<WireTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireStackItem {
    Num { num: String },
    Cell { cell: String },
    Null,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireRunResult {
    exit_code: i32,
    #[serde(default)]
    stack: Vec<WireStackItem>,
}

impl From<WireTransaction> for TransactionInfo {
    fn from(tx: WireTransaction) -> Self {
        Self {
            hash: tx.hash,
            lt: tx.lt,
            utime: tx.utime,
            exit_code: tx
                .compute_phase
                .filter(|phase| !phase.skipped)
                .and_then(|phase| phase.exit_code),
            aborted: tx.aborted,
            success: Some(tx.success),
            total_fees: tx.total_fees,
        }
    }
}

impl From<WireStackItem> for StackItem {
    fn from(item: WireStackItem) -> Self {
        match item {
            WireStackItem::Num { num } => {
                parse_int(&num).map_or(Self::Unsupported("num".to_string()), Self::Int)
            }
            WireStackItem::Cell { cell } => hex::decode(&cell)
                .map_or(Self::Unsupported("cell".to_string()), |bytes| {
                    Self::Cell(Cell::new(bytes))
                }),
            WireStackItem::Null => Self::Null,
            WireStackItem::Other => Self::Unsupported("other".to_string()),
        }
    }
}

impl IndexerClient {
    #[must_use]
    pub fn new(endpoint: &str, api_key: Option<String>, http: ThrottledClient) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            api_key,
            http,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.inner().get(format!("{}{path}", self.endpoint));
        self.authorize(request)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl LedgerApi for IndexerClient {
    fn dialect(&self) -> ApiDialect {
        ApiDialect::Indexer
    }

    async fn account_state(&self, address: &Address) -> Result<AccountState, TransportError> {
        let response = self
            .http
            .send(self.get(&format!("/v2/blockchain/accounts/{address}")))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(AccountState {
                status: AccountStatus::Nonexist,
                balance: 0,
                last_transaction: None,
            });
        }
        let account: WireAccount = decode_json(response).await?;

        let last_transaction = match (account.last_transaction_lt, account.last_transaction_hash) {
            (Some(lt), Some(hash)) if lt != 0 => Some(TransactionId { lt, hash }),
            _ => None,
        };

        Ok(AccountState {
            status: AccountStatus::from_wire(&account.status),
            balance: account.balance,
            last_transaction,
        })
    }

    async fn transactions(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<TransactionInfo>, TransportError> {
        let response = self
            .http
            .send(self.get(&format!(
                "/v2/blockchain/accounts/{address}/transactions?limit={limit}"
            )))
            .await?;
        let wire: WireTransactions = decode_json(response).await?;
        Ok(wire
            .transactions
            .into_iter()
            .map(TransactionInfo::from)
            .collect())
    }

    async fn run_get_method(
        &self,
        address: &Address,
        method: &str,
    ) -> Result<GetMethodResult, TransportError> {
        let response = self
            .http
            .send(self.get(&format!(
                "/v2/blockchain/accounts/{address}/methods/{method}"
            )))
            .await?;
        let result: WireRunResult = decode_json(response).await?;

        Ok(GetMethodResult {
            exit_code: result.exit_code,
            stack: result.stack.into_iter().map(StackItem::from).collect(),
        })
    }

    async fn send_message(&self, message: &[u8]) -> Result<(), TransportError> {
        let request = self.authorize(
            self.http
                .inner()
                .post(format!("{}/v2/blockchain/message", self.endpoint))
                .json(&json!({ "boc": STANDARD.encode(message) })),
        );
        let response = self.http.send_once(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionLookup for IndexerClient {
    async fn transaction_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionInfo>, TransportError> {
        let response = self
            .http
            .send(self.get(&format!("/v2/blockchain/transactions/{hash}")))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let tx: WireTransaction = decode_json(response).await?;
        Ok(Some(tx.into()))
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;

    use super::*;
    use crate::api::throttle::RetryPolicy;

    async fn spawn_indexer() -> String {
        let app = Router::new().route(
            "/v2/blockchain/transactions/{hash}",
            get(|Path(hash): Path<String>| async move {
                if hash == "missing" {
                    return AxumStatus::NOT_FOUND.into_response();
                }
                axum::Json(json!({
                    "hash": hash,
                    "lt": 12,
                    "utime": 1_700_000_100,
                    "total_fees": 5000,
                    "success": false,
                    "aborted": true,
                    "compute_phase": { "exit_code": 9, "skipped": false }
                }))
                .into_response()
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn lookup_by_hash() {
        let endpoint = spawn_indexer().await;
        let http = ThrottledClient::new(RetryPolicy::immediate(1)).expect("client");
        let client = IndexerClient::new(&endpoint, Some("key".to_string()), http);

        let tx = client
            .transaction_by_hash("abc")
            .await
            .expect("lookup")
            .expect("found");
        assert_eq!(tx.exit_code, Some(9));
        assert_eq!(tx.success, Some(false));
        assert!(tx.aborted);

        assert_eq!(client.transaction_by_hash("missing").await.expect("lookup"), None);
    }
}
