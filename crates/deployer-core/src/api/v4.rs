//! Block-indexed dialect. Every account query is pinned to the latest block,
//! fetched first.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;

use crate::address::{Address, Cell};
use crate::api::throttle::{ThrottledClient, decode_json};
use crate::api::types::{
    AccountState, AccountStatus, GetMethodResult, StackItem, TransactionId, TransactionInfo,
    de_u64_flexible, parse_int,
};
use crate::api::{ApiDialect, LedgerApi};
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct V4Client {
    endpoint: String,
    http: ThrottledClient,
}

#[derive(Debug, Deserialize)]
struct WireLatestBlock {
    last: WireBlockRef,
}

#[derive(Debug, Deserialize)]
struct WireBlockRef {
    seqno: u64,
}

#[derive(Debug, Deserialize)]
struct WireAccountEnvelope {
    account: WireAccount,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    state: WireAccountState,
    balance: WireBalance,
    #[serde(default)]
    last: Option<WireLast>,
}

#[derive(Debug, Deserialize)]
struct WireAccountState {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct WireBalance {
    #[serde(deserialize_with = "de_u64_flexible")]
    coins: u64,
}

#[derive(Debug, Deserialize)]
struct WireLast {
    #[serde(deserialize_with = "de_u64_flexible")]
    lt: u64,
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    hash: String,
    #[serde(deserialize_with = "de_u64_flexible")]
    lt: u64,
    now: u64,
    #[serde(deserialize_with = "de_u64_flexible")]
    fees: u64,
    #[serde(default)]
    aborted: bool,
    #[serde(default)]
    compute_exit_code: Option<i32>,
    #[serde(default)]
    compute_success: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WireTransactions {
    transactions: Vec<WireTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireStackItem {
    Int { value: String },
    Cell { cell: String },
    Null,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRunResult {
    exit_code: i32,
    #[serde(default)]
    result: Vec<WireStackItem>,
}

impl V4Client {
    #[must_use]
    pub fn new(endpoint: &str, http: ThrottledClient) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn account_path(address: &Address) -> String {
        address.to_friendly(true, false)
    }

    async fn latest_seqno(&self) -> Result<u64, TransportError> {
        let response = self
            .http
            .send(self.http.inner().get(self.url("/block/latest")))
            .await?;
        let block: WireLatestBlock = decode_json(response).await?;
        Ok(block.last.seqno)
    }
}

impl From<WireStackItem> for StackItem {
    fn from(item: WireStackItem) -> Self {
        match item {
            WireStackItem::Int { value } => {
                parse_int(&value).map_or(Self::Unsupported("int".to_string()), Self::Int)
            }
            WireStackItem::Cell { cell } => Cell::from_base64(&cell)
                .map_or(Self::Unsupported("cell".to_string()), Self::Cell),
            WireStackItem::Null => Self::Null,
            WireStackItem::Other => Self::Unsupported("other".to_string()),
        }
    }
}

#[async_trait]
impl LedgerApi for V4Client {
    fn dialect(&self) -> ApiDialect {
        ApiDialect::V4
    }

    async fn account_state(&self, address: &Address) -> Result<AccountState, TransportError> {
        let seqno = self.latest_seqno().await?;
        let url = self.url(&format!("/block/{seqno}/{}", Self::account_path(address)));
        let response = self.http.send(self.http.inner().get(url)).await?;
        let envelope: WireAccountEnvelope = decode_json(response).await?;
        let account = envelope.account;

        Ok(AccountState {
            status: AccountStatus::from_wire(&account.state.kind),
            balance: account.balance.coins,
            last_transaction: account.last.map(|last| TransactionId {
                lt: last.lt,
                hash: last.hash,
            }),
        })
    }

    async fn transactions(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<TransactionInfo>, TransportError> {
        let state = self.account_state(address).await?;
        let Some(last) = state.last_transaction else {
            return Ok(Vec::new());
        };

        let hash = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(
            STANDARD
                .decode(&last.hash)
                .map_err(|e| TransportError::Decode(format!("transaction hash: {e}")))?,
        );
        let url = self.url(&format!(
            "/account/{}/tx/{}/{hash}?count={limit}",
            Self::account_path(address),
            last.lt
        ));
        let response = self.http.send(self.http.inner().get(url)).await?;
        let wire: WireTransactions = decode_json(response).await?;

        Ok(wire
            .transactions
            .into_iter()
            .map(|tx| TransactionInfo {
                hash: tx.hash,
                lt: tx.lt,
                utime: tx.now,
                exit_code: tx.compute_exit_code,
                aborted: tx.aborted,
                success: tx.compute_success,
                total_fees: tx.fees,
            })
            .collect())
    }

    async fn run_get_method(
        &self,
        address: &Address,
        method: &str,
    ) -> Result<GetMethodResult, TransportError> {
        let seqno = self.latest_seqno().await?;
        let url = self.url(&format!(
            "/block/{seqno}/{}/run/{method}",
            Self::account_path(address)
        ));
        let response = self.http.send(self.http.inner().get(url)).await?;
        let result: WireRunResult = decode_json(response).await?;

        Ok(GetMethodResult {
            exit_code: result.exit_code,
            stack: result.result.into_iter().map(StackItem::from).collect(),
        })
    }

    async fn send_message(&self, message: &[u8]) -> Result<(), TransportError> {
        let request = self
            .http
            .inner()
            .post(self.url("/send"))
            .json(&json!({ "boc": STANDARD.encode(message) }));
        let response = self.http.send_once(request).await?;
        let _: serde_json::Value = decode_json(response).await?;
        Ok(())
    }
}
