//! JSON-RPC request/response dialect.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::address::{Address, Cell};
use crate::api::throttle::{ThrottledClient, decode_json};
use crate::api::types::{
    AccountState, AccountStatus, GetMethodResult, StackItem, TransactionId, TransactionInfo,
    de_u64_flexible, parse_int,
};
use crate::api::{ApiDialect, LedgerApi};
use crate::error::TransportError;

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone)]
pub struct V2Client {
    endpoint: String,
    api_key: Option<String>,
    http: ThrottledClient,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireTransactionId {
    #[serde(deserialize_with = "de_u64_flexible")]
    lt: u64,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct WireAddressInformation {
    #[serde(deserialize_with = "de_u64_flexible")]
    balance: u64,
    state: String,
    #[serde(default)]
    last_transaction_id: Option<WireTransactionId>,
}

#[derive(Debug, Deserialize)]
struct WireComputePhase {
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    success: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDescription {
    #[serde(default)]
    aborted: bool,
    #[serde(default)]
    compute_ph: Option<WireComputePhase>,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    transaction_id: WireTransactionId,
    utime: u64,
    #[serde(deserialize_with = "de_u64_flexible")]
    fee: u64,
    #[serde(default)]
    description: Option<WireDescription>,
}

#[derive(Debug, Deserialize)]
struct WireRunResult {
    exit_code: i32,
    #[serde(default)]
    stack: Vec<Vec<Value>>,
}

impl V2Client {
    #[must_use]
    pub fn new(endpoint: &str, api_key: Option<String>, http: ThrottledClient) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            api_key,
            http,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        once: bool,
    ) -> Result<T, TransportError> {
        let mut request = self.http.inner().post(&self.endpoint).json(&json!({
            "id": 1,
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }));
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = if once {
            self.http.send_once(request).await?
        } else {
            self.http.send(request).await?
        };
        let envelope: RpcEnvelope<T> = decode_json(response).await?;

        match envelope {
            RpcEnvelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            RpcEnvelope { error, code, .. } => Err(TransportError::Api(format!(
                "{method} failed ({}): {}",
                code.map_or_else(|| "no code".to_string(), |c| c.to_string()),
                error.unwrap_or_else(|| "empty result".to_string())
            ))),
        }
    }
}

fn stack_item(entry: &[Value]) -> StackItem {
    let kind = entry.first().and_then(Value::as_str).unwrap_or_default();
    match kind {
        "num" => entry
            .get(1)
            .and_then(Value::as_str)
            .and_then(parse_int)
            .map_or_else(|| StackItem::Unsupported(kind.to_string()), StackItem::Int),
        "cell" => entry
            .get(1)
            .and_then(|cell| cell.get("bytes"))
            .and_then(Value::as_str)
            .and_then(|bytes| Cell::from_base64(bytes).ok())
            .map_or_else(|| StackItem::Unsupported(kind.to_string()), StackItem::Cell),
        "null" => StackItem::Null,
        other => StackItem::Unsupported(other.to_string()),
    }
}

impl From<WireTransaction> for TransactionInfo {
    fn from(tx: WireTransaction) -> Self {
        let description = tx.description.unwrap_or_default();
        let compute = description.compute_ph;
        Self {
            hash: tx.transaction_id.hash,
            lt: tx.transaction_id.lt,
            utime: tx.utime,
            exit_code: compute.as_ref().and_then(|c| c.exit_code),
            aborted: description.aborted,
            success: compute.and_then(|c| c.success),
            total_fees: tx.fee,
        }
    }
}

#[async_trait]
impl LedgerApi for V2Client {
    fn dialect(&self) -> ApiDialect {
        ApiDialect::V2
    }

    async fn account_state(&self, address: &Address) -> Result<AccountState, TransportError> {
        let info: WireAddressInformation = self
            .call(
                "getAddressInformation",
                json!({ "address": address.to_string() }),
                false,
            )
            .await?;

        Ok(AccountState {
            status: AccountStatus::from_wire(&info.state),
            balance: info.balance,
            last_transaction: info
                .last_transaction_id
                .filter(|id| id.lt != 0)
                .map(|id| TransactionId {
                    lt: id.lt,
                    hash: id.hash,
                }),
        })
    }

    async fn transactions(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<TransactionInfo>, TransportError> {
        let txs: Vec<WireTransaction> = self
            .call(
                "getTransactions",
                json!({ "address": address.to_string(), "limit": limit }),
                false,
            )
            .await?;
        Ok(txs.into_iter().map(TransactionInfo::from).collect())
    }

    async fn run_get_method(
        &self,
        address: &Address,
        method: &str,
    ) -> Result<GetMethodResult, TransportError> {
        let result: WireRunResult = self
            .call(
                "runGetMethod",
                json!({ "address": address.to_string(), "method": method, "stack": [] }),
                false,
            )
            .await?;

        Ok(GetMethodResult {
            exit_code: result.exit_code,
            stack: result.stack.iter().map(|entry| stack_item(entry)).collect(),
        })
    }

    async fn send_message(&self, message: &[u8]) -> Result<(), TransportError> {
        let _: Value = self
            .call("sendBoc", json!({ "boc": STANDARD.encode(message) }), true)
            .await?;
        Ok(())
    }
}
