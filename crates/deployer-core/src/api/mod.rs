//! Ledger query clients for the three supported dialects.

pub mod indexer;
pub mod throttle;
pub mod types;
pub mod v2;
pub mod v4;

use async_trait::async_trait;
use url::Url;

pub use crate::network::ApiDialect;

use crate::address::Address;
use crate::error::{ConfigError, TransportError};

use self::indexer::IndexerClient;
use self::throttle::{RetryPolicy, ThrottledClient};
use self::types::{AccountState, GetMethodResult, TransactionInfo};
use self::v2::V2Client;
use self::v4::V4Client;

/// State queries and message submission against one ledger endpoint.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    fn dialect(&self) -> ApiDialect;

    async fn account_state(&self, address: &Address) -> Result<AccountState, TransportError>;

    /// Most recent transactions first.
    async fn transactions(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<TransactionInfo>, TransportError>;

    async fn run_get_method(
        &self,
        address: &Address,
        method: &str,
    ) -> Result<GetMethodResult, TransportError>;

    /// Submits a serialized external message. Never retried.
    async fn send_message(&self, message: &[u8]) -> Result<(), TransportError>;
}

/// Hash-keyed transaction lookup used as an advisory second opinion.
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    async fn transaction_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionInfo>, TransportError>;
}

/// The client chosen at build time, tagged by dialect.
#[derive(Debug, Clone)]
pub enum ApiClient {
    V2(V2Client),
    V4(V4Client),
    Indexer(IndexerClient),
}

impl ApiClient {
    /// Builds the client for `dialect`. The v4 dialect takes no API key; one
    /// being supplied is a configuration error.
    pub fn new(
        dialect: ApiDialect,
        endpoint: &str,
        api_key: Option<String>,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        validate_endpoint(endpoint)?;
        if dialect == ApiDialect::V4 && api_key.is_some() {
            return Err(ConfigError::ApiKeyWithV4);
        }

        let http = ThrottledClient::new(policy).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        Ok(match dialect {
            ApiDialect::V2 => Self::V2(V2Client::new(endpoint, api_key, http)),
            ApiDialect::V4 => Self::V4(V4Client::new(endpoint, http)),
            ApiDialect::Indexer => Self::Indexer(IndexerClient::new(endpoint, api_key, http)),
        })
    }

    fn inner(&self) -> &dyn LedgerApi {
        match self {
            Self::V2(client) => client,
            Self::V4(client) => client,
            Self::Indexer(client) => client,
        }
    }
}

pub(crate) fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };

    let parsed = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid("must use http:// or https://".to_string()));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("must include a host".to_string()));
    }
    Ok(())
}

#[async_trait]
impl LedgerApi for ApiClient {
    fn dialect(&self) -> ApiDialect {
        self.inner().dialect()
    }

    async fn account_state(&self, address: &Address) -> Result<AccountState, TransportError> {
        self.inner().account_state(address).await
    }

    async fn transactions(
        &self,
        address: &Address,
        limit: u32,
    ) -> Result<Vec<TransactionInfo>, TransportError> {
        self.inner().transactions(address, limit).await
    }

    async fn run_get_method(
        &self,
        address: &Address,
        method: &str,
    ) -> Result<GetMethodResult, TransportError> {
        self.inner().run_get_method(address, method).await
    }

    async fn send_message(&self, message: &[u8]) -> Result<(), TransportError> {
        self.inner().send_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_rejects_api_key() {
        let err = ApiClient::new(
            ApiDialect::V4,
            "http://127.0.0.1:1",
            Some("secret".to_string()),
            RetryPolicy::immediate(1),
        )
        .expect_err("must fail");
        assert!(matches!(err, ConfigError::ApiKeyWithV4));
    }

    #[test]
    fn dialect_tag_follows_construction() {
        for dialect in [ApiDialect::V2, ApiDialect::V4, ApiDialect::Indexer] {
            let client =
                ApiClient::new(dialect, "https://example.com", None, RetryPolicy::immediate(1))
                    .expect("client");
            assert_eq!(client.dialect(), dialect);
        }
    }

    #[test]
    fn endpoint_must_be_http() {
        let err = ApiClient::new(
            ApiDialect::V2,
            "ftp://example.com",
            None,
            RetryPolicy::default(),
        )
        .expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }
}
