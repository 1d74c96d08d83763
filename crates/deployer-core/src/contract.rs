//! Contract handle that attaches its constructor payload only while the
//! address is not yet active.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::address::{Address, Cell, ContractInit};
use crate::api::LedgerApi;
use crate::api::types::{AccountState, GetMethodResult, TransactionInfo};
use crate::error::{SendError, TransportError};
use crate::send::{SendOutcome, Sender, SenderArguments, check_send_mode};

/// An internal message sent to the contract through the active signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalMessage {
    pub value: u64,
    pub body: Option<Cell>,
    pub send_mode: Option<u8>,
    pub bounce: Option<bool>,
}

impl InternalMessage {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            body: None,
            send_mode: None,
            bounce: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Option<Cell>) -> Self {
        self.body = body;
        self
    }
}

#[derive(Serialize)]
struct ExternalEnvelope<'a> {
    to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    init: Option<&'a ContractInit>,
    body: &'a Cell,
}

#[derive(Clone)]
pub struct ContractProvider {
    address: Address,
    init: Option<ContractInit>,
    api: Arc<dyn LedgerApi>,
    sender: Option<Arc<dyn Sender>>,
}

impl ContractProvider {
    #[must_use]
    pub fn new(
        address: Address,
        init: Option<ContractInit>,
        api: Arc<dyn LedgerApi>,
        sender: Option<Arc<dyn Sender>>,
    ) -> Self {
        Self {
            address,
            init,
            api,
            sender,
        }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Opens another contract through the same client and signer.
    #[must_use]
    pub fn open(&self, address: Address, init: Option<ContractInit>) -> Self {
        Self::new(address, init, Arc::clone(&self.api), self.sender.clone())
    }

    pub async fn state(&self) -> Result<AccountState, TransportError> {
        self.api.account_state(&self.address).await
    }

    /// The constructor payload to attach right now, if any.
    async fn pending_init(&self) -> Result<Option<&ContractInit>, TransportError> {
        let Some(init) = &self.init else {
            return Ok(None);
        };
        let state = self.state().await?;
        debug!(address = %self.address, status = ?state.status, "checked contract state");
        Ok((!state.is_active()).then_some(init))
    }

    pub async fn internal(&self, message: InternalMessage) -> Result<SendOutcome, SendError> {
        let sender = self.sender.as_ref().ok_or(SendError::NotConnected)?;
        check_send_mode(message.send_mode)?;
        let init = self.pending_init().await?.cloned();

        sender
            .send(SenderArguments {
                to: self.address,
                value: message.value,
                bounce: message.bounce,
                send_mode: message.send_mode,
                body: message.body,
                init,
            })
            .await
    }

    /// Submits an external message straight to the ledger, bypassing the
    /// signer.
    pub async fn external(&self, body: &Cell) -> Result<(), SendError> {
        let init = self.pending_init().await?;
        let envelope = serde_json::to_vec(&ExternalEnvelope {
            to: self.address,
            init,
            body,
        })?;
        self.api.send_message(&envelope).await?;
        Ok(())
    }

    pub async fn get(&self, method: &str) -> Result<GetMethodResult, TransportError> {
        self.api.run_get_method(&self.address, method).await
    }

    pub async fn transactions(&self, limit: u32) -> Result<Vec<TransactionInfo>, TransportError> {
        self.api.transactions(&self.address, limit).await
    }
}
