use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::address::{Address, Cell, ContractInit};
use crate::api::{LedgerApi, TransactionLookup};
use crate::contract::{ContractProvider, InternalMessage};
use crate::error::{ConfigError, DeployError, TransportError, VerifyError};
use crate::network::{Explorer, Network};
use crate::send::{SendOutcome, Sender};
use crate::verify::{DeploymentVerifier, VerificationResult, VerifyPolicy};

/// Contracts are deployed to the basechain.
pub const DEPLOY_WORKCHAIN: i8 = 0;

/// Outcome of [`NetworkProvider::deploy`].
#[derive(Debug)]
pub struct Deployment {
    pub address: Address,
    pub outcome: SendOutcome,
    pub verification: VerificationResult,
}

/// Everything one invocation needs to talk to the selected network.
pub struct NetworkProvider {
    network: Network,
    explorer: Explorer,
    api: Arc<dyn LedgerApi>,
    indexer: Option<Arc<dyn TransactionLookup>>,
    sender: Option<Arc<dyn Sender>>,
    verify_policy: VerifyPolicy,
}

impl NetworkProvider {
    #[must_use]
    pub fn new(
        network: Network,
        explorer: Explorer,
        api: Arc<dyn LedgerApi>,
        indexer: Option<Arc<dyn TransactionLookup>>,
        sender: Option<Arc<dyn Sender>>,
    ) -> Self {
        Self {
            network,
            explorer,
            api,
            indexer,
            sender,
            verify_policy: VerifyPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_verify_policy(mut self, policy: VerifyPolicy) -> Self {
        self.verify_policy = policy;
        self
    }

    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub const fn explorer(&self) -> Explorer {
        self.explorer
    }

    #[must_use]
    pub fn api(&self) -> &Arc<dyn LedgerApi> {
        &self.api
    }

    pub fn sender(&self) -> Result<&Arc<dyn Sender>, ConfigError> {
        self.sender
            .as_ref()
            .ok_or(ConfigError::MissingSelection("signer"))
    }

    #[must_use]
    pub fn open(&self, address: Address, init: Option<ContractInit>) -> ContractProvider {
        ContractProvider::new(address, init, Arc::clone(&self.api), self.sender.clone())
    }

    pub async fn is_contract_deployed(&self, address: &Address) -> Result<bool, TransportError> {
        Ok(self.api.account_state(address).await?.is_active())
    }

    #[must_use]
    pub fn verifier(&self, policy: VerifyPolicy) -> DeploymentVerifier {
        DeploymentVerifier::new(Arc::clone(&self.api), self.indexer.clone(), policy)
            .with_links(self.network.clone(), self.explorer)
    }

    /// Polls `address` until its deployment reaches a verdict. `None` keeps
    /// the configured budget.
    pub async fn wait_for_deploy(
        &self,
        address: &Address,
        attempts: Option<u32>,
        interval: Option<Duration>,
    ) -> Result<VerificationResult, VerifyError> {
        self.verifier(self.verify_policy.with_polling(attempts, interval))
            .verify(address)
            .await
    }

    /// Sends `init` with `value` attached, then waits for the verdict.
    pub async fn deploy(
        &self,
        init: ContractInit,
        value: u64,
        body: Option<Cell>,
    ) -> Result<Deployment, DeployError> {
        let address = init.address(DEPLOY_WORKCHAIN);
        self.sender()?;
        if self.is_contract_deployed(&address).await? {
            return Err(DeployError::AlreadyDeployed {
                address: self.network.format_address(&address, true),
            });
        }

        info!(%address, value, network = %self.network, "deploying contract");
        if let Some(link) = self.address_link(&address) {
            info!(%link, "contract address");
        }

        let outcome = self
            .open(address, Some(init))
            .internal(InternalMessage::new(value).with_body(body))
            .await?;

        let verification = self.wait_for_deploy(&address, None, None).await?;
        if let Some(diagnostics) = verification
            .diagnostics
            .as_ref()
            .filter(|_| verification.terminal && !verification.success)
        {
            warn!(%address, %diagnostics, "deployment failed on-chain");
            return Err(DeployError::OnChainFailure(Box::new(diagnostics.clone())));
        }

        Ok(Deployment {
            address,
            outcome,
            verification,
        })
    }

    #[must_use]
    pub fn address_link(&self, address: &Address) -> Option<String> {
        self.explorer.address_link(&self.network, address)
    }

    #[must_use]
    pub fn transaction_link(&self, hash: &str) -> Option<String> {
        self.explorer.transaction_link(&self.network, hash)
    }
}
