//! Post-send deployment verification.
//!
//! The verifier first waits for the address to become active, then inspects
//! its latest transaction. Exit codes 0 and 1 both count as success. When an
//! indexer is configured its opinion is recorded but never overrides the
//! primary client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use tracing::{debug, info, warn};

use crate::address::{Address, NANO_PER_COIN};
use crate::api::types::{AccountState, TransactionInfo};
use crate::api::{LedgerApi, TransactionLookup};
use crate::error::VerifyError;
use crate::network::{Explorer, Network};

pub const DEFAULT_ATTEMPTS: u32 = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_TX_FETCH_ATTEMPTS: u32 = 5;
pub const DEFAULT_TX_FETCH_INTERVAL: Duration = Duration::from_secs(2);

/// Compute exit codes treated as success.
const SUCCESS_EXIT_CODES: [i32; 2] = [0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub tx_fetch_attempts: u32,
    pub tx_fetch_interval: Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            tx_fetch_attempts: DEFAULT_TX_FETCH_ATTEMPTS,
            tx_fetch_interval: DEFAULT_TX_FETCH_INTERVAL,
        }
    }
}

impl VerifyPolicy {
    /// Same budgets, no sleeping.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            poll_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
            tx_fetch_attempts: DEFAULT_TX_FETCH_ATTEMPTS,
            tx_fetch_interval: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_polling(mut self, attempts: Option<u32>, interval: Option<Duration>) -> Self {
        if let Some(attempts) = attempts {
            self.max_attempts = attempts.max(1);
        }
        if let Some(interval) = interval {
            self.poll_interval = interval;
        }
        self
    }
}

/// What the latest transaction says about the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub exit_code: Option<i32>,
    pub aborted: bool,
    pub success: Option<bool>,
    pub total_fees: u64,
    pub lt: u64,
    pub utime: u64,
    pub hash: String,
}

impl From<&TransactionInfo> for Diagnostics {
    fn from(tx: &TransactionInfo) -> Self {
        Self {
            exit_code: tx.exit_code,
            aborted: tx.aborted,
            success: tx.success,
            total_fees: tx.total_fees,
            lt: tx.lt,
            utime: tx.utime,
            hash: tx.hash.clone(),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "exit code {code}")?,
            None => write!(f, "compute phase skipped")?,
        }
        if self.aborted {
            write!(f, ", aborted")?;
        }
        write!(
            f,
            ", fees {}.{:09} ({} nano), lt {}, time {}, tx {}",
            self.total_fees / NANO_PER_COIN,
            self.total_fees % NANO_PER_COIN,
            self.total_fees,
            self.lt,
            self.utime,
            self.hash
        )
    }
}

/// The indexer's second opinion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    NotChecked,
    Agrees,
    /// The indexer classified the transaction differently.
    Disagrees { indexer_success: bool },
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub success: bool,
    /// `false` means the outcome is still unknown; not a failure.
    pub terminal: bool,
    pub diagnostics: Option<Diagnostics>,
    pub advisory: Advisory,
    pub explorer_link: Option<String>,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match (self.terminal, self.success) {
            (true, true) => "deployed successfully",
            (true, false) => "deployment failed",
            (false, _) => "contract is active, transaction not found yet; probably deployed",
        };
        f.write_str(verdict)?;
        if let Some(diagnostics) = &self.diagnostics {
            write!(f, "\n  {diagnostics}")?;
        }
        match &self.advisory {
            Advisory::Disagrees { indexer_success } => write!(
                f,
                "\n  indexer reports {}",
                if *indexer_success { "success" } else { "failure" }
            )?,
            Advisory::Unavailable(reason) => write!(f, "\n  indexer check unavailable: {reason}")?,
            Advisory::NotChecked | Advisory::Agrees => {}
        }
        if let Some(link) = &self.explorer_link {
            write!(f, "\n  {link}")?;
        }
        Ok(())
    }
}

/// Success unless the compute phase exited outside {0, 1}, the transaction
/// reports an explicit failure, or it was aborted.
#[must_use]
pub fn classify(tx: &TransactionInfo) -> bool {
    if tx.aborted || tx.success == Some(false) {
        return false;
    }
    tx.exit_code
        .is_none_or(|code| SUCCESS_EXIT_CODES.contains(&code))
}

/// Indexers key transactions by hex hash; some clients report base64.
#[must_use]
pub fn normalize_hash(hash: &str) -> String {
    if hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return hash.to_ascii_lowercase();
    }
    STANDARD
        .decode(hash)
        .or_else(|_| URL_SAFE.decode(hash))
        .ok()
        .filter(|bytes| bytes.len() == 32)
        .map_or_else(|| hash.to_string(), hex::encode)
}

pub struct DeploymentVerifier {
    api: Arc<dyn LedgerApi>,
    indexer: Option<Arc<dyn TransactionLookup>>,
    policy: VerifyPolicy,
    links: Option<(Network, Explorer)>,
}

impl DeploymentVerifier {
    #[must_use]
    pub fn new(
        api: Arc<dyn LedgerApi>,
        indexer: Option<Arc<dyn TransactionLookup>>,
        policy: VerifyPolicy,
    ) -> Self {
        Self {
            api,
            indexer,
            policy,
            links: None,
        }
    }

    #[must_use]
    pub fn with_links(mut self, network: Network, explorer: Explorer) -> Self {
        self.links = Some((network, explorer));
        self
    }

    /// Polls until the address is active. Errors while polling mean "not
    /// visible yet".
    pub async fn wait_until_active(&self, address: &Address) -> Result<AccountState, VerifyError> {
        for attempt in 1..=self.policy.max_attempts {
            match self.api.account_state(address).await {
                Ok(state) if state.is_active() => {
                    info!(%address, attempt, "contract is active");
                    return Ok(state);
                }
                Ok(state) => debug!(%address, attempt, status = ?state.status, "not active yet"),
                Err(error) => debug!(%address, attempt, %error, "state query failed, retrying"),
            }
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.poll_interval).await;
            }
        }

        Err(VerifyError::Exhausted {
            address: address.to_string(),
            attempts: self.policy.max_attempts,
        })
    }

    async fn latest_transaction(&self, address: &Address) -> Option<TransactionInfo> {
        for attempt in 1..=self.policy.tx_fetch_attempts {
            match self.api.transactions(address, 1).await {
                Ok(txs) => {
                    if let Some(tx) = txs.into_iter().next() {
                        return Some(tx);
                    }
                    debug!(%address, attempt, "no transactions indexed yet");
                }
                Err(error) => debug!(%address, attempt, %error, "transaction fetch failed"),
            }
            if attempt < self.policy.tx_fetch_attempts {
                tokio::time::sleep(self.policy.tx_fetch_interval).await;
            }
        }
        None
    }

    async fn cross_check(&self, tx: &TransactionInfo, primary_success: bool) -> Advisory {
        let Some(indexer) = &self.indexer else {
            return Advisory::NotChecked;
        };

        match indexer.transaction_by_hash(&normalize_hash(&tx.hash)).await {
            Ok(Some(indexed)) => {
                let indexer_success = classify(&indexed);
                if indexer_success == primary_success {
                    return Advisory::Agrees;
                }
                if primary_success {
                    warn!(
                        hash = %tx.hash,
                        exit_code = ?indexed.exit_code,
                        "indexer reports failure for a transaction the primary client reports as successful"
                    );
                } else {
                    debug!(hash = %tx.hash, "indexer reports success, keeping primary failure");
                }
                Advisory::Disagrees { indexer_success }
            }
            Ok(None) => Advisory::Unavailable("transaction not indexed yet".to_string()),
            Err(error) => {
                debug!(%error, "indexer cross-check failed");
                Advisory::Unavailable(error.to_string())
            }
        }
    }

    pub async fn verify(&self, address: &Address) -> Result<VerificationResult, VerifyError> {
        self.wait_until_active(address).await?;
        tokio::time::sleep(self.policy.settle_delay).await;

        let Some(tx) = self.latest_transaction(address).await else {
            warn!(%address, "contract is active but its transaction could not be fetched");
            return Ok(VerificationResult {
                success: true,
                terminal: false,
                diagnostics: None,
                advisory: Advisory::NotChecked,
                explorer_link: self
                    .links
                    .as_ref()
                    .and_then(|(network, explorer)| explorer.address_link(network, address)),
            });
        };

        let success = classify(&tx);
        let advisory = self.cross_check(&tx, success).await;
        let explorer_link = self.links.as_ref().and_then(|(network, explorer)| {
            explorer.transaction_link(network, &normalize_hash(&tx.hash))
        });

        info!(%address, success, exit_code = ?tx.exit_code, lt = tx.lt, "deployment transaction classified");
        Ok(VerificationResult {
            success,
            terminal: true,
            diagnostics: Some(Diagnostics::from(&tx)),
            advisory,
            explorer_link,
        })
    }
}
