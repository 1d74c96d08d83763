//! Resolves network, API dialect, explorer and signer for one invocation.
//!
//! Every item is taken from an explicit flag first, then from the project
//! config, then from an interactive prompt. All contradictions are reported
//! before any client is constructed or any request leaves the process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::api::indexer::IndexerClient;
use crate::api::throttle::{RetryPolicy, ThrottledClient};
use crate::api::{ApiClient, ApiDialect, LedgerApi, TransactionLookup};
use crate::config::{ProjectConfig, SignerEnv};
use crate::error::{ConfigError, DeployError, SendError};
use crate::network::{
    CustomNetwork, Explorer, MAINNET_INDEXER_ENDPOINT, MAINNET_V4_ENDPOINT, Network, NetworkKind,
    TESTNET_INDEXER_ENDPOINT, TESTNET_V4_ENDPOINT,
};
use crate::prompt::Prompter;
use crate::provider::NetworkProvider;
use crate::send::bridge::{BridgeOptions, BridgeProvider};
use crate::send::deep_link::DeepLinkProvider;
use crate::send::mnemonic::MnemonicProvider;
use crate::send::{Mechanism, SendFacade, SendProvider, Sender};
use crate::storage::FsStorage;
use crate::verify::VerifyPolicy;

pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/ton-org/blueprint/main/tonconnect/manifest.json";
pub const DEFAULT_EXPLORER: Explorer = Explorer::Tonviewer;
const DEFAULT_WORKCHAIN: i8 = 0;

/// Selection flags as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFlags {
    pub mainnet: bool,
    pub testnet: bool,
    /// Endpoint of a custom network.
    pub custom: Option<String>,
    pub custom_type: Option<String>,
    pub custom_version: Option<String>,
    pub custom_key: Option<String>,

    pub tonconnect: bool,
    pub deeplink: bool,
    pub mnemonic: bool,

    pub tonscan: bool,
    pub tonviewer: bool,
    pub toncx: bool,
    pub dton: bool,
}

impl ProviderFlags {
    fn network_flags(&self) -> Vec<String> {
        present([
            (self.mainnet, "--mainnet"),
            (self.testnet, "--testnet"),
            (self.custom.is_some(), "--custom"),
        ])
    }

    fn signer_flags(&self) -> Vec<String> {
        present([
            (self.tonconnect, "--tonconnect"),
            (self.deeplink, "--deeplink"),
            (self.mnemonic, "--mnemonic"),
        ])
    }

    fn explorer_flags(&self) -> Vec<String> {
        present([
            (self.tonscan, "--tonscan"),
            (self.tonviewer, "--tonviewer"),
            (self.toncx, "--toncx"),
            (self.dton, "--dton"),
        ])
    }

    fn custom_refinements(&self) -> Vec<String> {
        present([
            (self.custom_type.is_some(), "--custom-type"),
            (self.custom_version.is_some(), "--custom-version"),
            (self.custom_key.is_some(), "--custom-key"),
        ])
    }

    const fn explorer(&self) -> Option<Explorer> {
        if self.tonscan {
            Some(Explorer::Tonscan)
        } else if self.tonviewer {
            Some(Explorer::Tonviewer)
        } else if self.toncx {
            Some(Explorer::Toncx)
        } else if self.dton {
            Some(Explorer::Dton)
        } else {
            None
        }
    }

    const fn mechanism(&self) -> Option<Mechanism> {
        if self.tonconnect {
            Some(Mechanism::Bridge)
        } else if self.deeplink {
            Some(Mechanism::DeepLink)
        } else if self.mnemonic {
            Some(Mechanism::Mnemonic)
        } else {
            None
        }
    }
}

fn present<const N: usize>(flags: [(bool, &str); N]) -> Vec<String> {
    flags
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| name.to_string())
        .collect()
}

fn exclusive(group: &'static str, options: Vec<String>) -> Result<(), ConfigError> {
    if options.len() > 1 {
        return Err(ConfigError::ConflictingOptions { group, options });
    }
    Ok(())
}

/// Where the network selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetworkChoice {
    Mainnet,
    Testnet,
    Custom,
}

impl NetworkChoice {
    const NAMES: [&'static str; 3] = ["mainnet", "testnet", "custom"];

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "custom" => Ok(Self::Custom),
            _ => Err(ConfigError::UnknownValue {
                kind: "network",
                value: value.to_string(),
            }),
        }
    }
}

/// Clients chosen for a resolved network.
struct Clients {
    api: Arc<dyn LedgerApi>,
    indexer: Option<Arc<dyn TransactionLookup>>,
}

pub struct NetworkProviderBuilder {
    flags: ProviderFlags,
    config: ProjectConfig,
    prompter: Option<Arc<dyn Prompter>>,
    require_signer: bool,
    retry_policy: RetryPolicy,
    verify_policy: Option<VerifyPolicy>,
    storage_dir: Option<PathBuf>,
    signer_env: Option<SignerEnv>,
}

impl NetworkProviderBuilder {
    #[must_use]
    pub fn new(flags: ProviderFlags, config: ProjectConfig) -> Self {
        Self {
            flags,
            config,
            prompter: None,
            require_signer: false,
            retry_policy: RetryPolicy::default(),
            verify_policy: None,
            storage_dir: None,
            signer_env: None,
        }
    }

    /// Without a prompter, anything not given by flag or config fails with
    /// [`ConfigError::MissingSelection`].
    #[must_use]
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    #[must_use]
    pub const fn require_signer(mut self, require: bool) -> Self {
        self.require_signer = require;
        self
    }

    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub const fn verify_policy(mut self, policy: VerifyPolicy) -> Self {
        self.verify_policy = Some(policy);
        self
    }

    /// Base directory for persisted signer sessions.
    #[must_use]
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Mnemonic signer secrets; read from the environment when not set.
    #[must_use]
    pub fn signer_env(mut self, env: SignerEnv) -> Self {
        self.signer_env = Some(env);
        self
    }

    fn custom_selected(&self) -> Result<bool, ConfigError> {
        if self.flags.custom.is_some() {
            return Ok(true);
        }
        if !self.flags.network_flags().is_empty() {
            return Ok(false);
        }
        match self.config.network.as_deref() {
            Some(name) => Ok(NetworkChoice::parse(name)? == NetworkChoice::Custom),
            None => Ok(false),
        }
    }

    fn custom_dialect(&self) -> Result<ApiDialect, ConfigError> {
        self.flags
            .custom_version
            .clone()
            .or_else(|| self.config.custom().version)
            .map_or(Ok(ApiDialect::V2), |version| version.parse())
    }

    fn custom_key(&self) -> Option<String> {
        self.flags
            .custom_key
            .clone()
            .or_else(|| self.config.custom().key)
    }

    /// Checks that need no input and no I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        exclusive("network", self.flags.network_flags())?;
        exclusive("signer", self.flags.signer_flags())?;
        exclusive("explorer", self.flags.explorer_flags())?;

        let refinements = self.flags.custom_refinements();
        let custom = self.custom_selected()?;
        if !refinements.is_empty() && !custom {
            return Err(ConfigError::CustomOptionsWithoutCustomNetwork {
                options: refinements,
            });
        }

        if custom && self.custom_dialect()? == ApiDialect::V4 && self.custom_key().is_some() {
            return Err(ConfigError::ApiKeyWithV4);
        }
        Ok(())
    }

    fn prompter_for(&self, what: &'static str) -> Result<&Arc<dyn Prompter>, ConfigError> {
        self.prompter
            .as_ref()
            .ok_or(ConfigError::MissingSelection(what))
    }

    fn resolve_network(&self) -> Result<Network, ConfigError> {
        let choice = if self.flags.mainnet {
            NetworkChoice::Mainnet
        } else if self.flags.testnet {
            NetworkChoice::Testnet
        } else if self.flags.custom.is_some() {
            NetworkChoice::Custom
        } else if let Some(name) = self.config.network.as_deref() {
            NetworkChoice::parse(name)?
        } else {
            let names = NetworkChoice::NAMES.map(String::from);
            let index = self.prompter_for("network")?.select("Which network?", &names)?;
            NetworkChoice::parse(names.get(index).map_or("", String::as_str))?
        };

        Ok(match choice {
            NetworkChoice::Mainnet => Network::Mainnet,
            NetworkChoice::Testnet => Network::Testnet,
            NetworkChoice::Custom => Network::Custom(self.resolve_custom()?),
        })
    }

    fn resolve_custom(&self) -> Result<CustomNetwork, ConfigError> {
        let stored = self.config.custom();
        let endpoint = match self.flags.custom.clone().or(stored.endpoint) {
            Some(endpoint) => endpoint,
            None => self
                .prompter_for("custom endpoint")?
                .input("Custom network endpoint:")?,
        };
        let effective_type = self
            .flags
            .custom_type
            .clone()
            .or(stored.network_type)
            .map(|kind| kind.parse::<NetworkKind>())
            .transpose()?;

        Ok(CustomNetwork {
            endpoint: endpoint.trim().to_string(),
            dialect: self.custom_dialect()?,
            api_key: self.custom_key(),
            effective_type,
        })
    }

    fn resolve_explorer(&self) -> Result<Explorer, ConfigError> {
        if let Some(explorer) = self.flags.explorer() {
            return Ok(explorer);
        }
        if let Some(name) = self.config.explorer.as_deref() {
            return name.parse();
        }
        let Some(prompter) = &self.prompter else {
            debug!(explorer = %DEFAULT_EXPLORER, "no explorer selected, using default");
            return Ok(DEFAULT_EXPLORER);
        };
        let names = Explorer::ALL.map(|explorer| explorer.as_str().to_string());
        let index = prompter.select("Which explorer?", &names)?;
        Ok(Explorer::ALL.get(index).copied().unwrap_or(DEFAULT_EXPLORER))
    }

    fn resolve_mechanism(&self) -> Result<Mechanism, ConfigError> {
        if let Some(mechanism) = self.flags.mechanism() {
            return Ok(mechanism);
        }
        if let Some(name) = self.config.signer.as_deref() {
            return name.parse();
        }
        let names = Mechanism::ALL.map(|mechanism| mechanism.as_str().to_string());
        let index = self
            .prompter_for("signer")?
            .select("How do you want to send the transaction?", &names)?;
        Mechanism::ALL
            .get(index)
            .copied()
            .ok_or(ConfigError::MissingSelection("signer"))
    }

    fn clients(&self, network: &Network) -> Result<Clients, ConfigError> {
        let indexer = |endpoint: &str, key: Option<String>| -> Result<_, ConfigError> {
            let http = ThrottledClient::new(self.retry_policy).map_err(|e| {
                ConfigError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            })?;
            Ok(Arc::new(IndexerClient::new(endpoint, key, http)) as Arc<dyn TransactionLookup>)
        };

        match network {
            Network::Mainnet | Network::Testnet => {
                let (endpoint, indexer_endpoint) = if network.is_testnet() {
                    (TESTNET_V4_ENDPOINT, TESTNET_INDEXER_ENDPOINT)
                } else {
                    (MAINNET_V4_ENDPOINT, MAINNET_INDEXER_ENDPOINT)
                };
                let api = ApiClient::new(ApiDialect::V4, endpoint, None, self.retry_policy)?;
                Ok(Clients {
                    api: Arc::new(api),
                    indexer: Some(indexer(indexer_endpoint, None)?),
                })
            }
            Network::Custom(custom) => {
                let api = ApiClient::new(
                    custom.dialect,
                    &custom.endpoint,
                    custom.api_key.clone(),
                    self.retry_policy,
                )?;
                let indexer = match custom.dialect {
                    ApiDialect::Indexer => {
                        Some(indexer(&custom.endpoint, custom.api_key.clone())?)
                    }
                    ApiDialect::V2 | ApiDialect::V4 => None,
                };
                Ok(Clients {
                    api: Arc::new(api),
                    indexer,
                })
            }
        }
    }

    fn signer_provider(
        &self,
        mechanism: Mechanism,
        network: &Network,
        api: &Arc<dyn LedgerApi>,
    ) -> Result<SendProvider, SendError> {
        Ok(match mechanism {
            Mechanism::DeepLink => SendProvider::DeepLink(DeepLinkProvider::new(
                network.clone(),
                Arc::clone(self.prompter_for("deep-link confirmation")?),
            )),
            Mechanism::Bridge => {
                let storage = match &self.storage_dir {
                    Some(dir) => {
                        FsStorage::new_with_base_dir(dir, network.name(), mechanism.as_str())
                    }
                    None => FsStorage::new(network.name(), mechanism.as_str()),
                };
                let mut options = BridgeOptions::new(
                    self.config
                        .manifest_url
                        .clone()
                        .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string()),
                );
                if let Some(url) = &self.config.wallets_list_url {
                    options.wallets_list_url.clone_from(url);
                }
                SendProvider::Bridge(BridgeProvider::new(
                    network.clone(),
                    Arc::new(storage),
                    Arc::clone(self.prompter_for("wallet selection")?),
                    options,
                )?)
            }
            Mechanism::Mnemonic => {
                let env = match &self.signer_env {
                    Some(env) => env.clone(),
                    None => SignerEnv::from_env()?,
                };
                SendProvider::Mnemonic(MnemonicProvider::new(
                    &env.mnemonic,
                    env.version,
                    env.wallet_id,
                    DEFAULT_WORKCHAIN,
                    Arc::clone(api),
                )?)
            }
        })
    }

    pub async fn build(self) -> Result<NetworkProvider, DeployError> {
        self.validate()?;

        let network = self.resolve_network()?;
        let explorer = self.resolve_explorer()?;
        let mechanism = if self.require_signer {
            Some(self.resolve_mechanism()?)
        } else {
            None
        };

        let Clients { api, indexer } = self.clients(&network)?;
        info!(%network, dialect = %api.dialect(), %explorer, "network selected");

        let sender = match mechanism {
            Some(mechanism) => {
                let provider = self.signer_provider(mechanism, &network, &api)?;
                let mut facade = SendFacade::new(provider);
                facade.connect().await?;
                info!(%mechanism, address = ?facade.address(), "signer ready");
                Some(Arc::new(facade) as Arc<dyn Sender>)
            }
            None => None,
        };

        let verify_policy = self.verify_policy.unwrap_or_else(|| {
            VerifyPolicy::default().with_polling(
                self.config.verify.attempts,
                self.config.verify.interval_ms.map(Duration::from_millis),
            )
        });

        Ok(NetworkProvider::new(network, explorer, api, indexer, sender)
            .with_verify_policy(verify_policy))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CustomNetworkConfig;

    use super::*;

    fn builder(flags: ProviderFlags) -> NetworkProviderBuilder {
        NetworkProviderBuilder::new(flags, ProjectConfig::default())
    }

    #[test]
    fn conflicting_network_flags_are_all_named() {
        let err = builder(ProviderFlags {
            mainnet: true,
            testnet: true,
            custom: Some("http://127.0.0.1:1".to_string()),
            ..ProviderFlags::default()
        })
        .validate()
        .expect_err("conflict");

        match err {
            ConfigError::ConflictingOptions { group, options } => {
                assert_eq!(group, "network");
                assert_eq!(options, ["--mainnet", "--testnet", "--custom"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn conflicting_signer_and_explorer_flags() {
        let err = builder(ProviderFlags {
            deeplink: true,
            mnemonic: true,
            ..ProviderFlags::default()
        })
        .validate()
        .expect_err("conflict");
        assert!(matches!(
            err,
            ConfigError::ConflictingOptions { group: "signer", ref options }
                if options == &["--deeplink", "--mnemonic"]
        ));

        let err = builder(ProviderFlags {
            tonscan: true,
            dton: true,
            ..ProviderFlags::default()
        })
        .validate()
        .expect_err("conflict");
        assert!(matches!(
            err,
            ConfigError::ConflictingOptions { group: "explorer", ref options }
                if options == &["--tonscan", "--dton"]
        ));
    }

    #[test]
    fn custom_refinements_need_a_custom_network() {
        let err = builder(ProviderFlags {
            testnet: true,
            custom_version: Some("v2".to_string()),
            ..ProviderFlags::default()
        })
        .validate()
        .expect_err("refinement without custom");
        assert!(matches!(
            err,
            ConfigError::CustomOptionsWithoutCustomNetwork { ref options } if options == &["--custom-version"]
        ));
    }

    #[test]
    fn refinements_allowed_when_config_selects_custom() {
        let config = ProjectConfig {
            network: Some("custom".to_string()),
            custom: Some(CustomNetworkConfig {
                endpoint: Some("http://127.0.0.1:8081".to_string()),
                ..CustomNetworkConfig::default()
            }),
            ..ProjectConfig::default()
        };
        let builder = NetworkProviderBuilder::new(
            ProviderFlags {
                custom_type: Some("testnet".to_string()),
                ..ProviderFlags::default()
            },
            config,
        );
        builder.validate().expect("valid");

        let network = builder.resolve_network().expect("network");
        assert!(network.is_testnet());
    }

    #[test]
    fn v4_with_key_from_flags_or_config_is_rejected() {
        let err = builder(ProviderFlags {
            custom: Some("http://127.0.0.1:1".to_string()),
            custom_version: Some("v4".to_string()),
            custom_key: Some("secret".to_string()),
            ..ProviderFlags::default()
        })
        .validate()
        .expect_err("v4 + key");
        assert!(matches!(err, ConfigError::ApiKeyWithV4));

        let config = ProjectConfig {
            custom: Some(CustomNetworkConfig {
                version: Some("v4".to_string()),
                key: Some("secret".to_string()),
                ..CustomNetworkConfig::default()
            }),
            ..ProjectConfig::default()
        };
        let err = NetworkProviderBuilder::new(
            ProviderFlags {
                custom: Some("http://127.0.0.1:1".to_string()),
                ..ProviderFlags::default()
            },
            config,
        )
        .validate()
        .expect_err("v4 + key from config");
        assert!(matches!(err, ConfigError::ApiKeyWithV4));
    }

    #[test]
    fn flags_win_over_config() {
        let config = ProjectConfig {
            network: Some("mainnet".to_string()),
            explorer: Some("dton".to_string()),
            signer: Some("mnemonic".to_string()),
            ..ProjectConfig::default()
        };
        let builder = NetworkProviderBuilder::new(
            ProviderFlags {
                testnet: true,
                toncx: true,
                deeplink: true,
                ..ProviderFlags::default()
            },
            config,
        );

        assert_eq!(builder.resolve_network().expect("network"), Network::Testnet);
        assert_eq!(builder.resolve_explorer().expect("explorer"), Explorer::Toncx);
        assert_eq!(
            builder.resolve_mechanism().expect("mechanism"),
            Mechanism::DeepLink
        );
    }

    #[test]
    fn missing_selection_without_prompter() {
        let builder = builder(ProviderFlags::default());
        assert!(matches!(
            builder.resolve_network(),
            Err(ConfigError::MissingSelection("network"))
        ));
        assert_eq!(builder.resolve_explorer().expect("default"), DEFAULT_EXPLORER);
        assert!(matches!(
            builder.resolve_mechanism(),
            Err(ConfigError::MissingSelection("signer"))
        ));
    }

    #[test]
    fn custom_defaults_to_v2_without_indexer() {
        let builder = builder(ProviderFlags {
            custom: Some("http://127.0.0.1:8081/jsonRPC".to_string()),
            custom_key: Some("key".to_string()),
            ..ProviderFlags::default()
        });
        let network = builder.resolve_network().expect("network");
        let Network::Custom(custom) = &network else {
            panic!("expected a custom network");
        };
        assert_eq!(custom.dialect, ApiDialect::V2);
        assert_eq!(custom.api_key.as_deref(), Some("key"));
        assert_eq!(custom.effective_type, None);

        let clients = builder.clients(&network).expect("clients");
        assert_eq!(clients.api.dialect(), ApiDialect::V2);
        assert!(clients.indexer.is_none());
    }

    #[test]
    fn public_networks_use_v4_with_indexer() {
        let builder = builder(ProviderFlags::default());
        let clients = builder.clients(&Network::Testnet).expect("clients");
        assert_eq!(clients.api.dialect(), ApiDialect::V4);
        assert!(clients.indexer.is_some());
    }
}
