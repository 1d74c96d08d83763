//! Project configuration file and signer environment.

use std::path::Path;

use config::{Case, Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::send::mnemonic::WalletVersion;

pub const PROJECT_CONFIG_FILE: &str = "deployer.toml";
pub const PROJECT_ENV_PREFIX: &str = "DEPLOYER";

pub const MNEMONIC_VAR: &str = "WALLET_MNEMONIC";
pub const WALLET_VERSION_VAR: &str = "WALLET_VERSION";
pub const WALLET_ID_VAR: &str = "WALLET_ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CustomNetworkConfig {
    pub endpoint: Option<String>,
    pub version: Option<String>,
    pub network_type: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub attempts: Option<u32>,
    pub interval_ms: Option<u64>,
}

/// Persisted project defaults, consulted when a flag is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub network: Option<String>,
    pub custom: Option<CustomNetworkConfig>,
    pub explorer: Option<String>,
    pub signer: Option<String>,
    pub wallets_list_url: Option<String>,
    pub manifest_url: Option<String>,
    pub verify: VerifyConfig,
}

impl ProjectConfig {
    /// Loads `deployer.toml` from `dir` (optional) with `DEPLOYER__*`
    /// environment overrides on top.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        Self::load_with(
            dir,
            Environment::with_prefix(PROJECT_ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_with(dir: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from(dir.join(PROJECT_CONFIG_FILE)).required(false))
            .add_source(environment)
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    #[must_use]
    pub fn custom(&self) -> CustomNetworkConfig {
        self.custom.clone().unwrap_or_default()
    }
}

/// Secrets for the mnemonic signer. Read only when that signer is selected.
#[derive(Clone)]
pub struct SignerEnv {
    pub mnemonic: String,
    pub version: WalletVersion,
    pub wallet_id: Option<u32>,
}

impl std::fmt::Debug for SignerEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerEnv")
            .field("mnemonic", &"<redacted>")
            .field("version", &self.version)
            .field("wallet_id", &self.wallet_id)
            .finish()
    }
}

impl SignerEnv {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(
            Environment::default()
                .separator("__")
                .convert_case(Case::ScreamingSnake),
        )
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let cfg = Config::builder().add_source(environment).build()?;
        let read = |name: &'static str| {
            cfg.get_string(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
        };

        let mnemonic = read(MNEMONIC_VAR).ok_or(ConfigError::MissingEnv(MNEMONIC_VAR))?;
        let version = read(WALLET_VERSION_VAR)
            .ok_or(ConfigError::MissingEnv(WALLET_VERSION_VAR))?
            .parse()?;
        let wallet_id = read(WALLET_ID_VAR)
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| ConfigError::UnknownValue {
                    kind: "wallet id",
                    value: raw,
                })
            })
            .transpose()?;

        Ok(Self {
            mnemonic,
            version,
            wallet_id,
        })
    }
}
