//! Ledger network selection and explorer link templates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::ConfigError;

pub const MAINNET_V4_ENDPOINT: &str = "https://mainnet-v4.tonhubapi.com";
pub const TESTNET_V4_ENDPOINT: &str = "https://testnet-v4.tonhubapi.com";
pub const MAINNET_INDEXER_ENDPOINT: &str = "https://tonapi.io";
pub const TESTNET_INDEXER_ENDPOINT: &str = "https://testnet.tonapi.io";

/// Public network flavour, also used as the effective type of a custom
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Mainnet,
    Testnet,
}

impl NetworkKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }
}

impl FromStr for NetworkKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            _ => Err(ConfigError::UnknownValue {
                kind: "network type",
                value: value.to_string(),
            }),
        }
    }
}

/// Ledger query protocol spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiDialect {
    /// JSON-RPC request/response API.
    V2,
    /// Block-indexed API; every account query is pinned to a block.
    V4,
    /// REST indexer API.
    Indexer,
}

impl ApiDialect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V2 => "v2",
            Self::V4 => "v4",
            Self::Indexer => "indexer",
        }
    }
}

impl FromStr for ApiDialect {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "v2" => Ok(Self::V2),
            "v4" => Ok(Self::V4),
            "indexer" | "tonapi" => Ok(Self::Indexer),
            _ => Err(ConfigError::UnknownValue {
                kind: "API version",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for ApiDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomNetwork {
    pub endpoint: String,
    pub dialect: ApiDialect,
    pub api_key: Option<String>,
    /// Lets a self-hosted endpoint borrow mainnet/testnet formatting and
    /// explorer links.
    pub effective_type: Option<NetworkKind>,
}

/// Target network. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Custom(CustomNetwork),
}

impl Network {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Custom(_) => "custom",
        }
    }

    /// The flavour used for address formatting and explorer links.
    #[must_use]
    pub const fn effective_kind(&self) -> Option<NetworkKind> {
        match self {
            Self::Mainnet => Some(NetworkKind::Mainnet),
            Self::Testnet => Some(NetworkKind::Testnet),
            Self::Custom(custom) => custom.effective_type,
        }
    }

    #[must_use]
    pub const fn is_testnet(&self) -> bool {
        matches!(self.effective_kind(), Some(NetworkKind::Testnet))
    }

    /// Formats an address the way wallets on this network expect it.
    #[must_use]
    pub fn format_address(&self, address: &Address, bounceable: bool) -> String {
        address.to_friendly(bounceable, self.is_testnet())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(custom) => write!(f, "custom ({})", custom.endpoint),
            other => f.write_str(other.name()),
        }
    }
}

/// Block explorer used for human-readable links. Presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Explorer {
    Tonscan,
    Tonviewer,
    Toncx,
    Dton,
}

impl Explorer {
    pub const ALL: [Self; 4] = [Self::Tonviewer, Self::Tonscan, Self::Toncx, Self::Dton];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tonscan => "tonscan",
            Self::Tonviewer => "tonviewer",
            Self::Toncx => "toncx",
            Self::Dton => "dton",
        }
    }

    const fn base_url(self, kind: NetworkKind) -> &'static str {
        match (self, kind) {
            (Self::Tonscan, NetworkKind::Mainnet) => "https://tonscan.org/",
            (Self::Tonscan, NetworkKind::Testnet) => "https://testnet.tonscan.org/",
            (Self::Tonviewer, NetworkKind::Mainnet) => "https://tonviewer.com/",
            (Self::Tonviewer, NetworkKind::Testnet) => "https://testnet.tonviewer.com/",
            (Self::Toncx, NetworkKind::Mainnet) => "https://ton.cx/",
            (Self::Toncx, NetworkKind::Testnet) => "https://testnet.ton.cx/",
            (Self::Dton, NetworkKind::Mainnet) => "https://dton.io/",
            (Self::Dton, NetworkKind::Testnet) => "https://testnet.dton.io/",
        }
    }

    const fn address_path(self) -> &'static str {
        match self {
            Self::Tonscan | Self::Toncx => "address/",
            Self::Tonviewer => "",
            Self::Dton => "a/",
        }
    }

    const fn transaction_path(self) -> &'static str {
        match self {
            Self::Tonscan | Self::Toncx | Self::Dton => "tx/",
            Self::Tonviewer => "transaction/",
        }
    }

    /// Returns `None` for custom networks without an effective type.
    #[must_use]
    pub fn address_link(self, network: &Network, address: &Address) -> Option<String> {
        let kind = network.effective_kind()?;
        Some(format!(
            "{}{}{}",
            self.base_url(kind),
            self.address_path(),
            network.format_address(address, true)
        ))
    }

    #[must_use]
    pub fn transaction_link(self, network: &Network, hash: &str) -> Option<String> {
        let kind = network.effective_kind()?;
        Some(format!(
            "{}{}{hash}",
            self.base_url(kind),
            self.transaction_path()
        ))
    }
}

impl FromStr for Explorer {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|explorer| explorer.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ConfigError::UnknownValue {
                kind: "explorer",
                value: value.to_string(),
            })
    }
}

impl fmt::Display for Explorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        "0:2cf55953e92efbeadab7ba725c3f93a0b23f842cbba72d7b8e6f510a70e422e3"
            .parse()
            .expect("address")
    }

    #[test]
    fn mainnet_links_use_bounceable_form() {
        let link = Explorer::Tonviewer
            .address_link(&Network::Mainnet, &address())
            .expect("link");
        assert_eq!(
            link,
            "https://tonviewer.com/EQAs9VlT6S776tq3unJcP5Ogsj-ELLunLXuOb1EKcOQi4wJB"
        );
    }

    #[test]
    fn testnet_transaction_link() {
        let link = Explorer::Tonscan
            .transaction_link(&Network::Testnet, "abcd")
            .expect("link");
        assert_eq!(link, "https://testnet.tonscan.org/tx/abcd");
    }

    #[test]
    fn custom_network_links_follow_effective_type() {
        let mut custom = CustomNetwork {
            endpoint: "http://127.0.0.1:8081/jsonRPC".to_string(),
            dialect: ApiDialect::V2,
            api_key: None,
            effective_type: None,
        };
        assert_eq!(
            Explorer::Dton.address_link(&Network::Custom(custom.clone()), &address()),
            None
        );

        custom.effective_type = Some(NetworkKind::Testnet);
        let link = Explorer::Dton
            .address_link(&Network::Custom(custom), &address())
            .expect("link");
        assert!(link.starts_with("https://testnet.dton.io/a/kQ"));
    }

    #[test]
    fn explorer_names_parse_case_insensitively() {
        assert_eq!("TonCX".parse::<Explorer>().expect("parse"), Explorer::Toncx);
        assert!("etherscan".parse::<Explorer>().is_err());
    }
}
