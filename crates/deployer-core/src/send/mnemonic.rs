//! Local wallet signing from a secret phrase.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::signature::{Ed25519KeyPair, KeyPair};
use ring::{hmac, pbkdf2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::address::{Address, Cell, ContractInit};
use crate::api::LedgerApi;
use crate::error::{ConfigError, SendError, TransportError};
use crate::now_ms;
use crate::send::{PendingTransfer, SEND_MODE_PAY_GAS_SEPARATELY};

pub const MNEMONIC_WORDS: usize = 24;
pub const DEFAULT_WALLET_ID: u32 = 698_983_191;
pub const MESSAGE_TTL: Duration = Duration::from_secs(60);

const SEED_SALT: &[u8] = b"TON default seed";
const SEED_ROUNDS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(rounds) => rounds,
    None => unreachable!(),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletVersion {
    V1R1,
    V1R2,
    V1R3,
    V2R1,
    V2R2,
    V3R1,
    V3R2,
    V4R1,
    V4R2,
    V5R1,
}

impl WalletVersion {
    pub const ALL: [Self; 10] = [
        Self::V1R1,
        Self::V1R2,
        Self::V1R3,
        Self::V2R1,
        Self::V2R2,
        Self::V3R1,
        Self::V3R2,
        Self::V4R1,
        Self::V4R2,
        Self::V5R1,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1R1 => "v1r1",
            Self::V1R2 => "v1r2",
            Self::V1R3 => "v1r3",
            Self::V2R1 => "v2r1",
            Self::V2R2 => "v2r2",
            Self::V3R1 => "v3r1",
            Self::V3R2 => "v3r2",
            Self::V4R1 => "v4r1",
            Self::V4R2 => "v4r2",
            Self::V5R1 => "v5r1",
        }
    }

    /// Versions before v3 carry no subwallet id.
    #[must_use]
    pub const fn has_wallet_id(self) -> bool {
        !matches!(
            self,
            Self::V1R1 | Self::V1R2 | Self::V1R3 | Self::V2R1 | Self::V2R2
        )
    }
}

impl FromStr for WalletVersion {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|version| version.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownValue {
                kind: "wallet version",
                value: value.to_string(),
            })
    }
}

impl fmt::Display for WalletVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transfer inside an external message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub to: Address,
    pub value: u64,
    pub bounce: bool,
    pub mode: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<ContractInit>,
}

/// The signed part of an external message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBody {
    pub wallet: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<u32>,
    pub seqno: u32,
    pub valid_until: u64,
    pub messages: Vec<OutgoingMessage>,
}

impl ExternalBody {
    pub fn signing_hash(&self) -> Result<[u8; 32], serde_json::Error> {
        Ok(Sha256::digest(serde_json::to_vec(self)?).into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedExternal {
    pub body: ExternalBody,
    /// Wallet init, present only while the wallet itself is not yet active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<ContractInit>,
    pub signature: String,
}

/// What was actually submitted, returned instead of kept on the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Base64 of the serialized external message.
    pub boc: String,
    /// Hex SHA-256 of the serialized external message.
    pub hash: String,
    pub seqno: u32,
}

pub struct MnemonicProvider {
    keypair: Ed25519KeyPair,
    version: WalletVersion,
    wallet_id: Option<u32>,
    init: ContractInit,
    address: Address,
    api: Arc<dyn LedgerApi>,
}

/// Derives the Ed25519 seed from a phrase: HMAC-SHA512 keyed by the phrase,
/// stretched with PBKDF2-HMAC-SHA512.
pub fn mnemonic_to_seed(words: &[&str]) -> [u8; 32] {
    let phrase = words.join(" ");
    let entropy = hmac::sign(
        &hmac::Key::new(hmac::HMAC_SHA512, phrase.as_bytes()),
        b"",
    );

    let mut stretched = [0_u8; 64];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA512,
        SEED_ROUNDS,
        SEED_SALT,
        entropy.as_ref(),
        &mut stretched,
    );

    let mut seed = [0_u8; 32];
    seed.copy_from_slice(&stretched[..32]);
    seed
}

fn parse_mnemonic(mnemonic: &str) -> Result<Vec<&str>, ConfigError> {
    let words: Vec<&str> = mnemonic.split_whitespace().collect();
    if words.len() != MNEMONIC_WORDS {
        return Err(ConfigError::InvalidMnemonic(format!(
            "expected {MNEMONIC_WORDS} words, got {}",
            words.len()
        )));
    }
    if let Some(bad) = words
        .iter()
        .find(|word| !word.chars().all(|c| c.is_ascii_lowercase()))
    {
        return Err(ConfigError::InvalidMnemonic(format!(
            "word '{bad}' is not a lowercase word"
        )));
    }
    Ok(words)
}

impl MnemonicProvider {
    /// Derives the key pair and wallet address. Runs synchronously; no I/O.
    pub fn new(
        mnemonic: &str,
        version: WalletVersion,
        wallet_id: Option<u32>,
        workchain: i8,
        api: Arc<dyn LedgerApi>,
    ) -> Result<Self, ConfigError> {
        let words = parse_mnemonic(mnemonic)?;
        let seed = mnemonic_to_seed(&words);
        let keypair = Ed25519KeyPair::from_seed_unchecked(&seed)
            .map_err(|e| ConfigError::InvalidMnemonic(e.to_string()))?;

        let wallet_id = version
            .has_wallet_id()
            .then(|| wallet_id.unwrap_or(DEFAULT_WALLET_ID));

        let mut data = Vec::with_capacity(40);
        if let Some(id) = wallet_id {
            data.extend_from_slice(&id.to_be_bytes());
        }
        data.extend_from_slice(&0_u32.to_be_bytes());
        data.extend_from_slice(keypair.public_key().as_ref());

        let init = ContractInit::new(
            Cell::new(format!("wallet-{version}").into_bytes()),
            Cell::new(data),
        );
        let address = init.address(workchain);

        Ok(Self {
            keypair,
            version,
            wallet_id,
            init,
            address,
            api,
        })
    }

    #[must_use]
    pub const fn wallet_address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub const fn version(&self) -> WalletVersion {
        self.version
    }

    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        self.keypair.public_key().as_ref()
    }

    /// Current seqno, or `None` while the wallet is not active and must be
    /// initialized by this message.
    async fn seqno(&self) -> Result<Option<u32>, TransportError> {
        let state = self.api.account_state(&self.address).await?;
        if !state.is_active() {
            return Ok(None);
        }

        let result = self.api.run_get_method(&self.address, "seqno").await?;
        if result.exit_code != 0 {
            return Err(TransportError::Api(format!(
                "seqno get-method exited with {}",
                result.exit_code
            )));
        }
        let seqno = result
            .first_int()
            .and_then(|value| u32::try_from(value).ok())
            .ok_or_else(|| TransportError::Decode("seqno is not a u32".to_string()))?;
        Ok(Some(seqno))
    }

    /// Signs and submits one external message carrying `transfer`.
    pub async fn send_transaction(
        &self,
        transfer: &PendingTransfer,
    ) -> Result<SentMessage, SendError> {
        let seqno = self.seqno().await?;
        let init = seqno.is_none().then(|| self.init.clone());
        let seqno = seqno.unwrap_or(0);

        let body = ExternalBody {
            wallet: self.address,
            wallet_id: self.wallet_id,
            seqno,
            valid_until: (now_ms() + u64::try_from(MESSAGE_TTL.as_millis()).unwrap_or(0)) / 1000,
            messages: vec![OutgoingMessage {
                to: transfer.to,
                value: transfer.value,
                bounce: transfer.bounceable(),
                mode: SEND_MODE_PAY_GAS_SEPARATELY,
                body: transfer.body.clone(),
                init: transfer.init.clone(),
            }],
        };

        let signature = self.keypair.sign(&body.signing_hash()?);
        let signed = SignedExternal {
            body,
            init,
            signature: STANDARD.encode(signature.as_ref()),
        };
        let boc = serde_json::to_vec(&signed)?;
        let hash = hex::encode(Sha256::digest(&boc));

        debug!(
            wallet = %self.address,
            seqno,
            with_wallet_init = signed.init.is_some(),
            "submitting external message"
        );
        self.api.send_message(&boc).await?;
        info!(wallet = %self.address, seqno, %hash, "external message submitted");

        Ok(SentMessage {
            boc: STANDARD.encode(&boc),
            hash,
            seqno,
        })
    }
}
