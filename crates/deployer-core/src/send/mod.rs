//! Signing mechanisms and the façade that normalizes their inputs.

pub mod bridge;
pub mod deep_link;
pub mod mnemonic;
pub mod qr;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::address::{Address, Cell, ContractInit};
use crate::error::{ConfigError, SendError};

use self::bridge::BridgeProvider;
use self::deep_link::DeepLinkProvider;
use self::mnemonic::{MnemonicProvider, SentMessage};

/// The only send mode every signing mechanism can express.
pub const SEND_MODE_PAY_GAS_SEPARATELY: u8 = 1;

/// Signing mechanism, fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    DeepLink,
    Bridge,
    Mnemonic,
}

impl Mechanism {
    pub const ALL: [Self; 3] = [Self::Bridge, Self::DeepLink, Self::Mnemonic];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeepLink => "deeplink",
            Self::Bridge => "tonconnect",
            Self::Mnemonic => "mnemonic",
        }
    }
}

impl FromStr for Mechanism {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deeplink" | "deep-link" => Ok(Self::DeepLink),
            "tonconnect" | "bridge" => Ok(Self::Bridge),
            "mnemonic" => Ok(Self::Mnemonic),
            _ => Err(ConfigError::UnknownValue {
                kind: "signer",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller asks the sender to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderArguments {
    pub to: Address,
    pub value: u64,
    /// Ignored; no mechanism supports per-message bounce control.
    pub bounce: Option<bool>,
    pub send_mode: Option<u8>,
    pub body: Option<Cell>,
    pub init: Option<ContractInit>,
}

impl SenderArguments {
    #[must_use]
    pub const fn new(to: Address, value: u64) -> Self {
        Self {
            to,
            value,
            bounce: None,
            send_mode: None,
            body: None,
            init: None,
        }
    }
}

/// One outgoing transfer after the façade has validated it. Produced once per
/// call and consumed by exactly one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub to: Address,
    pub value: u64,
    pub body: Option<Cell>,
    pub init: Option<ContractInit>,
}

impl PendingTransfer {
    /// Messages that activate a contract must not bounce back.
    #[must_use]
    pub const fn bounceable(&self) -> bool {
        self.init.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The user confirmed they approved the transfer in their wallet.
    Submitted,
    /// The remote wallet acknowledged the request, optionally with the signed
    /// message it broadcast.
    Acknowledged { boc: Option<String> },
    /// Signed and submitted locally; the envelope is returned for inspection.
    Signed(SentMessage),
}

/// Submits transfers on behalf of a contract provider.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, args: SenderArguments) -> Result<SendOutcome, SendError>;

    fn address(&self) -> Option<Address>;
}

pub enum SendProvider {
    DeepLink(DeepLinkProvider),
    Bridge(BridgeProvider),
    Mnemonic(MnemonicProvider),
}

impl SendProvider {
    #[must_use]
    pub const fn mechanism(&self) -> Mechanism {
        match self {
            Self::DeepLink(_) => Mechanism::DeepLink,
            Self::Bridge(_) => Mechanism::Bridge,
            Self::Mnemonic(_) => Mechanism::Mnemonic,
        }
    }

    pub async fn connect(&mut self) -> Result<(), SendError> {
        match self {
            Self::DeepLink(_) => Ok(()),
            Self::Bridge(provider) => provider.connect().await,
            Self::Mnemonic(provider) => {
                debug!(address = %provider.wallet_address(), "mnemonic wallet ready");
                Ok(())
            }
        }
    }

    pub async fn send_transaction(
        &self,
        transfer: &PendingTransfer,
    ) -> Result<SendOutcome, SendError> {
        match self {
            Self::DeepLink(provider) => provider.send_transaction(transfer).await,
            Self::Bridge(provider) => provider.send_transaction(transfer).await,
            Self::Mnemonic(provider) => provider
                .send_transaction(transfer)
                .await
                .map(SendOutcome::Signed),
        }
    }

    #[must_use]
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::DeepLink(_) => None,
            Self::Bridge(provider) => provider.address(),
            Self::Mnemonic(provider) => Some(provider.wallet_address()),
        }
    }
}

/// Rejects every send mode other than "pay gas separately". Runs before any
/// network call on the send path.
pub fn check_send_mode(send_mode: Option<u8>) -> Result<(), ConfigError> {
    match send_mode {
        Some(mode) if mode != SEND_MODE_PAY_GAS_SEPARATELY => {
            Err(ConfigError::UnsupportedSendMode(mode))
        }
        _ => Ok(()),
    }
}

/// Uniform front for whichever provider is active.
pub struct SendFacade {
    provider: SendProvider,
}

impl SendFacade {
    #[must_use]
    pub const fn new(provider: SendProvider) -> Self {
        Self { provider }
    }

    #[must_use]
    pub const fn provider(&self) -> &SendProvider {
        &self.provider
    }

    pub async fn connect(&mut self) -> Result<(), SendError> {
        self.provider.connect().await
    }

    /// Validation applied before any provider sees the request.
    pub fn prepare(args: SenderArguments) -> Result<PendingTransfer, SendError> {
        check_send_mode(args.send_mode)?;
        if let Some(bounce) = args.bounce {
            warn!(
                bounce,
                to = %args.to,
                "bounce override is not supported by any signer, ignoring it"
            );
        }

        Ok(PendingTransfer {
            to: args.to,
            value: args.value,
            body: args.body,
            init: args.init,
        })
    }
}

#[async_trait]
impl Sender for SendFacade {
    async fn send(&self, args: SenderArguments) -> Result<SendOutcome, SendError> {
        let transfer = Self::prepare(args)?;
        debug!(
            mechanism = %self.provider.mechanism(),
            to = %transfer.to,
            value = transfer.value,
            with_init = transfer.init.is_some(),
            "sending transfer"
        );
        self.provider.send_transaction(&transfer).await
    }

    fn address(&self) -> Option<Address> {
        self.provider.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SenderArguments {
        SenderArguments::new(Address::new(0, [7; 32]), 1_000)
    }

    #[test]
    fn only_pay_gas_separately_is_accepted() {
        let mut rejected = args();
        rejected.send_mode = Some(3);
        let err = SendFacade::prepare(rejected).expect_err("must fail");
        assert!(matches!(
            err,
            SendError::Config(ConfigError::UnsupportedSendMode(3))
        ));

        let mut accepted = args();
        accepted.send_mode = Some(SEND_MODE_PAY_GAS_SEPARATELY);
        assert!(SendFacade::prepare(accepted).is_ok());
    }

    #[test]
    fn bounce_override_is_dropped() {
        let mut with_bounce = args();
        with_bounce.bounce = Some(false);
        with_bounce.init = Some(ContractInit::new(Cell::new(vec![1]), Cell::new(vec![2])));

        let transfer = SendFacade::prepare(with_bounce).expect("prepare");
        assert!(!transfer.bounceable());
        assert!(SendFacade::prepare(args()).expect("prepare").bounceable());
    }

    #[test]
    fn mechanism_names_round_trip() {
        for mechanism in Mechanism::ALL {
            assert_eq!(
                mechanism.as_str().parse::<Mechanism>().expect("parse"),
                mechanism
            );
        }
    }
}
