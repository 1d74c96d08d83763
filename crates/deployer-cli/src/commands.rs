use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use deployer_core::address::{Address, Cell, ContractInit, parse_coins};
use deployer_core::config::ProjectConfig;
use deployer_core::error::{DeployError, SendError, VerifyError};
use deployer_core::prompt::TerminalPrompter;
use deployer_core::send::SendOutcome;
use deployer_core::{NetworkProvider, NetworkProviderBuilder, ProviderFlags};
use tracing::debug;

/// Network and explorer selection, shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct NetworkArgs {
    /// Use mainnet
    #[arg(long, global = true)]
    mainnet: bool,
    /// Use testnet
    #[arg(long, global = true)]
    testnet: bool,
    /// Use a custom network reachable at ENDPOINT
    #[arg(long, value_name = "ENDPOINT", global = true)]
    custom: Option<String>,
    /// Treat the custom network as mainnet or testnet for addresses and links
    #[arg(long = "custom-type", value_name = "TYPE", global = true)]
    custom_type: Option<String>,
    /// API dialect of the custom endpoint: v2, v4 or indexer
    #[arg(long = "custom-version", value_name = "VERSION", global = true)]
    custom_version: Option<String>,
    /// API key for the custom endpoint (not accepted by v4)
    #[arg(long = "custom-key", value_name = "KEY", global = true)]
    custom_key: Option<String>,

    /// Build links for tonscan
    #[arg(long, global = true)]
    tonscan: bool,
    /// Build links for tonviewer
    #[arg(long, global = true)]
    tonviewer: bool,
    /// Build links for ton.cx
    #[arg(long, global = true)]
    toncx: bool,
    /// Build links for dton
    #[arg(long, global = true)]
    dton: bool,
}

/// Signing mechanism selection.
#[derive(Args, Debug, Clone, Default)]
pub struct SignerArgs {
    /// Sign in a remote wallet through the wallet bridge
    #[arg(long)]
    tonconnect: bool,
    /// Sign by scanning a transfer link
    #[arg(long)]
    deeplink: bool,
    /// Sign locally with WALLET_MNEMONIC and WALLET_VERSION
    #[arg(long)]
    mnemonic: bool,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Compiled contract code
    #[arg(long)]
    code: PathBuf,
    /// Initial contract data
    #[arg(long)]
    data: PathBuf,
    /// Optional message body sent with the deployment
    #[arg(long)]
    body: Option<PathBuf>,
    /// Amount attached to the deployment, in coins
    #[arg(long, default_value = "0.05")]
    value: String,

    #[command(flatten)]
    signer: SignerArgs,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Address to watch
    #[arg(long)]
    address: Address,
    /// Maximum number of state polls
    #[arg(long)]
    attempts: Option<u32>,
    /// Delay between state polls, in milliseconds
    #[arg(long = "interval-ms")]
    interval_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct LinksArgs {
    #[arg(long)]
    address: Address,
    /// Transaction hash
    #[arg(long)]
    tx: Option<String>,
}

fn flags(network: &NetworkArgs, signer: &SignerArgs) -> ProviderFlags {
    ProviderFlags {
        mainnet: network.mainnet,
        testnet: network.testnet,
        custom: network.custom.clone(),
        custom_type: network.custom_type.clone(),
        custom_version: network.custom_version.clone(),
        custom_key: network.custom_key.clone(),
        tonconnect: signer.tonconnect,
        deeplink: signer.deeplink,
        mnemonic: signer.mnemonic,
        tonscan: network.tonscan,
        tonviewer: network.tonviewer,
        toncx: network.toncx,
        dton: network.dton,
    }
}

async fn provider(
    network: &NetworkArgs,
    signer: &SignerArgs,
    config: ProjectConfig,
    require_signer: bool,
) -> Result<NetworkProvider> {
    let provider = NetworkProviderBuilder::new(flags(network, signer), config)
        .prompter(Arc::new(TerminalPrompter::terminal()))
        .require_signer(require_signer)
        .build()
        .await
        .map_err(with_guidance)?;
    Ok(provider)
}

fn read_cell(path: &Path) -> Result<Cell> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Cell::new(bytes))
}

/// Adds mechanism-specific advice to errors the user can act on.
fn with_guidance(error: DeployError) -> anyhow::Error {
    let hint = match &error {
        DeployError::Send(SendError::Rejected(_)) => {
            Some("the wallet declined the request; run the command again to retry")
        }
        DeployError::Send(SendError::PayloadTooLarge { .. }) => {
            Some("the transfer is too large for a QR code; use --tonconnect or --mnemonic")
        }
        DeployError::Send(SendError::LinkExpired) => {
            Some("the wallet did not answer in time; run the command again to get a new link")
        }
        DeployError::Verify(VerifyError::Exhausted { .. }) => {
            Some("the outcome is unknown; check the address in an explorer")
        }
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(error).context(hint),
        None => error.into(),
    }
}

pub async fn deploy(network: &NetworkArgs, config: ProjectConfig, args: &DeployArgs) -> Result<()> {
    let init = ContractInit::new(read_cell(&args.code)?, read_cell(&args.data)?);
    let body = args.body.as_deref().map(read_cell).transpose()?;
    let value = parse_coins(&args.value)?;

    let provider = provider(network, &args.signer, config, true).await?;
    let address = init.address(deployer_core::provider::DEPLOY_WORKCHAIN);
    println!(
        "contract address: {}",
        provider.network().format_address(&address, true)
    );

    let deployment = provider
        .deploy(init, value, body)
        .await
        .map_err(with_guidance)?;

    if let SendOutcome::Signed(sent) = &deployment.outcome {
        println!("sent external message {} (seqno {})", sent.hash, sent.seqno);
    }
    println!("{}", deployment.verification);
    Ok(())
}

pub async fn verify(network: &NetworkArgs, config: ProjectConfig, args: &VerifyArgs) -> Result<()> {
    let provider = provider(network, &SignerArgs::default(), config, false).await?;
    let result = provider
        .wait_for_deploy(
            &args.address,
            args.attempts,
            args.interval_ms.map(Duration::from_millis),
        )
        .await
        .map_err(|e| with_guidance(e.into()))?;

    println!("{result}");
    if result.terminal && !result.success {
        bail!("deployment at {} failed on-chain", args.address);
    }
    Ok(())
}

pub async fn links(network: &NetworkArgs, config: ProjectConfig, args: &LinksArgs) -> Result<()> {
    let provider = provider(network, &SignerArgs::default(), config, false).await?;
    debug!(network = %provider.network(), explorer = %provider.explorer(), "building links");

    let Some(address_link) = provider.address_link(&args.address) else {
        bail!(
            "{} has no explorer links; pass --custom-type to borrow mainnet or testnet links",
            provider.network()
        );
    };
    println!("{address_link}");
    if let Some(link) = args.tx.as_deref().and_then(|tx| provider.transaction_link(tx)) {
        println!("{link}");
    }
    Ok(())
}
