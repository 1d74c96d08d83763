use crate::verify::Diagnostics;

/// Contradictory or missing configuration, always raised before any I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// More than one option of a mutually exclusive group was supplied.
    #[error("only one {group} option may be given, got: {}", options.join(", "))]
    ConflictingOptions {
        group: &'static str,
        options: Vec<String>,
    },

    #[error("{} can only be used together with a custom network", options.join(", "))]
    CustomOptionsWithoutCustomNetwork { options: Vec<String> },

    #[error("the v4 API does not accept an API key")]
    ApiKeyWithV4,

    #[error("environment variable {0} is required for the mnemonic signer")]
    MissingEnv(&'static str),

    #[error("unknown {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    /// Only "pay gas separately" is supported by every signing mechanism.
    #[error("send mode {0} is not supported, only pay-gas-separately (1) is accepted")]
    UnsupportedSendMode(u8),

    #[error("a value was required for {0} but no interactive input is available")]
    MissingSelection(&'static str),

    #[error("failed to load project config: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("failed to read input: {0}")]
    Prompt(#[from] PromptError),
}

/// Failures talking to a ledger endpoint, indexer or bridge relay.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The endpoint kept answering 429 after every backoff attempt.
    #[error("rate limited by {url} after {attempts} attempts")]
    Throttled { url: String, attempts: u32 },

    #[error("API error: {0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("bridge protocol error: {0}")]
    Protocol(#[from] deployer_transport::bridge::BridgeProtocolError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("failed to read from terminal: {0}")]
    Io(#[from] std::io::Error),

    #[error("input closed before an answer was given")]
    Closed,

    #[error("no choices available for '{0}'")]
    NoChoices(String),
}

/// Errors from the signing mechanisms, merged at the send façade.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The user declined in their wallet.
    #[error("request rejected by the wallet: {0}")]
    Rejected(String),

    /// The transfer does not fit into a scannable code.
    #[error("transfer link is too large for a QR code ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("wallet link expired before the wallet answered")]
    LinkExpired,

    #[error("wallet answered with error {code}: {message}")]
    Wallet { code: u16, message: String },

    #[error("no wallet is connected")]
    NotConnected,

    #[error("failed to render QR code: {0}")]
    Qr(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Polling budget spent without ever seeing the contract active.
    #[error(
        "contract {address} did not become active after {attempts} attempts, check it manually"
    )]
    Exhausted { address: String, attempts: u32 },
}

/// Top-level error of a deployment cycle.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("a contract is already active at {address}")]
    AlreadyDeployed { address: String },

    /// The transaction was included but its execution failed.
    #[error("deployment failed on-chain: {0}")]
    OnChainFailure(Box<Diagnostics>),
}
