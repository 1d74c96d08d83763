//! Remote wallet bridge: pairs with a wallet app through an end-to-end
//! encrypted relay and forwards transfer requests to it.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use deployer_transport::bridge::{
    BRIDGE_PROTOCOL_VERSION, BRIDGE_USER_REJECTED_CODE, BridgeClientFrame, BridgeDirection,
    BridgePairing, BridgeRole, BridgeServerFrame, BridgeStatusState, BridgeTransferMessage,
    ChannelKey, SendTransactionRequest, WalletMessage,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::address::Address;
use crate::api::throttle::{RetryPolicy, ThrottledClient, decode_json};
use crate::error::{SendError, TransportError};
use crate::network::Network;
use crate::now_ms;
use crate::prompt::Prompter;
use crate::send::qr::render_text_qr;
use crate::send::{PendingTransfer, SendOutcome};
use crate::storage::Storage;

/// Storage key of the persisted connection.
pub const SESSION_KEY: &str = "session";

pub const DEFAULT_WALLETS_LIST_URL: &str = "https://config.ton.org/wallets-v2.json";
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PAIRING_TTL: Duration = Duration::from_secs(5 * 60);

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A wallet app advertised in the remote wallets list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub name: String,
    pub app_name: String,
    pub universal_url: String,
    pub bridge_url: String,
}

#[derive(Debug, Clone, Serialize)]
struct CreatePairingRequest {
    origin: String,
    request_id: String,
    network: String,
    ttl_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatePairingResponse {
    pairing_id: String,
    relay_ws_url: String,
    expires_at_ms: u64,
    web_token: String,
    phone_token: String,
}

/// Persisted so later invocations skip re-approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSession {
    pub wallet: String,
    pub wallet_address: Address,
    pub pairing: BridgePairing,
    pub web_token: String,
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub wallets_list_url: String,
    pub manifest_url: String,
    pub request_ttl: Duration,
    pub pairing_ttl: Duration,
}

impl BridgeOptions {
    #[must_use]
    pub fn new(manifest_url: impl Into<String>) -> Self {
        Self {
            wallets_list_url: DEFAULT_WALLETS_LIST_URL.to_string(),
            manifest_url: manifest_url.into(),
            request_ttl: DEFAULT_REQUEST_TTL,
            pairing_ttl: DEFAULT_PAIRING_TTL,
        }
    }
}

enum RelayEvent {
    Wallet(WalletMessage),
    Expired(String),
    Closed,
}

pub struct BridgeProvider {
    network: Network,
    storage: Arc<dyn Storage>,
    prompter: Arc<dyn Prompter>,
    http: ThrottledClient,
    options: BridgeOptions,
    session: Option<BridgeSession>,
}

impl BridgeProvider {
    pub fn new(
        network: Network,
        storage: Arc<dyn Storage>,
        prompter: Arc<dyn Prompter>,
        options: BridgeOptions,
    ) -> Result<Self, SendError> {
        Ok(Self {
            network,
            storage,
            prompter,
            http: ThrottledClient::new(RetryPolicy::default())?,
            options,
            session: None,
        })
    }

    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.session.as_ref().map(|session| session.wallet_address)
    }

    #[must_use]
    pub const fn session(&self) -> Option<&BridgeSession> {
        self.session.as_ref()
    }

    fn network_name(&self) -> &'static str {
        self.network
            .effective_kind()
            .map_or(self.network.name(), |kind| kind.as_str())
    }

    /// Restores the stored session, or pairs with a new wallet and waits
    /// until it connects or the pairing expires.
    pub async fn connect(&mut self) -> Result<(), SendError> {
        if self.session.is_some() {
            return Ok(());
        }

        if let Some(raw) = self.storage.get(SESSION_KEY)? {
            match serde_json::from_str::<BridgeSession>(&raw) {
                Ok(session) => {
                    info!(wallet = %session.wallet, address = %session.wallet_address, "restored wallet session");
                    self.session = Some(session);
                    return Ok(());
                }
                Err(error) => {
                    warn!(%error, "discarding unreadable wallet session");
                    self.storage.remove(SESSION_KEY)?;
                }
            }
        }

        let wallets = self.fetch_wallets().await?;
        let names: Vec<String> = wallets.iter().map(|w| w.name.clone()).collect();
        let index = self.prompter.select("Choose a wallet", &names)?;
        let wallet = wallets
            .get(index)
            .ok_or_else(|| TransportError::Decode(format!("no wallet at index {index}")))?;

        let created = self.create_pairing(wallet).await?;
        let pairing = BridgePairing {
            v: BRIDGE_PROTOCOL_VERSION,
            pairing_id: created.pairing_id,
            relay_ws_url: created.relay_ws_url,
            expires_at_ms: created.expires_at_ms,
            phone_token: created.phone_token,
            channel_key: ChannelKey::random().map_err(TransportError::from)?,
            manifest_url: self.options.manifest_url.clone(),
        };

        let link = pairing
            .to_link(&wallet.universal_url)
            .map_err(TransportError::from)?;
        let qr = render_text_qr(&link)?;
        self.prompter.show(&format!(
            "Scan the code below with {}, or open the link:\n{qr}\n{link}",
            wallet.name
        ))?;

        let ws = open_channel(&pairing, &created.web_token).await?;
        let (done, connected) = oneshot::channel();
        let watcher = tokio::spawn(watch_connection(ws, pairing.clone(), done));

        let remaining = Duration::from_millis(pairing.expires_at_ms.saturating_sub(now_ms()));
        let outcome = match timeout(remaining, connected).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::Api(
                "relay watcher stopped before the wallet connected".to_string(),
            )
            .into()),
            Err(_) => Err(SendError::LinkExpired),
        };
        watcher.abort();
        let wallet_address = outcome?;

        let session = BridgeSession {
            wallet: wallet.name.clone(),
            wallet_address,
            pairing,
            web_token: created.web_token,
        };
        self.remember(&session)?;
        info!(wallet = %session.wallet, address = %wallet_address, "wallet connected");
        self.session = Some(session);
        Ok(())
    }

    fn remember(&self, session: &BridgeSession) -> Result<(), SendError> {
        self.storage
            .set(SESSION_KEY, &serde_json::to_string(session)?)?;
        Ok(())
    }

    fn forget(&self) -> Result<(), SendError> {
        self.storage.remove(SESSION_KEY)?;
        Ok(())
    }

    async fn fetch_wallets(&self) -> Result<Vec<WalletEntry>, TransportError> {
        let response = self
            .http
            .send(self.http.inner().get(&self.options.wallets_list_url))
            .await?;
        decode_json(response).await
    }

    async fn create_pairing(
        &self,
        wallet: &WalletEntry,
    ) -> Result<CreatePairingResponse, TransportError> {
        let url = format!("{}/v1/pairings", wallet.bridge_url.trim_end_matches('/'));
        let request = self
            .http
            .inner()
            .post(url)
            .json(&CreatePairingRequest {
                origin: self.options.manifest_url.clone(),
                request_id: Uuid::new_v4().to_string(),
                network: self.network_name().to_string(),
                ttl_ms: u64::try_from(self.options.pairing_ttl.as_millis()).unwrap_or(u64::MAX),
            });
        decode_json(self.http.send_once(request).await?).await
    }

    /// Sends one signed-transfer request and waits for the wallet's answer,
    /// at most until the request's own validity runs out.
    pub async fn send_transaction(
        &self,
        transfer: &PendingTransfer,
    ) -> Result<SendOutcome, SendError> {
        let session = self.session.as_ref().ok_or(SendError::NotConnected)?;

        let request_id = Uuid::new_v4().to_string();
        let ttl_ms = u64::try_from(self.options.request_ttl.as_millis()).unwrap_or(u64::MAX);
        let request = SendTransactionRequest {
            id: request_id.clone(),
            valid_until: now_ms().saturating_add(ttl_ms) / 1000,
            network: self.network_name().to_string(),
            from: session.wallet_address.to_string(),
            messages: vec![BridgeTransferMessage {
                address: self
                    .network
                    .format_address(&transfer.to, transfer.bounceable()),
                amount: transfer.value.to_string(),
                payload: transfer.body.as_ref().map(|body| body.to_base64()),
                state_init: transfer
                    .init
                    .as_ref()
                    .map(|init| init.encode().map(|bytes| STANDARD.encode(bytes)))
                    .transpose()?,
            }],
        };

        let mut ws = open_channel(&session.pairing, &session.web_token).await?;
        publish(&mut ws, &session.pairing, &request).await?;
        self.prompter
            .show(&format!("Approve the transaction in {}", session.wallet))?;

        let outcome = match timeout(
            self.options.request_ttl,
            self.await_response(&mut ws, session, &request_id),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(SendError::LinkExpired),
        };

        if let Err(error) = ws.close(None).await {
            debug!(%error, "relay socket did not close cleanly");
        }
        outcome
    }

    async fn await_response(
        &self,
        ws: &mut RelaySocket,
        session: &BridgeSession,
        request_id: &str,
    ) -> Result<SendOutcome, SendError> {
        loop {
            match next_event(ws, &session.pairing).await? {
                RelayEvent::Wallet(WalletMessage::Response { id, result, error })
                    if id == request_id =>
                {
                    if let Some(error) = error {
                        return Err(wallet_error(error.code, error.message));
                    }
                    info!(request_id, "wallet acknowledged the transfer");
                    return Ok(SendOutcome::Acknowledged { boc: result });
                }
                RelayEvent::Wallet(WalletMessage::Disconnect) => {
                    self.forget()?;
                    return Err(SendError::NotConnected);
                }
                RelayEvent::Wallet(other) => {
                    debug!(?other, "ignoring unrelated wallet message");
                }
                RelayEvent::Expired(detail) => {
                    warn!(%detail, "wallet session expired, forgetting it");
                    self.forget()?;
                    return Err(SendError::LinkExpired);
                }
                RelayEvent::Closed => {
                    return Err(TransportError::Api(
                        "relay closed before the wallet answered".to_string(),
                    )
                    .into());
                }
            }
        }
    }
}

fn wallet_error(code: u16, message: String) -> SendError {
    if code == BRIDGE_USER_REJECTED_CODE {
        SendError::Rejected(message)
    } else {
        SendError::Wallet { code, message }
    }
}

async fn send_frame(ws: &mut RelaySocket, frame: &BridgeClientFrame) -> Result<(), TransportError> {
    let encoded =
        serde_json::to_string(frame).map_err(|e| TransportError::Decode(e.to_string()))?;
    ws.send(Message::Text(encoded.into())).await?;
    Ok(())
}

async fn open_channel(pairing: &BridgePairing, token: &str) -> Result<RelaySocket, TransportError> {
    let (mut ws, _) = connect_async(pairing.relay_ws_url.as_str()).await?;
    send_frame(
        &mut ws,
        &BridgeClientFrame::Auth {
            pairing_id: pairing.pairing_id.clone(),
            role: BridgeRole::Web,
            token: token.to_string(),
        },
    )
    .await?;
    Ok(ws)
}

async fn publish(
    ws: &mut RelaySocket,
    pairing: &BridgePairing,
    request: &SendTransactionRequest,
) -> Result<(), TransportError> {
    let sealed = pairing.seal(
        BridgeDirection::WebToPhone,
        format!("msg-req-{}", Uuid::new_v4()),
        request,
    )?;

    send_frame(
        ws,
        &BridgeClientFrame::Publish {
            pairing_id: pairing.pairing_id.clone(),
            direction: BridgeDirection::WebToPhone,
            sealed,
        },
    )
    .await
}

/// Reads frames until something the caller must react to arrives. Delivered
/// wallet messages are decrypted and acknowledged.
async fn next_event(
    ws: &mut RelaySocket,
    pairing: &BridgePairing,
) -> Result<RelayEvent, TransportError> {
    loop {
        let Some(message) = ws.next().await else {
            return Ok(RelayEvent::Closed);
        };
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(RelayEvent::Closed),
            _ => continue,
        };

        let frame: BridgeServerFrame = serde_json::from_str(&text)
            .map_err(|e| TransportError::Decode(format!("relay frame: {e}")))?;

        match frame {
            BridgeServerFrame::Status {
                pairing_id,
                state,
                detail,
            } if pairing_id == pairing.pairing_id => match state {
                BridgeStatusState::Expired => return Ok(RelayEvent::Expired(detail)),
                BridgeStatusState::Closed => return Ok(RelayEvent::Closed),
                other => debug!(?other, %detail, "relay status"),
            },
            BridgeServerFrame::Deliver {
                pairing_id,
                direction: BridgeDirection::PhoneToWeb,
                sealed,
                ..
            } if pairing_id == pairing.pairing_id => {
                let message: WalletMessage = pairing.open(BridgeDirection::PhoneToWeb, &sealed)?;
                send_frame(
                    ws,
                    &BridgeClientFrame::Ack {
                        pairing_id,
                        msg_id: sealed.msg_id,
                    },
                )
                .await?;
                return Ok(RelayEvent::Wallet(message));
            }
            BridgeServerFrame::Error { code, message, .. } => {
                return Err(TransportError::Api(format!(
                    "relay returned error '{code}': {message}"
                )));
            }
            _ => {}
        }
    }
}

/// Runs on its own task and completes `done` once the wallet connects,
/// refuses, or the relay gives up on the pairing.
async fn watch_connection(
    mut ws: RelaySocket,
    pairing: BridgePairing,
    done: oneshot::Sender<Result<Address, SendError>>,
) {
    let outcome = loop {
        match next_event(&mut ws, &pairing).await {
            Ok(RelayEvent::Wallet(WalletMessage::Connect {
                address, app_name, ..
            })) => {
                debug!(%app_name, %address, "wallet joined pairing");
                break address
                    .parse::<Address>()
                    .map_err(|e| SendError::from(TransportError::Decode(e.to_string())));
            }
            Ok(RelayEvent::Wallet(WalletMessage::ConnectError { code, message })) => {
                break Err(wallet_error(code, message));
            }
            Ok(RelayEvent::Wallet(other)) => debug!(?other, "ignoring message before connect"),
            Ok(RelayEvent::Expired(_)) => break Err(SendError::LinkExpired),
            Ok(RelayEvent::Closed) => {
                break Err(TransportError::Api(
                    "relay closed before the wallet connected".to_string(),
                )
                .into());
            }
            Err(error) => break Err(error.into()),
        }
    };

    if done.send(outcome).is_err() {
        debug!("connection waiter went away");
    }
}
