//! Wallet bridge wire format: the pairing shipped inside the connection link,
//! the relay frames, and the end-to-end encrypted messages they carry.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const BRIDGE_PROTOCOL_VERSION: u64 = 1;

/// Fragment parameter of the connection link that holds the pairing.
pub const BRIDGE_PAIRING_PARAM: &str = "bridge_v1";

/// Error code a wallet answers with when its user declines a request.
pub const BRIDGE_USER_REJECTED_CODE: u16 = 300;

const MAX_PAIRING_BYTES: usize = 16 * 1024;
const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 24;
const HKDF_CONTEXT: &[u8] = b"deployer_bridge_v1";

#[derive(Debug, Error)]
pub enum BridgeProtocolError {
    #[error("failed to encode or decode bridge message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode base64url field: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("pairing compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("connection link carries no {BRIDGE_PAIRING_PARAM} parameter")]
    MissingPairing,

    #[error("unsupported pairing version {0}")]
    Version(u64),

    #[error("{field} must be {expected} bytes, got {actual}")]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("system randomness unavailable")]
    Random,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,
}

/// Secret shared with the wallet only through the connection link. Each
/// direction encrypts under its own key derived from it.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelKey([u8; KEY_BYTES]);

impl ChannelKey {
    pub fn random() -> Result<Self, BridgeProtocolError> {
        Ok(Self(random_bytes()?))
    }

    fn cipher(
        &self,
        pairing_id: &str,
        direction: BridgeDirection,
    ) -> Result<XChaCha20Poly1305, BridgeProtocolError> {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, pairing_id.as_bytes()).extract(&self.0);
        let info = [HKDF_CONTEXT, direction.label().as_bytes()];
        let mut derived = [0_u8; KEY_BYTES];
        prk.expand(&info, hkdf::HKDF_SHA256)
            .and_then(|okm| okm.fill(&mut derived))
            .map_err(|_| BridgeProtocolError::KeyDerivation)?;
        Ok(XChaCha20Poly1305::new(Key::from_slice(&derived)))
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelKey(<redacted>)")
    }
}

impl Serialize for ChannelKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ChannelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        decode_fixed("channel key", &encoded)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeRole {
    Web,
    Phone,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeDirection {
    WebToPhone,
    PhoneToWeb,
}

impl BridgeDirection {
    const fn label(self) -> &'static str {
        match self {
            Self::WebToPhone => "web_to_phone",
            Self::PhoneToWeb => "phone_to_web",
        }
    }
}

/// Everything a wallet needs to join a pairing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgePairing {
    pub v: u64,
    pub pairing_id: String,
    pub relay_ws_url: String,
    pub expires_at_ms: u64,
    pub phone_token: String,
    pub channel_key: ChannelKey,
    pub manifest_url: String,
}

impl BridgePairing {
    /// Appends the compressed pairing to a wallet's universal link.
    pub fn to_link(&self, universal_url: &str) -> Result<String, BridgeProtocolError> {
        let json = serde_json::to_vec(self)?;
        let compressed =
            zstd::bulk::compress(&json, 0).map_err(BridgeProtocolError::Compression)?;
        let separator = if universal_url.contains('#') { '&' } else { '#' };
        Ok(format!(
            "{universal_url}{separator}{BRIDGE_PAIRING_PARAM}={}",
            URL_SAFE_NO_PAD.encode(compressed)
        ))
    }

    /// Reads the pairing back out of a connection link, as the wallet does.
    pub fn from_link(link: &str) -> Result<Self, BridgeProtocolError> {
        let encoded = link
            .trim()
            .split_once('#')
            .and_then(|(_, fragment)| {
                fragment.split('&').find_map(|pair| {
                    pair.strip_prefix(BRIDGE_PAIRING_PARAM)?.strip_prefix('=')
                })
            })
            .ok_or(BridgeProtocolError::MissingPairing)?;

        let compressed = URL_SAFE_NO_PAD.decode(encoded)?;
        let json = zstd::bulk::decompress(&compressed, MAX_PAIRING_BYTES)
            .map_err(BridgeProtocolError::Compression)?;
        let pairing: Self = serde_json::from_slice(&json)?;
        if pairing.v != BRIDGE_PROTOCOL_VERSION {
            return Err(BridgeProtocolError::Version(pairing.v));
        }
        Ok(pairing)
    }

    /// Encrypts `message` for the peer on the other end of `direction`. The
    /// pairing id, direction and message id are bound as associated data.
    pub fn seal<T: Serialize>(
        &self,
        direction: BridgeDirection,
        msg_id: String,
        message: &T,
    ) -> Result<Sealed, BridgeProtocolError> {
        let nonce: [u8; NONCE_BYTES] = random_bytes()?;
        let plaintext = serde_json::to_vec(message)?;
        let aad = self.aad(direction, &msg_id);
        let ciphertext = self
            .channel_key
            .cipher(&self.pairing_id, direction)?
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| BridgeProtocolError::Encrypt)?;

        Ok(Sealed {
            msg_id,
            nonce_b64: URL_SAFE_NO_PAD.encode(nonce),
            ciphertext_b64: URL_SAFE_NO_PAD.encode(ciphertext),
        })
    }

    pub fn open<T: DeserializeOwned>(
        &self,
        direction: BridgeDirection,
        sealed: &Sealed,
    ) -> Result<T, BridgeProtocolError> {
        let nonce: [u8; NONCE_BYTES] = decode_fixed("nonce", &sealed.nonce_b64)?;
        let ciphertext = URL_SAFE_NO_PAD.decode(&sealed.ciphertext_b64)?;
        let aad = self.aad(direction, &sealed.msg_id);
        let plaintext = self
            .channel_key
            .cipher(&self.pairing_id, direction)?
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| BridgeProtocolError::Decrypt)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn aad(&self, direction: BridgeDirection, msg_id: &str) -> Vec<u8> {
        format!("{}|{}|{msg_id}", self.pairing_id, direction.label()).into_bytes()
    }
}

/// Encrypted part of a publish or deliver frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sealed {
    pub msg_id: String,
    pub nonce_b64: String,
    pub ciphertext_b64: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatusState {
    PeerConnected,
    RequestSent,
    ResponseSent,
    Closed,
    Expired,
    Error,
}

/// Frames the deployer writes to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeClientFrame {
    Auth {
        pairing_id: String,
        role: BridgeRole,
        token: String,
    },
    Publish {
        pairing_id: String,
        direction: BridgeDirection,
        #[serde(flatten)]
        sealed: Sealed,
    },
    Ack {
        pairing_id: String,
        msg_id: String,
    },
}

/// Frames the relay writes back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeServerFrame {
    Ack {
        pairing_id: String,
        msg_id: String,
    },
    Deliver {
        pairing_id: String,
        direction: BridgeDirection,
        #[serde(flatten)]
        sealed: Sealed,
        created_at_ms: u64,
    },
    Status {
        pairing_id: String,
        state: BridgeStatusState,
        detail: String,
    },
    Error {
        pairing_id: Option<String>,
        code: String,
        message: String,
    },
}

/// One transfer inside a request. Amounts are decimal strings in nano units;
/// payload and init are standard base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeTransferMessage {
    pub address: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_init: Option<String>,
}

/// Signed-transfer request the deployer sends to the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename = "send_transaction")]
pub struct SendTransactionRequest {
    pub id: String,
    /// Unix seconds after which the wallet must refuse to sign.
    pub valid_until: u64,
    pub network: String,
    pub from: String,
    pub messages: Vec<BridgeTransferMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeResponseError {
    pub code: u16,
    pub message: String,
}

/// Messages from the wallet to the deployer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalletMessage {
    Connect {
        address: String,
        app_name: String,
        #[serde(default)]
        network: Option<String>,
    },
    ConnectError {
        code: u16,
        message: String,
    },
    Response {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<BridgeResponseError>,
    },
    Disconnect,
}

fn random_bytes<const N: usize>() -> Result<[u8; N], BridgeProtocolError> {
    let mut bytes = [0_u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| BridgeProtocolError::Random)?;
    Ok(bytes)
}

fn decode_fixed<const N: usize>(
    field: &'static str,
    encoded: &str,
) -> Result<[u8; N], BridgeProtocolError> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| BridgeProtocolError::Length {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pairing() -> BridgePairing {
        BridgePairing {
            v: BRIDGE_PROTOCOL_VERSION,
            pairing_id: "pair-1".to_string(),
            relay_ws_url: "ws://127.0.0.1:8787/v1/ws".to_string(),
            expires_at_ms: 1_700_000_120_000,
            phone_token: "token-phone".to_string(),
            channel_key: ChannelKey::random().expect("key"),
            manifest_url: "https://dapp.example/manifest.json".to_string(),
        }
    }

    #[test]
    fn wallet_reads_the_pairing_from_the_link() {
        let pairing = pairing();
        let link = pairing
            .to_link("https://wallet.example/ton-connect#ref=deployer")
            .expect("link");

        assert!(link.contains(&format!("#ref=deployer&{BRIDGE_PAIRING_PARAM}=")));
        assert_eq!(BridgePairing::from_link(&link).expect("decode"), pairing);
        assert!(matches!(
            BridgePairing::from_link("https://wallet.example/ton-connect"),
            Err(BridgeProtocolError::MissingPairing)
        ));
    }

    #[test]
    fn sealed_messages_only_open_in_their_direction() {
        let pairing = pairing();
        let request = SendTransactionRequest {
            id: "1".to_string(),
            valid_until: 1_700_000_300,
            network: "testnet".to_string(),
            from: "0:00".to_string(),
            messages: Vec::new(),
        };

        let sealed = pairing
            .seal(BridgeDirection::WebToPhone, "msg-1".to_string(), &request)
            .expect("seal");
        let opened: SendTransactionRequest = pairing
            .open(BridgeDirection::WebToPhone, &sealed)
            .expect("open");
        assert_eq!(opened, request);

        let reversed = pairing.open::<SendTransactionRequest>(BridgeDirection::PhoneToWeb, &sealed);
        assert!(matches!(reversed, Err(BridgeProtocolError::Decrypt)));

        let mut replayed = sealed;
        replayed.msg_id = "msg-2".to_string();
        let replayed = pairing.open::<SendTransactionRequest>(BridgeDirection::WebToPhone, &replayed);
        assert!(matches!(replayed, Err(BridgeProtocolError::Decrypt)));
    }

    #[test]
    fn frames_keep_the_sealed_fields_flat() {
        let frame = BridgeClientFrame::Publish {
            pairing_id: "pair-1".to_string(),
            direction: BridgeDirection::WebToPhone,
            sealed: Sealed {
                msg_id: "m".to_string(),
                nonce_b64: "n".to_string(),
                ciphertext_b64: "c".to_string(),
            },
        };

        assert_eq!(
            serde_json::to_value(&frame).expect("encode"),
            json!({
                "type": "publish",
                "pairing_id": "pair-1",
                "direction": "web_to_phone",
                "msg_id": "m",
                "nonce_b64": "n",
                "ciphertext_b64": "c",
            })
        );
    }

    #[test]
    fn request_is_tagged_with_its_method() {
        let request = SendTransactionRequest {
            id: "9".to_string(),
            valid_until: 1,
            network: "mainnet".to_string(),
            from: "0:00".to_string(),
            messages: Vec::new(),
        };
        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(value["method"], "send_transaction");
    }

    #[test]
    fn short_nonce_is_rejected() {
        let pairing = pairing();
        let sealed = Sealed {
            msg_id: "m".to_string(),
            nonce_b64: URL_SAFE_NO_PAD.encode([0_u8; 12]),
            ciphertext_b64: String::new(),
        };

        let err = pairing
            .open::<WalletMessage>(BridgeDirection::PhoneToWeb, &sealed)
            .expect_err("short nonce");
        assert!(matches!(
            err,
            BridgeProtocolError::Length { field: "nonce", expected: 24, actual: 12 }
        ));
    }

    #[test]
    fn wallet_rejection_decodes() {
        let raw = r#"{"event":"response","id":"7","error":{"code":300,"message":"User declined"}}"#;
        let message: WalletMessage = serde_json::from_str(raw).expect("decode");

        assert!(matches!(
            message,
            WalletMessage::Response { error: Some(BridgeResponseError { code, .. }), .. }
                if code == BRIDGE_USER_REJECTED_CODE
        ));
    }
}
