use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

pub const TRANSFER_LINK_SCHEME: &str = "ton";
pub const TRANSFER_LINK_ACTION: &str = "transfer";

/// Largest link a scannable code can carry: QR version 40, medium error
/// correction, byte mode.
pub const TRANSFER_LINK_QR_CAPACITY: usize = 2331;

/// One outgoing transfer, expressed as a wallet deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLink {
    pub destination: String,
    pub amount: u64,
    pub payload: Option<Vec<u8>>,
    pub init: Option<Vec<u8>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("transfer link is {size} bytes, a code holds at most {TRANSFER_LINK_QR_CAPACITY}")]
pub struct OversizedLink {
    pub size: usize,
}

impl TransferLink {
    #[must_use]
    pub fn to_uri(&self) -> String {
        let mut uri = format!(
            "{TRANSFER_LINK_SCHEME}://{TRANSFER_LINK_ACTION}/{}?amount={}",
            self.destination, self.amount
        );
        if let Some(payload) = &self.payload {
            uri.push_str("&bin=");
            uri.push_str(&URL_SAFE_NO_PAD.encode(payload));
        }
        if let Some(init) = &self.init {
            uri.push_str("&init=");
            uri.push_str(&URL_SAFE_NO_PAD.encode(init));
        }
        uri
    }

    /// Renders the link, refusing one that no single code can hold.
    pub fn to_scannable_uri(&self) -> Result<String, OversizedLink> {
        let uri = self.to_uri();
        if exceeds_qr_capacity(&uri) {
            return Err(OversizedLink { size: uri.len() });
        }
        Ok(uri)
    }
}

#[must_use]
pub fn exceeds_qr_capacity(text: &str) -> bool {
    text.len() > TRANSFER_LINK_QR_CAPACITY
}
