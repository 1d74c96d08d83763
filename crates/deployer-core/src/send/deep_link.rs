use std::sync::Arc;

use deployer_transport::deep_link::{OversizedLink, TRANSFER_LINK_QR_CAPACITY, TransferLink};
use tracing::info;

use crate::error::SendError;
use crate::network::Network;
use crate::prompt::Prompter;
use crate::send::qr::render_text_qr;
use crate::send::{PendingTransfer, SendOutcome};

/// Shows the transfer as a scannable code and waits for the user to say they
/// approved it. There is no way to learn the outcome programmatically.
pub struct DeepLinkProvider {
    network: Network,
    prompter: Arc<dyn Prompter>,
}

impl DeepLinkProvider {
    #[must_use]
    pub fn new(network: Network, prompter: Arc<dyn Prompter>) -> Self {
        Self { network, prompter }
    }

    /// Renders the transfer link; fails before any prompting when it cannot
    /// fit into a code.
    pub fn transfer_link(&self, transfer: &PendingTransfer) -> Result<String, SendError> {
        let link = TransferLink {
            destination: self
                .network
                .format_address(&transfer.to, transfer.bounceable()),
            amount: transfer.value,
            payload: transfer.body.as_ref().map(|body| body.as_bytes().to_vec()),
            init: transfer.init.as_ref().map(|init| init.encode()).transpose()?,
        };

        link.to_scannable_uri()
            .map_err(|OversizedLink { size }| SendError::PayloadTooLarge {
                size,
                max: TRANSFER_LINK_QR_CAPACITY,
            })
    }

    pub async fn send_transaction(
        &self,
        transfer: &PendingTransfer,
    ) -> Result<SendOutcome, SendError> {
        let uri = self.transfer_link(transfer)?;
        let qr = render_text_qr(&uri)?;

        self.prompter.show(&format!(
            "Scan the code below with your wallet, or open the link:\n{qr}\n{uri}"
        ))?;

        if !self
            .prompter
            .confirm("Did you approve the transaction in your wallet?")?
        {
            return Err(SendError::Rejected(
                "transfer was not confirmed".to_string(),
            ));
        }

        info!(to = %transfer.to, value = transfer.value, "transfer confirmed by user");
        Ok(SendOutcome::Submitted)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::address::{Address, Cell, ContractInit};
    use crate::prompt::LinePrompter;

    fn provider(script: &str) -> DeepLinkProvider {
        DeepLinkProvider::new(
            Network::Testnet,
            Arc::new(LinePrompter::new(
                Cursor::new(script.as_bytes().to_vec()),
                Vec::new(),
            )),
        )
    }

    fn transfer(body_len: usize) -> PendingTransfer {
        PendingTransfer {
            to: Address::new(0, [3; 32]),
            value: 50_000_000,
            body: Some(Cell::new(vec![0xab; body_len])),
            init: Some(ContractInit::new(Cell::new(vec![1]), Cell::new(vec![2]))),
        }
    }

    #[test]
    fn link_uses_non_bounceable_testnet_address_for_deploys() {
        let uri = provider("").transfer_link(&transfer(4)).expect("link");
        assert!(uri.starts_with("ton://transfer/0Q"));
        assert!(uri.contains("&init="));
    }

    #[tokio::test]
    async fn confirmed_transfer_is_submitted() {
        let outcome = provider("y\n")
            .send_transaction(&transfer(4))
            .await
            .expect("send");
        assert_eq!(outcome, SendOutcome::Submitted);
    }

    #[tokio::test]
    async fn declined_transfer_is_rejected() {
        let err = provider("n\n")
            .send_transaction(&transfer(4))
            .await
            .expect_err("must fail");
        assert!(matches!(err, SendError::Rejected(_)));
    }

    #[tokio::test]
    async fn oversized_transfer_fails_without_prompting() {
        // An empty script would surface as PromptError::Closed if prompted.
        let err = provider("")
            .send_transaction(&transfer(TRANSFER_LINK_QR_CAPACITY))
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            SendError::PayloadTooLarge {
                max: TRANSFER_LINK_QR_CAPACITY,
                ..
            }
        ));
    }
}
