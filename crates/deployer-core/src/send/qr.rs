use qr_code::QrCode;
use qr_code::types::QrError;

use crate::error::SendError;

/// Renders `content` as a terminal-printable code.
pub fn render_text_qr(content: &str) -> Result<String, SendError> {
    let qr = QrCode::new(content).map_err(|e| match e {
        QrError::DataTooLong => SendError::PayloadTooLarge {
            size: content.len(),
            max: deployer_transport::deep_link::TRANSFER_LINK_QR_CAPACITY,
        },
        other => SendError::Qr(other.to_string()),
    })?;
    Ok(qr.to_string(true, 3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_links_render() {
        let rendered = render_text_qr("ton://transfer/abc?amount=1").expect("render");
        assert!(rendered.lines().count() > 10);
    }

    #[test]
    fn oversized_content_maps_to_too_large() {
        let err = render_text_qr(&"x".repeat(4000)).expect_err("must fail");
        assert!(matches!(err, SendError::PayloadTooLarge { size: 4000, .. }));
    }
}
