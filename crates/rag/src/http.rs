//! Shared HTTP error mapping for the hosted collaborators.

use storechat_core::{AppError, ProviderError, ProviderErrorKind};

/// Longest error body kept in a provider error message.
const MAX_ERROR_BODY: usize = 512;

/// Classify a transport-level `reqwest` failure.
pub(crate) fn map_request_error(provider: &str, err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_connect() || err.is_request() {
        ProviderErrorKind::Network
    } else if let Some(status) = err.status() {
        ProviderErrorKind::from_status(status.as_u16())
    } else {
        // Body decoding and builder errors do not improve on retry
        ProviderErrorKind::Permanent
    };

    AppError::Provider(ProviderError::new(provider, kind, err.to_string()))
}

/// Read a failed response body for the error message, truncated.
pub(crate) async fn read_error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    truncate(&body, MAX_ERROR_BODY)
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }
}
