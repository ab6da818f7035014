//! Error types for the Azure clients.

use thiserror::Error;

/// Errors that can occur when talking to Azure.
#[derive(Debug, Error)]
pub enum AzureError {
    /// No token could be obtained.
    #[error("credential error: {0}")]
    Credential(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local process or file error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service answered with an unexpected status.
    #[error("request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// The service answered with something we cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AzureError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AzureError::Status { status, .. } => *status == 429 || *status >= 500,
            AzureError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Turn a non-success response into an error.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => AzureError::Status { status, body },
            Err(e) => AzureError::Status {
                status,
                body: format!("failed to read response: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        let status = |status| AzureError::Status {
            status,
            body: String::new(),
        };

        assert!(status(429).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(403).is_transient());
        assert!(!AzureError::NotFound("x".to_string()).is_transient());
    }
}
