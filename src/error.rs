// Error handling module
// Defines the errors delivered to callers of the marketplace client

use thiserror::Error;

use crate::transport::TransportError;

/// Errors delivered by `MarketClient` operations
#[derive(Error, Debug)]
pub enum ApiError {
    /// No valid token or credentials, and refresh was not attempted or failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure or non-success status
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// Download returned no body or was issued with a non-GET method
    #[error("Download error: {0}")]
    Download(String),

    /// Response body did not decode into the expected shape
    #[error("Data corrupted: {0}")]
    DataCorrupted(String),

    /// Caller misuse (unserializable body, malformed URL, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential store or other internal failure
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Auth(_) => "auth_error",
            ApiError::Network(_) => "network_error",
            ApiError::Download(_) => "download_error",
            ApiError::DataCorrupted(_) => "data_corrupted",
            ApiError::Configuration(_) => "configuration_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status carried by the underlying transport failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Human-readable message for the presentation layer
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Auth(_) => "Your session has expired. Please sign in again.".to_string(),
            ApiError::Network(TransportError::Status { status, .. }) if *status >= 500 => {
                "The server is unavailable right now. Try again later.".to_string()
            }
            ApiError::Network(TransportError::Status { status: 401, .. }) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Network(TransportError::Status { status, .. }) => {
                format!("The server rejected the request ({status}).")
            }
            ApiError::Network(_) => "Check your internet connection and try again.".to_string(),
            ApiError::Download(msg) => format!("Could not load the file: {msg}"),
            ApiError::DataCorrupted(_) => "Received unexpected data from the server.".to_string(),
            ApiError::Configuration(msg) => format!("Request could not be built: {msg}"),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                "Something went wrong.".to_string()
            }
        }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_messages() {
        let err = ApiError::Auth("No stored credentials".to_string());
        assert_eq!(err.to_string(), "Authentication failed: No stored credentials");

        let err = ApiError::Download("No data received".to_string());
        assert_eq!(err.to_string(), "Download error: No data received");

        let err = ApiError::Network(TransportError::Status {
            status: 429,
            body: "Rate limit exceeded".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Network error: HTTP 429 - Rate limit exceeded"
        );
    }

    #[test]
    fn test_data_corrupted_message() {
        let err = ApiError::DataCorrupted("missing field `filename`".to_string());
        assert_eq!(err.to_string(), "Data corrupted: missing field `filename`");
    }

    #[test]
    fn test_internal_error_message() {
        let err = ApiError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ApiError::Auth(String::new()).kind(), "auth_error");
        assert_eq!(ApiError::Download(String::new()).kind(), "download_error");
        assert_eq!(ApiError::DataCorrupted(String::new()).kind(), "data_corrupted");
        assert_eq!(
            ApiError::Configuration(String::new()).kind(),
            "configuration_error"
        );
        assert_eq!(
            ApiError::Network(TransportError::Timeout(Duration::from_secs(1))).kind(),
            "network_error"
        );
    }

    #[test]
    fn test_status_passthrough() {
        let err = ApiError::Network(TransportError::Status {
            status: 404,
            body: String::new(),
        });
        assert_eq!(err.status(), Some(404));
        assert_eq!(ApiError::Auth(String::new()).status(), None);
    }

    #[test]
    fn test_user_messages() {
        let err = ApiError::Network(TransportError::Status {
            status: 503,
            body: String::new(),
        });
        assert_eq!(
            err.user_message(),
            "The server is unavailable right now. Try again later."
        );

        let err = ApiError::Network(TransportError::Status {
            status: 400,
            body: String::new(),
        });
        assert_eq!(err.user_message(), "The server rejected the request (400).");

        let err = ApiError::Network(TransportError::Timeout(Duration::from_secs(30)));
        assert_eq!(
            err.user_message(),
            "Check your internet connection and try again."
        );
    }
}
