//! Error types for the Swift provider

use thiserror::Error;

/// Swift provider errors
#[derive(Error, Debug)]
pub enum SwiftError {
    /// API request returned an error status
    #[error("Swift API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse an API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Store error from the transport layer
    #[error(transparent)]
    StoreError(#[from] relay_traits::error::StoreError),
}

/// Result type for Swift operations
pub type Result<T> = std::result::Result<T, SwiftError>;

impl From<SwiftError> for relay_traits::error::StoreError {
    fn from(error: SwiftError) -> Self {
        match error {
            SwiftError::ApiError {
                status_code,
                message,
            } => relay_traits::error::StoreError::OperationFailed(format!(
                "API error (status {}): {}",
                status_code, message
            )),
            SwiftError::ParseError(msg) => {
                relay_traits::error::StoreError::OperationFailed(format!("Parse error: {}", msg))
            }
            SwiftError::StoreError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SwiftError::ApiError {
            status_code: 503,
            message: "Service Unavailable".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Swift API error (status 503): Service Unavailable"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error = SwiftError::ParseError("bad json".to_string());
        let store_error: relay_traits::error::StoreError = error.into();

        assert!(matches!(
            store_error,
            relay_traits::error::StoreError::OperationFailed(_)
        ));
    }
}
