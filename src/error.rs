//! Error types for the Kinesis stream client.

use thiserror::Error;

/// Main error type for stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("client not initialized: no configuration set")]
    NotInitialized,

    #[error("stream {stream} has no shards")]
    NoShards { stream: String },

    #[error("no records to write")]
    EmptyInput,

    #[error("invalid read limit {0}: must be between 1 and 10000")]
    InvalidLimit(u32),

    #[error("resource not found: {message}")]
    NotFound { message: String },

    #[error("throttled: {message}")]
    Throttled { message: String },

    #[error("shard iterator expired: {message}")]
    ExpiredIterator { message: String },

    #[error("access denied: {message}")]
    AccessDenied { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("service error: {status} {code} - {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("timeout")]
    Timeout,

    #[error("json error: {0}")]
    Json(String),

    #[error("payload decode error: {0}")]
    Decode(String),
}

impl StreamError {
    /// Create error from a service error response.
    ///
    /// `code` is the `__type` of the response body; a namespace prefix such as
    /// `com.amazonaws.kinesis.v20131202#` is ignored.
    pub fn from_service(status: u16, code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = code.rsplit('#').next().unwrap_or(code);

        match code {
            "ResourceNotFoundException" => StreamError::NotFound { message },
            "ProvisionedThroughputExceededException"
            | "LimitExceededException"
            | "ThrottlingException" => StreamError::Throttled { message },
            "ExpiredIteratorException" => StreamError::ExpiredIterator { message },
            "AccessDeniedException"
            | "UnrecognizedClientException"
            | "InvalidSignatureException"
            | "MissingAuthenticationTokenException" => StreamError::AccessDenied { message },
            "InvalidArgumentException" | "ValidationException" | "SerializationException" => {
                StreamError::InvalidRequest { message }
            }
            _ => StreamError::Service {
                status,
                code: code.to_string(),
                message,
            },
        }
    }

    /// Whether a caller may reasonably retry the failed call.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Throttled { .. } => true,
            StreamError::Service { status, .. } => *status >= 500,
            StreamError::Network { .. } => true,
            StreamError::Timeout => true,
            _ => false,
        }
    }

    /// HTTP status code if applicable
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StreamError::NotFound { .. }
            | StreamError::Throttled { .. }
            | StreamError::ExpiredIterator { .. }
            | StreamError::InvalidRequest { .. } => Some(400),
            StreamError::AccessDenied { .. } => Some(403),
            StreamError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short machine-readable code, used by the command line tool.
    pub fn error_code(&self) -> &str {
        match self {
            StreamError::NotInitialized => "NOT_INITIALIZED",
            StreamError::NoShards { .. } => "NO_SHARDS",
            StreamError::EmptyInput => "EMPTY_INPUT",
            StreamError::InvalidLimit(_) => "INVALID_LIMIT",
            StreamError::NotFound { .. } => "NOT_FOUND",
            StreamError::Throttled { .. } => "THROTTLED",
            StreamError::ExpiredIterator { .. } => "EXPIRED_ITERATOR",
            StreamError::AccessDenied { .. } => "ACCESS_DENIED",
            StreamError::InvalidRequest { .. } => "INVALID_REQUEST",
            StreamError::Service { code, .. } => code.as_str(),
            StreamError::Network { .. } => "NETWORK",
            StreamError::Timeout => "TIMEOUT",
            StreamError::Json(_) => "JSON",
            StreamError::Decode(_) => "DECODE",
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_codes_map_to_variants() {
        let err = StreamError::from_service(
            400,
            "com.amazonaws.kinesis.v20131202#ResourceNotFoundException",
            "Stream test-stream under account 000000000000 not found.",
        );
        assert!(matches!(err, StreamError::NotFound { .. }));
        assert_eq!(err.error_code(), "NOT_FOUND");

        let err = StreamError::from_service(400, "ProvisionedThroughputExceededException", "slow down");
        assert!(err.is_retryable());

        let err = StreamError::from_service(400, "ExpiredIteratorException", "expired");
        assert!(matches!(err, StreamError::ExpiredIterator { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_code_keeps_status() {
        let err = StreamError::from_service(503, "ServiceUnavailable", "try later");
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.error_code(), "ServiceUnavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_domain_errors_are_not_retryable() {
        assert!(!StreamError::NotInitialized.is_retryable());
        assert!(!StreamError::EmptyInput.is_retryable());
        assert!(!StreamError::NoShards {
            stream: "s".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = StreamError::Network {
            message: "connection refused".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "NETWORK");
        assert_eq!(err.status_code(), None);
        assert!(StreamError::Timeout.is_retryable());
    }
}
