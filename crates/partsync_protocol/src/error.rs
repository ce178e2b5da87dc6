//! Error types for the sync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A message could not be encoded to JSON.
    #[error("failed to encode {message}: {source}")]
    Encode {
        /// Message kind being encoded.
        message: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A message could not be decoded from JSON.
    #[error("failed to decode {message}: {source}")]
    Decode {
        /// Message kind being decoded.
        message: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A table name is not part of the replicated set.
    #[error("unknown table: {0}")]
    UnknownTable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::UnknownTable("orders".into());
        assert_eq!(err.to_string(), "unknown table: orders");

        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err = ProtocolError::Decode {
            message: "pull response",
            source,
        };
        assert!(err.to_string().starts_with("failed to decode pull response"));
    }
}
