//! Codec error types.

use thiserror::Error;

/// Errors raised while decoding a wire packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The frame is not a JSON object of the packet shape.
    #[error("Malformed packet: {0}")]
    Malformed(String),
    /// The `type` field holds a label that no protocol variant defines.
    #[error("Unexpected packet type: {0}")]
    UnexpectedType(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_type_display() {
        let err = CodecError::UnexpectedType("bogus".into());
        assert_eq!(err.to_string(), "Unexpected packet type: bogus");
    }

    #[test]
    fn json_error_converts_to_malformed() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: CodecError = json_err.into();
        assert!(matches!(err, CodecError::Malformed(_)));
        assert!(err.to_string().starts_with("Malformed packet:"));
    }
}
