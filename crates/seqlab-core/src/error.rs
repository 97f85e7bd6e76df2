use thiserror::Error;

/// Errors that can occur during seqlab core operations.
#[derive(Debug, Error)]
pub enum SeqlabError {
    /// Underlying filesystem failure (missing corpus, unwritable model directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A corpus line could not be interpreted.
    #[error("malformed corpus line {line}: {reason}")]
    MalformedLine {
        /// 1-based line number in the corpus file.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// A tag string is not a valid BIO/BILUO tag.
    #[error("invalid tag {0:?}")]
    InvalidTag(String),

    /// Token and tag sequences have different lengths.
    #[error("length mismatch: {tokens} tokens but {tags} tags")]
    LengthMismatch {
        /// Number of tokens.
        tokens: usize,
        /// Number of tags.
        tags: usize,
    },

    /// The tag refers to a label the model does not know.
    #[error("unknown label {0:?}")]
    UnknownLabel(String),

    /// Decoder input has the wrong shape.
    #[error("decoding error: {0}")]
    Decode(String),

    /// The model weights file could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// JSON (de)serialization of models or reports failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// An invalid argument was supplied (e.g. a split fraction outside `[0, 1]`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for seqlab core operations.
pub type Result<T> = std::result::Result<T, SeqlabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SeqlabError::MalformedLine {
            line: 12,
            reason: "missing tag column".into(),
        };
        assert_eq!(err.to_string(), "malformed corpus line 12: missing tag column");

        let err = SeqlabError::InvalidTag("X-PER".into());
        assert!(err.to_string().contains("X-PER"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SeqlabError>();
    }
}
