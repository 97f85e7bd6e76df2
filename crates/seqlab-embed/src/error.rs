use thiserror::Error;

/// Errors that can occur while training or querying word embeddings.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A word was looked up that the model never saw.
    #[error("word {word:?} not in vocabulary{}", hint(.suggestion))]
    OutOfVocabulary {
        word: String,
        /// Closest known spelling, if any is reasonably close.
        suggestion: Option<String>,
    },

    /// No word reached the minimum count.
    #[error("vocabulary is empty (min_count too high or corpus empty)")]
    EmptyVocabulary,

    /// A vectors or evaluation file could not be interpreted.
    #[error("malformed line {line}: {reason}")]
    Format {
        /// 1-based line number.
        line: usize,
        reason: String,
    },

    /// An invalid argument was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Candle ML framework error.
    #[error("ML training error: {0}")]
    Candle(#[from] candle_core::Error),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean {s:?}?)"))
        .unwrap_or_default()
}

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oov_message_includes_suggestion() {
        let err = EmbedError::OutOfVocabulary {
            word: "kinng".into(),
            suggestion: Some("king".into()),
        };
        assert_eq!(
            err.to_string(),
            r#"word "kinng" not in vocabulary (did you mean "king"?)"#
        );

        let err = EmbedError::OutOfVocabulary {
            word: "zzz".into(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), r#"word "zzz" not in vocabulary"#);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmbedError>();
    }
}
