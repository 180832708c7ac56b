use thiserror::Error;

/// Unified error type for the adapter layer.
///
/// Backend failures keep the backend name and the original message text so
/// callers (and the tool-support classifier) can act on them.
#[derive(Debug, Error)]
pub enum Error {
    /// The adapter cannot be constructed or used as configured, for example
    /// a missing API key or an unparseable base URL.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The backend rejected the request because of the attached tool
    /// declarations. Triggers at most one automatic tool-free retry.
    #[error("{backend} rejected tool declarations: {message}")]
    ToolsUnsupported { backend: String, message: String },

    /// Any other backend failure, transport-level or reported in an error
    /// body, wrapped with the backend name.
    #[error("{backend} request failed: {message}")]
    Provider { backend: String, message: String },

    /// The backend cannot embed the given content, either because it has no
    /// embedding endpoint or because there is nothing to embed.
    #[error("{backend} cannot embed content: {reason}")]
    EmbeddingUnsupported { backend: String, reason: String },

    /// The credential store refused an operation. Read paths degrade this to
    /// "credential absent"; only explicit writes surface it.
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn tools_unsupported(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolsUnsupported {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn provider(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn embedding_unsupported(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::EmbeddingUnsupported {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn credential_store(message: impl Into<String>) -> Self {
        Error::CredentialStore(message.into())
    }

    /// The backend this error came from, when it carries one.
    pub fn backend(&self) -> Option<&str> {
        match self {
            Error::ToolsUnsupported { backend, .. }
            | Error::Provider { backend, .. }
            | Error::EmbeddingUnsupported { backend, .. } => Some(backend),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_backend_and_message() {
        let err = Error::provider("ollama", "connection refused");
        assert_eq!(err.to_string(), "ollama request failed: connection refused");
        assert_eq!(err.backend(), Some("ollama"));
    }

    #[test]
    fn test_serde_json_errors_convert() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.backend().is_none());
    }
}
