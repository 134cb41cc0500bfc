//! Error types for the persona knowledge engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, loading or querying persona knowledge
#[derive(Debug, Error)]
pub enum Error {
    /// Index build was given no chunks
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,

    /// Nothing persisted at the index location
    #[error("no index found at {}", .0.display())]
    IndexNotFound(PathBuf),

    /// Persisted index exists but cannot be decoded
    #[error("index at {} is corrupt: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    /// Vector length differs from the index or embedder dimension
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding model could not be reached or failed to run
    #[error("embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Generation model could not be reached
    #[error("generation model unavailable: {0}")]
    GenerationUnavailable(String),

    /// Generation model answered with an error
    #[error("generation failed: {0}")]
    Generation(String),

    /// Reference source has nothing for the query
    #[error("no information found about {0}")]
    ReferenceNotFound(String),

    /// Reference source title resolves to several articles
    #[error("'{title}' may refer to: {}", options.join(", "))]
    ReferenceAmbiguous { title: String, options: Vec<String> },

    /// Network or protocol failure talking to the reference source
    #[error("reference source error: {0}")]
    ReferenceSource(String),

    /// Prompt template is missing a placeholder or has a bad one
    #[error("malformed prompt template: {0}")]
    MalformedTemplate(String),

    /// Chunk size and overlap do not describe a forward-moving window
    #[error("invalid chunking parameters: size {size}, overlap {overlap}")]
    InvalidChunking { size: usize, overlap: usize },

    /// Persona name cannot be used as a storage key
    #[error("invalid persona name: {0:?}")]
    InvalidPersonaName(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Transient infrastructure failures that the end user sees as a fixed apology
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingUnavailable(_) | Error::GenerationUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unavailable_classification() {
        assert!(Error::EmbeddingUnavailable("down".into()).is_service_unavailable());
        assert!(Error::GenerationUnavailable("down".into()).is_service_unavailable());
        assert!(!Error::Generation("bad".into()).is_service_unavailable());
        assert!(!Error::IndexNotFound(PathBuf::from("x")).is_service_unavailable());
    }

    #[test]
    fn test_ambiguous_message_lists_options() {
        let err = Error::ReferenceAmbiguous {
            title: "Mercury".into(),
            options: vec!["Mercury (planet)".into(), "Mercury (element)".into()],
        };
        assert_eq!(
            err.to_string(),
            "'Mercury' may refer to: Mercury (planet), Mercury (element)"
        );
    }
}
