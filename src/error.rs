//! Error taxonomy for the retrieval and answering pipeline.
//!
//! Every fallible library operation returns [`Result`]. The variants map
//! one-to-one onto the failure classes callers need to tell apart:
//! bad configuration, an exhausted embedding backend, an unusable vector
//! index, and a failed completion call.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration values (chunk geometry, unknown providers, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding backend kept failing until the attempt budget ran out.
    #[error("embedding service failed after {attempts} attempts: {message}")]
    EmbeddingService { attempts: u32, message: String },

    /// The vector index could not be opened, read, or written.
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    /// The completion provider rejected or failed the request.
    #[error("completion provider error: {0}")]
    Provider(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_message_names_attempts() {
        let err = Error::EmbeddingService {
            attempts: 5,
            message: "HTTP 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "embedding service failed after 5 attempts: HTTP 503"
        );
    }

    #[test]
    fn test_sqlx_errors_map_to_store_unavailable() {
        let err: Error = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }
}
