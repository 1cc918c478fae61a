//! Error types used by the original-value store.
//!
//! Registry misses are not errors; only persisted state can be invalid.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The original-value annotation could not be decoded
    #[error("malformed {annotation} annotation: {source}")]
    MalformedAnnotation {
        annotation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// Error while encoding JSON
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
