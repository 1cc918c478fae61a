//! Error types used by the instrumentor.

use odigos_envoverwrite::Error as EnvError;
use thiserror::Error;

use crate::workload::WorkloadKind;

#[derive(Debug, Error)]
pub enum Error {
    /// Errors from the Kubernetes API
    #[error("{0}")]
    Kube(#[from] kube::Error),
    /// Errors reading or writing the original env annotation
    #[error("{0}")]
    OriginalEnv(#[from] EnvError),
    /// Error while encoding JSON
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// An InstrumentationConfig name that does not encode a supported workload
    #[error("invalid workload runtime object name: {0}")]
    InvalidRuntimeObjectName(String),
    /// Requested item is not found
    #[error("not found: {0}")]
    NotFound(String),
    /// A workload without a pod template
    #[error("{kind} {namespace}/{name} has no pod template")]
    MissingPodTemplate {
        kind: WorkloadKind,
        namespace: String,
        name: String,
    },
    /// Any other error
    #[error("{0}")]
    Others(String),
}

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
