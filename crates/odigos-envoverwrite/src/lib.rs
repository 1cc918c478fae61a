//! Odigos-managed environment variables.
//!
//! Instrumenting a container means appending an agent fragment to variables such as
//! `JAVA_TOOL_OPTIONS`, `NODE_OPTIONS` or `PYTHONPATH` without losing whatever the
//! application owner already put there. This crate holds the pieces that do not
//! talk to a cluster:
//!
//! - [`Registry`]: which variables are managed, their delimiter and the managed value
//!   for every [`OtelSdk`] variant.
//! - The patch engine: methods on [`Registry`] that compose, strip and revert managed
//!   values (see the `patch` module).
//! - [`OriginalWorkloadEnv`]: the pre-Odigos snapshot persisted as a workload annotation.

pub mod error;
pub mod original_env;
pub mod patch;
pub mod registry;
pub mod sdk;

pub use error::{Error, Result};
pub use original_env::{ContainerOriginalEnv, ORIGINAL_ENV_ANNOTATION, OriginalWorkloadEnv};
pub use patch::{ODIGOS_MARKER, contains_odigos_marker};
pub use registry::{EnvVarRule, Registry, RegistryBuilder, SharedRegistry};
pub use sdk::{OdigosTier, OtelSdk, ProgrammingLanguage, SdkTier, SdkType};
