//! Instrumentor-side handling of Odigos-managed environment variables.
//!
//! - [`injector`]: runs inside the pod mutating webhook and patches one container
//!   spec at creation time.
//! - [`migration`]: runs once when the instrumentor starts and repairs persisted
//!   env state written by earlier versions.
//!
//! Both build on the registry and patch engine of `odigos-envoverwrite`.

pub mod api;
pub mod config;
pub mod error;
pub mod injector;
pub mod migration;
pub mod workload;

pub use config::InjectorConfig;
pub use error::{Error, Result};
pub use injector::EnvInjector;
pub use migration::{MigrationReport, MigrationRunnable};
