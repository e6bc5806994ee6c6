#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Model-serving bootstrap.
//!
//! A service module registers its model-service classes with the
//! [`registry`]; the [`orchestrator`] resolves the configured module, loads up
//! to [`loader::MAX_MODELS`] models through it, publishes one OpenAPI
//! endpoint per model, optionally emits a client SDK and starts the HTTP host.
//!
//! ```ignore
//! let orchestrator = Orchestrator::initialize("model-server", serve_config)?;
//! let handle = orchestrator.start_serving().await?;
//! handle.wait().await?;
//! ```

pub mod api;
pub mod config;
pub mod contracts;
pub mod error;
pub mod host;
pub mod loader;
pub mod orchestrator;
pub mod registry;
pub mod sdk;

pub use config::{DEFAULT_HOST, DEFAULT_PORT, ServeConfig, ServerConfig};
pub use contracts::{BASE_CONTRACT, HealthStatus, ModelService, ModelSignature, ServiceFactory};
pub use error::{StartupError, StartupErrorKind};
pub use loader::{MAX_MODELS, ModelSpec, ModelSpecList};
pub use orchestrator::{Collaborators, Orchestrator, ServiceSummary, ServingHandle};
pub use registry::{ClassDefinition, ModuleRegistry, ServiceModuleRegistrator};

// Re-exported for `inventory::submit!` in service modules.
pub use inventory;
