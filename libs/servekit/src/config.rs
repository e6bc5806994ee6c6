//! Serving configuration as supplied by the application layer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::{ModelSpecError, ModelSpecList};
use crate::registry::{ModuleReference, RegistryError};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// `serve` section of the application config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    /// Module reference of the model service to load.
    pub service: Option<String>,
    /// Model specs, `name=path` or `path`.
    pub models: Vec<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Directory to emit the client SDK into.
    pub gen_api: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no service module configured (set serve.service or --service)")]
    MissingService,
    #[error("no models configured (set serve.models or --models)")]
    NoModels,
    #[error(transparent)]
    Module(RegistryError),
    #[error("invalid model spec '{raw}': {source}")]
    ModelSpec {
        raw: String,
        #[source]
        source: ModelSpecError,
    },
    #[error("failed to build service module registry: {0}")]
    Registry(#[source] RegistryError),
}

impl ServeConfig {
    /// Check required fields and parse the module reference and model specs.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `service` or `models` is missing or malformed.
    pub fn validate(&self) -> Result<(ModuleReference, ModelSpecList), ConfigError> {
        let service = self
            .service
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingService)?;
        let module = ModuleReference::new(service).map_err(ConfigError::Module)?;

        if self.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        let mut specs = Vec::with_capacity(self.models.len());
        for raw in &self.models {
            let spec = raw.parse().map_err(|source| ConfigError::ModelSpec {
                raw: raw.clone(),
                source,
            })?;
            specs.push(spec);
        }

        Ok((module, ModelSpecList::new(specs)))
    }
}

/// Resolved listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Apply `127.0.0.1` / `8080` for whatever is unset.
    #[must_use]
    pub fn resolve(host: Option<&str>, port: Option<u16>) -> Self {
        Self {
            host: host
                .filter(|h| !h.is_empty())
                .unwrap_or(DEFAULT_HOST)
                .to_owned(),
            port: port.unwrap_or(DEFAULT_PORT),
        }
    }
}
