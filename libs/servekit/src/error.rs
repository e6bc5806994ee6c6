//! Startup error taxonomy.
//!
//! Every component error is converted exactly once into a [`StartupError`]
//! at the orchestrator boundary. Callers assert on [`StartupError::kind`] and
//! log with [`StartupError::stage`] as prefix.

use crate::api::PublishError;
use crate::config::ConfigError;
use crate::host::HostError;
use crate::loader::LoaderError;
use crate::registry::RegistryError;
use crate::sdk::CodegenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupErrorKind {
    Initialization,
    ModuleLoad,
    Registration,
    Lookup,
    Capacity,
    ModelInit,
    Bind,
    Codegen,
    HostStart,
}

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("invalid serving configuration: {0}")]
    Initialization(#[from] ConfigError),

    #[error("cannot load service module: {0}")]
    ModuleLoad(#[source] RegistryError),

    #[error(
        "user-defined module '{module}' must derive base contract (classes: {})",
        .classes.join(", ")
    )]
    Registration {
        module: String,
        classes: Vec<&'static str>,
    },

    #[error("service class '{class}' of module '{module}' is not registered")]
    Lookup { module: String, class: String },

    #[error("model number exceeds system limit: {limit} (requested {requested})")]
    Capacity { requested: usize, limit: usize },

    #[error(transparent)]
    ModelInit(LoaderError),

    #[error("cannot publish endpoints: {0}")]
    Bind(#[from] PublishError),

    #[error("client SDK generation failed: {0}")]
    Codegen(#[from] CodegenError),

    #[error("cannot start serving host: {0}")]
    HostStart(#[from] HostError),
}

impl From<LoaderError> for StartupError {
    fn from(e: LoaderError) -> Self {
        match e {
            LoaderError::Capacity { requested, limit } => Self::Capacity { requested, limit },
            other => Self::ModelInit(other),
        }
    }
}

impl StartupError {
    #[must_use]
    pub fn kind(&self) -> StartupErrorKind {
        match self {
            Self::Initialization(_) => StartupErrorKind::Initialization,
            Self::ModuleLoad(_) => StartupErrorKind::ModuleLoad,
            Self::Registration { .. } => StartupErrorKind::Registration,
            Self::Lookup { .. } => StartupErrorKind::Lookup,
            Self::Capacity { .. } => StartupErrorKind::Capacity,
            Self::ModelInit(_) => StartupErrorKind::ModelInit,
            Self::Bind(_) => StartupErrorKind::Bind,
            Self::Codegen(_) => StartupErrorKind::Codegen,
            Self::HostStart(_) => StartupErrorKind::HostStart,
        }
    }

    /// Stage that failed, used as the log prefix.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self.kind() {
            StartupErrorKind::Initialization => "initialization",
            StartupErrorKind::ModuleLoad | StartupErrorKind::Registration => "registration",
            StartupErrorKind::Lookup => "lookup",
            StartupErrorKind::Capacity | StartupErrorKind::ModelInit => "loading",
            StartupErrorKind::Bind => "publishing",
            StartupErrorKind::Codegen => "codegen",
            StartupErrorKind::HostStart => "host_start",
        }
    }
}

impl From<RegistryError> for StartupError {
    fn from(e: RegistryError) -> Self {
        Self::ModuleLoad(e)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn capacity_loader_error_keeps_its_kind() {
        let e: StartupError = LoaderError::Capacity {
            requested: 6,
            limit: 5,
        }
        .into();
        assert_eq!(e.kind(), StartupErrorKind::Capacity);
        assert_eq!(e.stage(), "loading");
        assert!(e.to_string().starts_with("model number exceeds system limit: 5"));
    }

    #[test]
    fn duplicate_model_is_a_model_init_error() {
        let e: StartupError = LoaderError::DuplicateModel {
            model: "m".to_owned(),
        }
        .into();
        assert_eq!(e.kind(), StartupErrorKind::ModelInit);
    }

    #[test]
    fn registration_message_names_the_base_contract() {
        let e = StartupError::Registration {
            module: "svc".to_owned(),
            classes: vec!["ModelService"],
        };
        assert!(e.to_string().contains("must derive base contract"));
        assert_eq!(e.stage(), "registration");
    }
}
