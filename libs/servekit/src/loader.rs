//! Model loading with a hard ceiling on concurrently served models.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::contracts::ModelService;
use crate::registry::ServiceClass;

/// Maximum number of models one host may serve.
pub const MAX_MODELS: usize = 5;

/// One model to load: `name=path`, or a bare `path` named after its file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub path: PathBuf,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ModelSpecError {
    #[error("empty model spec")]
    Empty,
    #[error("model spec '{spec}' has no usable name")]
    MissingName { spec: String },
    #[error("model name '{name}' may only contain ASCII letters, digits, '-', '_' and '.'")]
    InvalidName { name: String },
    #[error("model spec '{spec}' has an empty path")]
    MissingPath { spec: String },
}

impl ModelSpec {
    /// # Errors
    /// Returns [`ModelSpecError::InvalidName`] if `name` cannot be used in a URL path.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, ModelSpecError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            path: path.into(),
        })
    }
}

fn validate_name(name: &str) -> Result<(), ModelSpecError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ModelSpecError::InvalidName {
            name: name.to_owned(),
        })
    }
}

impl FromStr for ModelSpec {
    type Err = ModelSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelSpecError::Empty);
        }

        // `name=path` only when the left side is a usable name; otherwise the
        // whole argument is a path that may itself contain '='.
        let named = s.split_once('=').and_then(|(name, path)| {
            let name = name.trim();
            (name.is_empty() || validate_name(name).is_ok()).then_some((name, path.trim()))
        });

        let (name, path) = match named {
            Some((name, path)) => (name.to_owned(), path),
            None => {
                let stem = Path::new(s)
                    .file_stem()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| ModelSpecError::MissingName { spec: s.to_owned() })?;
                (stem.to_owned(), s)
            }
        };

        if name.is_empty() {
            return Err(ModelSpecError::MissingName { spec: s.to_owned() });
        }
        if path.is_empty() {
            return Err(ModelSpecError::MissingPath { spec: s.to_owned() });
        }
        Self::new(name, path)
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.path.display())
    }
}

/// Ordered list of model specs, as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSpecList(Vec<ModelSpec>);

impl ModelSpecList {
    #[must_use]
    pub fn new(specs: Vec<ModelSpec>) -> Self {
        Self(specs)
    }

    /// Parse each raw spec in order.
    ///
    /// # Errors
    /// Returns the first [`ModelSpecError`] encountered.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, ModelSpecError> {
        raw.iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelSpec> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ModelSpecList {
    type Item = &'a ModelSpec;
    type IntoIter = std::slice::Iter<'a, ModelSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An instantiated, initialized model.
#[derive(Clone)]
pub struct LoadedModel {
    pub spec: ModelSpec,
    pub class: &'static str,
    pub service: Arc<dyn ModelService>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("spec", &self.spec)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Loaded models keyed by model name.
#[derive(Debug, Clone, Default)]
pub struct LoadedModelSet {
    models: BTreeMap<String, LoadedModel>,
}

impl LoadedModelSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LoadedModel> {
        self.models.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.models.keys().map(String::as_str)
    }

    /// Models in name order.
    pub fn iter(&self) -> impl Iterator<Item = &LoadedModel> + '_ {
        self.models.values()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    #[error("model number exceeds system limit: {limit} (requested {requested})")]
    Capacity { requested: usize, limit: usize },
    #[error("model '{model}' is listed more than once")]
    DuplicateModel { model: String },
    #[error("failed to load model '{spec}' with class '{class}': {source}")]
    ModelInit {
        spec: ModelSpec,
        class: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Instantiates and initializes the configured models.
pub trait ModelLoader: Send + Sync {
    /// Load every spec with `class`, all or nothing.
    ///
    /// # Errors
    /// Returns [`LoaderError`] if the batch is over capacity or any model fails.
    fn load(&self, specs: &ModelSpecList, class: &ServiceClass)
    -> Result<LoadedModelSet, LoaderError>;
}

/// Loads at most [`MAX_MODELS`] models sequentially through the service
/// class factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultModelLoader;

impl ModelLoader for DefaultModelLoader {
    fn load(
        &self,
        specs: &ModelSpecList,
        class: &ServiceClass,
    ) -> Result<LoadedModelSet, LoaderError> {
        // Checked before any factory runs: a rejected batch touches no model files.
        if specs.len() > MAX_MODELS {
            return Err(LoaderError::Capacity {
                requested: specs.len(),
                limit: MAX_MODELS,
            });
        }

        let mut models = BTreeMap::new();
        for spec in specs {
            if models.contains_key(&spec.name) {
                return Err(LoaderError::DuplicateModel {
                    model: spec.name.clone(),
                });
            }

            let model_err = |source| LoaderError::ModelInit {
                spec: spec.clone(),
                class: class.name,
                source,
            };
            let service = (class.factory)(spec).map_err(model_err)?;
            service.warm_up().map_err(model_err)?;

            tracing::debug!(
                model = %spec.name,
                path = %spec.path.display(),
                class = class.name,
                "Model loaded"
            );
            models.insert(
                spec.name.clone(),
                LoadedModel {
                    spec: spec.clone(),
                    class: class.name,
                    service,
                },
            );
        }

        Ok(LoadedModelSet { models })
    }
}
