use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(thiserror::Error, Debug)]
pub enum LinearModelError {
    #[error("cannot read model file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file '{}' is not a linear model: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model has no weights")]
    EmptyWeights,
    #[error("model parameters must be finite numbers")]
    NonFinite,
    #[error("input row {row} has {got} features, model expects {expected}")]
    Width {
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// Parameters of `y = w · x + b`, as stored in a model file:
/// `{"weights": [..], "bias": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

impl LinearModel {
    /// # Errors
    /// Returns [`LinearModelError`] if there are no weights or a parameter is not finite.
    pub fn new(weights: Vec<f64>, bias: f64) -> Result<Self, LinearModelError> {
        let model = Self { weights, bias };
        model.validate()?;
        Ok(model)
    }

    /// Read and validate a model file.
    ///
    /// # Errors
    /// Returns [`LinearModelError`] if the file is unreadable, malformed or invalid.
    pub fn load(path: &Path) -> Result<Self, LinearModelError> {
        let raw = std::fs::read(path).map_err(|source| LinearModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_slice(&raw).map_err(|source| LinearModelError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), LinearModelError> {
        if self.weights.is_empty() {
            return Err(LinearModelError::EmptyWeights);
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(LinearModelError::NonFinite);
        }
        Ok(())
    }

    #[must_use]
    pub fn features(&self) -> usize {
        self.weights.len()
    }

    /// Evaluate every row; fails on the first row of the wrong width.
    ///
    /// # Errors
    /// Returns [`LinearModelError::Width`] for a row whose length differs from the weights.
    pub fn evaluate(&self, inputs: &[Vec<f64>]) -> Result<Vec<f64>, LinearModelError> {
        inputs
            .iter()
            .enumerate()
            .map(|(row, x)| {
                if x.len() != self.weights.len() {
                    return Err(LinearModelError::Width {
                        row,
                        expected: self.weights.len(),
                        got: x.len(),
                    });
                }
                Ok(self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + self.bias)
            })
            .collect()
    }
}

/// Body of `POST /models/{name}/predict`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PredictRequest {
    /// One feature vector per row.
    pub inputs: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PredictResponse {
    /// One prediction per input row, in order.
    pub outputs: Vec<f64>,
}
