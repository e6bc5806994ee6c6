#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Built-in `linear_service` module.
//!
//! Serves linear models read from JSON files of the form
//! `{"weights": [..], "bias": ..}`.

use std::sync::Arc;

use async_trait::async_trait;
use servekit::registry::{ClassDefinition, ServiceModuleRegistrator};
use servekit::{ModelService, ModelSignature, ModelSpec};
use utoipa::PartialSchema;

mod model;

pub use model::{LinearModel, LinearModelError, PredictRequest, PredictResponse};

pub const MODULE_NAME: &str = "linear_service";
pub const SERVICE_CLASS: &str = "LinearModelService";

pub struct LinearModelService {
    name: String,
    model: LinearModel,
}

impl LinearModelService {
    #[must_use]
    pub fn new(name: impl Into<String>, model: LinearModel) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }

    /// Service factory registered for [`SERVICE_CLASS`].
    ///
    /// # Errors
    /// Returns an error if the model file cannot be loaded.
    pub fn factory(spec: &ModelSpec) -> anyhow::Result<Arc<dyn ModelService>> {
        let model = LinearModel::load(&spec.path)?;
        tracing::debug!(
            model = %spec.name,
            features = model.features(),
            "Linear model read"
        );
        Ok(Arc::new(Self::new(spec.name.clone(), model)))
    }

    #[must_use]
    pub fn model(&self) -> &LinearModel {
        &self.model
    }
}

#[async_trait]
impl ModelService for LinearModelService {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> ModelSignature {
        ModelSignature {
            request_schema: PredictRequest::schema(),
            response_schema: PredictResponse::schema(),
            ..ModelSignature::default()
        }
    }

    fn warm_up(&self) -> anyhow::Result<()> {
        let zeros = vec![0.0; self.model.features()];
        self.model.evaluate(&[zeros])?;
        Ok(())
    }

    async fn predict(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let request: PredictRequest = serde_json::from_value(input)?;
        let outputs = self.model.evaluate(&request.inputs)?;
        Ok(serde_json::to_value(PredictResponse { outputs })?)
    }
}

fn classes() -> Vec<ClassDefinition> {
    vec![ClassDefinition::service(
        SERVICE_CLASS,
        LinearModelService::factory,
    )]
}

inventory::submit! {
    ServiceModuleRegistrator {
        name: MODULE_NAME,
        service_class: Some(SERVICE_CLASS),
        classes,
    }
}
