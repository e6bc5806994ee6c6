//! The base contract every model-service class fulfils.
//!
//! A "class" in this crate is a [`ServiceFactory`]: a function that builds one
//! model instance from its [`ModelSpec`]. Conformance with [`ModelService`] is
//! checked by the compiler, so the registry never has to inspect capabilities
//! at runtime.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use utoipa::openapi::schema::{ObjectBuilder, Schema};
use utoipa::openapi::RefOr;

use crate::loader::ModelSpec;

/// Name of the base contract class. Always the first entry of a discovered
/// class list.
pub const BASE_CONTRACT: &str = "ModelService";

/// Builds and returns a model instance for one spec.
pub type ServiceFactory = fn(&ModelSpec) -> anyhow::Result<Arc<dyn ModelService>>;

/// Health reported by a model through the `ping` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Request/response description of a model, used to derive its endpoint.
#[derive(Clone)]
pub struct ModelSignature {
    pub request_schema: RefOr<Schema>,
    pub response_schema: RefOr<Schema>,
    pub content_type: &'static str,
}

impl fmt::Debug for ModelSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSignature")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl Default for ModelSignature {
    fn default() -> Self {
        Self {
            request_schema: RefOr::T(Schema::Object(ObjectBuilder::new().build())),
            response_schema: RefOr::T(Schema::Object(ObjectBuilder::new().build())),
            content_type: "application/json",
        }
    }
}

/// Base model-service contract.
///
/// Instances are created by the loader through a [`ServiceFactory`], then
/// `warm_up` is called once before the model is considered loaded.
#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    /// Identifier of the model this instance serves.
    fn model_name(&self) -> &str;

    fn signature(&self) -> ModelSignature {
        ModelSignature::default()
    }

    /// One-time initialization after construction.
    ///
    /// # Errors
    /// Returns an error if the model cannot be made ready for inference.
    fn warm_up(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn ping(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    /// Run inference on one JSON request.
    ///
    /// # Errors
    /// Returns an error if the input is not acceptable for the model or inference fails.
    async fn predict(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}
