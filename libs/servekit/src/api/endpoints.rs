use std::collections::BTreeMap;
use std::fmt;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use http::Method;
use serde::Serialize;
use utoipa::openapi::schema::Schema;
use utoipa::openapi::{OpenApi, RefOr};

use super::openapi::{OpenApiInfo, build_openapi};
use crate::loader::{LoadedModel, LoadedModelSet};

/// How one loaded model is reachable.
#[derive(Clone, Serialize)]
pub struct EndpointDescriptor {
    pub model: String,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub path: String,
    pub operation_id: String,
    pub summary: String,
    pub content_type: &'static str,
    pub request_schema: RefOr<Schema>,
    pub response_schema: RefOr<Schema>,
}

fn serialize_method<S: serde::Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

/// Path of the predict endpoint of `model`.
#[must_use]
pub fn predict_path(model: &str) -> String {
    format!("/models/{model}/predict")
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("model", &self.model)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("operation_id", &self.operation_id)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl EndpointDescriptor {
    fn for_model(model: &LoadedModel) -> Self {
        let name = &model.spec.name;
        let signature = model.service.signature();
        Self {
            model: name.clone(),
            method: Method::POST,
            path: predict_path(name),
            operation_id: format!("predict_{}", name.replace(['-', '.'], "_")),
            summary: format!("Run inference with model '{name}'"),
            content_type: signature.content_type,
            request_schema: signature.request_schema,
            response_schema: signature.response_schema,
        }
    }
}

/// Published endpoints of a host: one descriptor per model plus the OpenAPI
/// document describing all of them.
#[derive(Clone)]
pub struct EndpointDescriptorSet {
    host: String,
    port: u16,
    descriptors: BTreeMap<String, EndpointDescriptor>,
    openapi: OpenApi,
}

impl fmt::Debug for EndpointDescriptorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptorSet")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

impl EndpointDescriptorSet {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    #[must_use]
    pub fn get(&self, model: &str) -> Option<&EndpointDescriptor> {
        self.descriptors.get(model)
    }

    /// Descriptors in model-name order.
    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescriptor> + '_ {
        self.descriptors.values()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.iter().map(|d| d.path.as_str()).collect()
    }

    #[must_use]
    pub fn openapi(&self) -> &OpenApi {
        &self.openapi
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("invalid bind address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },
    #[error("address {addr} is already in use: {source}")]
    AddressInUse {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("models '{first}' and '{second}' map to the same operation id '{operation_id}'")]
    OperationConflict {
        operation_id: String,
        first: String,
        second: String,
    },
}

/// Derives endpoint descriptors for the loaded models and validates the
/// host/port binding.
pub trait EndpointPublisher: Send + Sync {
    /// # Errors
    /// Returns [`PublishError`] if the binding is invalid or unavailable.
    fn setup(
        &self,
        host: &str,
        port: u16,
        models: &LoadedModelSet,
    ) -> Result<EndpointDescriptorSet, PublishError>;
}

/// Publishes one `POST /models/{name}/predict` operation per model.
#[derive(Debug, Clone)]
pub struct OpenApiPublisher {
    info: OpenApiInfo,
    probe_bind: bool,
}

impl Default for OpenApiPublisher {
    fn default() -> Self {
        Self {
            info: OpenApiInfo::default(),
            probe_bind: true,
        }
    }
}

impl OpenApiPublisher {
    #[must_use]
    pub fn new(info: OpenApiInfo) -> Self {
        Self {
            info,
            ..Self::default()
        }
    }

    /// Skip the availability probe (the host still fails on bind).
    #[must_use]
    pub fn without_bind_probe(mut self) -> Self {
        self.probe_bind = false;
        self
    }

    fn resolve(host: &str, port: u16) -> Result<SocketAddr, PublishError> {
        let invalid = |reason: String| PublishError::InvalidAddress {
            addr: format!("{host}:{port}"),
            reason,
        };
        if host.trim().is_empty() {
            return Err(invalid("empty host".to_owned()));
        }
        (host, port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host resolved to no addresses".to_owned()))
    }
}

impl EndpointPublisher for OpenApiPublisher {
    fn setup(
        &self,
        host: &str,
        port: u16,
        models: &LoadedModelSet,
    ) -> Result<EndpointDescriptorSet, PublishError> {
        let addr = Self::resolve(host, port)?;

        if self.probe_bind {
            // Released immediately; the serving host binds for real.
            let listener = TcpListener::bind(addr)
                .map_err(|source| PublishError::AddressInUse { addr, source })?;
            drop(listener);
        }

        let mut operations: BTreeMap<String, String> = BTreeMap::new();
        let mut descriptors = BTreeMap::new();
        for model in models.iter() {
            let descriptor = EndpointDescriptor::for_model(model);
            if let Some(first) = operations.insert(
                descriptor.operation_id.clone(),
                descriptor.model.clone(),
            ) {
                return Err(PublishError::OperationConflict {
                    operation_id: descriptor.operation_id,
                    first,
                    second: descriptor.model,
                });
            }
            descriptors.insert(descriptor.model.clone(), descriptor);
        }
        let openapi = build_openapi(&self.info, descriptors.values());

        tracing::info!(
            %addr,
            endpoints = descriptors.len(),
            "OpenAPI endpoints set up"
        );

        Ok(EndpointDescriptorSet {
            host: host.to_owned(),
            port,
            descriptors,
            openapi,
        })
    }
}
