//! Endpoint publishing: descriptors, OpenAPI generation and Problem responses.

pub mod endpoints;
pub mod openapi;
pub mod problem;

pub use endpoints::{
    EndpointDescriptor, EndpointDescriptorSet, EndpointPublisher, OpenApiPublisher, PublishError,
    predict_path,
};
pub use openapi::{API_DESCRIPTION_PATH, OPENAPI_JSON_PATH, OpenApiInfo, PING_PATH, build_openapi};
pub use problem::{APPLICATION_PROBLEM_JSON, Problem};
