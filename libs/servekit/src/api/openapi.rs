//! OpenAPI document generation for published endpoints.
//!
//! Model endpoints are converted to OpenAPI paths and operations, and the
//! host-level `/ping` and `/api-description` routes are documented alongside
//! them. The result is a standard `utoipa` OpenAPI 3 document.

use http::Method;
use utoipa::openapi::{
    content::ContentBuilder,
    info::InfoBuilder,
    path::{HttpMethod, OperationBuilder, PathItemBuilder, PathsBuilder},
    request_body::RequestBodyBuilder,
    response::{ResponseBuilder, ResponsesBuilder},
    schema::{ComponentsBuilder, ObjectBuilder, Schema, SchemaType, Type},
    OpenApi, OpenApiBuilder, Ref, RefOr, Required,
};

use super::endpoints::EndpointDescriptor;
use super::problem::{APPLICATION_PROBLEM_JSON, Problem};

pub const PING_PATH: &str = "/ping";
pub const API_DESCRIPTION_PATH: &str = "/api-description";
pub const OPENAPI_JSON_PATH: &str = "/openapi.json";

/// OpenAPI document metadata (title, version, description)
#[derive(Debug, Clone)]
pub struct OpenApiInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

impl Default for OpenApiInfo {
    fn default() -> Self {
        Self {
            title: "Model Server API".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            description: Some("Inference endpoints of the loaded models".to_owned()),
        }
    }
}

fn http_method(method: &Method) -> HttpMethod {
    match *method {
        Method::GET => HttpMethod::Get,
        Method::PUT => HttpMethod::Put,
        Method::DELETE => HttpMethod::Delete,
        Method::PATCH => HttpMethod::Patch,
        _ => HttpMethod::Post,
    }
}

fn string_schema() -> Schema {
    Schema::Object(
        ObjectBuilder::new()
            .schema_type(SchemaType::Type(Type::String))
            .build(),
    )
}

fn ping_schema() -> Schema {
    Schema::Object(
        ObjectBuilder::new()
            .property("health", string_schema())
            .property(
                "models",
                Schema::Object(
                    ObjectBuilder::new()
                        .description(Some("Health of each loaded model, by name"))
                        .build(),
                ),
            )
            .required("health")
            .build(),
    )
}

fn problem_response(description: &str) -> utoipa::openapi::Response {
    let content = ContentBuilder::new()
        .schema(Some(RefOr::Ref(Ref::from_schema_name("Problem"))))
        .build();
    ResponseBuilder::new()
        .description(description)
        .content(APPLICATION_PROBLEM_JSON, content)
        .build()
}

fn json_response(description: &str, schema: RefOr<Schema>) -> utoipa::openapi::Response {
    let content = ContentBuilder::new().schema(Some(schema)).build();
    ResponseBuilder::new()
        .description(description)
        .content("application/json", content)
        .build()
}

fn model_operation(d: &EndpointDescriptor) -> utoipa::openapi::path::Operation {
    let body = RequestBodyBuilder::new()
        .description(Some(format!("Inference request for model '{}'", d.model)))
        .content(
            d.content_type,
            ContentBuilder::new()
                .schema(Some(d.request_schema.clone()))
                .build(),
        )
        .required(Some(Required::True))
        .build();

    let responses = ResponsesBuilder::new()
        .response(
            "200",
            json_response("Inference result", d.response_schema.clone()),
        )
        .response("404", problem_response("Model not loaded"))
        .response("500", problem_response("Inference failed"))
        .build();

    OperationBuilder::new()
        .operation_id(Some(d.operation_id.clone()))
        .summary(Some(d.summary.clone()))
        .tag("models")
        .request_body(Some(body))
        .responses(responses)
        .build()
}

fn host_operation(
    operation_id: &str,
    summary: &str,
    schema: RefOr<Schema>,
) -> utoipa::openapi::path::Operation {
    OperationBuilder::new()
        .operation_id(Some(operation_id))
        .summary(Some(summary))
        .tag("host")
        .responses(
            ResponsesBuilder::new()
                .response("200", json_response(summary, schema))
                .build(),
        )
        .build()
}

/// Build the OpenAPI document for a set of model endpoints.
pub fn build_openapi<'a>(
    info: &OpenApiInfo,
    descriptors: impl IntoIterator<Item = &'a EndpointDescriptor>,
) -> OpenApi {
    let mut paths = PathsBuilder::new();
    let mut count = 0usize;

    for d in descriptors {
        let item = PathItemBuilder::new()
            .operation(http_method(&d.method), model_operation(d))
            .build();
        paths = paths.path(d.path.clone(), item);
        count += 1;
    }

    paths = paths
        .path(
            PING_PATH,
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    host_operation("ping", "Health of the host and its models", ping_schema().into()),
                )
                .build(),
        )
        .path(
            API_DESCRIPTION_PATH,
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    host_operation(
                        "api_description",
                        "OpenAPI description of this host",
                        Schema::Object(ObjectBuilder::new().build()).into(),
                    ),
                )
                .build(),
        );

    tracing::debug!(model_operations = count, "Built OpenAPI document");

    let components = ComponentsBuilder::new()
        .schema_from::<Problem>()
        .build();

    let openapi_info = InfoBuilder::new()
        .title(&info.title)
        .version(&info.version)
        .description(info.description.clone())
        .build();

    OpenApiBuilder::new()
        .info(openapi_info)
        .paths(paths.build())
        .components(Some(components))
        .build()
}
