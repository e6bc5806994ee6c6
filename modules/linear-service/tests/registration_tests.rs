#![allow(clippy::unwrap_used, clippy::expect_used)]

//! The module is discoverable through the link-time registry and serves
//! models end to end.

use linear_service::{MODULE_NAME, SERVICE_CLASS};
use servekit::registry::ModuleReference;
use servekit::{ModuleRegistry, Orchestrator, ServeConfig, StartupErrorKind};

fn write_model(dir: &std::path::Path, name: &str, body: &str) -> String {
    let path = dir.join(format!("{name}.json"));
    std::fs::write(&path, body).unwrap();
    format!("{name}={}", path.display())
}

#[test]
fn module_is_registered_via_inventory() {
    let mut registry = ModuleRegistry::from_inventory().unwrap();
    assert!(registry.available_modules().contains(&MODULE_NAME));

    let classes = registry
        .discover(&ModuleReference::new("modules/linear-service").unwrap())
        .unwrap();
    assert_eq!(classes.names(), vec![servekit::BASE_CONTRACT, SERVICE_CLASS]);
    assert_eq!(classes.concrete_class_name(), Some(SERVICE_CLASS));
    assert!(registry.registered_services().unwrap().get(SERVICE_CLASS).is_some());
}

#[tokio::test]
async fn serves_linear_models_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServeConfig {
        service: Some(MODULE_NAME.to_owned()),
        models: vec![
            write_model(dir.path(), "price", r#"{"weights": [1.5, 2.0], "bias": 3.0}"#),
            write_model(dir.path(), "score", r#"{"weights": [1.0], "bias": 0.0}"#),
        ],
        host: Some("127.0.0.1".to_owned()),
        port: Some(0),
        gen_api: None,
    };

    let handle = Orchestrator::initialize("linear-test", config)
        .unwrap()
        .start_serving()
        .await
        .unwrap();

    let price = handle.models().get("price").unwrap();
    assert_eq!(price.class, SERVICE_CLASS);
    let out = price
        .service
        .predict(serde_json::json!({ "inputs": [[2.0, 1.0]] }))
        .await
        .unwrap();
    assert_eq!(out, serde_json::json!({ "outputs": [8.0] }));

    let doc = serde_json::to_value(handle.endpoints().openapi()).unwrap();
    assert!(
        doc.pointer("/paths/~1models~1price~1predict/post/requestBody")
            .is_some()
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_model_file_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServeConfig {
        service: Some(MODULE_NAME.to_owned()),
        models: vec![write_model(dir.path(), "empty", r#"{"weights": []}"#)],
        port: Some(0),
        ..ServeConfig::default()
    };

    let err = Orchestrator::initialize("linear-test", config)
        .unwrap()
        .start_serving()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::ModelInit);
    assert!(err.to_string().contains("no weights"));
}
