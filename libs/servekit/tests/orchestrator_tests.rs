#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Startup transaction tests.
//!
//! Every collaborator is wrapped in a tracker that records its calls, so the
//! tests can assert on stage order and on which stages never ran.

use std::cell::Cell;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use servekit::api::{
    EndpointDescriptorSet, EndpointPublisher, OpenApiPublisher, PublishError,
};
use servekit::host::{HostError, RunningHost, ServingHost};
use servekit::loader::{
    DefaultModelLoader, LoadedModelSet, LoaderError, ModelLoader, ModelSpec, ModelSpecList,
};
use servekit::registry::ServiceClass;
use servekit::sdk::{ClientSdkGenerator, CodegenError, GeneratedSdk, OpenApiSdkGenerator};
use servekit::{
    ClassDefinition, Collaborators, ModelService, ModuleRegistry, Orchestrator, ServeConfig,
    ServiceModuleRegistrator, StartupErrorKind,
};

type CallTracker = Arc<Mutex<Vec<String>>>;

thread_local! {
    static BUILT: Cell<usize> = const { Cell::new(0) };
}

fn built() -> usize {
    BUILT.with(Cell::get)
}

struct Echo(String);

#[async_trait]
impl ModelService for Echo {
    fn model_name(&self) -> &str {
        &self.0
    }

    async fn predict(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        Ok(input)
    }
}

fn counting_factory(spec: &ModelSpec) -> anyhow::Result<Arc<dyn ModelService>> {
    BUILT.with(|b| b.set(b.get() + 1));
    if spec.name == "broken" {
        anyhow::bail!("cannot read {}", spec.path.display());
    }
    Ok(Arc::new(Echo(spec.name.clone())))
}

fn mymodel_classes() -> Vec<ClassDefinition> {
    vec![ClassDefinition::service("MyModel", counting_factory)]
}

fn registry() -> ModuleRegistry {
    ModuleRegistry::with_modules(vec![
        ServiceModuleRegistrator {
            name: "mymodel",
            service_class: None,
            classes: mymodel_classes,
        },
        ServiceModuleRegistrator {
            name: "bare",
            service_class: None,
            classes: Vec::new,
        },
        ServiceModuleRegistrator {
            name: "ghost",
            service_class: Some("Missing"),
            classes: mymodel_classes,
        },
    ])
    .unwrap()
}

struct TrackingLoader(CallTracker);

impl ModelLoader for TrackingLoader {
    fn load(
        &self,
        specs: &ModelSpecList,
        class: &ServiceClass,
    ) -> Result<LoadedModelSet, LoaderError> {
        self.0.lock().unwrap().push(format!("load {}", specs.len()));
        DefaultModelLoader.load(specs, class)
    }
}

struct TrackingPublisher {
    calls: CallTracker,
    inner: OpenApiPublisher,
}

impl EndpointPublisher for TrackingPublisher {
    fn setup(
        &self,
        host: &str,
        port: u16,
        models: &LoadedModelSet,
    ) -> Result<EndpointDescriptorSet, PublishError> {
        self.calls.lock().unwrap().push(format!("setup {host}:{port}"));
        self.inner.setup(host, port, models)
    }
}

struct TrackingSdk {
    calls: CallTracker,
    inner: Option<OpenApiSdkGenerator>,
}

impl ClientSdkGenerator for TrackingSdk {
    fn generate(
        &self,
        endpoints: &EndpointDescriptorSet,
        target: &Path,
    ) -> Result<GeneratedSdk, CodegenError> {
        self.calls.lock().unwrap().push(format!(
            "generate {} {}",
            target.display(),
            endpoints.len()
        ));
        match &self.inner {
            Some(inner) => inner.generate(endpoints, target),
            None => Ok(GeneratedSdk {
                dir: target.to_path_buf(),
                files: Vec::new(),
            }),
        }
    }
}

struct TrackingHost(CallTracker);

#[async_trait]
impl ServingHost for TrackingHost {
    async fn start(
        &self,
        host: &str,
        port: u16,
        endpoints: Arc<EndpointDescriptorSet>,
        _models: Arc<LoadedModelSet>,
    ) -> Result<RunningHost, HostError> {
        self.0.lock().unwrap().push(format!(
            "start {host}:{port} {}",
            endpoints.paths().join(",")
        ));
        let addr: SocketAddr = format!("{host}:{port}").parse().unwrap();
        let join = tokio::spawn(async { Ok(()) });
        Ok(RunningHost::new(addr, CancellationToken::new(), join))
    }
}

fn tracking(calls: &CallTracker) -> Collaborators {
    Collaborators {
        loader: Arc::new(TrackingLoader(calls.clone())),
        publisher: Arc::new(TrackingPublisher {
            calls: calls.clone(),
            inner: OpenApiPublisher::default().without_bind_probe(),
        }),
        sdk: Arc::new(TrackingSdk {
            calls: calls.clone(),
            inner: None,
        }),
        host: Arc::new(TrackingHost(calls.clone())),
    }
}

fn config(service: &str, models: &[&str]) -> ServeConfig {
    ServeConfig {
        service: Some(service.to_owned()),
        models: models.iter().map(|m| (*m).to_owned()).collect(),
        ..ServeConfig::default()
    }
}

fn orchestrator(config: ServeConfig, collaborators: Collaborators) -> Orchestrator {
    Orchestrator::with_parts("test-app", config, registry(), collaborators).unwrap()
}

fn calls(tracker: &CallTracker) -> Vec<String> {
    tracker.lock().unwrap().clone()
}

#[tokio::test]
async fn single_model_starts_on_default_address() {
    let tracker = CallTracker::default();
    let handle = orchestrator(config("mymodel", &["m1.params"]), tracking(&tracker))
        .start_serving()
        .await
        .unwrap();

    assert_eq!(handle.models().len(), 1);
    assert_eq!(handle.endpoints().len(), 1);
    assert_eq!(handle.server().host, "127.0.0.1");
    assert_eq!(handle.server().port, 8080);
    assert_eq!(
        calls(&tracker),
        vec![
            "load 1",
            "setup 127.0.0.1:8080",
            "start 127.0.0.1:8080 /models/m1/predict",
        ]
    );
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn configured_address_is_used() {
    let tracker = CallTracker::default();
    let mut cfg = config("mymodel", &["a=a.params", "b=b.params"]);
    cfg.host = Some("0.0.0.0".to_owned());
    cfg.port = Some(9000);

    let handle = orchestrator(cfg, tracking(&tracker))
        .start_serving()
        .await
        .unwrap();
    assert_eq!(handle.local_addr().port(), 9000);
    assert!(calls(&tracker).contains(&"setup 0.0.0.0:9000".to_owned()));
}

#[tokio::test]
async fn more_than_five_models_fail_before_any_instantiation() {
    let tracker = CallTracker::default();
    let err = orchestrator(
        config("mymodel", &["a", "b", "c", "d", "e", "f"]),
        tracking(&tracker),
    )
    .start_serving()
    .await
    .unwrap_err();

    assert_eq!(err.kind(), StartupErrorKind::Capacity);
    assert!(err.to_string().contains("model number exceeds system limit: 5"));
    assert_eq!(built(), 0);
    assert_eq!(calls(&tracker), vec!["load 6"]);
}

#[tokio::test]
async fn five_models_are_accepted() {
    let tracker = CallTracker::default();
    let handle = orchestrator(
        config("mymodel", &["a", "b", "c", "d", "e"]),
        tracking(&tracker),
    )
    .start_serving()
    .await
    .unwrap();
    assert_eq!(handle.models().len(), 5);
    assert_eq!(handle.endpoints().len(), 5);
    assert_eq!(built(), 5);
}

#[tokio::test]
async fn module_without_concrete_class_is_a_registration_error() {
    let tracker = CallTracker::default();
    let err = orchestrator(config("bare", &["m1.params"]), tracking(&tracker))
        .start_serving()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), StartupErrorKind::Registration);
    assert!(err.to_string().contains("must derive base contract"));
    assert!(calls(&tracker).is_empty());
}

#[tokio::test]
async fn unregistered_service_class_is_a_lookup_error() {
    let tracker = CallTracker::default();
    let err = orchestrator(config("ghost", &["m1.params"]), tracking(&tracker))
        .start_serving()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), StartupErrorKind::Lookup);
    assert!(err.to_string().contains("Missing"));
    assert!(calls(&tracker).is_empty());
}

#[tokio::test]
async fn unknown_module_fails_to_load() {
    let tracker = CallTracker::default();
    let err = orchestrator(config("modules/nope.rs", &["m1"]), tracking(&tracker))
        .start_serving()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::ModuleLoad);
    assert!(err.to_string().contains("mymodel"));
}

#[tokio::test]
async fn failing_model_aborts_the_batch() {
    let tracker = CallTracker::default();
    let err = orchestrator(
        config("mymodel", &["ok=ok.params", "broken=broken.params"]),
        tracking(&tracker),
    )
    .start_serving()
    .await
    .unwrap_err();

    assert_eq!(err.kind(), StartupErrorKind::ModelInit);
    assert!(err.to_string().contains("broken"));
    assert_eq!(calls(&tracker), vec!["load 2"]);
}

#[tokio::test]
async fn sdk_is_generated_once_before_host_start() {
    let tracker = CallTracker::default();
    let mut cfg = config("mymodel", &["m1.params"]);
    cfg.gen_api = Some(PathBuf::from("/out/sdk"));

    orchestrator(cfg, tracking(&tracker))
        .start_serving()
        .await
        .unwrap();

    assert_eq!(
        calls(&tracker),
        vec![
            "load 1",
            "setup 127.0.0.1:8080",
            "generate /out/sdk 1",
            "start 127.0.0.1:8080 /models/m1/predict",
        ]
    );
}

#[tokio::test]
async fn sdk_failure_aborts_startup() {
    let tracker = CallTracker::default();
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();

    let mut collaborators = tracking(&tracker);
    collaborators.sdk = Arc::new(TrackingSdk {
        calls: tracker.clone(),
        inner: Some(OpenApiSdkGenerator),
    });
    let mut cfg = config("mymodel", &["m1.params"]);
    cfg.gen_api = Some(blocker.join("sdk"));

    let err = orchestrator(cfg, collaborators)
        .start_serving()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::Codegen);
    assert!(!calls(&tracker).iter().any(|c| c.starts_with("start")));
}

#[tokio::test]
async fn occupied_port_is_a_bind_error_and_no_host_starts() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let tracker = CallTracker::default();
    let mut collaborators = tracking(&tracker);
    collaborators.publisher = Arc::new(TrackingPublisher {
        calls: tracker.clone(),
        inner: OpenApiPublisher::default(),
    });
    let mut cfg = config("mymodel", &["m1.params"]);
    cfg.port = Some(port);

    let err = orchestrator(cfg, collaborators)
        .start_serving()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::Bind);
    assert!(!calls(&tracker).iter().any(|c| c.starts_with("start")));
}

#[tokio::test]
async fn repeated_startups_publish_identical_paths() {
    let mut seen = Vec::new();
    for _ in 0..2 {
        let tracker = CallTracker::default();
        let handle = orchestrator(
            config("mymodel", &["z=z", "a=a", "m=m"]),
            tracking(&tracker),
        )
        .start_serving()
        .await
        .unwrap();
        seen.push(
            handle
                .endpoints()
                .paths()
                .iter()
                .map(|p| (*p).to_owned())
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(seen[0], seen[1]);
    assert_eq!(
        seen[0],
        vec!["/models/a/predict", "/models/m/predict", "/models/z/predict"]
    );
}

#[test]
fn incomplete_config_is_an_initialization_error() {
    let tracker = CallTracker::default();
    let missing_models = Orchestrator::with_parts(
        "test-app",
        config("mymodel", &[]),
        registry(),
        tracking(&tracker),
    );
    assert_eq!(
        missing_models.err().map(|e| e.kind()),
        Some(StartupErrorKind::Initialization)
    );

    let missing_service = Orchestrator::with_parts(
        "test-app",
        ServeConfig {
            models: vec!["m1".to_owned()],
            ..ServeConfig::default()
        },
        registry(),
        tracking(&tracker),
    );
    assert_eq!(
        missing_service.err().map(|e| e.kind()),
        Some(StartupErrorKind::Initialization)
    );
}

#[tokio::test]
#[traced_test]
async fn startup_logs_initialization_and_host_address() {
    let tracker = CallTracker::default();
    let mut cfg = config("mymodel", &["m1.params"]);
    cfg.port = Some(9100);
    let handle = orchestrator(cfg, tracking(&tracker))
        .start_serving()
        .await
        .unwrap();

    assert!(logs_contain("Initialized model serving."));
    assert!(logs_contain("Host is started at 127.0.0.1:9100"));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn failed_startup_logs_the_stage() {
    let tracker = CallTracker::default();
    let err = orchestrator(config("bare", &["m1.params"]), tracking(&tracker))
        .start_serving()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "registration");
    assert!(logs_contain("Failed to start model serving host"));
    assert!(!logs_contain("Host is started"));
}

#[test]
fn check_rejects_more_than_five_models() {
    let tracker = CallTracker::default();
    let err = orchestrator(
        config("mymodel", &["a", "b", "c", "d", "e", "f"]),
        tracking(&tracker),
    )
    .check()
    .unwrap_err();
    assert_eq!(err.kind(), StartupErrorKind::Capacity);
    assert!(err.to_string().contains("model number exceeds system limit: 5"));
    assert!(calls(&tracker).is_empty());
    assert_eq!(built(), 0);
}

#[test]
fn check_resolves_without_loading() {
    let tracker = CallTracker::default();
    let summary = orchestrator(config("mymodel", &["m1", "m2"]), tracking(&tracker))
        .check()
        .unwrap();
    assert_eq!(summary.module, "mymodel");
    assert_eq!(summary.class, "MyModel");
    assert_eq!(summary.models.len(), 2);
    assert_eq!(summary.server.port, 8080);
    assert!(calls(&tracker).is_empty());
    assert_eq!(built(), 0);
}
