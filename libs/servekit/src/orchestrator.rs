//! Startup transaction: registry → loader → publisher → SDK → host.
//!
//! [`Orchestrator::start_serving`] runs every stage in a fixed order and
//! stops at the first failure. Nothing is bound until the final stage, so a
//! failed startup leaves no listener behind.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{EndpointDescriptorSet, EndpointPublisher, OpenApiPublisher};
use crate::config::{ConfigError, ServeConfig, ServerConfig};
use crate::error::StartupError;
use crate::host::{AxumHost, HostError, RunningHost, ServingHost};
use crate::loader::{DefaultModelLoader, LoadedModelSet, MAX_MODELS, ModelLoader, ModelSpecList};
use crate::registry::{ModuleReference, ModuleRegistry, ServiceClass};
use crate::sdk::{ClientSdkGenerator, OpenApiSdkGenerator};

/// Stage implementations used by the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub loader: Arc<dyn ModelLoader>,
    pub publisher: Arc<dyn EndpointPublisher>,
    pub sdk: Arc<dyn ClientSdkGenerator>,
    pub host: Arc<dyn ServingHost>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            loader: Arc::new(DefaultModelLoader),
            publisher: Arc::new(OpenApiPublisher::default()),
            sdk: Arc::new(OpenApiSdkGenerator),
            host: Arc::new(AxumHost::default()),
        }
    }
}

/// What `check` resolved without loading any model.
#[derive(Debug, Clone)]
pub struct ServiceSummary {
    pub module: String,
    pub class: &'static str,
    pub models: ModelSpecList,
    pub server: ServerConfig,
}

pub struct Orchestrator {
    app: String,
    config: ServeConfig,
    module: ModuleReference,
    models: ModelSpecList,
    registry: ModuleRegistry,
    collaborators: Collaborators,
}

impl Orchestrator {
    /// Build the registry from linked service modules and validate `config`.
    ///
    /// # Errors
    /// Returns [`StartupError::Initialization`] if the registry cannot be
    /// built or the configuration is incomplete.
    pub fn initialize(app: impl Into<String>, config: ServeConfig) -> Result<Self, StartupError> {
        let app = app.into();
        let registry = match ModuleRegistry::from_inventory() {
            Ok(registry) => registry,
            Err(e) => {
                let e = StartupError::Initialization(ConfigError::Registry(e));
                report_init_failure(&app, &e);
                return Err(e);
            }
        };
        Self::with_parts(app, config, registry, Collaborators::default())
    }

    /// Like [`Orchestrator::initialize`] with an explicit registry and
    /// collaborators.
    ///
    /// # Errors
    /// Returns [`StartupError::Initialization`] if the configuration is incomplete.
    pub fn with_parts(
        app: impl Into<String>,
        config: ServeConfig,
        registry: ModuleRegistry,
        collaborators: Collaborators,
    ) -> Result<Self, StartupError> {
        let app = app.into();
        let (module, models) = match config.validate() {
            Ok(parsed) => parsed,
            Err(e) => {
                let e = StartupError::Initialization(e);
                report_init_failure(&app, &e);
                return Err(e);
            }
        };

        tracing::info!(
            app = %app,
            module = %module,
            models = models.len(),
            "Initialized model serving."
        );

        Ok(Self {
            app,
            config,
            module,
            models,
            registry,
            collaborators,
        })
    }

    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    #[must_use]
    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    #[must_use]
    pub fn available_modules(&self) -> Vec<&'static str> {
        self.registry.available_modules()
    }

    /// Resolve the address and service class and check the model count,
    /// without loading or binding.
    ///
    /// # Errors
    /// Returns the registration, lookup or capacity [`StartupError`].
    pub fn check(mut self) -> Result<ServiceSummary, StartupError> {
        let server = self.resolve_server();
        let class = self.resolve_class().inspect_err(report_start_failure)?;
        if self.models.len() > MAX_MODELS {
            let e = StartupError::Capacity {
                requested: self.models.len(),
                limit: MAX_MODELS,
            };
            report_start_failure(&e);
            return Err(e);
        }
        Ok(ServiceSummary {
            module: self.module.name().to_owned(),
            class: class.name,
            models: self.models,
            server,
        })
    }

    /// Run the startup transaction and return the running host.
    ///
    /// # Errors
    /// Returns the [`StartupError`] of the first stage that failed; the error
    /// has already been logged.
    pub async fn start_serving(self) -> Result<ServingHandle, StartupError> {
        self.run().await.inspect_err(report_start_failure)
    }

    async fn run(mut self) -> Result<ServingHandle, StartupError> {
        // 1. address
        let server = self.resolve_server();

        // 2-3. registration and class lookup
        let class = self.resolve_class()?;

        // 4. models
        tracing::info!(
            stage = "loading",
            class = class.name,
            models = self.models.len(),
            "Loading models"
        );
        let models = self.collaborators.loader.load(&self.models, &class)?;

        // 5. endpoints
        let endpoints =
            self.collaborators
                .publisher
                .setup(&server.host, server.port, &models)?;
        tracing::info!(
            stage = "publishing",
            endpoints = endpoints.len(),
            base_url = %endpoints.base_url(),
            "Endpoints published"
        );

        // 6. optional client SDK
        if let Some(target) = &self.config.gen_api {
            tracing::info!(stage = "codegen", target = %target.display(), "Generating client SDK");
            self.collaborators.sdk.generate(&endpoints, target)?;
        }

        // 7. host
        let endpoints = Arc::new(endpoints);
        let models = Arc::new(models);
        let running = self
            .collaborators
            .host
            .start(
                &server.host,
                server.port,
                Arc::clone(&endpoints),
                Arc::clone(&models),
            )
            .await?;

        tracing::info!(
            "Host is started at {}:{}",
            server.host,
            running.local_addr().port()
        );

        Ok(ServingHandle {
            server,
            gen_api: self.config.gen_api,
            endpoints,
            models,
            running,
        })
    }

    fn resolve_server(&self) -> ServerConfig {
        ServerConfig::resolve(self.config.host.as_deref(), self.config.port)
    }

    fn resolve_class(&mut self) -> Result<ServiceClass, StartupError> {
        let classes = self.registry.discover(&self.module)?;
        if !classes.derives_contract() {
            return Err(StartupError::Registration {
                module: self.module.name().to_owned(),
                classes: classes.names(),
            });
        }

        let lookup_err = |class: &str| StartupError::Lookup {
            module: classes.module().to_owned(),
            class: class.to_owned(),
        };
        let name = classes
            .concrete_class_name()
            .ok_or_else(|| lookup_err("<none>"))?;
        let class = self
            .registry
            .registered_services()?
            .get(name)
            .ok_or_else(|| lookup_err(name))?;

        tracing::info!(
            stage = "registration",
            module = classes.module(),
            class = class.name,
            "Service class resolved"
        );
        Ok(class)
    }
}

fn report_init_failure(app: &str, e: &StartupError) {
    tracing::error!(app, stage = e.stage(), "Failed to initialize model serving: {e}");
}

fn report_start_failure(e: &StartupError) {
    tracing::error!(stage = e.stage(), "Failed to start model serving host: {e}");
}

/// Running host plus everything the startup transaction produced.
#[derive(Debug)]
pub struct ServingHandle {
    server: ServerConfig,
    gen_api: Option<PathBuf>,
    endpoints: Arc<EndpointDescriptorSet>,
    models: Arc<LoadedModelSet>,
    running: RunningHost,
}

impl ServingHandle {
    /// Configured address (port may be 0; see [`ServingHandle::local_addr`]).
    #[must_use]
    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.running.local_addr()
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.running.local_addr())
    }

    #[must_use]
    pub fn gen_api(&self) -> Option<&PathBuf> {
        self.gen_api.as_ref()
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointDescriptorSet {
        &self.endpoints
    }

    #[must_use]
    pub fn models(&self) -> &LoadedModelSet {
        &self.models
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.running.cancellation_token()
    }

    /// # Errors
    /// Returns [`HostError`] if the server terminated with an error.
    pub async fn shutdown(self) -> Result<(), HostError> {
        self.running.shutdown().await
    }

    /// # Errors
    /// Returns [`HostError`] if the server terminated with an error.
    pub async fn wait(self) -> Result<(), HostError> {
        self.running.wait().await
    }
}
