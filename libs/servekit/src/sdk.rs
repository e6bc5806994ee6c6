//! Client SDK emission from published endpoints.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::api::EndpointDescriptorSet;

pub const OPENAPI_FILE: &str = "openapi.json";
pub const CLIENT_FILE: &str = "client.rs";

#[derive(thiserror::Error, Debug)]
pub enum CodegenError {
    #[error("failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize OpenAPI document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to render client bindings: {0}")]
    Render(#[from] std::fmt::Error),
}

/// Files written by a generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSdk {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

pub trait ClientSdkGenerator: Send + Sync {
    /// Write client bindings for `endpoints` into `target`.
    ///
    /// # Errors
    /// Returns [`CodegenError`] if the bindings cannot be rendered or written.
    fn generate(
        &self,
        endpoints: &EndpointDescriptorSet,
        target: &Path,
    ) -> Result<GeneratedSdk, CodegenError>;
}

/// Emits the OpenAPI document and a small `reqwest` client with one method per model.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApiSdkGenerator;

impl OpenApiSdkGenerator {
    fn render_client(endpoints: &EndpointDescriptorSet) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        writeln!(out, "//! Generated client for {}.", endpoints.base_url())?;
        writeln!(out, "//! Regenerate with `model-server --gen-api <dir>`.")?;
        writeln!(out)?;
        writeln!(out, "use serde_json::Value;")?;
        writeln!(out)?;
        writeln!(out, "pub const DEFAULT_BASE_URL: &str = \"{}\";", endpoints.base_url())?;
        writeln!(out)?;
        writeln!(out, "#[derive(Debug, Clone)]")?;
        writeln!(out, "pub struct ModelServerClient {{")?;
        writeln!(out, "    base_url: String,")?;
        writeln!(out, "    http: reqwest::Client,")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(out, "impl ModelServerClient {{")?;
        writeln!(out, "    pub fn new(base_url: impl Into<String>) -> Self {{")?;
        writeln!(out, "        Self {{")?;
        writeln!(out, "            base_url: base_url.into(),")?;
        writeln!(out, "            http: reqwest::Client::new(),")?;
        writeln!(out, "        }}")?;
        writeln!(out, "    }}")?;
        writeln!(out)?;
        writeln!(out, "    pub async fn ping(&self) -> reqwest::Result<Value> {{")?;
        writeln!(
            out,
            "        self.http.get(format!(\"{{}}/ping\", self.base_url)).send().await?.json().await"
        )?;
        writeln!(out, "    }}")?;

        for d in endpoints.iter() {
            writeln!(out)?;
            writeln!(out, "    /// {}", d.summary)?;
            writeln!(
                out,
                "    pub async fn {}(&self, input: &Value) -> reqwest::Result<Value> {{",
                d.operation_id
            )?;
            writeln!(out, "        self.http")?;
            writeln!(
                out,
                "            .{}(format!(\"{{}}{}\", self.base_url))",
                d.method.as_str().to_ascii_lowercase(),
                d.path
            )?;
            writeln!(out, "            .json(input)")?;
            writeln!(out, "            .send()")?;
            writeln!(out, "            .await?")?;
            writeln!(out, "            .error_for_status()?")?;
            writeln!(out, "            .json()")?;
            writeln!(out, "            .await")?;
            writeln!(out, "    }}")?;
        }

        writeln!(out, "}}")?;
        Ok(out)
    }

    fn write(path: PathBuf, contents: &[u8]) -> Result<PathBuf, CodegenError> {
        std::fs::write(&path, contents).map_err(|source| CodegenError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl ClientSdkGenerator for OpenApiSdkGenerator {
    fn generate(
        &self,
        endpoints: &EndpointDescriptorSet,
        target: &Path,
    ) -> Result<GeneratedSdk, CodegenError> {
        std::fs::create_dir_all(target).map_err(|source| CodegenError::Io {
            path: target.to_path_buf(),
            source,
        })?;

        let doc = serde_json::to_vec_pretty(endpoints.openapi())?;
        let client = Self::render_client(endpoints)?;

        let files = vec![
            Self::write(target.join(OPENAPI_FILE), &doc)?,
            Self::write(target.join(CLIENT_FILE), client.as_bytes())?,
        ];

        tracing::info!(
            target = %target.display(),
            endpoints = endpoints.len(),
            "Client SDK generated"
        );

        Ok(GeneratedSdk {
            dir: target.to_path_buf(),
            files,
        })
    }
}
