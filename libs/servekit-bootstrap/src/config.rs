//! Layered application configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the YAML file given
//! with `--config`, `MMS__*` environment variables (`__` separates nesting,
//! e.g. `MMS__SERVE__PORT=9000`), then command-line overrides.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use servekit::ServeConfig;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "MMS__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub serve: ServeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset, e.g. `info` or
    /// `info,servekit=debug`.
    pub level: String,
    pub format: LogFormat,
    /// Colored output for the text format.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
            ansi: true,
        }
    }
}

/// Command-line values that take precedence over every other layer.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub service: Option<String>,
    pub models: Vec<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub gen_api: Option<PathBuf>,
    pub verbose: u8,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),
    #[error("failed to render configuration: {0}")]
    Render(#[from] serde_json::Error),
}

impl AppConfig {
    /// Merge defaults, the optional YAML file and `MMS__*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingFile`] if `path` is given but is not a
    /// file, or [`ConfigError::Load`] if a layer cannot be parsed.
    pub fn load_layered(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;

        tracing::debug!(from_file = path.is_some(), "Configuration loaded");
        Ok(config)
    }

    /// Overwrite the `serve` section with whatever was given on the command line.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let serve = &mut self.serve;
        if let Some(service) = &args.service {
            serve.service = Some(service.clone());
        }
        if !args.models.is_empty() {
            serve.models.clone_from(&args.models);
        }
        if let Some(host) = &args.host {
            serve.host = Some(host.clone());
        }
        if let Some(port) = args.port {
            serve.port = Some(port);
        }
        if let Some(gen_api) = &args.gen_api {
            serve.gen_api = Some(gen_api.clone());
        }
    }

    /// # Errors
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file_or_env() {
        temp_env::with_vars_unset(["MMS__SERVE__PORT", "MMS__SERVE__SERVICE"], || {
            let config = AppConfig::load_layered(None).unwrap();
            assert_eq!(config, AppConfig::default());
            assert_eq!(config.logging.level, "info");
        });
    }

    #[test]
    fn yaml_file_is_merged() {
        let file = yaml_file(
            "serve:\n  service: linear_service\n  models:\n    - a=a.json\n    - b.json\n  port: 9100\nlogging:\n  format: json\n",
        );
        temp_env::with_vars_unset(["MMS__SERVE__PORT"], || {
            let config = AppConfig::load_layered(Some(file.path())).unwrap();
            assert_eq!(config.serve.service.as_deref(), Some("linear_service"));
            assert_eq!(config.serve.models, vec!["a=a.json", "b.json"]);
            assert_eq!(config.serve.port, Some(9100));
            assert_eq!(config.serve.host, None);
            assert_eq!(config.logging.format, LogFormat::Json);
        });
    }

    #[test]
    fn env_overrides_file() {
        let file = yaml_file("serve:\n  port: 9100\n");
        temp_env::with_var("MMS__SERVE__PORT", Some("9200"), || {
            let config = AppConfig::load_layered(Some(file.path())).unwrap();
            assert_eq!(config.serve.port, Some(9200));
        });
    }

    #[test]
    fn cli_overrides_everything() {
        let file = yaml_file("serve:\n  service: from_file\n  models: [a]\n  port: 9100\n");
        temp_env::with_var("MMS__SERVE__PORT", Some("9200"), || {
            let mut config = AppConfig::load_layered(Some(file.path())).unwrap();
            config.apply_cli_overrides(&CliArgs {
                service: Some("from_cli".to_owned()),
                port: Some(9300),
                ..CliArgs::default()
            });
            assert_eq!(config.serve.service.as_deref(), Some("from_cli"));
            assert_eq!(config.serve.port, Some(9300));
            assert_eq!(config.serve.models, vec!["a"]);
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_layered(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = yaml_file("serve:\n  sevrice: typo\n");
        let err = AppConfig::load_layered(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn renders_as_json() {
        let mut config = AppConfig::default();
        config.serve.service = Some("svc".to_owned());
        let json: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(json["serve"]["service"], "svc");
        assert_eq!(json["logging"]["format"], "text");
    }
}
