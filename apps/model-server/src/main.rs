mod registered_modules;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use mimalloc::MiMalloc;
use servekit::{Orchestrator, StartupError};
use servekit_bootstrap::{AppConfig, CliArgs, ConfigError, LoggingConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const APP_NAME: &str = "model-server";

/// Model Server - serves trained models over HTTP/OpenAPI
#[derive(Parser)]
#[command(name = "model-server")]
#[command(about = "Model Server - serves trained models over HTTP/OpenAPI")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Service module to load, by name or path (e.g. `linear_service`)
    #[arg(long, global = true)]
    service: Option<String>,

    /// Models to serve, each `name=path` or `path`. A bare path may contain
    /// `=` as long as the text before it is not a valid model name.
    #[arg(long, num_args = 1.., value_name = "SPEC", global = true)]
    models: Vec<String>,

    /// Host to bind (default 127.0.0.1)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to bind (default 8080)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Generate client bindings into DIR before serving
    #[arg(long, value_name = "DIR", global = true)]
    gen_api: Option<PathBuf>,

    /// Print effective configuration (JSON) and exit
    #[arg(long, global = true)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Load the models and serve them (default)
    Run,
    /// Validate configuration and the service module without loading models
    Check,
}

impl Cli {
    fn args(&self) -> CliArgs {
        CliArgs {
            config: self.config.clone(),
            service: self.service.clone(),
            models: self.models.clone(),
            host: self.host.clone(),
            port: self.port,
            gen_api: self.gen_api.clone(),
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Startup and configuration errors are already logged.
            if !e.is::<StartupError>() && !e.is::<ConfigError>() {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let args = cli.args();

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (MMS__*) -> 4) CLI overrides
    let mut config = match AppConfig::load_layered(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            servekit_bootstrap::init_logging(&LoggingConfig::default(), args.verbose)?;
            tracing::error!(
                app = APP_NAME,
                stage = "initialization",
                "Failed to initialize model serving: {e}"
            );
            return Err(e.into());
        }
    };
    config.apply_cli_overrides(&args);

    servekit_bootstrap::init_logging(&config.logging, args.verbose)?;

    if cli.print_config {
        let rendered = config
            .to_json()
            .inspect_err(|e| tracing::error!("Cannot print configuration: {e}"))?;
        println!("{rendered}");
        return Ok(());
    }

    let orchestrator = Orchestrator::initialize(APP_NAME, config.serve)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => serve(orchestrator).await,
        Commands::Check => check(orchestrator),
    }
}

fn check(orchestrator: Orchestrator) -> Result<()> {
    let summary = orchestrator.check()?;
    println!("Configuration is valid");
    println!("service: {} ({})", summary.module, summary.class);
    for spec in &summary.models {
        println!("model: {spec}");
    }
    println!("address: {}:{}", summary.server.host, summary.server.port);
    Ok(())
}

async fn serve(orchestrator: Orchestrator) -> Result<()> {
    let handle = orchestrator.start_serving().await?;
    let _signals = servekit_bootstrap::cancel_on_shutdown(handle.cancellation_token());

    handle.wait().await?;
    tracing::info!("Model server stopped");
    Ok(())
}
